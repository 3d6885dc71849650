//! Streaming record reader.

use crate::error::{CodecError, CodecResult};
use crate::record::BackupRecord;
use ciborium::value::Value;
use std::io::{self, BufRead, BufReader, Read};

/// Reads and verifies backup records from a byte source.
///
/// A clean end of input between two records ends the stream. Input that
/// stops inside a record is reported as [`CodecError::Truncated`].
#[derive(Debug)]
pub struct RecordReader<R: Read> {
    inner: BufReader<R>,
    records: u64,
    failed: bool,
}

impl<R: Read> RecordReader<R> {
    /// Creates a reader over `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            records: 0,
            failed: false,
        }
    }

    /// Reads the next record and verifies its checksum.
    ///
    /// Returns `Ok(None)` at a clean end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::ChecksumMismatch`] for a corrupted record,
    /// [`CodecError::Truncated`] for a partial record, and decoding or I/O
    /// errors otherwise.
    pub fn next_record(&mut self) -> CodecResult<Option<BackupRecord>> {
        if self.inner.fill_buf()?.is_empty() {
            return Ok(None);
        }

        let value: Value = ciborium::from_reader(&mut self.inner).map_err(|e| match e {
            ciborium::de::Error::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                CodecError::Truncated
            }
            ciborium::de::Error::Io(e) => CodecError::Io(e),
            other => CodecError::decoding(format!("{other:?}")),
        })?;

        let record = BackupRecord::from_value(value)?;
        record.verify()?;
        self.records += 1;
        Ok(Some(record))
    }

    /// Number of verified records read so far.
    #[must_use]
    pub fn records_read(&self) -> u64 {
        self.records
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = CodecResult<BackupRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.next_record().transpose();
        if matches!(item, Some(Err(_))) {
            self.failed = true;
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::RecordWriter;

    fn encode(pairs: &[(&[u8], &[u8])]) -> Vec<u8> {
        let mut writer = RecordWriter::new(Vec::new());
        for (k, v) in pairs {
            writer.write(k, v).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn empty_stream_is_clean_end() {
        let mut reader = RecordReader::new(&[][..]);
        assert!(reader.next_record().unwrap().is_none());
        assert_eq!(reader.records_read(), 0);
    }

    #[test]
    fn reads_records_in_order() {
        let data = encode(&[(b"a", b"1"), (b"b", b""), (b"c", b"333")]);
        let records: Vec<_> = RecordReader::new(&data[..])
            .collect::<CodecResult<_>>()
            .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].key, b"a");
        assert_eq!(records[1].value, b"");
        assert_eq!(records[2].value, b"333");
    }

    #[test]
    fn flipped_value_byte_is_checksum_mismatch() {
        let mut data = encode(&[(b"key", b"value")]);
        // array(3) bytes(3) "key" bytes(5) "value" ...
        let value_start = 1 + 1 + 3 + 1;
        data[value_start] ^= 0x20;
        let err = RecordReader::new(&data[..]).next_record().unwrap_err();
        assert!(err.is_checksum_mismatch());
    }

    #[test]
    fn flipped_key_byte_is_checksum_mismatch() {
        let mut data = encode(&[(b"key", b"value")]);
        data[2] ^= 0x01;
        let err = RecordReader::new(&data[..]).next_record().unwrap_err();
        assert!(err.is_checksum_mismatch());
    }

    #[test]
    fn cut_record_is_truncated() {
        let data = encode(&[(b"key", b"value")]);
        let cut = &data[..data.len() - 2];
        let err = RecordReader::new(cut).next_record().unwrap_err();
        assert!(matches!(err, CodecError::Truncated));
    }

    #[test]
    fn iterator_stops_after_error() {
        let first_len = encode(&[(b"a", b"1")]).len();
        let mut data = encode(&[(b"a", b"1"), (b"b", b"2")]);
        // second record's key byte
        data[first_len + 2] ^= 0x01;
        let mut reader = RecordReader::new(&data[..]);
        assert!(reader.next().unwrap().is_ok());
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }

    #[test]
    fn garbage_is_decoding_error() {
        let data = [0xFFu8, 0x00, 0x01];
        let err = RecordReader::new(&data[..]).next_record().unwrap_err();
        assert!(!err.is_checksum_mismatch());
    }
}
