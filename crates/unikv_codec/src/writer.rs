//! Streaming record writer.

use crate::error::{CodecError, CodecResult};
use crate::record::BackupRecord;
use std::io::Write;

/// Writes backup records to a byte sink, one CBOR item per record.
///
/// The writer does not buffer; wrap the sink in a `BufWriter` when it is a
/// file or socket.
#[derive(Debug)]
pub struct RecordWriter<W: Write> {
    inner: W,
    records: u64,
    payload_bytes: u64,
}

impl<W: Write> RecordWriter<W> {
    /// Creates a writer over `inner`.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            records: 0,
            payload_bytes: 0,
        }
    }

    /// Appends a record to the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink fails or the record cannot be encoded.
    pub fn write_record(&mut self, record: &BackupRecord) -> CodecResult<()> {
        ciborium::into_writer(&record.to_value(), &mut self.inner).map_err(|e| match e {
            ciborium::ser::Error::Io(e) => CodecError::Io(e),
            ciborium::ser::Error::Value(message) => CodecError::encoding(message),
        })?;
        self.records += 1;
        self.payload_bytes += record.payload_len() as u64;
        Ok(())
    }

    /// Builds a record for `key`/`value`, computing its checksum, and
    /// appends it.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty or the sink fails.
    pub fn write(&mut self, key: &[u8], value: &[u8]) -> CodecResult<u64> {
        if key.is_empty() {
            return Err(CodecError::encoding("record key is empty"));
        }
        let record = BackupRecord::new(key.to_vec(), value.to_vec());
        self.write_record(&record)?;
        Ok(record.checksum)
    }

    /// Number of records written so far.
    #[must_use]
    pub fn records_written(&self) -> u64 {
        self.records
    }

    /// Sum of key and value lengths written so far.
    #[must_use]
    pub fn payload_bytes(&self) -> u64 {
        self.payload_bytes
    }

    /// Flushes the sink and returns it.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    pub fn finish(mut self) -> CodecResult<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_records_and_bytes() {
        let mut writer = RecordWriter::new(Vec::new());
        writer.write(b"a", b"1").unwrap();
        writer.write(b"bb", b"22").unwrap();
        assert_eq!(writer.records_written(), 2);
        assert_eq!(writer.payload_bytes(), 6);

        let out = writer.finish().unwrap();
        assert!(!out.is_empty());
    }

    #[test]
    fn empty_key_refused() {
        let mut writer = RecordWriter::new(Vec::new());
        assert!(writer.write(b"", b"x").is_err());
        assert_eq!(writer.records_written(), 0);
        assert!(writer.finish().unwrap().is_empty());
    }

    #[test]
    fn record_is_a_cbor_array_of_three() {
        let mut writer = RecordWriter::new(Vec::new());
        writer.write(b"k", b"v").unwrap();
        let out = writer.finish().unwrap();
        // 0x83 = array(3), 0x41 = bytes(1)
        assert_eq!(&out[..5], &[0x83, 0x41, b'k', 0x41, b'v']);
    }
}
