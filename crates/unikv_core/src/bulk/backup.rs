//! Point-in-time backup and backup validation.

use crate::error::CoreResult;
use crate::scoped::with_reader;
use std::io::{Read, Write};
use tracing::{debug, info};
use unikv_codec::{RecordReader, RecordWriter};
use unikv_storage::{read_value, Context, Database};

/// Summary of a finished backup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackupStats {
    /// Records written.
    pub records: u64,
    /// Sum of key and value lengths written.
    pub bytes: u64,
}

/// Writes every key/value pair of `db` to `sink` as a checksummed record
/// stream.
///
/// All pairs come from one snapshot, so the dump is consistent even while
/// other transactions commit. Keys are written in ascending order.
///
/// On error the sink may hold a partial stream; discarding it is up to the
/// caller.
///
/// # Errors
///
/// Returns the first snapshot, iteration, value or sink error.
pub fn backup<D, W>(ctx: &Context, db: &D, sink: W) -> CoreResult<BackupStats>
where
    D: Database + ?Sized,
    W: Write,
{
    let mut writer = RecordWriter::new(sink);
    with_reader(ctx, db, |ctx, reader| -> CoreResult<()> {
        for entry in reader.ascend(ctx, b"", b"") {
            let (key, value) = entry?;
            let value = read_value(value)?;
            writer.write(&key, &value)?;
        }
        Ok(())
    })?;

    let stats = BackupStats {
        records: writer.records_written(),
        bytes: writer.payload_bytes(),
    };
    writer.finish()?;
    info!(records = stats.records, bytes = stats.bytes, "backup complete");
    Ok(stats)
}

/// Reads a backup stream to its end, verifying every record's checksum.
///
/// Never touches a store. Returns the number of records.
///
/// # Errors
///
/// Returns a checksum mismatch for the first corrupted record, and
/// truncation, decoding or I/O errors as they occur.
pub fn validate_backup<R: Read>(ctx: &Context, source: R) -> CoreResult<u64> {
    let mut reader = RecordReader::new(source);
    loop {
        ctx.check()?;
        if reader.next_record()?.is_none() {
            break;
        }
    }
    debug!(records = reader.records_read(), "backup stream valid");
    Ok(reader.records_read())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::test_support::{populate, stream};
    use unikv_codec::record_checksum;
    use unikv_storage::MemoryDatabase;

    #[test]
    fn backup_writes_sorted_verified_records() {
        let db = MemoryDatabase::new();
        populate(&db, &[("b", "2"), ("a", "1"), ("c", "")]);
        let ctx = Context::background();

        let mut out = Vec::new();
        let stats = backup(&ctx, &db, &mut out).unwrap();
        assert_eq!(stats, BackupStats { records: 3, bytes: 5 });
        assert_eq!(db.active_handles(), 0);

        let records: Vec<_> = RecordReader::new(&out[..])
            .collect::<Result<_, _>>()
            .unwrap();
        let keys: Vec<Vec<u8>> = records.iter().map(|r| r.key.clone()).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(records[0].checksum, record_checksum(b"a", b"1"));
        assert_eq!(stream(&[("a", "1"), ("b", "2"), ("c", "")]), out);
    }

    #[test]
    fn empty_database_gives_empty_stream() {
        let db = MemoryDatabase::new();
        let ctx = Context::background();
        let mut out = Vec::new();
        assert_eq!(backup(&ctx, &db, &mut out).unwrap(), BackupStats::default());
        assert!(out.is_empty());
        assert_eq!(validate_backup(&ctx, &out[..]).unwrap(), 0);
    }

    #[test]
    fn validate_counts_records() {
        let ctx = Context::background();
        let data = stream(&[("x", "1"), ("y", "2")]);
        assert_eq!(validate_backup(&ctx, &data[..]).unwrap(), 2);
    }

    #[test]
    fn validate_detects_flipped_value_byte() {
        let ctx = Context::background();
        let mut data = stream(&[("key", "value")]);
        // array header, key header, "key", value header
        assert_eq!(data[6], b'v');
        data[6] ^= 0x01;
        assert!(validate_backup(&ctx, &data[..])
            .unwrap_err()
            .is_checksum_mismatch());
    }

    #[test]
    fn validate_detects_flipped_key_byte() {
        let ctx = Context::background();
        let mut data = stream(&[("key", "value")]);
        assert_eq!(data[2], b'k');
        data[2] ^= 0x20;
        assert!(validate_backup(&ctx, &data[..])
            .unwrap_err()
            .is_checksum_mismatch());
    }

    #[test]
    fn validate_honors_cancellation() {
        let ctx = Context::background();
        ctx.cancel();
        let data = stream(&[("x", "1")]);
        assert!(validate_backup(&ctx, &data[..]).unwrap_err().is_cancelled());
    }
}
