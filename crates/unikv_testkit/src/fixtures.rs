//! Test fixtures and database helpers.
//!
//! Every helper works against any [`Database`] and panics on failure, so
//! they can be used directly inside `#[test]` functions.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use tempfile::NamedTempFile;
use unikv_codec::RecordWriter;
use unikv_core::{backup, with_read_writer, with_reader};
use unikv_storage::{read_value, Context, Database, KvError};

/// Ordered key/value pairs as the tests compare them.
pub type Contents = BTreeMap<Vec<u8>, Vec<u8>>;

/// Writes `entries` into `db` in one transaction.
pub fn populate<D, I, K, V>(db: &D, entries: I)
where
    D: Database + ?Sized,
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<[u8]>,
    V: AsRef<[u8]>,
{
    let ctx = Context::background();
    with_read_writer(&ctx, db, |ctx, tx| {
        for (key, value) in entries {
            tx.set(ctx, key.as_ref(), &mut value.as_ref())?;
        }
        Ok::<_, KvError>(())
    })
    .expect("Failed to populate database");
}

/// Reads every pair visible to a fresh snapshot of `db`.
pub fn dump<D: Database + ?Sized>(db: &D) -> Contents {
    let ctx = Context::background();
    with_reader(&ctx, db, |ctx, reader| {
        reader
            .ascend(ctx, b"", b"")
            .map(|entry| {
                let (key, value) = entry?;
                Ok((key, read_value(value)?))
            })
            .collect::<Result<Contents, KvError>>()
    })
    .expect("Failed to dump database")
}

/// Reads the value at `key`, or `None` if it is absent.
pub fn value_of<D: Database + ?Sized>(db: &D, key: &[u8]) -> Option<Vec<u8>> {
    let ctx = Context::background();
    let result = with_reader(&ctx, db, |ctx, reader| match reader.get(ctx, key) {
        Ok(value) => read_value(value).map(Some),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    });
    result.expect("Failed to read key")
}

/// Deterministic sample data: `count` keys under `item/` with values of
/// varying length, some of them empty.
pub fn sample_entries(count: usize) -> Contents {
    (0..count)
        .map(|i| {
            let key = format!("item/{i:06}").into_bytes();
            let value = (0..(i * 13) % 97).map(|b| (b ^ i) as u8).collect();
            (key, value)
        })
        .collect()
}

/// Encodes `entries` as a backup stream without going through a database.
pub fn record_stream<I, K, V>(entries: I) -> Vec<u8>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<[u8]>,
    V: AsRef<[u8]>,
{
    let mut writer = RecordWriter::new(Vec::new());
    for (key, value) in entries {
        writer
            .write(key.as_ref(), value.as_ref())
            .expect("Failed to encode record");
    }
    writer.finish().expect("Failed to finish stream")
}

/// Takes a backup of `db` into memory.
pub fn backup_bytes<D: Database + ?Sized>(db: &D) -> Vec<u8> {
    let ctx = Context::background();
    let mut sink = Vec::new();
    backup(&ctx, db, &mut sink).expect("Failed to back up database");
    sink
}

/// A backup written to a temporary file, removed on drop.
pub struct BackupFile {
    file: NamedTempFile,
    /// Records in the backup.
    pub records: u64,
}

impl BackupFile {
    /// Backs up `db` into a new temporary file.
    pub fn create<D: Database + ?Sized>(db: &D) -> Self {
        let ctx = Context::background();
        let file = NamedTempFile::new().expect("Failed to create temp file");
        let mut sink = BufWriter::new(file.reopen().expect("Failed to open temp file"));
        let stats = backup(&ctx, db, &mut sink).expect("Failed to back up database");
        sink.flush().expect("Failed to flush backup");
        Self {
            file,
            records: stats.records,
        }
    }

    /// Opens the backup for reading from the start.
    pub fn open(&self) -> File {
        File::open(self.file.path()).expect("Failed to open backup file")
    }

    /// Size of the backup in bytes.
    pub fn len(&self) -> u64 {
        self.file
            .as_file()
            .metadata()
            .expect("Failed to stat backup file")
            .len()
    }

    /// Whether the backup holds no records.
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unikv_storage::MemoryDatabase;

    #[test]
    fn populate_and_dump() {
        let db = MemoryDatabase::new();
        populate(&db, [("b", "2"), ("a", "1")]);
        let contents = dump(&db);
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[&b"a".to_vec()], b"1");
        assert_eq!(value_of(&db, b"b"), Some(b"2".to_vec()));
        assert_eq!(value_of(&db, b"c"), None);
    }

    #[test]
    fn sample_entries_are_stable() {
        let first = sample_entries(40);
        assert_eq!(first, sample_entries(40));
        assert_eq!(first.len(), 40);
        assert!(first.values().any(Vec::is_empty));
    }

    #[test]
    fn backup_file_roundtrip() {
        let db = MemoryDatabase::new();
        populate(&db, sample_entries(25));
        let file = BackupFile::create(&db);
        assert_eq!(file.records, 25);
        assert!(!file.is_empty());
        assert_eq!(file.len(), backup_bytes(&db).len() as u64);

        let ctx = Context::background();
        assert_eq!(unikv_core::validate_backup(&ctx, file.open()).unwrap(), 25);
    }
}
