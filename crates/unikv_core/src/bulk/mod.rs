//! Bulk operations built purely on the backend contract.
//!
//! - [`backup`] writes a consistent dump from one snapshot
//! - [`validate_backup`] checks a dump without touching any store
//! - [`restore`] replays a dump in chunks of bounded transactions
//! - [`clear`] deletes everything in chunks
//!
//! Chunks commit independently. When a chunked operation fails, every chunk
//! committed before the failure stays applied and the failing chunk is
//! rolled back as a whole.

mod backup;
mod clear;
mod restore;

pub use backup::{backup, validate_backup, BackupStats};
pub use clear::{clear, clear_with_config, ClearStats};
pub use restore::{restore, restore_with_config, RestoreStats};

#[cfg(test)]
pub(crate) mod test_support {
    use unikv_codec::RecordWriter;
    use unikv_storage::{read_value, Context, MemoryDatabase};

    use crate::scoped::{with_read_writer, with_reader};
    use std::collections::BTreeMap;

    pub(crate) fn populate(db: &MemoryDatabase, pairs: &[(&str, &str)]) {
        let ctx = Context::background();
        with_read_writer(&ctx, db, |ctx, tx| {
            for (key, value) in pairs {
                tx.set(ctx, key.as_bytes(), &mut value.as_bytes())?;
            }
            Ok::<_, unikv_storage::KvError>(())
        })
        .unwrap();
    }

    pub(crate) fn dump(db: &MemoryDatabase) -> BTreeMap<Vec<u8>, Vec<u8>> {
        let ctx = Context::background();
        with_reader(&ctx, db, |ctx, reader| {
            reader
                .ascend(ctx, b"", b"")
                .map(|entry| {
                    let (key, value) = entry?;
                    Ok((key, read_value(value)?))
                })
                .collect::<Result<_, unikv_storage::KvError>>()
        })
        .unwrap()
    }

    pub(crate) fn stream(pairs: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = RecordWriter::new(Vec::new());
        for (key, value) in pairs {
            writer.write(key.as_bytes(), value.as_bytes()).unwrap();
        }
        writer.finish().unwrap()
    }
}
