//! Chunked restore from a backup stream.

use crate::config::{chunk_limit, BulkConfig};
use crate::error::CoreResult;
use crate::scoped::{with_transaction, Finish};
use std::io::Read;
use tracing::{debug, info, warn};
use unikv_codec::RecordReader;
use unikv_storage::{Context, Database};

/// Summary of a finished restore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreStats {
    /// Records written.
    pub records: u64,
    /// Transactions committed.
    pub transactions: u64,
}

/// Replays the backup stream in `source` into `db`.
///
/// Records are written `max_per_tx` per transaction (zero means one
/// transaction for the whole stream). Each record's checksum is verified
/// before it is written. When the stream ends inside a chunk, the partial
/// chunk is committed. A chunk that would hold no records is rolled back
/// rather than committed, so a stream whose length is a multiple of
/// `max_per_tx` takes exactly `len / max_per_tx` commits and an empty stream
/// takes none. Backends that count commits see no trailing empty one.
///
/// Existing keys not present in the stream are left alone.
///
/// # Errors
///
/// Returns `InvalidArgument` for a negative `max_per_tx`. Any stream, write
/// or commit error stops the restore: chunks committed before it stay
/// applied and the failing chunk is rolled back.
pub fn restore<D, R>(ctx: &Context, db: &D, source: R, max_per_tx: i64) -> CoreResult<RestoreStats>
where
    D: Database + ?Sized,
    R: Read,
{
    let limit = chunk_limit(max_per_tx)?;
    run(ctx, db, source, limit)
}

/// [`restore`] with the chunk size taken from `config`.
///
/// # Errors
///
/// As for [`restore`].
pub fn restore_with_config<D, R>(
    ctx: &Context,
    db: &D,
    source: R,
    config: &BulkConfig,
) -> CoreResult<RestoreStats>
where
    D: Database + ?Sized,
    R: Read,
{
    let limit = config.chunk_limit()?;
    run(ctx, db, source, limit)
}

fn run<D, R>(ctx: &Context, db: &D, source: R, limit: usize) -> CoreResult<RestoreStats>
where
    D: Database + ?Sized,
    R: Read,
{
    let mut reader = RecordReader::new(source);
    let mut stats = RestoreStats::default();

    loop {
        let chunk = stats.transactions + 1;
        let result = with_transaction(ctx, db, |ctx, tx| -> CoreResult<_> {
            let mut written = 0usize;
            let mut exhausted = false;
            while written < limit {
                let Some(record) = reader.next_record()? else {
                    exhausted = true;
                    break;
                };
                tx.set(ctx, &record.key, &mut record.value.as_slice())?;
                written += 1;
            }
            let finish = if written == 0 {
                Finish::Rollback
            } else {
                Finish::Commit
            };
            Ok(((written, exhausted), finish))
        });

        let (written, exhausted) = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(chunk, records_committed = stats.records, error = %err, "restore chunk abandoned");
                return Err(err);
            }
        };
        if written > 0 {
            stats.records += written as u64;
            stats.transactions += 1;
            debug!(chunk, records = written, "restore chunk committed");
        }
        if exhausted {
            break;
        }
    }

    info!(
        records = stats.records,
        transactions = stats.transactions,
        "restore complete"
    );
    Ok(stats)
}
