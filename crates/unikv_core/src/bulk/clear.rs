//! Chunked deletion of every key.

use crate::config::{chunk_limit, BulkConfig};
use crate::error::CoreResult;
use crate::scoped::{with_transaction, Finish};
use tracing::{debug, info, warn};
use unikv_storage::{Context, Database, KvResult};

/// Summary of a finished clear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearStats {
    /// Keys deleted.
    pub deleted: u64,
    /// Transactions committed.
    pub transactions: u64,
}

/// Deletes every key in `db`, at most `max_per_tx` per transaction (zero
/// means one transaction).
///
/// Stops once a chunk finds no keys; that last chunk is not committed.
///
/// # Errors
///
/// Returns `InvalidArgument` for a negative `max_per_tx`. Any iteration,
/// delete or commit error stops the clear: chunks committed before it stay
/// applied and the failing chunk is rolled back.
pub fn clear<D>(ctx: &Context, db: &D, max_per_tx: i64) -> CoreResult<ClearStats>
where
    D: Database + ?Sized,
{
    let limit = chunk_limit(max_per_tx)?;
    run(ctx, db, limit)
}

/// [`clear`] with the chunk size taken from `config`.
///
/// # Errors
///
/// As for [`clear`].
pub fn clear_with_config<D>(ctx: &Context, db: &D, config: &BulkConfig) -> CoreResult<ClearStats>
where
    D: Database + ?Sized,
{
    let limit = config.chunk_limit()?;
    run(ctx, db, limit)
}

fn run<D>(ctx: &Context, db: &D, limit: usize) -> CoreResult<ClearStats>
where
    D: Database + ?Sized,
{
    let mut stats = ClearStats::default();
    loop {
        let chunk = stats.transactions + 1;
        let result = with_transaction(ctx, db, |ctx, tx| -> CoreResult<_> {
            let keys = tx
                .ascend(ctx, b"", b"")
                .take(limit)
                .map(|entry| entry.map(|(key, _)| key))
                .collect::<KvResult<Vec<_>>>()?;
            if keys.is_empty() {
                return Ok((0, Finish::Rollback));
            }
            for key in &keys {
                tx.delete(ctx, key)?;
            }
            Ok((keys.len(), Finish::Commit))
        });

        let deleted = match result {
            Ok(0) => break,
            Ok(deleted) => deleted,
            Err(err) => {
                warn!(chunk, keys_deleted = stats.deleted, error = %err, "clear chunk abandoned");
                return Err(err);
            }
        };
        stats.deleted += deleted as u64;
        stats.transactions += 1;
        debug!(chunk, keys = deleted, "clear chunk committed");
    }

    info!(
        deleted = stats.deleted,
        transactions = stats.transactions,
        "clear complete"
    );
    Ok(stats)
}
