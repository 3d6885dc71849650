//! Scoped snapshots and transactions.
//!
//! The helpers here own the handle for the duration of one unit of work and
//! release it on every exit path, panics included: a snapshot is always
//! discarded and a transaction that did not commit is always rolled back.

use tracing::warn;
use unikv_storage::{Context, Database, KvError, ReadWriter, Reader, Snapshot, Transaction};

/// How a unit of work wants its transaction to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Finish {
    Commit,
    Rollback,
}

/// Runs `work` against a fresh snapshot of `db`.
///
/// The snapshot is discarded afterwards whatever `work` returns. The error is
/// the snapshot creation error or `work`'s own.
///
/// ```
/// use unikv_core::with_reader;
/// use unikv_storage::{Context, KvError, MemoryDatabase};
///
/// let db = MemoryDatabase::new();
/// let ctx = Context::background();
/// let count = with_reader(&ctx, &db, |ctx, reader| {
///     Ok::<_, KvError>(reader.scan(ctx).count())
/// })
/// .unwrap();
/// assert_eq!(count, 0);
/// ```
///
/// # Errors
///
/// Returns the creation error converted into `E`, or `work`'s error.
pub fn with_reader<D, T, E, F>(ctx: &Context, db: &D, work: F) -> Result<T, E>
where
    D: Database + ?Sized,
    E: From<KvError>,
    F: FnOnce(&Context, &dyn Reader) -> Result<T, E>,
{
    let guard = DiscardGuard {
        snapshot: db.new_snapshot(ctx)?,
        ctx,
    };
    work(ctx, &guard.snapshot)
}

/// Runs `work` in a fresh transaction of `db` and commits if it succeeds.
///
/// If `work` fails the transaction is rolled back and commit is never
/// attempted, so the store is left exactly as it was. Rollback is also
/// armed as a safety net after a commit, where it is a harmless no-op.
///
/// ```
/// use unikv_core::with_read_writer;
/// use unikv_storage::{Context, KvError, MemoryDatabase};
///
/// let db = MemoryDatabase::new();
/// let ctx = Context::background();
/// with_read_writer(&ctx, &db, |ctx, tx| {
///     tx.set(ctx, b"k", &mut &b"v"[..])?;
///     Ok::<_, KvError>(())
/// })
/// .unwrap();
/// assert_eq!(db.len(), 1);
/// ```
///
/// # Errors
///
/// Returns the creation error, else `work`'s error, else the commit error.
pub fn with_read_writer<D, T, E, F>(ctx: &Context, db: &D, work: F) -> Result<T, E>
where
    D: Database + ?Sized,
    E: From<KvError>,
    F: FnOnce(&Context, &mut dyn ReadWriter) -> Result<T, E>,
{
    with_transaction(ctx, db, |ctx, tx| {
        let value = work(ctx, tx)?;
        Ok((value, Finish::Commit))
    })
}

/// Like [`with_read_writer`], but `work` decides whether to commit.
pub(crate) fn with_transaction<D, T, E, F>(ctx: &Context, db: &D, work: F) -> Result<T, E>
where
    D: Database + ?Sized,
    E: From<KvError>,
    F: FnOnce(&Context, &mut dyn ReadWriter) -> Result<(T, Finish), E>,
{
    let mut guard = RollbackGuard {
        tx: db.new_transaction(ctx)?,
        ctx,
    };
    let (value, finish) = work(ctx, &mut guard.tx)?;
    if finish == Finish::Commit {
        guard.tx.commit(ctx)?;
    }
    Ok(value)
}

struct DiscardGuard<'c, S: Snapshot> {
    snapshot: S,
    ctx: &'c Context,
}

impl<S: Snapshot> Drop for DiscardGuard<'_, S> {
    fn drop(&mut self) {
        if let Err(err) = self.snapshot.discard(self.ctx) {
            warn!(error = %err, "failed to discard snapshot");
        }
    }
}

struct RollbackGuard<'c, T: Transaction> {
    tx: T,
    ctx: &'c Context,
}

impl<T: Transaction> Drop for RollbackGuard<'_, T> {
    fn drop(&mut self) {
        match self.tx.rollback(self.ctx) {
            Ok(()) | Err(KvError::AlreadyClosed) => {}
            Err(err) => warn!(error = %err, "failed to roll back transaction"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, CoreResult};
    use unikv_storage::{read_value, MemoryDatabase};

    fn put(db: &MemoryDatabase, key: &[u8], value: &[u8]) {
        let ctx = Context::background();
        with_read_writer(&ctx, db, |ctx, tx| {
            tx.set(ctx, key, &mut &value[..])?;
            Ok::<_, KvError>(())
        })
        .unwrap();
    }

    fn get(db: &MemoryDatabase, key: &[u8]) -> Option<Vec<u8>> {
        let ctx = Context::background();
        with_reader(&ctx, db, |ctx, reader| match reader.get(ctx, key) {
            Ok(value) => Ok(Some(read_value(value)?)),
            Err(KvError::NotFound) => Ok(None),
            Err(err) => Err(err),
        })
        .unwrap()
    }

    #[test]
    fn reader_is_released() {
        let db = MemoryDatabase::new();
        put(&db, b"k", b"v");
        assert_eq!(get(&db, b"k"), Some(b"v".to_vec()));
        assert_eq!(db.active_handles(), 0);

        let ctx = Context::background();
        let err = with_reader(&ctx, &db, |_, _| -> CoreResult<()> {
            Err(CoreError::invalid_argument("boom"))
        })
        .unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(db.active_handles(), 0);
    }

    #[test]
    fn failed_work_leaves_store_unchanged() {
        let db = MemoryDatabase::new();
        put(&db, b"a", b"1");
        let before = db.committed_seq();

        let ctx = Context::background();
        let err = with_read_writer(&ctx, &db, |ctx, tx| -> CoreResult<()> {
            tx.set(ctx, b"a", &mut &b"2"[..])?;
            tx.set(ctx, b"b", &mut &b"3"[..])?;
            tx.delete(ctx, b"missing")?;
            Ok(())
        })
        .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(get(&db, b"a"), Some(b"1".to_vec()));
        assert_eq!(get(&db, b"b"), None);
        assert_eq!(db.committed_seq(), before);
        assert_eq!(db.active_handles(), 0);
    }

    #[test]
    fn work_value_is_returned_after_commit() {
        let db = MemoryDatabase::new();
        let ctx = Context::background();
        let written = with_read_writer(&ctx, &db, |ctx, tx| {
            for key in [b"x", b"y", b"z"] {
                tx.set(ctx, key, &mut &b""[..])?;
            }
            Ok::<_, KvError>(3)
        })
        .unwrap();
        assert_eq!(written, 3);
        assert_eq!(db.len(), 3);
    }

    #[test]
    fn commit_error_is_reported() {
        let db = MemoryDatabase::new();
        let ctx = Context::background();
        let err = with_read_writer(&ctx, &db, |ctx, tx| {
            tx.set(ctx, b"k", &mut &b"mine"[..])?;
            // a concurrent writer commits the same key first
            put(&db, b"k", b"theirs");
            Ok::<_, KvError>(())
        })
        .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(get(&db, b"k"), Some(b"theirs".to_vec()));
        assert_eq!(db.active_handles(), 0);
    }

    #[test]
    fn panicking_work_still_releases() {
        let db = MemoryDatabase::new();
        let ctx = Context::background();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<(), KvError> = with_read_writer(&ctx, &db, |ctx, tx| {
                tx.set(ctx, b"k", &mut &b"v"[..])?;
                panic!("work failed");
            });
        }));
        assert!(result.is_err());
        assert_eq!(db.active_handles(), 0);
        assert!(db.is_empty());
    }

    #[test]
    fn rollback_only_transaction() {
        let db = MemoryDatabase::new();
        let ctx = Context::background();
        let value = with_transaction(&ctx, &db, |ctx, tx| {
            tx.set(ctx, b"k", &mut &b"v"[..])?;
            Ok::<_, KvError>((7, Finish::Rollback))
        })
        .unwrap();
        assert_eq!(value, 7);
        assert!(db.is_empty());
        assert_eq!(db.committed_seq(), 0);
    }

    #[test]
    fn cancelled_context_fails_creation() {
        let db = MemoryDatabase::new();
        let ctx = Context::background();
        ctx.cancel();
        let err = with_reader(&ctx, &db, |_, _| Ok::<_, CoreError>(())).unwrap_err();
        assert!(err.is_cancelled());
    }
}
