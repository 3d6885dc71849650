//! Type-erased databases.
//!
//! [`Database`] has associated handle types, so two backends are two
//! different types. [`AnyDatabase`] hides the backend behind one type whose
//! handles are boxed trait objects, for code that picks a backend at runtime
//! or stores several side by side.

use crate::backend::{Database, Snapshot, Transaction};
use crate::context::Context;
use crate::error::KvResult;
use std::sync::Arc;

/// Object-safe view of a [`Database`].
trait DynDatabase: Send + Sync {
    fn open_transaction(&self, ctx: &Context) -> KvResult<Box<dyn Transaction>>;
    fn open_snapshot(&self, ctx: &Context) -> KvResult<Box<dyn Snapshot>>;
}

impl<D> DynDatabase for D
where
    D: Database,
    D::Transaction: 'static,
    D::Snapshot: 'static,
{
    fn open_transaction(&self, ctx: &Context) -> KvResult<Box<dyn Transaction>> {
        let tx = self.new_transaction(ctx)?;
        Ok(Box::new(tx))
    }

    fn open_snapshot(&self, ctx: &Context) -> KvResult<Box<dyn Snapshot>> {
        let snapshot = self.new_snapshot(ctx)?;
        Ok(Box::new(snapshot))
    }
}

/// A database of any backend.
///
/// ```rust
/// use unikv_storage::{database_from, Context, Database, MemoryDatabase, Transaction};
///
/// let db = database_from(MemoryDatabase::new());
/// let ctx = Context::background();
/// let mut tx = db.new_transaction(&ctx).unwrap();
/// tx.commit(&ctx).unwrap();
/// ```
#[derive(Clone)]
pub struct AnyDatabase {
    inner: Arc<dyn DynDatabase>,
}

impl AnyDatabase {
    /// Wraps `db`.
    pub fn new<D>(db: D) -> Self
    where
        D: Database + 'static,
    {
        Self {
            inner: Arc::new(db),
        }
    }
}

impl std::fmt::Debug for AnyDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyDatabase").finish_non_exhaustive()
    }
}

impl Database for AnyDatabase {
    type Transaction = Box<dyn Transaction>;
    type Snapshot = Box<dyn Snapshot>;

    fn new_transaction(&self, ctx: &Context) -> KvResult<Box<dyn Transaction>> {
        self.inner.open_transaction(ctx)
    }

    fn new_snapshot(&self, ctx: &Context) -> KvResult<Box<dyn Snapshot>> {
        self.inner.open_snapshot(ctx)
    }
}

/// Erases the backend type of `db`.
pub fn database_from<D>(db: D) -> AnyDatabase
where
    D: Database + 'static,
{
    AnyDatabase::new(db)
}
