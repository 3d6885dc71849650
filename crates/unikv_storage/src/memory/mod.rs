//! In-memory multi-version backend.
//!
//! Suitable for tests and ephemeral data. Every commit gets a sequence
//! number; snapshots and transactions read the newest versions at or below
//! the sequence current when they were created. Commits are checked
//! optimistically and serialized behind one lock.
//!
//! # Example
//!
//! ```rust
//! use unikv_storage::{read_value, Context, Database, Getter, MemoryDatabase, Setter, Transaction};
//!
//! let ctx = Context::background();
//! let db = MemoryDatabase::new();
//!
//! let mut tx = db.new_transaction(&ctx).unwrap();
//! tx.set(&ctx, b"greeting", &mut &b"hello"[..]).unwrap();
//! tx.commit(&ctx).unwrap();
//!
//! let tx = db.new_transaction(&ctx).unwrap();
//! let value = read_value(tx.get(&ctx, b"greeting").unwrap()).unwrap();
//! assert_eq!(value, b"hello");
//! ```

mod iter;
mod snapshot;
mod store;
mod transaction;

pub use snapshot::MemorySnapshot;
pub use transaction::{MemoryTransaction, TransactionState};

use crate::backend::Database;
use crate::config::MemoryConfig;
use crate::context::Context;
use crate::error::KvResult;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use store::VersionStore;

/// Buffered writes of a transaction. `None` marks a deletion.
pub(crate) type WriteSet = BTreeMap<Vec<u8>, Option<Bytes>>;

pub(crate) struct Shared {
    pub(crate) config: MemoryConfig,
    pub(crate) store: RwLock<VersionStore>,
}

/// An in-memory database.
///
/// Cloning is cheap and every clone refers to the same data.
#[derive(Clone)]
pub struct MemoryDatabase {
    shared: Arc<Shared>,
}

impl MemoryDatabase {
    /// Creates an empty database with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MemoryConfig::default())
    }

    /// Creates an empty database.
    #[must_use]
    pub fn with_config(config: MemoryConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                store: RwLock::new(VersionStore::default()),
            }),
        }
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &MemoryConfig {
        &self.shared.config
    }

    /// Sequence number of the latest commit. Zero before any commit.
    #[must_use]
    pub fn committed_seq(&self) -> u64 {
        self.shared.store.read().committed_seq()
    }

    /// Number of live keys in the latest committed state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.store.read().live_count()
    }

    /// Returns true if the latest committed state holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of snapshots and transactions not yet released.
    #[must_use]
    pub fn active_handles(&self) -> usize {
        self.shared.store.read().pinned_count()
    }

    /// Number of stored versions, deletions included.
    #[must_use]
    pub fn version_count(&self) -> usize {
        self.shared.store.read().version_count()
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.shared.store.read();
        f.debug_struct("MemoryDatabase")
            .field("config", &self.shared.config)
            .field("committed_seq", &store.committed_seq())
            .field("active_handles", &store.pinned_count())
            .finish()
    }
}

impl Database for MemoryDatabase {
    type Transaction = MemoryTransaction;
    type Snapshot = MemorySnapshot;

    fn new_transaction(&self, ctx: &Context) -> KvResult<MemoryTransaction> {
        ctx.check()?;
        let seq = self.shared.store.write().pin_current();
        Ok(MemoryTransaction::new(Arc::clone(&self.shared), seq))
    }

    fn new_snapshot(&self, ctx: &Context) -> KvResult<MemorySnapshot> {
        ctx.check()?;
        let seq = self.shared.store.write().pin_current();
        Ok(MemorySnapshot::new(Arc::clone(&self.shared), seq))
    }
}
