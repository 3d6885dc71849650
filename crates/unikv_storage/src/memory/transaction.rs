//! Optimistic transactions over the in-memory backend.

use super::iter::{failed, range_iter, value_reader};
use super::store::{Direction, Seq, VersionStore};
use super::{Shared, WriteSet};
use crate::backend::{Deleter, Getter, KvIter, Ranger, Scanner, Setter, Transaction, ValueReader};
use crate::context::Context;
use crate::error::{KvError, KvResult};
use crate::range::{validate_key, KeyRange};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::io::Read;
use std::sync::Arc;
use tracing::debug;

/// Transaction lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Operations are allowed.
    Active,
    /// Writes were applied.
    Committed,
    /// Writes were dropped, by rollback or by a failed commit.
    RolledBack,
}

/// Keys and ranges read from committed state.
#[derive(Debug, Default)]
pub(crate) struct ReadSet {
    pub(crate) keys: BTreeSet<Vec<u8>>,
    ranges: Vec<KeyRange>,
}

/// A transaction on a [`MemoryDatabase`](super::MemoryDatabase).
///
/// Reads see the database as of [`start_seq`](Self::start_seq) with this
/// transaction's buffered writes on top. At commit, any key it read or
/// wrote, iteration included (and, when range tracking is enabled, any key
/// in a range it iterated), that another transaction committed since then is a conflict.
/// A transaction with no writes always commits.
///
/// Dropping an active transaction rolls it back.
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    start_seq: Seq,
    state: TransactionState,
    writes: WriteSet,
    reads: Mutex<ReadSet>,
}

impl MemoryTransaction {
    pub(crate) fn new(shared: Arc<Shared>, start_seq: Seq) -> Self {
        Self {
            shared,
            start_seq,
            state: TransactionState::Active,
            writes: WriteSet::new(),
            reads: Mutex::new(ReadSet::default()),
        }
    }

    /// Commit sequence this transaction reads at.
    #[must_use]
    pub fn start_seq(&self) -> u64 {
        self.start_seq
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Number of buffered writes, deletions included.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    fn ensure_active(&self) -> KvResult<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            TransactionState::Committed | TransactionState::RolledBack => {
                Err(KvError::AlreadyClosed)
            }
        }
    }

    /// Current value of `key` as this transaction sees it.
    fn lookup(&self, key: &[u8]) -> Option<Bytes> {
        if let Some(buffered) = self.writes.get(key) {
            return buffered.clone();
        }
        self.reads.lock().keys.insert(key.to_vec());
        self.shared
            .store
            .read()
            .get_at(key, self.start_seq)
            .cloned()
    }

    fn iter(&self, ctx: &Context, begin: &[u8], end: &[u8], direction: Direction) -> KvIter<'_> {
        if let Err(err) = self.ensure_active() {
            return failed(err);
        }
        let range = KeyRange::new(begin, end);
        // a tracked range covers every key in it; otherwise record keys as seen
        let mut key_reads = Some(&self.reads);
        if let Ok(range) = &range {
            if self.shared.config.track_range_reads {
                self.reads.lock().ranges.push(range.clone());
                key_reads = None;
            }
        }
        range_iter(
            &self.shared,
            ctx,
            self.start_seq,
            Some(&self.writes),
            key_reads,
            range,
            direction,
        )
    }

    /// Finds a key changed by someone else since this transaction started.
    fn find_conflict(&self, store: &VersionStore, reads: &ReadSet) -> Option<Vec<u8>> {
        let changed = |key: &Vec<u8>| {
            store
                .latest_seq(key)
                .is_some_and(|seq| seq > self.start_seq)
        };
        if let Some(key) = self.writes.keys().chain(reads.keys.iter()).find(|k| changed(*k)) {
            return Some(key.clone());
        }
        reads
            .ranges
            .iter()
            .find_map(|range| store.first_change_in(range, self.start_seq))
    }

    fn close(&mut self, state: TransactionState, store: &mut VersionStore) {
        self.state = state;
        store.unpin(self.start_seq);
    }
}

impl std::fmt::Debug for MemoryTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransaction")
            .field("start_seq", &self.start_seq)
            .field("state", &self.state)
            .field("pending_writes", &self.writes.len())
            .finish_non_exhaustive()
    }
}

impl Getter for MemoryTransaction {
    fn get(&self, ctx: &Context, key: &[u8]) -> KvResult<ValueReader> {
        self.ensure_active()?;
        ctx.check()?;
        validate_key(key)?;
        self.lookup(key).map(value_reader).ok_or(KvError::NotFound)
    }
}

impl Setter for MemoryTransaction {
    fn set(&mut self, ctx: &Context, key: &[u8], value: &mut dyn Read) -> KvResult<()> {
        self.ensure_active()?;
        ctx.check()?;
        validate_key(key)?;
        let mut buf = Vec::new();
        value.read_to_end(&mut buf)?;
        self.writes.insert(key.to_vec(), Some(Bytes::from(buf)));
        Ok(())
    }
}

impl Deleter for MemoryTransaction {
    fn delete(&mut self, ctx: &Context, key: &[u8]) -> KvResult<()> {
        self.ensure_active()?;
        ctx.check()?;
        validate_key(key)?;
        if self.lookup(key).is_none() {
            return Err(KvError::NotFound);
        }
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }
}

impl Ranger for MemoryTransaction {
    fn ascend(&self, ctx: &Context, begin: &[u8], end: &[u8]) -> KvIter<'_> {
        self.iter(ctx, begin, end, Direction::Ascending)
    }

    fn descend(&self, ctx: &Context, begin: &[u8], end: &[u8]) -> KvIter<'_> {
        self.iter(ctx, begin, end, Direction::Descending)
    }
}

impl Scanner for MemoryTransaction {
    fn scan(&self, ctx: &Context) -> KvIter<'_> {
        self.iter(ctx, b"", b"", Direction::Ascending)
    }
}

impl Transaction for MemoryTransaction {
    fn rollback(&mut self, _ctx: &Context) -> KvResult<()> {
        self.ensure_active()?;
        self.writes.clear();
        let shared = Arc::clone(&self.shared);
        self.close(TransactionState::RolledBack, &mut shared.store.write());
        Ok(())
    }

    fn commit(&mut self, ctx: &Context) -> KvResult<()> {
        self.ensure_active()?;
        ctx.check()?;

        let shared = Arc::clone(&self.shared);
        let mut store = shared.store.write();
        if self.writes.is_empty() {
            self.close(TransactionState::Committed, &mut store);
            return Ok(());
        }

        let reads = std::mem::take(self.reads.get_mut());
        if let Some(key) = self.find_conflict(&store, &reads) {
            debug!(
                start_seq = self.start_seq,
                committed_seq = store.committed_seq(),
                key = %String::from_utf8_lossy(&key),
                "commit conflict"
            );
            self.writes.clear();
            self.close(TransactionState::RolledBack, &mut store);
            return Err(KvError::conflict(key));
        }

        let writes = std::mem::take(&mut self.writes);
        let seq = store.apply(&writes);
        self.close(TransactionState::Committed, &mut store);
        if shared.config.gc_on_commit {
            let removed = store.collect_garbage(writes.keys());
            if removed > 0 {
                debug!(seq, removed, "pruned unreachable versions");
            }
        }
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            self.shared.store.write().unpin(self.start_seq);
        }
    }
}
