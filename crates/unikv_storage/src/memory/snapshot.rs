//! Read-only snapshots of the in-memory backend.

use super::iter::{failed, range_iter, value_reader};
use super::store::{Direction, Seq};
use super::Shared;
use crate::backend::{Getter, KvIter, Ranger, Scanner, Snapshot, ValueReader};
use crate::context::Context;
use crate::error::{KvError, KvResult};
use crate::range::{validate_key, KeyRange};
use std::sync::Arc;

/// A fixed point-in-time view of a [`MemoryDatabase`](super::MemoryDatabase).
///
/// Dropping the snapshot releases it like [`Snapshot::discard`] does.
pub struct MemorySnapshot {
    shared: Arc<Shared>,
    seq: Seq,
    discarded: bool,
}

impl MemorySnapshot {
    pub(crate) fn new(shared: Arc<Shared>, seq: Seq) -> Self {
        Self {
            shared,
            seq,
            discarded: false,
        }
    }

    /// Commit sequence this snapshot reads at.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    fn ensure_open(&self) -> KvResult<()> {
        if self.discarded {
            return Err(KvError::AlreadyClosed);
        }
        Ok(())
    }

    fn iter(&self, ctx: &Context, begin: &[u8], end: &[u8], direction: Direction) -> KvIter<'_> {
        if let Err(err) = self.ensure_open() {
            return failed(err);
        }
        range_iter(
            &self.shared,
            ctx,
            self.seq,
            None,
            None,
            KeyRange::new(begin, end),
            direction,
        )
    }
}

impl std::fmt::Debug for MemorySnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySnapshot")
            .field("seq", &self.seq)
            .field("discarded", &self.discarded)
            .finish_non_exhaustive()
    }
}

impl Getter for MemorySnapshot {
    fn get(&self, ctx: &Context, key: &[u8]) -> KvResult<ValueReader> {
        self.ensure_open()?;
        ctx.check()?;
        validate_key(key)?;
        let store = self.shared.store.read();
        store
            .get_at(key, self.seq)
            .cloned()
            .map(value_reader)
            .ok_or(KvError::NotFound)
    }
}

impl Ranger for MemorySnapshot {
    fn ascend(&self, ctx: &Context, begin: &[u8], end: &[u8]) -> KvIter<'_> {
        self.iter(ctx, begin, end, Direction::Ascending)
    }

    fn descend(&self, ctx: &Context, begin: &[u8], end: &[u8]) -> KvIter<'_> {
        self.iter(ctx, begin, end, Direction::Descending)
    }
}

impl Scanner for MemorySnapshot {
    fn scan(&self, ctx: &Context) -> KvIter<'_> {
        self.iter(ctx, b"", b"", Direction::Ascending)
    }
}

impl Snapshot for MemorySnapshot {
    fn discard(&mut self, _ctx: &Context) -> KvResult<()> {
        self.ensure_open()?;
        self.discarded = true;
        self.shared.store.write().unpin(self.seq);
        Ok(())
    }
}

impl Drop for MemorySnapshot {
    fn drop(&mut self) {
        if !self.discarded {
            self.shared.store.write().unpin(self.seq);
        }
    }
}
