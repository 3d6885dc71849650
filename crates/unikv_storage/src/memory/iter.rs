//! Range iteration over committed versions and a transaction's own writes.

use super::store::{as_slice_bound, Direction, Seq};
use super::transaction::ReadSet;
use super::{Shared, WriteSet};
use crate::backend::{Entry, KvIter};
use crate::context::Context;
use crate::error::{KvError, KvResult};
use crate::range::{bounds_are_empty, KeyRange};
use bytes::Bytes;
use parking_lot::Mutex;
use std::io::Cursor;
use std::ops::Bound;
use std::sync::Arc;

/// Builds the iterator for `[begin, end)`, or a single error item if the
/// range is invalid.
///
/// When `reads` is given, every key yielded from the committed view is
/// recorded in it.
pub(crate) fn range_iter<'a>(
    shared: &Arc<Shared>,
    ctx: &Context,
    seq: Seq,
    overlay: Option<&'a WriteSet>,
    reads: Option<&'a Mutex<ReadSet>>,
    range: KvResult<KeyRange>,
    direction: Direction,
) -> KvIter<'a> {
    match range {
        Ok(range) => Box::new(MemoryIter {
            shared: Arc::clone(shared),
            ctx: ctx.clone(),
            seq,
            overlay,
            reads,
            direction,
            lower: range.lower_bound(),
            upper: range.upper_bound(),
            done: false,
        }),
        Err(err) => failed(err),
    }
}

/// An iterator that yields one error.
pub(crate) fn failed<'a>(err: KvError) -> KvIter<'a> {
    Box::new(std::iter::once(Err(err)))
}

pub(crate) fn value_reader(bytes: Bytes) -> crate::backend::ValueReader {
    Box::new(Cursor::new(bytes))
}

/// Lazily merges the committed view at `seq` with buffered writes.
///
/// Every step re-seeks past the last returned key, so commits landing
/// mid-iteration never disturb it and the store lock is held only briefly.
struct MemoryIter<'a> {
    shared: Arc<Shared>,
    ctx: Context,
    seq: Seq,
    overlay: Option<&'a WriteSet>,
    reads: Option<&'a Mutex<ReadSet>>,
    direction: Direction,
    lower: Bound<Vec<u8>>,
    upper: Bound<Vec<u8>>,
    done: bool,
}

impl MemoryIter<'_> {
    fn step(&mut self) -> KvResult<Option<Entry>> {
        loop {
            self.ctx.check()?;
            let base = self.shared.store.read().next_visible(
                self.seq,
                &self.lower,
                &self.upper,
                self.direction,
            );
            let buffered = self.next_buffered();

            let (key, value, committed) = match (base, buffered) {
                (None, None) => return Ok(None),
                (Some((key, value)), None) => (key, Some(value), true),
                (None, Some((key, value))) => (key, value, false),
                (Some((base_key, base_value)), Some((key, value))) => {
                    let buffered_first = match self.direction {
                        Direction::Ascending => key <= base_key,
                        Direction::Descending => key >= base_key,
                    };
                    if buffered_first {
                        (key, value, false)
                    } else {
                        (base_key, Some(base_value), true)
                    }
                }
            };
            if committed {
                if let Some(reads) = self.reads {
                    reads.lock().keys.insert(key.clone());
                }
            }

            match self.direction {
                Direction::Ascending => self.lower = Bound::Excluded(key.clone()),
                Direction::Descending => self.upper = Bound::Excluded(key.clone()),
            }
            // tombstone: the key was deleted in this transaction
            if let Some(value) = value {
                return Ok(Some((key, value_reader(value))));
            }
        }
    }

    fn next_buffered(&self) -> Option<(Vec<u8>, Option<Bytes>)> {
        let writes = self.overlay?;
        if bounds_are_empty(&self.lower, &self.upper) {
            return None;
        }
        let mut range =
            writes.range::<[u8], _>((as_slice_bound(&self.lower), as_slice_bound(&self.upper)));
        let (key, value) = match self.direction {
            Direction::Ascending => range.next()?,
            Direction::Descending => range.next_back()?,
        };
        Some((key.clone(), value.clone()))
    }
}

impl Iterator for MemoryIter<'_> {
    type Item = KvResult<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
