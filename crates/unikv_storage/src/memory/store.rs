//! Multi-version key store behind the in-memory backend.

use crate::range::{bounds_are_empty, KeyRange};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Commit sequence number. Zero is the empty initial state.
pub(crate) type Seq = u64;

/// One committed version of a key. `None` marks a deletion.
#[derive(Debug, Clone)]
pub(crate) struct Version {
    pub(crate) seq: Seq,
    pub(crate) value: Option<Bytes>,
}

/// Iteration direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Ascending,
    Descending,
}

/// All committed versions plus the sequence numbers still being read.
#[derive(Debug, Default)]
pub(crate) struct VersionStore {
    committed_seq: Seq,
    /// Versions per key, oldest first.
    keys: BTreeMap<Vec<u8>, Vec<Version>>,
    /// Sequence numbers pinned by open snapshots and transactions.
    pinned: BTreeMap<Seq, usize>,
}

impl VersionStore {
    pub(crate) fn committed_seq(&self) -> Seq {
        self.committed_seq
    }

    /// Registers a reader at the current sequence and returns it.
    pub(crate) fn pin_current(&mut self) -> Seq {
        let seq = self.committed_seq;
        *self.pinned.entry(seq).or_insert(0) += 1;
        seq
    }

    pub(crate) fn unpin(&mut self, seq: Seq) {
        if let Some(count) = self.pinned.get_mut(&seq) {
            *count -= 1;
            if *count == 0 {
                self.pinned.remove(&seq);
            }
        }
    }

    pub(crate) fn pinned_count(&self) -> usize {
        self.pinned.values().sum()
    }

    /// Value of `key` as of `seq`.
    pub(crate) fn get_at(&self, key: &[u8], seq: Seq) -> Option<&Bytes> {
        visible(self.keys.get(key)?, seq)
    }

    /// Sequence of the newest committed version of `key`, deletions included.
    pub(crate) fn latest_seq(&self, key: &[u8]) -> Option<Seq> {
        self.keys.get(key)?.last().map(|v| v.seq)
    }

    /// First key inside `range` with a version newer than `seq`.
    pub(crate) fn first_change_in(&self, range: &KeyRange, seq: Seq) -> Option<Vec<u8>> {
        let lower = range.lower_bound();
        let upper = range.upper_bound();
        if bounds_are_empty(&lower, &upper) {
            return None;
        }
        self.keys
            .range::<[u8], _>((as_slice_bound(&lower), as_slice_bound(&upper)))
            .find(|(_, versions)| versions.last().is_some_and(|v| v.seq > seq))
            .map(|(key, _)| key.clone())
    }

    /// Nearest live key within the bounds as of `seq`, in `direction`.
    pub(crate) fn next_visible(
        &self,
        seq: Seq,
        lower: &Bound<Vec<u8>>,
        upper: &Bound<Vec<u8>>,
        direction: Direction,
    ) -> Option<(Vec<u8>, Bytes)> {
        if bounds_are_empty(lower, upper) {
            return None;
        }
        let mut range = self
            .keys
            .range::<[u8], _>((as_slice_bound(lower), as_slice_bound(upper)));
        let mut pick = |(key, versions): (&Vec<u8>, &Vec<Version>)| {
            visible(versions, seq).map(|value| (key.clone(), value.clone()))
        };
        match direction {
            Direction::Ascending => range.find_map(&mut pick),
            Direction::Descending => range.rev().find_map(&mut pick),
        }
    }

    /// Applies a commit's writes as one new sequence number.
    pub(crate) fn apply(&mut self, writes: &BTreeMap<Vec<u8>, Option<Bytes>>) -> Seq {
        let seq = self.committed_seq + 1;
        for (key, value) in writes {
            self.keys.entry(key.clone()).or_default().push(Version {
                seq,
                value: value.clone(),
            });
        }
        self.committed_seq = seq;
        seq
    }

    /// Drops versions of `keys` that no pinned reader can observe.
    ///
    /// Returns the number of versions removed.
    pub(crate) fn collect_garbage<'a>(&mut self, keys: impl Iterator<Item = &'a Vec<u8>>) -> usize {
        let horizon = self
            .pinned
            .keys()
            .next()
            .copied()
            .unwrap_or(self.committed_seq);
        let mut removed = 0;
        for key in keys {
            let Some(versions) = self.keys.get_mut(key) else {
                continue;
            };
            // Keep the newest version at or below the horizon and all newer.
            if let Some(keep_from) = versions.iter().rposition(|v| v.seq <= horizon) {
                removed += keep_from;
                versions.drain(..keep_from);
            }
            if versions.len() == 1 && versions[0].value.is_none() && versions[0].seq <= horizon {
                removed += 1;
                self.keys.remove(key);
            }
        }
        removed
    }

    /// Number of stored versions across all keys.
    pub(crate) fn version_count(&self) -> usize {
        self.keys.values().map(Vec::len).sum()
    }

    /// Number of live keys at the latest sequence.
    pub(crate) fn live_count(&self) -> usize {
        self.keys
            .values()
            .filter(|versions| versions.last().is_some_and(|v| v.value.is_some()))
            .count()
    }
}

fn visible(versions: &[Version], seq: Seq) -> Option<&Bytes> {
    versions
        .iter()
        .rev()
        .find(|v| v.seq <= seq)
        .and_then(|v| v.value.as_ref())
}

pub(crate) fn as_slice_bound(bound: &Bound<Vec<u8>>) -> Bound<&[u8]> {
    bound.as_ref().map(Vec::as_slice)
}
