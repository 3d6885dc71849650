//! Key and range rules shared by every backend.
//!
//! Keys are non-empty byte strings ordered lexicographically. The empty key
//! is never stored; as a range endpoint it means "open": an empty `begin`
//! starts at the smallest key and an empty `end` runs past the largest.

use crate::error::{KvError, KvResult};
use std::ops::Bound;

/// Rejects the empty key.
///
/// # Errors
///
/// Returns [`KvError::InvalidArgument`] if `key` is empty.
pub fn validate_key(key: &[u8]) -> KvResult<()> {
    if key.is_empty() {
        return Err(KvError::invalid_argument("key must not be empty"));
    }
    Ok(())
}

/// Rejects ranges whose non-empty endpoints are out of order.
///
/// `begin == end` is a valid, empty range.
///
/// # Errors
///
/// Returns [`KvError::InvalidArgument`] if both ends are non-empty and
/// `begin > end`.
pub fn validate_range(begin: &[u8], end: &[u8]) -> KvResult<()> {
    if !begin.is_empty() && !end.is_empty() && begin > end {
        return Err(KvError::invalid_argument(format!(
            "range begin {:?} is after end {:?}",
            String::from_utf8_lossy(begin),
            String::from_utf8_lossy(end)
        )));
    }
    Ok(())
}

/// Returns the `[begin, end)` pair covering every key that starts with
/// `prefix`.
///
/// The end is the prefix with trailing `0xFF` bytes dropped and the last
/// remaining byte incremented. A prefix made only of `0xFF` bytes (or an
/// empty one) has no such successor, so `end` is empty: the end of the key
/// space.
///
/// ```
/// use unikv_storage::prefix_range;
///
/// assert_eq!(prefix_range(b"abcd"), (b"abcd".to_vec(), b"abce".to_vec()));
/// assert_eq!(prefix_range(b"a\xff"), (b"a\xff".to_vec(), b"b".to_vec()));
/// assert_eq!(prefix_range(b"\xff\xff"), (b"\xff\xff".to_vec(), Vec::new()));
/// ```
#[must_use]
pub fn prefix_range(prefix: &[u8]) -> (Vec<u8>, Vec<u8>) {
    (prefix.to_vec(), prefix_end(prefix))
}

fn prefix_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last != 0xFF {
            end.push(last + 1);
            return end;
        }
    }
    Vec::new()
}

/// A validated half-open key range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    begin: Vec<u8>,
    end: Vec<u8>,
}

impl KeyRange {
    /// Creates a range, validating endpoint order.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::InvalidArgument`] for out of order endpoints.
    pub fn new(begin: &[u8], end: &[u8]) -> KvResult<Self> {
        validate_range(begin, end)?;
        Ok(Self {
            begin: begin.to_vec(),
            end: end.to_vec(),
        })
    }

    /// The whole key space.
    #[must_use]
    pub fn all() -> Self {
        Self {
            begin: Vec::new(),
            end: Vec::new(),
        }
    }

    /// Every key starting with `prefix`.
    #[must_use]
    pub fn prefix(prefix: &[u8]) -> Self {
        let (begin, end) = prefix_range(prefix);
        Self { begin, end }
    }

    /// Inclusive lower endpoint; empty means unbounded.
    #[must_use]
    pub fn begin(&self) -> &[u8] {
        &self.begin
    }

    /// Exclusive upper endpoint; empty means unbounded.
    #[must_use]
    pub fn end(&self) -> &[u8] {
        &self.end
    }

    /// Returns true if `key` falls inside the range.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        (self.begin.is_empty() || key >= self.begin.as_slice())
            && (self.end.is_empty() || key < self.end.as_slice())
    }

    /// Lower bound for ordered map lookups.
    #[must_use]
    pub fn lower_bound(&self) -> Bound<Vec<u8>> {
        if self.begin.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Included(self.begin.clone())
        }
    }

    /// Upper bound for ordered map lookups.
    #[must_use]
    pub fn upper_bound(&self) -> Bound<Vec<u8>> {
        if self.end.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(self.end.clone())
        }
    }
}

/// Returns true if no key can satisfy both bounds.
///
/// Ordered map range queries panic on such bounds, so callers check first.
#[must_use]
pub fn bounds_are_empty(lower: &Bound<Vec<u8>>, upper: &Bound<Vec<u8>>) -> bool {
    match (lower, upper) {
        (Bound::Unbounded, _) | (_, Bound::Unbounded) => false,
        (Bound::Included(lo), Bound::Included(hi)) => lo > hi,
        (Bound::Included(lo), Bound::Excluded(hi))
        | (Bound::Excluded(lo), Bound::Included(hi))
        | (Bound::Excluded(lo), Bound::Excluded(hi)) => lo >= hi,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_rejected() {
        assert!(validate_key(b"").unwrap_err().is_invalid_argument());
        assert!(validate_key(b"a").is_ok());
    }

    #[test]
    fn range_order_rules() {
        assert!(validate_range(b"", b"").is_ok());
        assert!(validate_range(b"b", b"").is_ok());
        assert!(validate_range(b"", b"a").is_ok());
        assert!(validate_range(b"a", b"a").is_ok());
        assert!(validate_range(b"a", b"b").is_ok());
        assert!(validate_range(b"b", b"a").unwrap_err().is_invalid_argument());
    }

    #[test]
    fn prefix_end_cases() {
        assert_eq!(prefix_end(b"abcd"), b"abce");
        assert_eq!(prefix_end(b"ab\xff\xff"), b"ac");
        assert_eq!(prefix_end(b"\xff"), b"");
        assert_eq!(prefix_end(b""), b"");
    }

    #[test]
    fn prefix_range_covers_only_prefixed_keys() {
        let range = KeyRange::prefix(b"user/");
        assert!(range.contains(b"user/"));
        assert!(range.contains(b"user/42"));
        assert!(range.contains(b"user/\xff\xff"));
        assert!(!range.contains(b"user0"));
        assert!(!range.contains(b"use"));
    }

    #[test]
    fn open_ended_ranges() {
        let all = KeyRange::all();
        assert!(all.contains(b"\x00"));
        assert!(all.contains(b"\xff\xff"));
        assert_eq!(all.lower_bound(), Bound::Unbounded);
        assert_eq!(all.upper_bound(), Bound::Unbounded);

        let tail = KeyRange::new(b"m", b"").unwrap();
        assert!(!tail.contains(b"a"));
        assert!(tail.contains(b"m"));
        assert!(tail.contains(b"z"));
    }

    #[test]
    fn empty_bounds_detected() {
        let a = || b"a".to_vec();
        let b = || b"b".to_vec();
        assert!(bounds_are_empty(&Bound::Excluded(a()), &Bound::Excluded(a())));
        assert!(bounds_are_empty(&Bound::Included(a()), &Bound::Excluded(a())));
        assert!(!bounds_are_empty(&Bound::Included(a()), &Bound::Included(a())));
        assert!(bounds_are_empty(&Bound::Included(b()), &Bound::Excluded(a())));
        assert!(!bounds_are_empty(&Bound::Unbounded, &Bound::Excluded(a())));
    }
}
