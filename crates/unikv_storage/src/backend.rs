//! The backend contract.
//!
//! A backend is anything that can hand out [`Snapshot`]s and
//! [`Transaction`]s through a [`Database`]. The single-key and ranged
//! operations are split into small capability traits so code can ask for
//! exactly what it uses: a [`Reader`] for read-only work, a [`ReadWriter`]
//! for work that mutates, never the handle's terminal operations.
//!
//! # Invariants every backend upholds
//!
//! - The empty key is never stored. `get`, `set` and `delete` on it fail with
//!   [`KvError::InvalidArgument`](crate::KvError::InvalidArgument).
//! - `get` and `delete` of an absent key fail with
//!   [`KvError::NotFound`](crate::KvError::NotFound).
//! - A snapshot reads one fixed point in time for its whole life.
//! - A transaction reads its own buffered writes layered over the point in
//!   time at which it started; iteration included.
//! - Exactly one terminal call (`commit` or `rollback`) succeeds on a
//!   transaction. Any later terminal call returns
//!   [`KvError::AlreadyClosed`](crate::KvError::AlreadyClosed), as does any
//!   other operation on a closed handle.
//! - `commit` fails with [`KvError::Conflict`](crate::KvError::Conflict)
//!   rather than apply writes over state that changed under the
//!   transaction's reads or writes. A failed commit means nothing landed.
//! - Every call takes a [`Context`] and returns promptly once it ends.
//!
//! Snapshots and transactions are single-owner. The [`Database`] itself is
//! shared across threads.

use crate::context::Context;
use crate::error::KvResult;
use std::io::Read;

/// A value as handed out by a backend: a byte stream, so large values need
/// not be materialized.
pub type ValueReader = Box<dyn Read + Send>;

/// One key/value pair yielded by iteration.
pub type Entry = (Vec<u8>, ValueReader);

/// Lazy, fallible iteration over a key range.
///
/// An `Err` item ends the sequence; consumers drain the iterator and stop
/// at the first error.
pub type KvIter<'a> = Box<dyn Iterator<Item = KvResult<Entry>> + Send + 'a>;

/// Reads single keys.
pub trait Getter {
    /// Returns the value stored at `key`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty key, `NotFound` if absent, anything
    /// else is backend defined.
    fn get(&self, ctx: &Context, key: &[u8]) -> KvResult<ValueReader>;
}

/// Creates or overwrites single keys.
pub trait Setter {
    /// Stores the bytes read from `value` at `key`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty key; `Io` if reading `value` fails.
    fn set(&mut self, ctx: &Context, key: &[u8], value: &mut dyn Read) -> KvResult<()>;
}

/// Removes single keys.
pub trait Deleter {
    /// Removes `key`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty key, `NotFound` if absent.
    fn delete(&mut self, ctx: &Context, key: &[u8]) -> KvResult<()>;
}

/// Ordered iteration over `[begin, end)`.
///
/// An empty `begin` starts at the smallest key; an empty `end` runs past the
/// largest. Out of order non-empty endpoints yield a single
/// `InvalidArgument` item.
pub trait Ranger {
    /// Iterates the range in ascending key order.
    fn ascend(&self, ctx: &Context, begin: &[u8], end: &[u8]) -> KvIter<'_>;

    /// Iterates the range in descending key order.
    fn descend(&self, ctx: &Context, begin: &[u8], end: &[u8]) -> KvIter<'_>;
}

/// Unordered iteration over every pair.
///
/// Backends that have a cheaper physical order than key order use it here.
pub trait Scanner {
    /// Iterates every pair in backend-chosen order.
    fn scan(&self, ctx: &Context) -> KvIter<'_>;
}

/// Read capabilities.
pub trait Reader: Getter + Ranger + Scanner {}

impl<T: Getter + Ranger + Scanner + ?Sized> Reader for T {}

/// Write capabilities.
pub trait Writer: Setter + Deleter {}

impl<T: Setter + Deleter + ?Sized> Writer for T {}

/// Read and write capabilities.
pub trait ReadWriter: Reader + Writer {}

impl<T: Reader + Writer + ?Sized> ReadWriter for T {}

/// A read-only view bound to the moment it was created.
pub trait Snapshot: Reader + Send {
    /// Releases the snapshot. Every later call on it fails.
    ///
    /// # Errors
    ///
    /// Backends may report `AlreadyClosed` for a second discard.
    fn discard(&mut self, ctx: &Context) -> KvResult<()>;
}

/// An isolated read-write unit of work.
pub trait Transaction: ReadWriter + Send {
    /// Drops all buffered writes without a conflict check.
    ///
    /// # Errors
    ///
    /// `AlreadyClosed` after a prior commit or rollback. Calling it after
    /// any commit attempt is always harmless.
    fn rollback(&mut self, ctx: &Context) -> KvResult<()>;

    /// Checks the transaction against concurrently committed changes and
    /// atomically applies its writes.
    ///
    /// Never reports failure for writes that actually landed.
    ///
    /// # Errors
    ///
    /// `Conflict` if the check fails, `AlreadyClosed` after a prior commit or
    /// rollback.
    fn commit(&mut self, ctx: &Context) -> KvResult<()>;
}

/// Factory for snapshots and transactions. Safe to share between threads.
pub trait Database: Send + Sync {
    /// Transaction handle type.
    type Transaction: Transaction;
    /// Snapshot handle type.
    type Snapshot: Snapshot;

    /// Starts a transaction.
    ///
    /// # Errors
    ///
    /// Backend defined (resource exhaustion, connectivity, cancellation).
    fn new_transaction(&self, ctx: &Context) -> KvResult<Self::Transaction>;

    /// Takes a snapshot.
    ///
    /// # Errors
    ///
    /// Backend defined (resource exhaustion, connectivity, cancellation).
    fn new_snapshot(&self, ctx: &Context) -> KvResult<Self::Snapshot>;
}

impl<T: Getter + ?Sized> Getter for Box<T> {
    fn get(&self, ctx: &Context, key: &[u8]) -> KvResult<ValueReader> {
        (**self).get(ctx, key)
    }
}

impl<T: Setter + ?Sized> Setter for Box<T> {
    fn set(&mut self, ctx: &Context, key: &[u8], value: &mut dyn Read) -> KvResult<()> {
        (**self).set(ctx, key, value)
    }
}

impl<T: Deleter + ?Sized> Deleter for Box<T> {
    fn delete(&mut self, ctx: &Context, key: &[u8]) -> KvResult<()> {
        (**self).delete(ctx, key)
    }
}

impl<T: Ranger + ?Sized> Ranger for Box<T> {
    fn ascend(&self, ctx: &Context, begin: &[u8], end: &[u8]) -> KvIter<'_> {
        (**self).ascend(ctx, begin, end)
    }

    fn descend(&self, ctx: &Context, begin: &[u8], end: &[u8]) -> KvIter<'_> {
        (**self).descend(ctx, begin, end)
    }
}

impl<T: Scanner + ?Sized> Scanner for Box<T> {
    fn scan(&self, ctx: &Context) -> KvIter<'_> {
        (**self).scan(ctx)
    }
}

impl<T: Snapshot + ?Sized> Snapshot for Box<T> {
    fn discard(&mut self, ctx: &Context) -> KvResult<()> {
        (**self).discard(ctx)
    }
}

impl<T: Transaction + ?Sized> Transaction for Box<T> {
    fn rollback(&mut self, ctx: &Context) -> KvResult<()> {
        (**self).rollback(ctx)
    }

    fn commit(&mut self, ctx: &Context) -> KvResult<()> {
        (**self).commit(ctx)
    }
}

/// Reads a value stream to the end.
///
/// # Errors
///
/// Returns [`KvError::Io`](crate::KvError::Io) if the stream fails.
pub fn read_value(mut value: ValueReader) -> KvResult<Vec<u8>> {
    let mut buf = Vec::new();
    value.read_to_end(&mut buf)?;
    Ok(buf)
}
