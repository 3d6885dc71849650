//! # unikv Storage
//!
//! The transactional key-value contract every unikv backend implements.
//!
//! Backends are opaque: code written against these traits never learns how
//! keys are stored, locked or shipped over a network. What it can rely on is
//! the contract documented on [`Database`] and the handle traits.
//!
//! ## Design Principles
//!
//! - Small capability traits ([`Getter`], [`Setter`], [`Deleter`],
//!   [`Ranger`], [`Scanner`]) composed into [`Reader`], [`Writer`] and
//!   [`ReadWriter`]
//! - Values are byte streams ([`ValueReader`])
//! - Iteration is a fallible iterator ([`KvIter`]) that ends at its first
//!   error
//! - Every call takes a [`Context`] carrying cancellation and deadlines
//! - A failed commit means the writes did not land; adapters with lossy
//!   transports use [`confirm_commit`] to uphold that
//!
//! ## Available Backends
//!
//! - [`MemoryDatabase`] - multi-version in-memory store for tests and
//!   ephemeral data
//! - [`AnyDatabase`] - type-erased wrapper around any other backend
//!
//! ## Example
//!
//! ```rust
//! use unikv_storage::{Context, Database, MemoryDatabase, Ranger, Setter, Transaction};
//!
//! let ctx = Context::background();
//! let db = MemoryDatabase::new();
//!
//! let mut tx = db.new_transaction(&ctx).unwrap();
//! tx.set(&ctx, b"b", &mut &b"2"[..]).unwrap();
//! tx.set(&ctx, b"a", &mut &b"1"[..]).unwrap();
//! let keys: Vec<Vec<u8>> = tx
//!     .ascend(&ctx, b"", b"")
//!     .map(|entry| entry.map(|(key, _)| key))
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//! assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
//! tx.commit(&ctx).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod any;
mod backend;
mod config;
mod context;
mod error;
mod memory;
mod range;
mod retry;

pub use any::{database_from, AnyDatabase};
pub use backend::{
    read_value, Database, Deleter, Entry, Getter, KvIter, ReadWriter, Ranger, Reader, Scanner,
    Setter, Snapshot, Transaction, ValueReader, Writer,
};
pub use config::{MemoryConfig, RetryConfig};
pub use context::Context;
pub use error::{KvError, KvResult};
pub use memory::{MemoryDatabase, MemorySnapshot, MemoryTransaction, TransactionState};
pub use range::{bounds_are_empty, prefix_range, validate_key, validate_range, KeyRange};
pub use retry::{confirm_commit, CommitAttempt, CommitStatus};
