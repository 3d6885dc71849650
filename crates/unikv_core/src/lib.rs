//! # unikv Core
//!
//! Generic operations over any backend implementing the
//! [`unikv_storage`] contract.
//!
//! ## Scoped handles
//!
//! [`with_reader`] and [`with_read_writer`] open a snapshot or transaction,
//! run a unit of work against it and always release it. A read-write unit
//! commits only when the work succeeds.
//!
//! ## Bulk operations
//!
//! - [`backup`] / [`validate_backup`] - checksummed point-in-time dumps
//! - [`restore`] - replay a dump in bounded transactions
//! - [`clear`] - delete everything in bounded transactions
//!
//! Chunked operations commit each chunk on its own. On error, the chunks
//! already committed stay and the failing one is rolled back.
//!
//! ## Example
//!
//! ```rust
//! use unikv_core::{backup, clear, restore, validate_backup, with_read_writer};
//! use unikv_storage::{Context, KvError, MemoryDatabase};
//!
//! let ctx = Context::background();
//! let db = MemoryDatabase::new();
//! with_read_writer(&ctx, &db, |ctx, tx| {
//!     tx.set(ctx, b"a", &mut &b"1"[..])?;
//!     tx.set(ctx, b"b", &mut &b"2"[..])?;
//!     Ok::<_, KvError>(())
//! })
//! .unwrap();
//!
//! let mut dump = Vec::new();
//! backup(&ctx, &db, &mut dump).unwrap();
//! assert_eq!(validate_backup(&ctx, &dump[..]).unwrap(), 2);
//!
//! clear(&ctx, &db, 0).unwrap();
//! assert!(db.is_empty());
//!
//! let stats = restore(&ctx, &db, &dump[..], 1).unwrap();
//! assert_eq!(stats.transactions, 2);
//! assert_eq!(db.len(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bulk;
mod config;
mod error;
mod scoped;
mod typed;

pub use bulk::{
    backup, clear, clear_with_config, restore, restore_with_config, validate_backup, BackupStats,
    ClearStats, RestoreStats,
};
pub use config::{BulkConfig, DEFAULT_MAX_PER_TX};
pub use error::{CoreError, CoreResult};
pub use scoped::{with_read_writer, with_reader};
pub use typed::{ascend_cbor, descend_cbor, get_cbor, set_cbor, CborIter};
