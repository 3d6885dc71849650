//! # unikv Testkit
//!
//! Test utilities for unikv backends.
//!
//! This crate provides:
//! - A conformance suite any [`Database`](unikv_storage::Database) can be run
//!   against
//! - A fault-injecting database wrapper
//! - Fixtures for populating, dumping and backing up stores
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use unikv_storage::MemoryDatabase;
//! use unikv_testkit::prelude::*;
//!
//! init_tracing();
//! let db = MemoryDatabase::new();
//! populate(&db, sample_entries(10));
//! assert_eq!(dump(&db).len(), 10);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod conformance;
pub mod faults;
pub mod fixtures;
pub mod generators;

use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::conformance::run_all;
    pub use crate::faults::{FaultStats, FaultyDatabase};
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
}

/// Installs a test-friendly `tracing` subscriber once per process.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`. Later calls, and
/// calls made after another subscriber was installed, do nothing.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
