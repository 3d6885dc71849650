//! Property-based test generators using proptest.
//!
//! Keys are always non-empty. Key strategies mix a small alphabet, so that
//! generated operations collide on the same keys often, with arbitrary
//! bytes.

use crate::fixtures::Contents;
use proptest::prelude::*;

/// Strategy for valid keys.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        3 => prop::collection::vec(prop::sample::select(b"abcd".to_vec()), 1..4),
        1 => prop::collection::vec(any::<u8>(), 1..24),
    ]
}

/// Strategy for values, empty ones included.
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// Strategy for up to `max` distinct entries.
pub fn entries_strategy(max: usize) -> impl Strategy<Value = Contents> {
    prop::collection::btree_map(key_strategy(), value_strategy(), 0..=max)
}

/// One write against a key/value store.
#[derive(Debug, Clone)]
pub enum KvOp {
    /// Create or overwrite a key.
    Set {
        /// Key
        key: Vec<u8>,
        /// Value
        value: Vec<u8>,
    },
    /// Remove a key that may or may not exist.
    Delete {
        /// Key
        key: Vec<u8>,
    },
}

impl KvOp {
    /// Key the operation touches.
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Set { key, .. } | Self::Delete { key } => key,
        }
    }

    /// Applies the operation to an in-memory model of the store.
    pub fn apply_to(&self, model: &mut Contents) {
        match self {
            Self::Set { key, value } => {
                model.insert(key.clone(), value.clone());
            }
            Self::Delete { key } => {
                model.remove(key);
            }
        }
    }
}

/// Strategy for a single operation, biased towards sets.
pub fn op_strategy() -> impl Strategy<Value = KvOp> {
    prop_oneof![
        3 => (key_strategy(), value_strategy()).prop_map(|(key, value)| KvOp::Set { key, value }),
        1 => key_strategy().prop_map(|key| KvOp::Delete { key }),
    ]
}

/// Strategy for a batch of operations.
pub fn ops_strategy(max: usize) -> impl Strategy<Value = Vec<KvOp>> {
    prop::collection::vec(op_strategy(), 0..=max)
}
