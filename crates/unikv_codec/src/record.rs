//! Backup record type.

use crate::crc64::record_checksum;
use crate::error::{CodecError, CodecResult};
use ciborium::value::{Integer, Value};

/// One key/value pair in a backup stream.
///
/// On the wire a record is a three element CBOR array:
///
/// ```text
/// [ key: bytes, value: bytes, checksum: uint64 ]
/// ```
///
/// The checksum is the CRC-64 of the key bytes followed by the value bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    /// Stored key. Never empty.
    pub key: Vec<u8>,
    /// Fully materialized value bytes.
    pub value: Vec<u8>,
    /// Checksum carried by the record.
    pub checksum: u64,
}

impl BackupRecord {
    /// Creates a record and computes its checksum.
    #[must_use]
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Self {
        let checksum = record_checksum(&key, &value);
        Self {
            key,
            value,
            checksum,
        }
    }

    /// Recomputes the checksum over the record's contents.
    #[must_use]
    pub fn computed_checksum(&self) -> u64 {
        record_checksum(&self.key, &self.value)
    }

    /// Verifies the carried checksum.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::ChecksumMismatch`] if the contents do not hash to
    /// the carried checksum.
    pub fn verify(&self) -> CodecResult<()> {
        let actual = self.computed_checksum();
        if actual != self.checksum {
            return Err(CodecError::ChecksumMismatch {
                expected: self.checksum,
                actual,
            });
        }
        Ok(())
    }

    /// Returns the encoded size of the key and value payloads.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.key.len() + self.value.len()
    }

    pub(crate) fn to_value(&self) -> Value {
        Value::Array(vec![
            Value::Bytes(self.key.clone()),
            Value::Bytes(self.value.clone()),
            Value::Integer(Integer::from(self.checksum)),
        ])
    }

    /// Builds a record from a decoded CBOR item without verifying the
    /// checksum.
    pub(crate) fn from_value(value: Value) -> CodecResult<Self> {
        let Value::Array(items) = value else {
            return Err(CodecError::decoding("record is not an array"));
        };
        let [key, value, checksum]: [Value; 3] = items.try_into().map_err(|items: Vec<Value>| {
            CodecError::decoding(format!("record has {} fields, expected 3", items.len()))
        })?;

        let key = match key {
            Value::Bytes(key) if !key.is_empty() => key,
            Value::Bytes(_) => return Err(CodecError::decoding("record key is empty")),
            _ => return Err(CodecError::decoding("record key is not a byte string")),
        };
        let value = match value {
            Value::Bytes(value) => value,
            _ => return Err(CodecError::decoding("record value is not a byte string")),
        };
        let checksum = match checksum {
            Value::Integer(n) => u64::try_from(n)
                .map_err(|_| CodecError::decoding("record checksum out of range"))?,
            _ => return Err(CodecError::decoding("record checksum is not an integer")),
        };

        Ok(Self {
            key,
            value,
            checksum,
        })
    }
}
