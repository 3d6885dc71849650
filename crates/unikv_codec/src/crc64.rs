//! CRC-64 checksum with the ISO polynomial.
//!
//! The table is the reflected form of `x^64 + x^4 + x^3 + x + 1`
//! (`0xD800_0000_0000_0000`). Initial value and final xor are all ones.
//! Changing either makes existing backups unreadable.

/// Reflected ISO polynomial.
pub const CRC64_ISO_POLY: u64 = 0xD800_0000_0000_0000;

const CRC64_TABLE: [u64; 256] = {
    let mut table = [0u64; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u64;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ CRC64_ISO_POLY;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Incremental CRC-64 hasher.
///
/// ```
/// use unikv_codec::Crc64;
///
/// let mut hasher = Crc64::new();
/// hasher.update(b"1234");
/// hasher.update(b"56789");
/// assert_eq!(hasher.finish(), 0xB909_56C7_75A4_1001);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Crc64 {
    state: u64,
}

impl Crc64 {
    /// Creates a hasher with no input.
    #[must_use]
    pub const fn new() -> Self {
        Self { state: !0 }
    }

    /// Feeds bytes into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        let mut crc = self.state;
        for &byte in data {
            let index = ((crc ^ u64::from(byte)) & 0xFF) as usize;
            crc = (crc >> 8) ^ CRC64_TABLE[index];
        }
        self.state = crc;
    }

    /// Returns the checksum of everything fed so far.
    #[must_use]
    pub const fn finish(&self) -> u64 {
        !self.state
    }
}

impl Default for Crc64 {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes the CRC-64 of a single buffer.
#[must_use]
pub fn compute_crc64(data: &[u8]) -> u64 {
    let mut hasher = Crc64::new();
    hasher.update(data);
    hasher.finish()
}

/// Computes the record checksum: CRC-64 over the key bytes followed by the
/// value bytes.
#[must_use]
pub fn record_checksum(key: &[u8], value: &[u8]) -> u64 {
    let mut hasher = Crc64::new();
    hasher.update(key);
    hasher.update(value);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn crc64_known_value() {
        assert_eq!(compute_crc64(b"123456789"), 0xB909_56C7_75A4_1001);
    }

    #[test]
    fn crc64_empty() {
        assert_eq!(compute_crc64(b""), 0);
    }

    #[test]
    fn record_checksum_hashes_key_then_value() {
        // hashed as one concatenated stream
        assert_eq!(record_checksum(b"ab", b"cd"), record_checksum(b"abc", b"d"));
        assert_ne!(record_checksum(b"ab", b"cd"), record_checksum(b"ab", b"ce"));
    }

    proptest! {
        #[test]
        fn incremental_matches_one_shot(data in prop::collection::vec(any::<u8>(), 0..512), split in 0usize..512) {
            let split = split.min(data.len());
            let mut hasher = Crc64::new();
            hasher.update(&data[..split]);
            hasher.update(&data[split..]);
            prop_assert_eq!(hasher.finish(), compute_crc64(&data));
        }
    }
}
