//! # unikv Codec
//!
//! Checksummed record stream used by unikv backups.
//!
//! A backup is a plain concatenation of records. Each record is one CBOR
//! array holding the key, the value and a CRC-64 over both:
//!
//! ```text
//! [ key: bytes, value: bytes, checksum: uint64 ] [ ... ] [ ... ]
//! ```
//!
//! - There is no header or footer; a clean end of input ends the stream
//! - CBOR items are self-describing and length-prefixed, so values of any
//!   size stream without framing of their own
//! - The checksum uses the ISO CRC-64 table (see [`Crc64`])
//!
//! ## Usage
//!
//! ```
//! use unikv_codec::{RecordReader, RecordWriter};
//!
//! let mut writer = RecordWriter::new(Vec::new());
//! writer.write(b"greeting", b"hello").unwrap();
//! let bytes = writer.finish().unwrap();
//!
//! let mut reader = RecordReader::new(&bytes[..]);
//! let record = reader.next_record().unwrap().unwrap();
//! assert_eq!(record.key, b"greeting");
//! assert!(reader.next_record().unwrap().is_none());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod crc64;
mod error;
mod reader;
mod record;
mod writer;

pub use crc64::{compute_crc64, record_checksum, Crc64, CRC64_ISO_POLY};
pub use error::{CodecError, CodecResult};
pub use reader::RecordReader;
pub use record::BackupRecord;
pub use writer::RecordWriter;
