//! Streaming content-defined deduplication.
//!
//! Bytes go in through [`writer::DedupWriter`], [`writer::SingleStreamWriter`],
//! or [`writer::FragmentWriter`]; each partitions the stream into blocks
//! using one of three interchangeable chunking strategies ([`Mode`]),
//! computes a 20-byte content digest per block on a parallel worker pool,
//! and emits either the block's data or a back-reference to an earlier
//! occurrence of the same content, all in strict submission order despite
//! the hashing happening out of order.
//!
//! ```no_run
//! use dedupstream::{DedupWriter, Mode};
//!
//! let idx = Vec::new();
//! let data = Vec::new();
//! let mut writer = DedupWriter::new(idx, data, Mode::Dynamic, 4096, 0).unwrap();
//! writer.write(b"some bytes to deduplicate").unwrap();
//! writer.close().unwrap();
//! ```
//!
//! Decoding, payload compression, and any configuration/CLI/file-I/O layer
//! are out of scope for this crate; only the encoder side lives here.

mod chunker;
mod core;
mod error;
mod hash;
mod index;
mod mode;
mod pool;
mod varint;
pub mod writer;

pub use error::{Error, Result};
pub use mode::Mode;
pub use writer::{DedupWriter, Fragment, FragmentWriter, SingleStreamWriter};
