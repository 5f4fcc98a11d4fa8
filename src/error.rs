//
// Crate error type. Hand-rolled rather than derived: the variants map
// directly onto the error kinds the coordinator latches under its mutex
// (configuration errors never reach the latch; everything else does).
//

use std::fmt;
use std::sync::Arc;

/// Errors produced by construction, `write`, `split`, and `close`.
#[derive(Debug, Clone)]
pub enum Error {
    /// `max_size` was below the 512-byte floor.
    MaxSizeTooSmall,
    /// The raw mode value did not match a known [`crate::Mode`].
    UnknownMode(u8),
    /// `max_memory` was smaller than `max_size` (single-stream writer only).
    MaxMemoryTooSmall,
    /// A sink returned an I/O error.
    Io(Arc<std::io::Error>),
    /// A sink wrote fewer bytes than requested.
    ShortWrite { expected: usize, actual: usize },
    /// A back-reference offset was computed as non-positive; indicates an
    /// index bookkeeping bug.
    NegativeOffset,
    /// A digest copy produced fewer than 20 bytes.
    ShortHashCopy,
    /// A background thread observed a broken channel or other invariant
    /// violation that doesn't fit the other variants.
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MaxSizeTooSmall => write!(f, "max_size must be at least 512 bytes"),
            Error::UnknownMode(m) => write!(f, "unknown chunker mode: {m}"),
            Error::MaxMemoryTooSmall => write!(f, "max_memory must be at least max_size"),
            Error::Io(e) => write!(f, "sink I/O error: {e}"),
            Error::ShortWrite { expected, actual } => {
                write!(f, "short write: expected {expected} bytes, wrote {actual}")
            }
            Error::NegativeOffset => write!(f, "computed a non-positive back-reference offset"),
            Error::ShortHashCopy => write!(f, "digest copy was shorter than 20 bytes"),
            Error::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Io(Arc::new(error))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
