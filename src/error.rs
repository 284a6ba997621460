//! Error types for mediaflow.
//!
//! Two families live here:
//!
//! - [`Error`]: control-plane failures returned by pipeline, executor and
//!   construction APIs.
//! - [`IoError`]: data-plane signals returned by buses and ports. These are
//!   kept apart so a stage can tell a recoverable timeout from a torn-down
//!   port without string matching.

use thiserror::Error;

/// Result type alias using mediaflow's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for data-plane acquire/release calls.
pub type IoResult<T> = std::result::Result<T, IoError>;

/// Main error type for mediaflow operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed call (empty name, zero length, bad alignment).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Allocation failed.
    #[error("out of memory: {size} bytes aligned to {align}")]
    OutOfMemory {
        /// Requested size in bytes.
        size: usize,
        /// Requested alignment.
        align: usize,
    },

    /// Source data does not fit into the destination.
    #[error("out of range: need {needed} bytes, {available} available")]
    OutOfRange {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        available: usize,
    },

    /// Operation is not valid in the current state or configuration.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Name or tag lookup missed.
    #[error("not found: {0}")]
    NotFound(String),

    /// A bounded wait expired.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The object is not in a state where the call makes sense.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A data bus or port reported a hard failure.
    #[error("bus failure: {0}")]
    Bus(IoError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// System call error (via rustix).
    #[error("system error: {0}")]
    System(#[from] rustix::io::Errno),
}

impl Error {
    /// Whether the caller may retry the same call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::Bus(IoError::Timeout))
    }
}

/// Data-plane failure returned by acquire/release.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoError {
    /// Hard failure: invalid arguments, torn-down port, or a broken
    /// acquire/release pairing.
    #[error("i/o failure")]
    Fail,

    /// The wait expired before data or space became available.
    #[error("i/o timed out")]
    Timeout,

    /// The bus was aborted while the caller was waiting.
    #[error("i/o aborted")]
    Aborted,
}

impl IoError {
    /// Whether retrying the call may succeed.
    pub fn is_timeout(self) -> bool {
        self == IoError::Timeout
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        match e {
            IoError::Timeout => Error::Timeout("data bus wait expired".into()),
            other => Error::Bus(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_retryable() {
        let err: Error = IoError::Timeout.into();
        assert!(err.is_retryable());
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[test]
    fn test_fail_is_not_retryable() {
        let err: Error = IoError::Fail.into();
        assert!(!err.is_retryable());
        assert!(matches!(err, Error::Bus(IoError::Fail)));
        assert_eq!(err.to_string(), "bus failure: i/o failure");
    }

    #[test]
    fn test_out_of_range_message() {
        let err = Error::OutOfRange {
            needed: 100,
            available: 50,
        };
        assert_eq!(err.to_string(), "out of range: need 100 bytes, 50 available");
    }
}
