//! Error types for the transaction coordinator
//!
//! A write-write conflict is not an error: `can_commit` reports it as
//! `Ok(false)` and the client aborts. Everything here is either a client
//! protocol violation (`TransactionNotInProgress`), a persistence failure,
//! or a fatal condition.

use crate::types::WritePointer;
use std::io;
use thiserror::Error;

/// Result type alias for coordinator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the transaction coordinator
#[derive(Debug, Error)]
pub enum Error {
    /// The transaction is no longer in progress (committed, aborted, expired
    /// or invalidated)
    #[error("Transaction {0} is not in progress")]
    TransactionNotInProgress(WritePointer),

    /// The write pointer space is used up. Fatal.
    #[error("Write pointer space exhausted")]
    PointerExhausted,

    /// I/O error from the persistence layer
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Persisted data failed validation
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Configuration could not be parsed or is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid operation or state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl Error {
    /// Whether this error means the coordinator cannot continue
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::PointerExhausted | Error::Corruption(_))
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Error::SerializationError(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Error::SerializationError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_in_progress() {
        let err = Error::TransactionNotInProgress(42);
        let msg = err.to_string();
        assert!(msg.contains("not in progress"));
        assert!(msg.contains("42"));
    }

    #[test]
    fn test_error_display_corruption() {
        let err = Error::Corruption("CRC check failed".to_string());
        let msg = err.to_string();
        assert!(msg.contains("Data corruption"));
        assert!(msg.contains("CRC check failed"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::IoError(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_error_from_rmp_decode() {
        let result: Result<String> = rmp_serde::from_slice(&[0xc1]).map_err(Error::from);
        assert!(matches!(result, Err(Error::SerializationError(_))));
    }

    #[test]
    fn test_fatal_errors() {
        assert!(Error::PointerExhausted.is_fatal());
        assert!(Error::Corruption("x".into()).is_fatal());
        assert!(!Error::TransactionNotInProgress(1).is_fatal());
    }
}
