//! Error types for revlog operations.
//!
//! This module defines [`Error`], the primary error type for all commit log
//! operations, along with a convenient [`Result`] type alias.

use common::StorageError;
use common::serde::DeserializeError;

/// Error type for revlog operations.
///
/// # Error Categories
///
/// - [`NotFound`](Error::NotFound): a log, commit or shard does not exist.
/// - [`Contention`](Error::Contention): a transaction lost a race with a
///   concurrent writer. Commit creation absorbs this through the shard
///   fallback; every other mutation surfaces it to the caller.
/// - [`InvalidInput`](Error::InvalidInput): the caller passed bad arguments.
/// - [`Storage`](Error::Storage), [`Encoding`](Error::Encoding) and
///   [`Internal`](Error::Internal): failures below the log layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The requested entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A concurrent writer changed an entity this transaction read.
    #[error("Contention: {0}")]
    Contention(String),

    /// Invalid input or parameter errors.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage-related errors from the underlying storage layer.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Encoding or decoding errors.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Internal errors indicating bugs or invariant violations.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if this error was caused by transactional contention.
    pub fn is_contention(&self) -> bool {
        matches!(self, Error::Contention(_))
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Storage(msg) => Error::Storage(msg),
            StorageError::Internal(msg) => Error::Internal(msg),
        }
    }
}

impl From<DeserializeError> for Error {
    fn from(err: DeserializeError) -> Self {
        Error::Encoding(err.message)
    }
}

/// Result type alias for revlog operations.
pub type Result<T> = std::result::Result<T, Error>;
