//! Error types for LobDB core.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for LOB operations.
pub type LobResult<T> = Result<T, LobError>;

/// Errors that can occur in large-object operations.
#[derive(Debug, Error)]
pub enum LobError {
    /// File store error.
    #[error("storage error: {0}")]
    Storage(#[from] lobdb_storage::StorageError),

    /// I/O error while reading a source or writing a stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A value or source is malformed (for example invalid UTF-8 in a CLOB).
    #[error("LOB corruption: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    /// No free object id could be found in the shard tree.
    #[error("object id allocation exhausted after {probes} probes")]
    AllocationExhausted {
        /// Number of directories probed.
        probes: u32,
    },

    /// The operation is not possible with the current configuration.
    #[error("unsupported configuration: {message}")]
    UnsupportedConfiguration {
        /// Description of the conflict.
        message: String,
    },

    /// The value's backing file was closed or moved by a lifecycle transition.
    #[error("LOB used after close: {}", path.display())]
    UseAfterClose {
        /// Path the value referred to.
        path: PathBuf,
    },

    /// Operation not permitted in the value's current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl LobError {
    /// Creates a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates an unsupported configuration error.
    pub fn unsupported_configuration(message: impl Into<String>) -> Self {
        Self::UnsupportedConfiguration {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a use-after-close error for `path`.
    pub fn use_after_close(path: impl Into<PathBuf>) -> Self {
        Self::UseAfterClose { path: path.into() }
    }
}
