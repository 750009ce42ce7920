//! Storage error types for the storage abstraction layer.

use std::fmt;

/// Errors that can occur against a storage backend or blob store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested blob does not exist or is not readable.
    #[error("Blob not found: {url}")]
    BlobNotFound {
        /// Location of the missing blob.
        url: String,
    },

    /// The backend is temporarily unable to serve the request
    /// (timeout, throttling, connection loss). Safe to retry.
    #[error("Storage unavailable: {message}")]
    Unavailable {
        /// Description of the transient condition.
        message: String,
    },

    /// The data handed to the backend is malformed.
    #[error("Invalid data: {message}")]
    InvalidData {
        /// Description of why the data is invalid.
        message: String,
    },

    /// An I/O error occurred while streaming blob content.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `BlobNotFound` error.
    #[must_use]
    pub fn blob_not_found(url: impl Into<String>) -> Self {
        Self::BlobNotFound { url: url.into() }
    }

    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidData` error.
    #[must_use]
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if retrying the same operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::BlobNotFound { .. } => ErrorCategory::NotFound,
            Self::Unavailable { .. } => ErrorCategory::Infrastructure,
            Self::InvalidData { .. } => ErrorCategory::Validation,
            Self::Io(_) => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Blob or resource not found.
    NotFound,
    /// Validation error.
    Validation,
    /// Infrastructure/connection error.
    Infrastructure,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
