use ferrofhir_jobs::JobError;
use ferrofhir_storage::StorageError;
use thiserror::Error;

/// Errors raised inside the import pipeline.
///
/// The taxonomy mirrors the propagation policy: record-level problems
/// never become an `ImportError` at all (they are captured as data and
/// end up in the error log); everything here is at least fatal to one
/// processing job, and the variant decides whether the failure is
/// retriable, caller-facing, or a cancellation.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("import cancelled")]
    Cancelled,

    #[error("input file etag changed: {url}")]
    EtagMismatch { url: String },

    #[error("failed to access input file {url}: {source}")]
    BlobAccess {
        url: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to process input file {url}: {message}")]
    ProcessingFailed { url: String, message: String },

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("job queue failure: {0}")]
    Queue(#[from] JobError),

    #[error("I/O failure while reading input: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("pipeline channel closed unexpectedly")]
    ChannelClosed,

    #[error("internal import failure: {message}")]
    Internal { message: String },
}

impl ImportError {
    pub fn blob_access(url: impl Into<String>, source: StorageError) -> Self {
        Self::BlobAccess {
            url: url.into(),
            source,
        }
    }

    pub fn etag_mismatch(url: impl Into<String>) -> Self {
        Self::EtagMismatch { url: url.into() }
    }

    pub fn processing_failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProcessingFailed {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this failure ends the orchestration with a caller-facing
    /// error body instead of being retried.
    pub fn is_precondition_failure(&self) -> bool {
        matches!(
            self,
            Self::EtagMismatch { .. } | Self::BlobAccess { .. } | Self::ProcessingFailed { .. }
        )
    }

    /// The HTTP status code reported upward for caller-facing failures.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::EtagMismatch { .. } | Self::ProcessingFailed { .. } => 400,
            Self::BlobAccess { source, .. } => match source {
                StorageError::BlobNotFound { .. } => 404,
                _ => 400,
            },
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_failures() {
        assert!(ImportError::etag_mismatch("https://x").is_precondition_failure());
        assert!(
            ImportError::blob_access("https://x", StorageError::blob_not_found("https://x"))
                .is_precondition_failure()
        );
        assert!(ImportError::processing_failed("https://x", "boom").is_precondition_failure());
        assert!(!ImportError::Cancelled.is_precondition_failure());
        assert!(!ImportError::internal("boom").is_precondition_failure());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ImportError::etag_mismatch("https://x").status_code(), 400);
        assert_eq!(
            ImportError::blob_access("https://x", StorageError::blob_not_found("https://x"))
                .status_code(),
            404
        );
        assert_eq!(
            ImportError::blob_access("https://x", StorageError::unavailable("throttled"))
                .status_code(),
            400
        );
        assert_eq!(ImportError::internal("boom").status_code(), 500);
    }
}
