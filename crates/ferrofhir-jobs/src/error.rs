use serde_json::Value;
use thiserror::Error;

/// Errors produced by job executors and the queue client.
///
/// The variants are the propagation policy: `Retriable` asks the queue
/// to redispatch the same job (which will resume from its persisted
/// checkpoint), `Failed` is terminal, and `Cancelled` is terminal but
/// distinguished from failure everywhere.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job cancelled: {message}")]
    Cancelled { message: String },

    #[error("retriable job failure: {message}")]
    Retriable { message: String },

    #[error("job failed: {message}")]
    Failed {
        message: String,
        /// Structured, caller-facing error payload, when one exists.
        result: Option<Value>,
    },

    #[error("job not found: {job_id}")]
    NotFound { job_id: String },

    #[error("no executor registered for job type: {type_tag}")]
    UnknownType { type_tag: String },

    #[error("queue failure: {message}")]
    Queue { message: String },

    #[error("malformed job payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl JobError {
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    pub fn retriable(message: impl Into<String>) -> Self {
        Self::Retriable {
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            result: None,
        }
    }

    pub fn failed_with_result(message: impl Into<String>, result: Value) -> Self {
        Self::Failed {
            message: message.into(),
            result: Some(result),
        }
    }

    pub fn not_found(job_id: impl Into<String>) -> Self {
        Self::NotFound {
            job_id: job_id.into(),
        }
    }

    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue {
            message: message.into(),
        }
    }

    /// Whether the queue should redispatch the job.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Retriable { .. })
    }

    /// Whether the job ended because of cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
