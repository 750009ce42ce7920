use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Lifecycle states of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Created,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// A terminal status will never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// The immutable description of one unit of queued work.
///
/// `type_tag` is the explicit discriminator the registry dispatches on;
/// `payload` is the executor-specific definition, kept opaque to the
/// queue. The id is assigned by the submitter so a restarted submitter
/// can re-attach to its jobs instead of enqueueing duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDefinition {
    pub job_id: String,
    pub queue_id: String,
    pub type_tag: String,
    pub payload: Value,
    pub max_retry_count: u32,
}

impl JobDefinition {
    pub fn new(
        queue_id: impl Into<String>,
        type_tag: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().simple().to_string(),
            queue_id: queue_id.into(),
            type_tag: type_tag.into(),
            payload,
            max_retry_count: 3,
        }
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = job_id.into();
        self
    }

    pub fn with_max_retry_count(mut self, max_retry_count: u32) -> Self {
        self.max_retry_count = max_retry_count;
        self
    }
}

/// A queue-side snapshot of one job: definition plus mutable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub definition: JobDefinition,
    pub status: JobStatus,
    /// Terminal result payload (success value or failure body).
    pub result: Option<Value>,
    /// Last checkpoint reported by the executor.
    pub progress: Option<Value>,
    pub cancel_requested: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl JobInfo {
    pub fn new(definition: JobDefinition) -> Self {
        Self {
            definition,
            status: JobStatus::Created,
            result: None,
            progress: None,
            cancel_requested: false,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn id(&self) -> &str {
        &self.definition.job_id
    }
}
