use async_trait::async_trait;
use serde_json::Value;

use crate::error::JobError;
use crate::types::{JobDefinition, JobInfo};

/// Client surface of the durable job queue service.
///
/// The queue stores definitions, leases them to workers, tracks retries
/// and heartbeats, and persists executor checkpoints. This trait is the
/// narrow slice the server consumes; the queue implementation lives
/// elsewhere.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Durably stores the definition and schedules it for execution.
    ///
    /// Enqueueing a definition whose `job_id` is already known returns
    /// the existing job unchanged, so a restarted submitter re-attaches
    /// instead of duplicating work.
    async fn enqueue(&self, definition: JobDefinition) -> Result<JobInfo, JobError>;

    /// Fetches the current snapshot of a job, or `None` when the id is
    /// unknown.
    async fn get(&self, job_id: &str) -> Result<Option<JobInfo>, JobError>;

    /// Requests cooperative cancellation of a job.
    async fn cancel(&self, job_id: &str) -> Result<(), JobError>;

    /// Persists an executor checkpoint. The next attempt of the same
    /// job observes this value and resumes from it.
    async fn report_progress(&self, job_id: &str, progress: Value) -> Result<(), JobError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_job_queue_object_safe(_: &dyn JobQueue) {}
}
