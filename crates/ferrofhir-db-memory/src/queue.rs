//! In-memory job queue with registry-dispatched execution.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ferrofhir_jobs::{
    JobContext, JobDefinition, JobError, JobInfo, JobQueue, JobRegistry, JobStatus,
};
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

struct JobEntry {
    info: JobInfo,
    cancel: CancellationToken,
}

struct QueueInner {
    jobs: RwLock<HashMap<String, JobEntry>>,
    registry: Arc<JobRegistry>,
}

/// Job queue that executes enqueued definitions on the tokio runtime.
///
/// Honors the production queue's contracts: enqueue with a known id
/// re-attaches instead of duplicating, retriable failures are
/// redispatched up to the definition's retry budget, cancellation is
/// cooperative, and executor checkpoints survive between attempts.
#[derive(Clone)]
pub struct InMemoryJobQueue {
    inner: Arc<QueueInner>,
}

impl InMemoryJobQueue {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                jobs: RwLock::new(HashMap::new()),
                registry,
            }),
        }
    }

    /// Polls a job until it reaches a terminal status.
    pub async fn wait_for_terminal(&self, job_id: &str) -> Result<JobInfo, JobError> {
        loop {
            let info = self
                .get(job_id)
                .await?
                .ok_or_else(|| JobError::not_found(job_id))?;
            if info.status.is_terminal() {
                return Ok(info);
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }

    async fn set_running(&self, job_id: &str) {
        let mut jobs = self.inner.jobs.write().await;
        if let Some(entry) = jobs.get_mut(job_id) {
            entry.info.status = JobStatus::Running;
        }
    }

    async fn finish(&self, job_id: &str, status: JobStatus, result: Option<Value>) {
        let mut jobs = self.inner.jobs.write().await;
        if let Some(entry) = jobs.get_mut(job_id) {
            entry.info.status = status;
            entry.info.result = result;
        }
    }

    async fn drive(self, job_id: String) {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            let (job, cancel) = {
                let jobs = self.inner.jobs.read().await;
                let Some(entry) = jobs.get(&job_id) else {
                    return;
                };
                (entry.info.clone(), entry.cancel.clone())
            };

            let Some(executor) = self.inner.registry.get(&job.definition.type_tag) else {
                self.finish(
                    &job_id,
                    JobStatus::Failed,
                    Some(json!({
                        "message": format!("no executor for job type {}", job.definition.type_tag)
                    })),
                )
                .await;
                return;
            };

            self.set_running(&job_id).await;
            let max_retry_count = job.definition.max_retry_count;
            let ctx = JobContext {
                job,
                queue: Arc::new(self.clone()),
                cancel,
            };

            match executor.execute(ctx).await {
                Ok(result) => {
                    self.finish(&job_id, JobStatus::Completed, Some(result)).await;
                    return;
                }
                Err(JobError::Cancelled { message }) => {
                    info!(job_id = %job_id, "job cancelled");
                    self.finish(&job_id, JobStatus::Cancelled, Some(json!({"message": message})))
                        .await;
                    return;
                }
                Err(JobError::Failed { message, result }) => {
                    self.finish(
                        &job_id,
                        JobStatus::Failed,
                        Some(result.unwrap_or_else(|| json!({"message": message}))),
                    )
                    .await;
                    return;
                }
                Err(err) if err.is_retriable() && attempt <= max_retry_count => {
                    warn!(job_id = %job_id, attempt, error = %err, "job attempt failed, redispatching");
                }
                Err(err) => {
                    self.finish(
                        &job_id,
                        JobStatus::Failed,
                        Some(json!({"message": err.to_string()})),
                    )
                    .await;
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, definition: JobDefinition) -> Result<JobInfo, JobError> {
        let job_id = definition.job_id.clone();

        {
            let mut jobs = self.inner.jobs.write().await;
            if let Some(existing) = jobs.get(&job_id) {
                // Same id: re-attach, never duplicate.
                return Ok(existing.info.clone());
            }
            let info = JobInfo::new(definition);
            jobs.insert(
                job_id.clone(),
                JobEntry {
                    info: info.clone(),
                    cancel: CancellationToken::new(),
                },
            );
        }

        let queue = self.clone();
        let spawn_id = job_id.clone();
        tokio::spawn(async move { queue.drive(spawn_id).await });

        let jobs = self.inner.jobs.read().await;
        Ok(jobs
            .get(&job_id)
            .map(|entry| entry.info.clone())
            .ok_or_else(|| JobError::not_found(&job_id))?)
    }

    async fn get(&self, job_id: &str) -> Result<Option<JobInfo>, JobError> {
        let jobs = self.inner.jobs.read().await;
        Ok(jobs.get(job_id).map(|entry| entry.info.clone()))
    }

    async fn cancel(&self, job_id: &str) -> Result<(), JobError> {
        let mut jobs = self.inner.jobs.write().await;
        let entry = jobs
            .get_mut(job_id)
            .ok_or_else(|| JobError::not_found(job_id))?;
        entry.info.cancel_requested = true;
        entry.cancel.cancel();
        Ok(())
    }

    async fn report_progress(&self, job_id: &str, progress: Value) -> Result<(), JobError> {
        let mut jobs = self.inner.jobs.write().await;
        let entry = jobs
            .get_mut(job_id)
            .ok_or_else(|| JobError::not_found(job_id))?;
        entry.info.progress = Some(progress);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrofhir_jobs::JobExecutor;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyExecutor {
        attempts: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl JobExecutor for FlakyExecutor {
        fn type_tag(&self) -> &'static str {
            "flaky"
        }

        async fn execute(&self, _ctx: JobContext) -> Result<Value, JobError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.fail_first {
                return Err(JobError::retriable("flaky"));
            }
            Ok(json!({"attempt": attempt}))
        }
    }

    struct BlockingExecutor;

    #[async_trait]
    impl JobExecutor for BlockingExecutor {
        fn type_tag(&self) -> &'static str {
            "blocking"
        }

        async fn execute(&self, ctx: JobContext) -> Result<Value, JobError> {
            ctx.cancel.cancelled().await;
            Err(JobError::cancelled("stopped"))
        }
    }

    fn queue_with(executors: Vec<Arc<dyn JobExecutor>>) -> InMemoryJobQueue {
        let mut registry = JobRegistry::new();
        for executor in executors {
            registry.register(executor);
        }
        InMemoryJobQueue::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_executes_to_completion() {
        let queue = queue_with(vec![Arc::new(FlakyExecutor {
            attempts: AtomicU32::new(0),
            fail_first: 0,
        })]);

        let definition = JobDefinition::new("default", "flaky", json!({}));
        let info = queue.enqueue(definition).await.unwrap();
        let done = queue.wait_for_terminal(info.id()).await.unwrap();

        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.result.unwrap()["attempt"], 1);
    }

    #[tokio::test]
    async fn test_retriable_failures_are_redispatched() {
        let queue = queue_with(vec![Arc::new(FlakyExecutor {
            attempts: AtomicU32::new(0),
            fail_first: 2,
        })]);

        let definition =
            JobDefinition::new("default", "flaky", json!({})).with_max_retry_count(5);
        let info = queue.enqueue(definition).await.unwrap();
        let done = queue.wait_for_terminal(info.id()).await.unwrap();

        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.result.unwrap()["attempt"], 3);
    }

    #[tokio::test]
    async fn test_retry_budget_exhaustion_fails() {
        let queue = queue_with(vec![Arc::new(FlakyExecutor {
            attempts: AtomicU32::new(0),
            fail_first: 10,
        })]);

        let definition =
            JobDefinition::new("default", "flaky", json!({})).with_max_retry_count(2);
        let info = queue.enqueue(definition).await.unwrap();
        let done = queue.wait_for_terminal(info.id()).await.unwrap();

        assert_eq!(done.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_unknown_type_fails() {
        let queue = queue_with(vec![]);
        let definition = JobDefinition::new("default", "mystery", json!({}));
        let info = queue.enqueue(definition).await.unwrap();
        let done = queue.wait_for_terminal(info.id()).await.unwrap();

        assert_eq!(done.status, JobStatus::Failed);
        assert!(
            done.result.unwrap()["message"]
                .as_str()
                .unwrap()
                .contains("mystery")
        );
    }

    #[tokio::test]
    async fn test_enqueue_same_id_reattaches() {
        let queue = queue_with(vec![Arc::new(BlockingExecutor)]);

        let definition =
            JobDefinition::new("default", "blocking", json!({})).with_job_id("job-1");
        queue.enqueue(definition.clone()).await.unwrap();
        let second = queue.enqueue(definition).await.unwrap();
        assert_eq!(second.id(), "job-1");

        let jobs = queue.inner.jobs.read().await;
        assert_eq!(jobs.len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_reaches_executor() {
        let queue = queue_with(vec![Arc::new(BlockingExecutor)]);

        let definition = JobDefinition::new("default", "blocking", json!({}));
        let info = queue.enqueue(definition).await.unwrap();

        queue.cancel(info.id()).await.unwrap();
        let done = queue.wait_for_terminal(info.id()).await.unwrap();

        assert_eq!(done.status, JobStatus::Cancelled);
        assert!(done.cancel_requested);
    }

    #[tokio::test]
    async fn test_progress_persists_across_attempts() {
        struct CheckpointingExecutor {
            attempts: AtomicU32,
        }

        #[async_trait]
        impl JobExecutor for CheckpointingExecutor {
            fn type_tag(&self) -> &'static str {
                "checkpointing"
            }

            async fn execute(&self, ctx: JobContext) -> Result<Value, JobError> {
                let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt == 1 {
                    ctx.report_progress(&json!({"resumeAt": 42})).await?;
                    return Err(JobError::retriable("first attempt dies"));
                }
                let checkpoint: Option<Value> = ctx.checkpoint()?;
                Ok(checkpoint.unwrap_or_else(|| json!({"resumeAt": 0})))
            }
        }

        let queue = queue_with(vec![Arc::new(CheckpointingExecutor {
            attempts: AtomicU32::new(0),
        })]);

        let definition =
            JobDefinition::new("default", "checkpointing", json!({})).with_max_retry_count(3);
        let info = queue.enqueue(definition).await.unwrap();
        let done = queue.wait_for_terminal(info.id()).await.unwrap();

        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.result.unwrap()["resumeAt"], 42);
    }
}
