use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::queue::JobQueue;
use crate::types::JobInfo;

/// Everything an executor needs for one attempt of one job: the job
/// snapshot, a queue handle for checkpointing, and the cancellation
/// token threaded through every await point below it.
pub struct JobContext {
    pub job: JobInfo,
    pub queue: Arc<dyn JobQueue>,
    pub cancel: CancellationToken,
}

impl JobContext {
    /// Deserializes the job's typed payload.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, JobError> {
        Ok(serde_json::from_value(self.job.definition.payload.clone())?)
    }

    /// Deserializes the last persisted checkpoint, when one exists.
    pub fn checkpoint<T: DeserializeOwned>(&self) -> Result<Option<T>, JobError> {
        match &self.job.progress {
            Some(progress) => Ok(Some(serde_json::from_value(progress.clone())?)),
            None => Ok(None),
        }
    }

    /// Persists a new checkpoint for this job.
    pub async fn report_progress<T: Serialize>(&self, progress: &T) -> Result<(), JobError> {
        self.queue
            .report_progress(self.job.id(), serde_json::to_value(progress)?)
            .await
    }
}

/// One job type's implementation.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// The type tag this executor handles.
    fn type_tag(&self) -> &'static str;

    /// Runs one attempt of the job. The returned value becomes the
    /// job's terminal result on success.
    async fn execute(&self, ctx: JobContext) -> Result<Value, JobError>;
}

/// Maps type tags to executors.
///
/// Dispatch is by the definition's explicit tag, never by inspecting
/// the payload.
#[derive(Default)]
pub struct JobRegistry {
    executors: HashMap<&'static str, Arc<dyn JobExecutor>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an executor under its type tag, replacing any previous
    /// registration for the same tag.
    pub fn register(&mut self, executor: Arc<dyn JobExecutor>) {
        self.executors.insert(executor.type_tag(), executor);
    }

    /// Looks up the executor for a type tag.
    pub fn get(&self, type_tag: &str) -> Option<Arc<dyn JobExecutor>> {
        self.executors.get(type_tag).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobDefinition, JobStatus};
    use serde_json::json;

    struct EchoExecutor;

    #[async_trait]
    impl JobExecutor for EchoExecutor {
        fn type_tag(&self) -> &'static str {
            "echo"
        }

        async fn execute(&self, ctx: JobContext) -> Result<Value, JobError> {
            Ok(ctx.job.definition.payload.clone())
        }
    }

    struct NullQueue;

    #[async_trait]
    impl JobQueue for NullQueue {
        async fn enqueue(&self, definition: JobDefinition) -> Result<JobInfo, JobError> {
            Ok(JobInfo::new(definition))
        }

        async fn get(&self, _job_id: &str) -> Result<Option<JobInfo>, JobError> {
            Ok(None)
        }

        async fn cancel(&self, _job_id: &str) -> Result<(), JobError> {
            Ok(())
        }

        async fn report_progress(&self, _job_id: &str, _progress: Value) -> Result<(), JobError> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_dispatch() {
        let mut registry = JobRegistry::new();
        registry.register(Arc::new(EchoExecutor));

        assert!(registry.get("echo").is_some());
        assert!(registry.get("unknown").is_none());
        assert!(!registry.is_empty());
    }

    #[tokio::test]
    async fn test_executor_receives_payload() {
        let definition = JobDefinition::new("default", "echo", json!({"n": 7}));
        let job = JobInfo::new(definition);
        assert_eq!(job.status, JobStatus::Created);

        let ctx = JobContext {
            job,
            queue: Arc::new(NullQueue),
            cancel: CancellationToken::new(),
        };

        let result = EchoExecutor.execute(ctx).await.unwrap();
        assert_eq!(result, json!({"n": 7}));
    }

    #[tokio::test]
    async fn test_context_payload_deserialization() {
        #[derive(serde::Deserialize)]
        struct Payload {
            n: u32,
        }

        let definition = JobDefinition::new("default", "echo", json!({"n": 7}));
        let ctx = JobContext {
            job: JobInfo::new(definition),
            queue: Arc::new(NullQueue),
            cancel: CancellationToken::new(),
        };

        let payload: Payload = ctx.payload().unwrap();
        assert_eq!(payload.n, 7);
        let checkpoint: Option<Payload> = ctx.checkpoint().unwrap();
        assert!(checkpoint.is_none());
    }
}
