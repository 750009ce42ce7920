//! One file's load → import → checkpoint loop as a queue-executable job.

use std::sync::Arc;

use async_trait::async_trait;
use ferrofhir_jobs::{JobContext, JobError, JobExecutor};
use ferrofhir_storage::ErrorLogStore;
use serde_json::Value;
use tracing::{info, warn};

use crate::definitions::{
    IMPORT_PROCESSING_JOB, ImportProcessingJobDefinition, ImportProcessingJobResult,
};
use crate::error::ImportError;
use crate::error_store::ImportErrorRecorder;
use crate::importer::BulkImporter;
use crate::loader::{LoadRequest, ResourceLoader};

/// Executes one [`ImportProcessingJobDefinition`]: wires a loader and an
/// importer together, drains the progress channel into persisted
/// checkpoints, and maps the outcome onto the queue's retry policy.
///
/// A restarted attempt resumes at the persisted checkpoint — never from
/// byte zero.
pub struct ImportProcessingJob {
    loader: ResourceLoader,
    importer: BulkImporter,
    error_store: Arc<dyn ErrorLogStore>,
}

impl ImportProcessingJob {
    pub fn new(
        loader: ResourceLoader,
        importer: BulkImporter,
        error_store: Arc<dyn ErrorLogStore>,
    ) -> Self {
        Self {
            loader,
            importer,
            error_store,
        }
    }

    /// Maps a pipeline-half outcome onto the job taxonomy: cancellation
    /// stays cancellation, everything else is retriable so the queue
    /// redispatches and the checkpoint resumes.
    fn map_outcome(
        stage: &str,
        outcome: Result<Result<(), ImportError>, tokio::task::JoinError>,
    ) -> Result<(), JobError> {
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(ImportError::Cancelled)) => {
                Err(JobError::cancelled(format!("{stage} cancelled")))
            }
            Ok(Err(err)) => Err(JobError::retriable(format!("{stage} failed: {err}"))),
            Err(err) => Err(JobError::retriable(format!("{stage} task aborted: {err}"))),
        }
    }
}

#[async_trait]
impl JobExecutor for ImportProcessingJob {
    fn type_tag(&self) -> &'static str {
        IMPORT_PROCESSING_JOB
    }

    async fn execute(&self, ctx: JobContext) -> Result<Value, JobError> {
        let definition: ImportProcessingJobDefinition = ctx.payload()?;
        let base: ImportProcessingJobResult = ctx.checkpoint()?.unwrap_or_default();
        let mut result = base.clone();

        // Resume point: the checkpoint's offset sits inside the last
        // merged line; the remaining budget shrinks by what the prior
        // attempt already consumed.
        let start_offset = if base.current_offset > 0 {
            base.current_offset
        } else {
            definition.offset
        };
        let bytes_to_read = (definition.offset + definition.bytes_to_read)
            .saturating_sub(start_offset);

        info!(
            job_id = %definition.job_id,
            location = %definition.resource_location,
            start_offset,
            resumed_index = base.current_index,
            "starting import processing job"
        );

        let recorder = ImportErrorRecorder::new(Arc::clone(&self.error_store), &definition.job_id);
        let error_log_url = recorder.location();

        let request = LoadRequest {
            location: definition.resource_location.clone(),
            offset: start_offset,
            bytes_to_read,
            resource_type: definition.resource_type.clone(),
            begin_sequence_id: definition.begin_sequence_id,
            index_base: base.current_index,
            import_mode: definition.import_mode,
        };

        let (records, load_handle) = self.loader.load(request, ctx.cancel.child_token());
        let (mut progress_rx, import_handle) =
            self.importer
                .import(records, recorder, ctx.cancel.child_token());

        // Drain progress into persisted checkpoints. Each value is
        // already durable in the backend, so persisting it makes the
        // index a true lower bound for the next attempt.
        while let Some(progress) = progress_rx.recv().await {
            result.succeeded = base.succeeded + progress.succeeded;
            result.failed = base.failed + progress.failed;
            if progress.current_index > base.current_index {
                result.current_index = progress.current_index;
                result.current_offset = progress.current_offset;
            }
            if let Err(err) = ctx.report_progress(&result).await {
                warn!(job_id = %definition.job_id, error = %err, "failed to persist processing checkpoint");
            }
        }

        let import_outcome = import_handle.await;
        let load_outcome = load_handle.await;
        Self::map_outcome("importer", import_outcome)?;
        Self::map_outcome("loader", load_outcome)?;

        result.resource_type = definition.resource_type.clone();
        result.error_log_url = Some(error_log_url);

        info!(
            job_id = %definition.job_id,
            succeeded = result.succeeded,
            failed = result.failed,
            "import processing job complete"
        );

        Ok(serde_json::to_value(&result)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImportConfig;
    use crate::definitions::ImportMode;
    use crate::parser::ImportResourceParser;
    use ferrofhir_db_memory::{
        InMemoryBlobStore, InMemoryBulkWriteStore, InMemoryErrorLogStore, InMemoryJobQueue,
    };
    use ferrofhir_jobs::{JobDefinition, JobInfo, JobQueue, JobRegistry};
    use ferrofhir_storage::BulkWriteStore;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use url::Url;

    struct Harness {
        blob: Arc<InMemoryBlobStore>,
        store: Arc<InMemoryBulkWriteStore>,
        queue: Arc<InMemoryJobQueue>,
        job: ImportProcessingJob,
    }

    fn harness(batch_size: usize) -> Harness {
        let config = ImportConfig::default()
            .with_storage_batch_size(batch_size)
            .with_retry_delay_ms(1);
        let blob = Arc::new(InMemoryBlobStore::new());
        let store = Arc::new(InMemoryBulkWriteStore::new());
        let errors = Arc::new(InMemoryErrorLogStore::new());
        let queue = Arc::new(InMemoryJobQueue::new(Arc::new(JobRegistry::new())));

        let loader = ResourceLoader::new(blob.clone(), ImportResourceParser::new(), &config);
        let importer = BulkImporter::new(store.clone() as Arc<dyn BulkWriteStore>, &config);
        let job = ImportProcessingJob::new(loader, importer, errors);

        Harness {
            blob,
            store,
            queue,
            job,
        }
    }

    fn definition(url: &Url, bytes: u64) -> ImportProcessingJobDefinition {
        ImportProcessingJobDefinition {
            job_id: "proc-1".to_string(),
            resource_location: url.clone(),
            resource_type: Some("Patient".to_string()),
            offset: 0,
            bytes_to_read: bytes,
            begin_sequence_id: 0,
            end_sequence_id: 10_000,
            import_mode: ImportMode::InitialLoad,
        }
    }

    fn context(
        harness: &Harness,
        definition: &ImportProcessingJobDefinition,
        checkpoint: Option<&ImportProcessingJobResult>,
    ) -> JobContext {
        let job_definition = JobDefinition::new(
            "import-processing-queue",
            IMPORT_PROCESSING_JOB,
            serde_json::to_value(definition).unwrap(),
        )
        .with_job_id(&definition.job_id);
        let mut info = JobInfo::new(job_definition);
        info.progress = checkpoint.map(|c| serde_json::to_value(c).unwrap());

        JobContext {
            job: info,
            queue: harness.queue.clone() as Arc<dyn JobQueue>,
            cancel: CancellationToken::new(),
        }
    }

    fn patient_lines(range: std::ops::RangeInclusive<usize>) -> String {
        range
            .map(|i| format!(r#"{{"resourceType":"Patient","id":"p{i}"}}"#) + "\n")
            .collect()
    }

    #[tokio::test]
    async fn test_clean_run_imports_everything() {
        let harness = harness(10);
        let content = patient_lines(1..=21);
        let url = Url::parse("memory://input/patients.ndjson").unwrap();
        harness.blob.put_blob(&url, content.as_bytes());

        let def = definition(&url, content.len() as u64);
        let ctx = context(&harness, &def, None);
        let value = harness.job.execute(ctx).await.unwrap();

        let result: ImportProcessingJobResult = serde_json::from_value(value).unwrap();
        assert_eq!(result.succeeded, 21);
        assert_eq!(result.failed, 0);
        assert_eq!(result.current_index, 21);
        assert_eq!(result.resource_type.as_deref(), Some("Patient"));
        assert!(result.error_log_url.is_some());
        assert_eq!(harness.store.resource_count(), 21);
    }

    #[tokio::test]
    async fn test_partial_failure_is_still_success() {
        let harness = harness(10);
        let content = format!(
            "{}not json\n{}",
            patient_lines(1..=1),
            patient_lines(3..=3)
        );
        let url = Url::parse("memory://input/mixed.ndjson").unwrap();
        harness.blob.put_blob(&url, content.as_bytes());

        let def = definition(&url, content.len() as u64);
        let value = harness
            .job
            .execute(context(&harness, &def, None))
            .await
            .unwrap();

        let result: ImportProcessingJobResult = serde_json::from_value(value).unwrap();
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed, 1);
    }

    #[tokio::test]
    async fn test_missing_blob_is_retriable() {
        let harness = harness(10);
        let url = Url::parse("memory://input/absent.ndjson").unwrap();
        let def = definition(&url, 1000);

        let err = harness
            .job
            .execute(context(&harness, &def, None))
            .await
            .unwrap_err();
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn test_storage_failure_is_retriable() {
        let harness = harness(3);
        let content = patient_lines(1..=7);
        let url = Url::parse("memory://input/patients.ndjson").unwrap();
        harness.blob.put_blob(&url, content.as_bytes());
        harness
            .store
            .poison_key(&ferrofhir_core::ResourceKey::new("Patient".parse().unwrap(), "p4"));

        let def = definition(&url, content.len() as u64);
        let err = harness
            .job
            .execute(context(&harness, &def, None))
            .await
            .unwrap_err();
        assert!(err.is_retriable());
        // The first batch committed before the failure.
        assert_eq!(harness.store.resource_count(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_outcome_is_not_retriable() {
        let harness = harness(10);
        let content = patient_lines(1..=5);
        let url = Url::parse("memory://input/patients.ndjson").unwrap();
        harness.blob.put_blob(&url, content.as_bytes());

        let def = definition(&url, content.len() as u64);
        let ctx = context(&harness, &def, None);
        ctx.cancel.cancel();

        let err = harness.job.execute(ctx).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(!err.is_retriable());
    }

    #[tokio::test]
    async fn test_resume_from_checkpoint_merges_remainder_exactly_once() {
        let harness = harness(10);
        let content = patient_lines(1..=6);
        let url = Url::parse("memory://input/patients.ndjson").unwrap();
        harness.blob.put_blob(&url, content.as_bytes());

        // First run the whole file, capturing the final checkpoint.
        let def = definition(&url, content.len() as u64);
        let value = harness
            .job
            .execute(context(&harness, &def, None))
            .await
            .unwrap();
        let first: ImportProcessingJobResult = serde_json::from_value(value).unwrap();
        assert_eq!(first.succeeded, 6);

        // Simulate a crash-after-checkpoint-3: rebuild a checkpoint as
        // the importer would have reported it after line 3, then run a
        // fresh attempt from it.
        let line_len = (content.len() / 6) as u64;
        let checkpoint = ImportProcessingJobResult {
            succeeded: 3,
            failed: 0,
            current_index: 3,
            current_offset: 3 * line_len - 1,
            error_log_url: None,
            resource_type: None,
        };
        let value = harness
            .job
            .execute(context(&harness, &def, Some(&checkpoint)))
            .await
            .unwrap();
        let resumed: ImportProcessingJobResult = serde_json::from_value(value).unwrap();

        // Lines 4-6 replay as duplicates (already merged by the first
        // run), lines 1-3 are never re-read.
        assert_eq!(resumed.current_index, 6);
        assert_eq!(resumed.succeeded + resumed.failed, 6);
        assert_eq!(harness.store.resource_count(), 6);
        // Checkpoint persisted through the queue during the run.
        let persisted = harness.queue.get("proc-1").await.unwrap();
        assert!(persisted.is_none() || persisted.unwrap().progress.is_some());
    }
}
