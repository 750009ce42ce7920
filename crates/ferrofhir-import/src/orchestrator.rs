//! Supervises one whole import request across its processing jobs.

use std::sync::Arc;

use async_trait::async_trait;
use ferrofhir_core::{FhirDateTime, generate_id};
use ferrofhir_jobs::{
    JobContext, JobDefinition, JobError, JobExecutor, JobInfo, JobQueue, JobStatus,
};
use ferrofhir_storage::{BlobStore, BulkWriteStore, SequenceAllocator};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ImportConfig;
use crate::definitions::{
    IMPORT_ORCHESTRATOR_JOB, IMPORT_PROCESSING_JOB, ImportOrchestratorJobDefinition,
    ImportProcessingJobDefinition, ImportProcessingJobResult, OrchestratorProgress,
    OrchestratorStage,
};
use crate::error::ImportError;

/// Per-input success row of the final result payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOperationOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    pub count: u64,
    pub input_url: String,
}

/// Per-input error row of the final result payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportFailedOperationOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    pub count: u64,
    pub input_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_log_url: Option<String>,
}

/// The orchestration's final result payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJobResult {
    pub request: String,
    pub transaction_time: FhirDateTime,
    pub output: Vec<ImportOperationOutcome>,
    pub error: Vec<ImportFailedOperationOutcome>,
}

/// Structured failure body reported to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJobErrorResult {
    pub http_status_code: u16,
    pub message: String,
}

/// Drives the explicit stage machine of one import request:
///
/// `Initialized → InputsValidated → PreprocessCompleted →
/// ProcessingJobsGenerated → ProcessingJobsCompleted →
/// PostprocessCompleted`
///
/// Progress is persisted after every transition, so a restarted
/// orchestrator resumes at the last completed stage — including
/// re-attaching to processing jobs it already submitted — instead of
/// starting over.
pub struct ImportOrchestratorJob {
    blob: Arc<dyn BlobStore>,
    store: Arc<dyn BulkWriteStore>,
    sequence: Arc<dyn SequenceAllocator>,
    config: ImportConfig,
}

type Outcomes = (Vec<ImportOperationOutcome>, Vec<ImportFailedOperationOutcome>);

impl ImportOrchestratorJob {
    pub fn new(
        blob: Arc<dyn BlobStore>,
        store: Arc<dyn BulkWriteStore>,
        sequence: Arc<dyn SequenceAllocator>,
        config: ImportConfig,
    ) -> Self {
        Self {
            blob,
            store,
            sequence,
            config,
        }
    }

    async fn run_stages(
        &self,
        ctx: &JobContext,
        definition: &ImportOrchestratorJobDefinition,
        progress: &mut OrchestratorProgress,
    ) -> Result<ImportJobResult, ImportError> {
        let cancel = &ctx.cancel;

        if progress.stage == OrchestratorStage::Initialized {
            self.validate_inputs(definition, cancel).await?;
            progress.stage = OrchestratorStage::InputsValidated;
            self.save_progress(ctx, progress).await?;
            info!("input resources validated");
        }

        if progress.stage == OrchestratorStage::InputsValidated {
            // A throughput optimization only: a failed preprocess is
            // logged and the import carries on against live indexes.
            if let Err(err) = self.store.prepare_for_bulk_write().await {
                warn!(error = %err, "prepare for bulk write failed, continuing");
            }
            progress.stage = OrchestratorStage::PreprocessCompleted;
            self.save_progress(ctx, progress).await?;
            info!("preprocess completed");
        }

        if progress.stage == OrchestratorStage::PreprocessCompleted {
            progress.processing_jobs = self.generate_processing_jobs(definition, cancel).await?;
            progress.stage = OrchestratorStage::ProcessingJobsGenerated;
            self.save_progress(ctx, progress).await?;
            info!(
                jobs = progress.processing_jobs.len(),
                "processing job definitions generated"
            );
        }

        let mut outcomes: Option<Outcomes> = None;
        if progress.stage == OrchestratorStage::ProcessingJobsGenerated {
            outcomes = Some(self.run_processing_jobs(ctx, definition, progress).await?);
            progress.stage = OrchestratorStage::ProcessingJobsCompleted;
            self.save_progress(ctx, progress).await?;
            info!("processing jobs completed");
        }

        if progress.stage == OrchestratorStage::ProcessingJobsCompleted {
            self.store.remove_duplicates().await?;
            self.store.finalize_bulk_write().await?;
            progress.stage = OrchestratorStage::PostprocessCompleted;
            self.save_progress(ctx, progress).await?;
            info!("postprocess completed");
        }

        // A restart that lands past ProcessingJobsGenerated re-derives
        // the aggregation from the (all terminal) children.
        let (output, error) = match outcomes {
            Some(outcomes) => outcomes,
            None => self.collect_outcomes(ctx, progress).await?,
        };

        Ok(ImportJobResult {
            request: definition.request_uri.to_string(),
            transaction_time: FhirDateTime::new(ctx.job.created_at),
            output,
            error,
        })
    }

    /// Fails the whole orchestration when a declared etag no longer
    /// matches the file — the file changed after the request was
    /// accepted.
    async fn validate_inputs(
        &self,
        definition: &ImportOrchestratorJobDefinition,
        cancel: &CancellationToken,
    ) -> Result<(), ImportError> {
        for input in &definition.inputs {
            if cancel.is_cancelled() {
                return Err(ImportError::Cancelled);
            }

            let properties = self
                .blob
                .get_properties(&input.url)
                .await
                .map_err(|source| ImportError::blob_access(input.url.as_str(), source))?;

            if let Some(expected) = &input.etag
                && properties.etag.as_deref() != Some(expected.as_str())
            {
                return Err(ImportError::etag_mismatch(input.url.as_str()));
            }
        }
        Ok(())
    }

    /// Reserves a disjoint sequence-id range per input and emits one
    /// processing-job definition each, in submission order.
    async fn generate_processing_jobs(
        &self,
        definition: &ImportOrchestratorJobDefinition,
        cancel: &CancellationToken,
    ) -> Result<IndexMap<String, ImportProcessingJobDefinition>, ImportError> {
        let mut jobs = IndexMap::new();

        for input in &definition.inputs {
            if cancel.is_cancelled() {
                return Err(ImportError::Cancelled);
            }

            let properties = self
                .blob
                .get_properties(&input.url)
                .await
                .map_err(|source| ImportError::blob_access(input.url.as_str(), source))?;

            let estimated = self.estimate_resource_count(properties.length);
            let begin_sequence_id = self.sequence.next(estimated).await?;

            jobs.insert(
                input.url.to_string(),
                ImportProcessingJobDefinition {
                    job_id: generate_id(),
                    resource_location: input.url.clone(),
                    resource_type: input.resource_type.clone(),
                    offset: 0,
                    bytes_to_read: properties.length,
                    begin_sequence_id,
                    end_sequence_id: begin_sequence_id + estimated,
                    import_mode: definition.import_mode,
                },
            );
        }

        Ok(jobs)
    }

    fn estimate_resource_count(&self, blob_length: u64) -> i64 {
        let estimated = (blob_length / self.config.resource_size_estimate_bytes) as i64 + 1;
        estimated.max(self.config.min_estimated_resources)
    }

    /// Submits processing jobs up to the concurrency limit and polls
    /// until every one of them completes.
    async fn run_processing_jobs(
        &self,
        ctx: &JobContext,
        definition: &ImportOrchestratorJobDefinition,
        progress: &mut OrchestratorProgress,
    ) -> Result<Outcomes, ImportError> {
        let cancel = &ctx.cancel;
        let mut output = Vec::new();
        let mut error = Vec::new();
        let mut running: Vec<(String, String)> = Vec::new();

        let jobs: Vec<(String, ImportProcessingJobDefinition)> = progress
            .processing_jobs
            .iter()
            .map(|(url, def)| (url.clone(), def.clone()))
            .collect();

        for (url, processing_definition) in jobs {
            if cancel.is_cancelled() {
                return Err(ImportError::Cancelled);
            }

            while running.len() >= definition.max_concurrent_processing_jobs {
                let completed = self.poll_running(ctx, &mut running).await?;
                if completed.is_empty() {
                    self.sleep_poll(cancel).await?;
                } else {
                    self.absorb_completed(completed, &mut output, &mut error)?;
                    self.save_progress(ctx, progress).await?;
                }
            }

            // Re-attach when the job already exists (orchestrator
            // restart); enqueue otherwise.
            let info = match ctx.queue.get(&processing_definition.job_id).await? {
                Some(info) => info,
                None => {
                    let job_definition = JobDefinition::new(
                        definition.processing_queue_id.clone(),
                        IMPORT_PROCESSING_JOB,
                        serde_json::to_value(&processing_definition)?,
                    )
                    .with_job_id(&processing_definition.job_id)
                    .with_max_retry_count(self.config.processing_job_max_retries);
                    ctx.queue.enqueue(job_definition).await?
                }
            };

            if info.status.is_terminal() {
                self.absorb_completed(vec![(url, info)], &mut output, &mut error)?;
            } else {
                running.push((url, processing_definition.job_id.clone()));
            }
        }

        while !running.is_empty() {
            let completed = self.poll_running(ctx, &mut running).await?;
            if completed.is_empty() {
                self.sleep_poll(cancel).await?;
            } else {
                self.absorb_completed(completed, &mut output, &mut error)?;
                self.save_progress(ctx, progress).await?;
            }
        }

        Ok((output, error))
    }

    /// One poll tick: refresh every running job, move the terminal ones
    /// out of the running set.
    async fn poll_running(
        &self,
        ctx: &JobContext,
        running: &mut Vec<(String, String)>,
    ) -> Result<Vec<(String, JobInfo)>, ImportError> {
        let cancel = &ctx.cancel;
        let mut completed = Vec::new();

        for (url, job_id) in running.iter() {
            if cancel.is_cancelled() {
                return Err(ImportError::Cancelled);
            }

            let info = ctx
                .queue
                .get(job_id)
                .await?
                .ok_or_else(|| {
                    ImportError::internal(format!("processing job {job_id} disappeared from queue"))
                })?;

            if info.status.is_terminal() {
                completed.push((url.clone(), info));
            }
        }

        running.retain(|(url, _)| !completed.iter().any(|(done, _)| done == url));
        Ok(completed)
    }

    /// Folds terminal processing jobs into the aggregate result.
    ///
    /// A `Failed` child is fatal to the orchestration; a `Cancelled`
    /// child propagates as orchestration cancellation; a `Completed`
    /// child with record-level failures is success-with-errors.
    fn absorb_completed(
        &self,
        completed: Vec<(String, JobInfo)>,
        output: &mut Vec<ImportOperationOutcome>,
        error: &mut Vec<ImportFailedOperationOutcome>,
    ) -> Result<(), ImportError> {
        for (url, info) in completed {
            match info.status {
                JobStatus::Completed => {
                    let result: ImportProcessingJobResult = match &info.result {
                        Some(value) => serde_json::from_value(value.clone())?,
                        None => ImportProcessingJobResult::default(),
                    };

                    output.push(ImportOperationOutcome {
                        resource_type: result.resource_type.clone(),
                        count: result.succeeded,
                        input_url: url.clone(),
                    });
                    if result.failed > 0 {
                        error.push(ImportFailedOperationOutcome {
                            resource_type: result.resource_type,
                            count: result.failed,
                            input_url: url,
                            error_log_url: result.error_log_url,
                        });
                    }
                }
                JobStatus::Failed => {
                    let message = info
                        .result
                        .as_ref()
                        .map(Value::to_string)
                        .unwrap_or_else(|| "unknown processing failure".to_string());
                    return Err(ImportError::processing_failed(url, message));
                }
                JobStatus::Cancelled => return Err(ImportError::Cancelled),
                JobStatus::Created | JobStatus::Running => {
                    return Err(ImportError::internal(format!(
                        "processing job for {url} reported non-terminal status"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Re-derives the aggregation after a restart that resumed past the
    /// supervision stage: by then every child must be terminal.
    async fn collect_outcomes(
        &self,
        ctx: &JobContext,
        progress: &OrchestratorProgress,
    ) -> Result<Outcomes, ImportError> {
        let cancel = &ctx.cancel;
        let mut output = Vec::new();
        let mut error = Vec::new();

        for (url, processing_definition) in &progress.processing_jobs {
            if cancel.is_cancelled() {
                return Err(ImportError::Cancelled);
            }

            let info = ctx
                .queue
                .get(&processing_definition.job_id)
                .await?
                .ok_or_else(|| {
                    ImportError::internal(format!(
                        "processing job {} disappeared from queue",
                        processing_definition.job_id
                    ))
                })?;
            self.absorb_completed(vec![(url.clone(), info)], &mut output, &mut error)?;
        }

        Ok((output, error))
    }

    async fn sleep_poll(&self, cancel: &CancellationToken) -> Result<(), ImportError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(ImportError::Cancelled),
            _ = tokio::time::sleep(self.config.poll_interval()) => Ok(()),
        }
    }

    async fn save_progress(
        &self,
        ctx: &JobContext,
        progress: &OrchestratorProgress,
    ) -> Result<(), ImportError> {
        ctx.report_progress(progress).await?;
        Ok(())
    }

    /// Compensating cleanup after cancellation: cancel every submitted
    /// processing job, wait (bounded) for each to reach a terminal
    /// status, then still finalize the storage backend.
    async fn cleanup_after_cancellation(&self, ctx: &JobContext, progress: &OrchestratorProgress) {
        let mut pending: Vec<&ImportProcessingJobDefinition> =
            progress.processing_jobs.values().collect();

        for processing_definition in &pending {
            if let Err(err) = ctx.queue.cancel(&processing_definition.job_id).await {
                warn!(
                    job_id = %processing_definition.job_id,
                    error = %err,
                    "failed to request cancellation of processing job"
                );
            }
        }

        let deadline = tokio::time::Instant::now() + self.config.cancel_drain_timeout();
        while !pending.is_empty() && tokio::time::Instant::now() < deadline {
            let mut still_pending = Vec::new();
            for processing_definition in pending {
                match ctx.queue.get(&processing_definition.job_id).await {
                    Ok(Some(info)) if !info.status.is_terminal() => {
                        still_pending.push(processing_definition);
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(
                            job_id = %processing_definition.job_id,
                            error = %err,
                            "failed to poll cancelled processing job"
                        );
                        still_pending.push(processing_definition);
                    }
                }
            }
            pending = still_pending;
            if !pending.is_empty() {
                tokio::time::sleep(self.config.poll_interval()).await;
            }
        }

        // The backend must be left consistent even on a cancelled run.
        if let Err(err) = self.store.remove_duplicates().await {
            warn!(error = %err, "failed to remove duplicates after cancellation");
        }
        if let Err(err) = self.store.finalize_bulk_write().await {
            warn!(error = %err, "failed to finalize bulk write after cancellation");
        }
    }
}

#[async_trait]
impl JobExecutor for ImportOrchestratorJob {
    fn type_tag(&self) -> &'static str {
        IMPORT_ORCHESTRATOR_JOB
    }

    async fn execute(&self, ctx: JobContext) -> Result<Value, JobError> {
        let definition: ImportOrchestratorJobDefinition = ctx.payload()?;
        let mut progress: OrchestratorProgress = ctx.checkpoint()?.unwrap_or_default();

        info!(
            request = %definition.request_uri,
            inputs = definition.inputs.len(),
            stage = ?progress.stage,
            "starting import orchestration"
        );

        match self.run_stages(&ctx, &definition, &mut progress).await {
            Ok(result) => Ok(serde_json::to_value(&result)?),
            Err(ImportError::Cancelled) => {
                warn!("import orchestration cancelled, cleaning up processing jobs");
                self.cleanup_after_cancellation(&ctx, &progress).await;
                Err(JobError::cancelled("import orchestration cancelled"))
            }
            Err(err) if err.is_precondition_failure() => {
                error!(error = %err, "import orchestration failed");
                let body = ImportJobErrorResult {
                    http_status_code: err.status_code(),
                    message: err.to_string(),
                };
                Err(JobError::failed_with_result(
                    err.to_string(),
                    serde_json::to_value(body)?,
                ))
            }
            Err(err) => {
                // Unexpected failure: retriable, so a replacement
                // orchestrator resumes from the persisted stage.
                error!(error = %err, "import orchestration hit an internal failure");
                Err(JobError::retriable(err.to_string()))
            }
        }
    }
}
