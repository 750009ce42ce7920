//! Job definitions, checkpoints, and the orchestrator stage machine.
//!
//! Everything in this module is persisted through the job queue and
//! must deserialize identically across process restarts — fields are
//! stable, camelCase, and additive-only.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;

/// Type tag the orchestrator job is registered under.
pub const IMPORT_ORCHESTRATOR_JOB: &str = "import-orchestrator";
/// Type tag the per-file processing job is registered under.
pub const IMPORT_PROCESSING_JOB: &str = "import-processing";

/// How incoming records relate to data already in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ImportMode {
    /// The store is empty (or being seeded); payload versions are
    /// discarded and the server assigns fresh ones.
    #[default]
    InitialLoad,
    /// The store already has data; payload-supplied versions and
    /// timestamps are preserved.
    IncrementalLoad,
}

/// One source file reference in an import request. Immutable once the
/// orchestrator has validated it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportInput {
    pub url: Url,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    /// Optimistic-concurrency tag; when present, the orchestration
    /// fails if the file changed since the request was accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl ImportInput {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            resource_type: None,
            etag: None,
        }
    }

    #[must_use]
    pub fn with_resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    #[must_use]
    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }
}

/// The whole import request, as handed to the orchestrator job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOrchestratorJobDefinition {
    pub request_uri: Url,
    pub base_uri: Url,
    pub inputs: Vec<ImportInput>,
    pub import_mode: ImportMode,
    pub max_concurrent_processing_jobs: usize,
    /// Queue the processing jobs are submitted to.
    pub processing_queue_id: String,
}

/// The contract handed to one processing job: one input file, one byte
/// slice, one reserved sequence-id range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProcessingJobDefinition {
    pub job_id: String,
    pub resource_location: Url,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    /// Start of the byte slice assigned to this job.
    pub offset: u64,
    /// Length of the byte slice assigned to this job.
    pub bytes_to_read: u64,
    /// First id of the reserved range.
    pub begin_sequence_id: i64,
    /// One past the last id of the reserved range.
    pub end_sequence_id: i64,
    pub import_mode: ImportMode,
}

/// A processing job's checkpoint: the only state a restarted attempt
/// needs.
///
/// `current_index` is the 1-based index of the last line known to be
/// durably merged (with its errors durably uploaded); `current_offset`
/// is the byte offset of that line's *final* byte — a position inside
/// an already-consumed line, never at the start of an unread one.
/// Resuming the loader there re-reads only the tail of the consumed
/// line, which the skip-first-line rule discards, so no line is lost
/// or merged twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImportProcessingJobResult {
    pub succeeded: u64,
    pub failed: u64,
    pub current_index: u64,
    pub current_offset: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_log_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
}

/// Stages of the orchestrator state machine. Serialized names are part
/// of the persisted format and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OrchestratorStage {
    #[default]
    Initialized,
    InputsValidated,
    PreprocessCompleted,
    ProcessingJobsGenerated,
    ProcessingJobsCompleted,
    PostprocessCompleted,
}

/// The orchestrator's persisted progress: the last completed stage plus
/// the processing-job definitions generated for each input, in
/// submission order.
///
/// Persisting the definitions (not just ids) is what lets a restarted
/// orchestrator re-attach to its children without re-reserving
/// sequence ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorProgress {
    pub stage: OrchestratorStage,
    pub processing_jobs: IndexMap<String, ImportProcessingJobDefinition>,
}
