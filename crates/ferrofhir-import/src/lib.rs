//! Bulk resource import pipeline.
//!
//! Ingests very large newline-delimited resource files from a blob
//! store into the transactional storage backend, with resumable
//! checkpoints, bounded memory, per-record error isolation, and safe
//! cancellation.
//!
//! The pipeline is layered leaf-to-root:
//!
//! - [`loader::ResourceLoader`] streams one file from a byte offset and
//!   publishes parsed-or-failed records on a bounded channel.
//! - [`importer::BulkImporter`] consumes that channel, merges batches
//!   into the storage backend, fans out per-category index rows, and
//!   emits progress checkpoints.
//! - [`processing::ImportProcessingJob`] wraps one loader + importer
//!   pair as a unit of queue-executable work owning one file's
//!   checkpoint.
//! - [`orchestrator::ImportOrchestratorJob`] plans sequence-id ranges,
//!   supervises processing jobs up to a concurrency limit, and drives
//!   the multi-stage progress state machine.

pub mod config;
pub mod definitions;
pub mod error;
pub mod error_store;
pub mod importer;
pub mod index;
pub mod loader;
pub mod orchestrator;
pub mod parser;
pub mod processing;
pub mod record;

pub use config::ImportConfig;
pub use definitions::{
    IMPORT_ORCHESTRATOR_JOB, IMPORT_PROCESSING_JOB, ImportInput, ImportMode,
    ImportOrchestratorJobDefinition, ImportProcessingJobDefinition, ImportProcessingJobResult,
    OrchestratorProgress, OrchestratorStage,
};
pub use error::ImportError;
pub use error_store::{ImportErrorRecorder, ImportErrorSerializer};
pub use importer::BulkImporter;
pub use loader::{LoadRequest, ResourceLoader};
pub use orchestrator::{
    ImportFailedOperationOutcome, ImportJobErrorResult, ImportJobResult, ImportOperationOutcome,
    ImportOrchestratorJob,
};
pub use parser::ImportResourceParser;
pub use processing::ImportProcessingJob;
pub use record::{ImportProgress, ImportRecord, RecordPayload};
