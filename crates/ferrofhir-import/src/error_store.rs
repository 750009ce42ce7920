//! Per-record error serialization and durable upload.

use std::sync::Arc;

use ferrofhir_storage::{ErrorLogStore, StorageError};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Serializes one record failure into a replayable error-log line.
///
/// Deliberately captures only the index, byte offset, and error text —
/// never the raw input line, which may contain sensitive data.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportErrorSerializer;

impl ImportErrorSerializer {
    pub fn serialize(&self, index: u64, message: &str, offset: u64) -> String {
        json!({
            "index": index,
            "offset": offset,
            "message": message,
        })
        .to_string()
    }
}

/// Uploads serialized error lines to the durable log for one job+file.
#[derive(Clone)]
pub struct ImportErrorRecorder {
    store: Arc<dyn ErrorLogStore>,
    log_name: String,
}

impl ImportErrorRecorder {
    pub fn new(store: Arc<dyn ErrorLogStore>, job_id: &str) -> Self {
        Self {
            store,
            log_name: format!("import-errors-{job_id}.ndjson"),
        }
    }

    /// Appends the lines to the log. Empty uploads are a no-op.
    pub async fn upload(
        &self,
        lines: &[String],
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        if lines.is_empty() {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(StorageError::unavailable("error upload cancelled"));
        }

        self.store.append(&self.log_name, lines).await?;
        info!(log = %self.log_name, lines = lines.len(), "uploaded import error lines");
        Ok(())
    }

    /// The caller-facing location of this job's error log.
    pub fn location(&self) -> String {
        self.store.location(&self.log_name)
    }
}
