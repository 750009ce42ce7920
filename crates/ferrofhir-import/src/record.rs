//! Records and progress values flowing between loader and importer.

use ferrofhir_storage::StagedResource;
use serde::{Deserialize, Serialize};

/// One input line, parsed or failed.
///
/// `offset` is the absolute byte offset of the line's start and
/// `length` covers the line plus its terminator, so the error log can
/// report exact byte ranges without re-scanning the file — and so the
/// importer can checkpoint a byte position the loader can resume from.
#[derive(Debug, Clone)]
pub struct ImportRecord {
    /// 1-based, file-local index of this record.
    pub index: u64,
    pub offset: u64,
    pub length: u64,
    pub payload: RecordPayload,
}

/// A record either parsed into a staged resource or failed with the
/// parse error text. A failed record never reaches the storage
/// backend; it becomes an error-log entry.
#[derive(Debug, Clone)]
pub enum RecordPayload {
    Parsed(StagedResource),
    Failed(String),
}

impl ImportRecord {
    pub fn parsed(index: u64, offset: u64, length: u64, resource: StagedResource) -> Self {
        Self {
            index,
            offset,
            length,
            payload: RecordPayload::Parsed(resource),
        }
    }

    pub fn failed(index: u64, offset: u64, length: u64, message: impl Into<String>) -> Self {
        Self {
            index,
            offset,
            length,
            payload: RecordPayload::Failed(message.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.payload, RecordPayload::Failed(_))
    }
}

/// Importer progress checkpoint, emitted only after the corresponding
/// batch is durably merged and its errors durably uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImportProgress {
    pub succeeded: u64,
    pub failed: u64,
    pub current_index: u64,
    pub current_offset: u64,
}
