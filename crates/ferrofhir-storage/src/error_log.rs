//! Durable, offset-addressable error log store.

use async_trait::async_trait;

use crate::error::StorageError;

/// Append-only store for serialized per-record import errors.
///
/// Logs are keyed by name (one per job and input file). Appending is
/// idempotent in the sense required by resumable imports: replaying an
/// already-appended batch after a crash may duplicate lines but never
/// corrupts the log, and every line is self-describing (it carries its
/// own record index and byte offset).
#[async_trait]
pub trait ErrorLogStore: Send + Sync {
    /// Appends serialized error lines to the named log.
    async fn append(&self, log_name: &str, lines: &[String]) -> Result<(), StorageError>;

    /// The caller-facing location of the named log.
    fn location(&self, log_name: &str) -> String;
}
