//! Bulk-write traits implemented by every storage backend.

use async_trait::async_trait;
use ferrofhir_core::ResourceKey;

use crate::error::StorageError;
use crate::types::{IndexCategory, IndexRow, StagedResource};

/// The bulk-write surface of a storage backend.
///
/// All operations are idempotent by contract: replaying a batch after a
/// crash must never produce a second copy of a resource or a fatal
/// error. That property — not locking — is what makes resumed imports
/// safe.
#[async_trait]
pub trait BulkWriteStore: Send + Sync {
    /// Inserts every resource whose natural key is absent; resources
    /// whose key is already stored are left untouched.
    ///
    /// Returns the keys that were actually merged. The caller derives
    /// the duplicate set as `input \ merged`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` for transient backend
    /// conditions; any other error is fatal for the calling job.
    async fn bulk_merge_or_noop(
        &self,
        resources: &[StagedResource],
    ) -> Result<Vec<ResourceKey>, StorageError>;

    /// Bulk-copies generated rows into one per-category index table.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` for transient conditions,
    /// which the importer retries with backoff.
    async fn bulk_copy_rows(
        &self,
        category: IndexCategory,
        rows: Vec<IndexRow>,
    ) -> Result<(), StorageError>;

    /// Prepares the backend for a bulk write (e.g. disables secondary
    /// indexes). A throughput optimization, not correctness-critical.
    async fn prepare_for_bulk_write(&self) -> Result<(), StorageError>;

    /// Finalizes a bulk write (e.g. rebuilds secondary indexes). Must be
    /// invoked even after a cancelled run so the backend is left
    /// consistent.
    async fn finalize_bulk_write(&self) -> Result<(), StorageError>;

    /// Removes duplicate-merge artifacts left behind by concurrent
    /// processing jobs.
    async fn remove_duplicates(&self) -> Result<(), StorageError>;
}

/// Issues globally-ordered, non-overlapping sequence-id ranges.
///
/// The cursor only moves forward, and must be derived from durable
/// state so monotonicity survives orchestrator restarts.
#[async_trait]
pub trait SequenceAllocator: Send + Sync {
    /// Reserves `count` ids and returns the first. The caller owns
    /// `[begin, begin + count)` exclusively.
    async fn next(&self, count: i64) -> Result<i64, StorageError>;
}

// Ensure traits are object-safe by using them as trait objects
#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_bulk_write_store_object_safe(_: &dyn BulkWriteStore) {}

    fn _assert_sequence_allocator_object_safe(_: &dyn SequenceAllocator) {}
}
