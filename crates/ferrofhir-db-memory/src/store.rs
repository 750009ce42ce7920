//! In-memory bulk write store with failure injection for tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use ferrofhir_core::ResourceKey;
use ferrofhir_storage::{
    BulkWriteStore, IndexCategory, IndexRow, StagedResource, StorageError,
};
use tracing::debug;

/// Bulk write store keeping merged resources and index rows in
/// concurrent maps.
///
/// Merge is insert-if-absent on the natural key, which gives the same
/// replay-safety the production backend provides. Tests can inject
/// failures: a poisoned key makes the merge call carrying it fail
/// fatally, and a transient-failure budget makes the next N bulk
/// copies return a retriable error.
#[derive(Default)]
pub struct InMemoryBulkWriteStore {
    resources: DashMap<ResourceKey, StagedResource>,
    tables: DashMap<IndexCategory, Vec<IndexRow>>,
    poisoned: Mutex<Option<ResourceKey>>,
    transient_copy_failures: AtomicU32,
    prepare_calls: AtomicU64,
    finalize_calls: AtomicU64,
    remove_duplicates_calls: AtomicU64,
}

impl InMemoryBulkWriteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of durably merged resources.
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.resources.contains_key(key)
    }

    /// Rows bulk-copied into one category table so far.
    pub fn rows(&self, category: IndexCategory) -> Vec<IndexRow> {
        self.tables
            .get(&category)
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    pub fn prepare_calls(&self) -> u64 {
        self.prepare_calls.load(Ordering::SeqCst)
    }

    pub fn finalize_calls(&self) -> u64 {
        self.finalize_calls.load(Ordering::SeqCst)
    }

    pub fn remove_duplicates_calls(&self) -> u64 {
        self.remove_duplicates_calls.load(Ordering::SeqCst)
    }

    /// Makes any merge call containing `key` fail with a fatal error.
    pub fn poison_key(&self, key: &ResourceKey) {
        if let Ok(mut poisoned) = self.poisoned.lock() {
            *poisoned = Some(key.clone());
        }
    }

    /// Makes the next `count` bulk copies fail with a transient error.
    pub fn fail_next_copies(&self, count: u32) {
        self.transient_copy_failures.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl BulkWriteStore for InMemoryBulkWriteStore {
    async fn bulk_merge_or_noop(
        &self,
        resources: &[StagedResource],
    ) -> Result<Vec<ResourceKey>, StorageError> {
        if let Ok(poisoned) = self.poisoned.lock()
            && let Some(poisoned_key) = poisoned.as_ref()
            && resources.iter().any(|r| &r.key == poisoned_key)
        {
            return Err(StorageError::internal(format!(
                "merge rejected for {poisoned_key}"
            )));
        }

        let mut merged = Vec::new();
        for resource in resources {
            match self.resources.entry(resource.key.clone()) {
                Entry::Occupied(_) => {}
                Entry::Vacant(vacant) => {
                    vacant.insert(resource.clone());
                    merged.push(resource.key.clone());
                }
            }
        }

        debug!(
            input = resources.len(),
            merged = merged.len(),
            "bulk merge completed"
        );
        Ok(merged)
    }

    async fn bulk_copy_rows(
        &self,
        category: IndexCategory,
        rows: Vec<IndexRow>,
    ) -> Result<(), StorageError> {
        let remaining = self.transient_copy_failures.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .transient_copy_failures
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(StorageError::unavailable("injected bulk copy failure"));
        }

        self.tables.entry(category).or_default().extend(rows);
        Ok(())
    }

    async fn prepare_for_bulk_write(&self) -> Result<(), StorageError> {
        self.prepare_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn finalize_bulk_write(&self) -> Result<(), StorageError> {
        self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove_duplicates(&self) -> Result<(), StorageError> {
        self.remove_duplicates_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrofhir_core::ResourceEnvelope;
    use ferrofhir_storage::IndexValue;

    fn staged(id: &str, sequence_id: i64) -> StagedResource {
        let envelope: ResourceEnvelope = serde_json::from_str(&format!(
            r#"{{"resourceType":"Patient","id":"{id}"}}"#
        ))
        .unwrap();
        StagedResource::new(sequence_id, envelope)
    }

    #[tokio::test]
    async fn test_merge_is_idempotent() {
        let store = InMemoryBulkWriteStore::new();

        let merged = store
            .bulk_merge_or_noop(&[staged("p1", 1), staged("p2", 2)])
            .await
            .unwrap();
        assert_eq!(merged.len(), 2);

        // Replaying the same keys merges nothing and stores nothing new.
        let merged = store
            .bulk_merge_or_noop(&[staged("p1", 3)])
            .await
            .unwrap();
        assert!(merged.is_empty());
        assert_eq!(store.resource_count(), 2);
    }

    #[tokio::test]
    async fn test_poisoned_key_fails_whole_call() {
        let store = InMemoryBulkWriteStore::new();
        store.poison_key(&staged("p2", 2).key);

        let result = store
            .bulk_merge_or_noop(&[staged("p1", 1), staged("p2", 2)])
            .await;
        assert!(result.is_err());
        assert_eq!(store.resource_count(), 0);
    }

    #[tokio::test]
    async fn test_transient_copy_failure_budget() {
        let store = InMemoryBulkWriteStore::new();
        store.fail_next_copies(1);

        let row = IndexRow::new(1, "code", IndexValue::Uri("http://x".into()));
        let err = store
            .bulk_copy_rows(IndexCategory::UriSearchParam, vec![row.clone()])
            .await
            .unwrap_err();
        assert!(err.is_transient());

        store
            .bulk_copy_rows(IndexCategory::UriSearchParam, vec![row])
            .await
            .unwrap();
        assert_eq!(store.rows(IndexCategory::UriSearchParam).len(), 1);
    }

    #[tokio::test]
    async fn test_lifecycle_hook_counters() {
        let store = InMemoryBulkWriteStore::new();
        store.prepare_for_bulk_write().await.unwrap();
        store.remove_duplicates().await.unwrap();
        store.finalize_bulk_write().await.unwrap();
        store.finalize_bulk_write().await.unwrap();

        assert_eq!(store.prepare_calls(), 1);
        assert_eq!(store.remove_duplicates_calls(), 1);
        assert_eq!(store.finalize_calls(), 2);
    }
}
