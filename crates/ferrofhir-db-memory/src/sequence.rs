//! In-memory sequence allocator.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use ferrofhir_storage::{SequenceAllocator, StorageError};

/// Forward-only sequence cursor. The production allocator derives its
/// cursor from durable storage; this one starts where the test tells
/// it to.
pub struct InMemorySequenceAllocator {
    cursor: AtomicI64,
}

impl InMemorySequenceAllocator {
    pub fn new(start: i64) -> Self {
        Self {
            cursor: AtomicI64::new(start),
        }
    }

    /// The next id that would be handed out.
    pub fn current(&self) -> i64 {
        self.cursor.load(Ordering::SeqCst)
    }
}

impl Default for InMemorySequenceAllocator {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
impl SequenceAllocator for InMemorySequenceAllocator {
    async fn next(&self, count: i64) -> Result<i64, StorageError> {
        if count <= 0 {
            return Err(StorageError::invalid_data(format!(
                "sequence reservation must be positive, got {count}"
            )));
        }
        Ok(self.cursor.fetch_add(count, Ordering::SeqCst))
    }
}
