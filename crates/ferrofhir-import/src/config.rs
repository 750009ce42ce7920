//! Configuration for the bulk import pipeline.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning knobs for the import pipeline.
///
/// The defaults match the sizes the pipeline was tested at; all of them
/// trade peak memory against round trips, none affect correctness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportConfig {
    /// Lines accumulated by the loader before handing a batch to the
    /// parser.
    pub max_batch_size: usize,

    /// Capacity of the bounded loader → importer channel. The loader
    /// blocks when the importer falls behind.
    pub channel_capacity: usize,

    /// Records buffered by the importer before one storage round trip.
    pub storage_batch_size: usize,

    /// Concurrent index-row generator tasks per batch.
    pub max_index_concurrency: usize,

    /// Attempts for one index-table bulk copy before the failure is
    /// fatal to the processing job.
    pub max_retries: u32,

    /// Base delay between bulk-copy retries; attempt `n` waits
    /// `retry_delay_ms * (n - 1)`.
    pub retry_delay_ms: u64,

    /// Fixed delay between orchestrator status polls.
    pub poll_interval_ms: u64,

    /// How long a cancelled orchestration waits for its processing jobs
    /// to reach a terminal status before giving up on them.
    pub cancel_drain_timeout_ms: u64,

    /// Assumed average serialized resource size, used to estimate the
    /// record count of an input file from its byte length.
    pub resource_size_estimate_bytes: u64,

    /// Floor for the estimated record count of one input file.
    pub min_estimated_resources: i64,

    /// Retry budget given to each processing job on the queue.
    pub processing_job_max_retries: u32,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 1000,
            channel_capacity: 500,
            storage_batch_size: 2000,
            max_index_concurrency: 4,
            max_retries: 10,
            retry_delay_ms: 5000,
            poll_interval_ms: 3000,
            cancel_drain_timeout_ms: 60_000,
            resource_size_estimate_bytes: 64,
            min_estimated_resources: 10_000,
            processing_job_max_retries: 5,
        }
    }
}

impl ImportConfig {
    #[must_use]
    pub fn with_storage_batch_size(mut self, size: usize) -> Self {
        self.storage_batch_size = size;
        self
    }

    #[must_use]
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_poll_interval_ms(mut self, millis: u64) -> Self {
        self.poll_interval_ms = millis;
        self
    }

    #[must_use]
    pub fn with_retry_delay_ms(mut self, millis: u64) -> Self {
        self.retry_delay_ms = millis;
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub fn with_min_estimated_resources(mut self, floor: i64) -> Self {
        self.min_estimated_resources = floor;
        self
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cancel_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_drain_timeout_ms)
    }
}
