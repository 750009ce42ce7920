//! Merges loaded records into the storage backend in batches.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ferrofhir_core::ResourceKey;
use ferrofhir_storage::{BulkWriteStore, IndexCategory, IndexRow, StagedResource};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ImportConfig;
use crate::error::ImportError;
use crate::error_store::{ImportErrorRecorder, ImportErrorSerializer};
use crate::index::{RowGenerator, default_generators};
use crate::record::{ImportProgress, ImportRecord, RecordPayload};

/// Consumes the loader's channel and merges records into the storage
/// backend.
///
/// Records are buffered into batches to amortize round trips; each
/// batch is deduplicated by natural key, merged idempotently, fanned
/// out across the per-category index generators, and its error lines
/// uploaded — only then is the checkpoint advanced and emitted on the
/// progress channel. That ordering is what makes the emitted
/// `current_index` a safe resume point.
#[derive(Clone)]
pub struct BulkImporter {
    store: Arc<dyn BulkWriteStore>,
    generators: Arc<Vec<Arc<dyn RowGenerator>>>,
    serializer: ImportErrorSerializer,
    config: ImportConfig,
}

#[derive(Debug, Default, Clone, Copy)]
struct ImportState {
    succeeded: u64,
    failed: u64,
    current_index: u64,
    current_offset: u64,
}

impl ImportState {
    fn progress(&self) -> ImportProgress {
        ImportProgress {
            succeeded: self.succeeded,
            failed: self.failed,
            current_index: self.current_index,
            current_offset: self.current_offset,
        }
    }
}

impl BulkImporter {
    pub fn new(store: Arc<dyn BulkWriteStore>, config: &ImportConfig) -> Self {
        Self {
            store,
            generators: Arc::new(default_generators()),
            serializer: ImportErrorSerializer,
            config: config.clone(),
        }
    }

    /// Replaces the default generator set (used by tests and by
    /// backends with a reduced table set).
    #[must_use]
    pub fn with_generators(mut self, generators: Vec<Arc<dyn RowGenerator>>) -> Self {
        self.generators = Arc::new(generators);
        self
    }

    /// Starts importing in the background. Returns the progress channel
    /// and the handle resolving to the import outcome.
    ///
    /// The progress channel is closed exactly once, on every exit path.
    pub fn import(
        &self,
        input: mpsc::Receiver<ImportRecord>,
        recorder: ImportErrorRecorder,
        cancel: CancellationToken,
    ) -> (
        mpsc::UnboundedReceiver<ImportProgress>,
        JoinHandle<Result<(), ImportError>>,
    ) {
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let importer = self.clone();

        let handle = tokio::spawn(async move {
            let outcome = importer.run(input, &recorder, &progress_tx, &cancel).await;
            if let Err(err) = &outcome {
                warn!(error = %err, "import to storage backend ended with error");
            }
            outcome
        });

        (progress_rx, handle)
    }

    async fn run(
        &self,
        mut input: mpsc::Receiver<ImportRecord>,
        recorder: &ImportErrorRecorder,
        progress_tx: &mpsc::UnboundedSender<ImportProgress>,
        cancel: &CancellationToken,
    ) -> Result<(), ImportError> {
        info!("start importing resources into storage backend");

        let mut state = ImportState::default();
        let mut batch: Vec<ImportRecord> = Vec::with_capacity(self.config.storage_batch_size);

        loop {
            let record = tokio::select! {
                _ = cancel.cancelled() => return Err(ImportError::Cancelled),
                record = input.recv() => record,
            };

            match record {
                Some(record) => {
                    batch.push(record);
                    if batch.len() >= self.config.storage_batch_size {
                        self.commit_batch(&mut batch, &mut state, recorder, progress_tx, cancel)
                            .await?;
                    }
                }
                None => break,
            }
        }

        self.commit_batch(&mut batch, &mut state, recorder, progress_tx, cancel)
            .await?;

        // Final checkpoint, so the caller observes terminal counts even
        // for an empty input.
        let _ = progress_tx.send(state.progress());

        info!(
            succeeded = state.succeeded,
            failed = state.failed,
            "import to storage backend complete"
        );
        Ok(())
    }

    async fn commit_batch(
        &self,
        batch: &mut Vec<ImportRecord>,
        state: &mut ImportState,
        recorder: &ImportErrorRecorder,
        progress_tx: &mpsc::UnboundedSender<ImportProgress>,
        cancel: &CancellationToken,
    ) -> Result<(), ImportError> {
        let records = std::mem::take(batch);
        let Some(last) = records.last() else {
            return Ok(());
        };
        let last_index = last.index;
        // The checkpoint offset points at the final byte of the last
        // handled line: inside a consumed line, never at the start of
        // an unread one, so the resumed loader's skip-first-line rule
        // discards only already-merged content.
        let last_offset = last.offset + last.length.saturating_sub(1);

        let mut error_lines: Vec<String> = Vec::new();
        let mut failed: u64 = 0;
        let mut seen: HashSet<ResourceKey> = HashSet::new();
        let mut candidates: Vec<(StagedResource, u64, u64)> = Vec::new();

        for record in &records {
            match &record.payload {
                RecordPayload::Failed(message) => {
                    error_lines
                        .push(self.serializer.serialize(record.index, message, record.offset));
                    failed += 1;
                }
                RecordPayload::Parsed(resource) => {
                    if seen.insert(resource.key.clone()) {
                        candidates.push((resource.clone(), record.index, record.offset));
                    } else {
                        // Later duplicates in the same batch are
                        // reported, not silently dropped.
                        error_lines.push(self.serializer.serialize(
                            record.index,
                            &format!("failed to import duplicated resource {}", resource.key),
                            record.offset,
                        ));
                        failed += 1;
                    }
                }
            }
        }

        let staged: Vec<StagedResource> = candidates
            .iter()
            .map(|(resource, _, _)| resource.clone())
            .collect();
        let merged_keys: HashSet<ResourceKey> = self
            .store
            .bulk_merge_or_noop(&staged)
            .await?
            .into_iter()
            .collect();

        let mut merged: Vec<StagedResource> = Vec::with_capacity(merged_keys.len());
        for (resource, index, offset) in candidates {
            if merged_keys.contains(&resource.key) {
                merged.push(resource);
            } else {
                // Already durably stored, typically by a prior attempt
                // of this same job. Replay is a no-op plus an error
                // line, never a double write.
                error_lines.push(self.serializer.serialize(
                    index,
                    &format!("failed to import duplicated resource {}", resource.key),
                    offset,
                ));
                failed += 1;
            }
        }

        let succeeded = merged.len() as u64;
        let tables = self.generate_rows(merged).await?;
        for (category, rows) in tables {
            self.bulk_copy_with_retry(category, rows, cancel).await?;
        }

        recorder.upload(&error_lines, cancel).await?;

        state.succeeded += succeeded;
        state.failed += failed;
        state.current_index = last_index;
        state.current_offset = last_offset;
        let _ = progress_tx.send(state.progress());

        debug!(
            batch = records.len(),
            succeeded = state.succeeded,
            failed = state.failed,
            current_index = state.current_index,
            "batch committed"
        );
        Ok(())
    }

    /// Runs every generator over the merged batch with bounded
    /// concurrency and collects the rows per category.
    async fn generate_rows(
        &self,
        merged: Vec<StagedResource>,
    ) -> Result<HashMap<IndexCategory, Vec<IndexRow>>, ImportError> {
        let mut tables: HashMap<IndexCategory, Vec<IndexRow>> = HashMap::new();
        if merged.is_empty() {
            return Ok(tables);
        }

        let merged = Arc::new(merged);
        let semaphore = Arc::new(Semaphore::new(self.config.max_index_concurrency));
        let mut tasks: JoinSet<(IndexCategory, Vec<IndexRow>)> = JoinSet::new();

        for generator in self.generators.iter() {
            let generator = Arc::clone(generator);
            let merged = Arc::clone(&merged);
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|_| ImportError::internal("index generation semaphore closed"))?;

            tasks.spawn(async move {
                let rows: Vec<IndexRow> = merged
                    .iter()
                    .flat_map(|resource| generator.generate(resource))
                    .collect();
                drop(permit);
                (generator.category(), rows)
            });
        }

        while let Some(next) = tasks.join_next().await {
            let (category, rows) = next
                .map_err(|err| ImportError::internal(format!("index generator failed: {err}")))?;
            if !rows.is_empty() {
                tables.entry(category).or_default().extend(rows);
            }
        }

        Ok(tables)
    }

    async fn bulk_copy_with_retry(
        &self,
        category: IndexCategory,
        rows: Vec<IndexRow>,
        cancel: &CancellationToken,
    ) -> Result<(), ImportError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.store.bulk_copy_rows(category, rows.clone()).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_transient() && attempt < self.config.max_retries => {
                    let delay = self.config.retry_delay() * (attempt - 1);
                    warn!(
                        table = %category,
                        attempt,
                        error = %err,
                        "bulk copy failed, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(ImportError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
