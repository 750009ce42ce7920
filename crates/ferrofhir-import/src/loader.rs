//! Streams one input file from a byte offset into import records.

use std::sync::Arc;

use ferrofhir_core::generate_id;
use ferrofhir_storage::BlobStore;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use crate::config::ImportConfig;
use crate::definitions::ImportMode;
use crate::error::ImportError;
use crate::parser::ImportResourceParser;
use crate::record::ImportRecord;

/// The slice of one input file assigned to one load.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub location: Url,
    /// Absolute byte offset the read starts at.
    pub offset: u64,
    /// Byte budget of this slice. The line that crosses the budget
    /// boundary is still read and emitted; the next slice discards it
    /// as its skipped first line.
    pub bytes_to_read: u64,
    /// Declared resource type; a mismatching record is a per-record
    /// failure.
    pub resource_type: Option<String>,
    /// First id of the sequence range reserved for this file; record
    /// `index` maps to sequence id `begin_sequence_id + index`.
    pub begin_sequence_id: i64,
    /// Index of the last record already consumed by a prior attempt;
    /// zero on a fresh read. Emitted indexes continue from here.
    pub index_base: u64,
    pub import_mode: ImportMode,
}

/// Streams a file from the blob store, splits it into lines, parses
/// each line independently, and publishes records on a bounded channel.
///
/// The channel is closed exactly once on every exit path — success,
/// error, or cancellation — and an acquired lease is always released.
pub struct ResourceLoader {
    blob: Arc<dyn BlobStore>,
    parser: ImportResourceParser,
    max_batch_size: usize,
    channel_capacity: usize,
}

struct RawLine {
    bytes: Vec<u8>,
    index: u64,
    offset: u64,
    length: u64,
}

impl ResourceLoader {
    pub fn new(blob: Arc<dyn BlobStore>, parser: ImportResourceParser, config: &ImportConfig) -> Self {
        Self {
            blob,
            parser,
            max_batch_size: config.max_batch_size,
            channel_capacity: config.channel_capacity,
        }
    }

    /// Starts loading in the background. Returns the record channel and
    /// the handle resolving to the load outcome.
    pub fn load(
        &self,
        request: LoadRequest,
        cancel: CancellationToken,
    ) -> (mpsc::Receiver<ImportRecord>, JoinHandle<Result<(), ImportError>>) {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let blob = Arc::clone(&self.blob);
        let parser = self.parser;
        let max_batch_size = self.max_batch_size;

        let handle = tokio::spawn(async move {
            // Advisory lease: failure to acquire is not fatal, the
            // backend may simply not support leasing.
            let owner_id = generate_id();
            let lease_id = match blob.try_acquire_lease(&request.location, &owner_id).await {
                Ok(lease_id) => lease_id,
                Err(err) => {
                    warn!(location = %request.location, error = %err, "failed to acquire blob lease, loading without one");
                    None
                }
            };

            let outcome =
                Self::read_records(&*blob, &parser, &request, max_batch_size, tx, &cancel).await;

            if let Some(lease_id) = lease_id
                && let Err(err) = blob.try_release_lease(&request.location, &lease_id).await
            {
                warn!(location = %request.location, error = %err, "failed to release blob lease");
            }

            outcome
        });

        (rx, handle)
    }

    async fn read_records(
        blob: &dyn BlobStore,
        parser: &ImportResourceParser,
        request: &LoadRequest,
        max_batch_size: usize,
        tx: mpsc::Sender<ImportRecord>,
        cancel: &CancellationToken,
    ) -> Result<(), ImportError> {
        info!(
            location = %request.location,
            offset = request.offset,
            bytes_to_read = request.bytes_to_read,
            "start loading resources from blob store"
        );

        let stream = blob
            .open_byte_range(&request.location, request.offset)
            .await
            .map_err(|source| ImportError::blob_access(request.location.as_str(), source))?;

        let mut reader = BufReader::new(stream);
        let mut bytes_read: u64 = 0;
        let mut index = request.index_base;
        let mut line_start = request.offset;
        // Resuming mid-file: the offset points into a line a prior
        // attempt already consumed in full. Discard it, but count its
        // bytes, so line boundaries match a from-scratch read exactly.
        let mut skip_first_line = request.offset > 0;
        let mut batch: Vec<RawLine> = Vec::new();
        let mut buf: Vec<u8> = Vec::new();

        while bytes_read <= request.bytes_to_read {
            if cancel.is_cancelled() {
                return Err(ImportError::Cancelled);
            }

            buf.clear();
            let n = reader.read_until(b'\n', &mut buf).await?;
            if n == 0 {
                break;
            }

            // Handles \n and \r\n line ends. Bare \r is not supported.
            let terminator_len = if buf.ends_with(b"\r\n") {
                2
            } else if buf.ends_with(b"\n") {
                1
            } else {
                0
            };

            let offset = line_start;
            let length = n as u64;
            line_start += length;
            bytes_read += length;

            if skip_first_line {
                skip_first_line = false;
                continue;
            }

            let content = &buf[..n - terminator_len];
            if content.is_empty() {
                continue;
            }

            index += 1;
            batch.push(RawLine {
                bytes: content.to_vec(),
                index,
                offset,
                length,
            });

            if batch.len() >= max_batch_size {
                Self::publish_batch(parser, request, &mut batch, &tx, cancel).await?;
            }
        }

        Self::publish_batch(parser, request, &mut batch, &tx, cancel).await?;

        info!(lines = index - request.index_base, "resource load complete");
        Ok(())
    }

    async fn publish_batch(
        parser: &ImportResourceParser,
        request: &LoadRequest,
        batch: &mut Vec<RawLine>,
        tx: &mpsc::Sender<ImportRecord>,
        cancel: &CancellationToken,
    ) -> Result<(), ImportError> {
        for line in batch.drain(..) {
            let record = Self::parse_line(parser, request, line);
            tokio::select! {
                _ = cancel.cancelled() => return Err(ImportError::Cancelled),
                sent = tx.send(record) => {
                    if sent.is_err() {
                        return Err(ImportError::ChannelClosed);
                    }
                }
            }
        }
        Ok(())
    }

    fn parse_line(
        parser: &ImportResourceParser,
        request: &LoadRequest,
        line: RawLine,
    ) -> ImportRecord {
        let sequence_id = request.begin_sequence_id + line.index as i64;

        let text = match std::str::from_utf8(&line.bytes) {
            Ok(text) => text,
            Err(err) => {
                return ImportRecord::failed(
                    line.index,
                    line.offset,
                    line.length,
                    format!("invalid UTF-8: {err}"),
                );
            }
        };

        match parser.parse(
            text,
            sequence_id,
            request.resource_type.as_deref(),
            request.import_mode,
        ) {
            Ok(resource) => ImportRecord::parsed(line.index, line.offset, line.length, resource),
            Err(err) => {
                // The error text never includes the line itself.
                ImportRecord::failed(line.index, line.offset, line.length, err.to_string())
            }
        }
    }
}
