//! Storage abstraction layer for the FerroFHIR server.
//!
//! This crate defines the trait seams between the server and its
//! external collaborators: the transactional storage backend used for
//! bulk writes, the blob store holding newline-delimited input files,
//! the durable error log, and the sequence-id allocator. Backends
//! implement these traits; everything above them (notably the bulk
//! import pipeline) is backend-agnostic.

pub mod blob;
pub mod error;
pub mod error_log;
pub mod traits;
pub mod types;

pub use blob::{BlobStore, BlobStream};
pub use error::{ErrorCategory, StorageError};
pub use error_log::ErrorLogStore;
pub use traits::{BulkWriteStore, SequenceAllocator};
pub use types::{BlobProperties, IndexCategory, IndexRow, IndexValue, StagedResource};
