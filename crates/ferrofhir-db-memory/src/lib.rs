//! In-memory backends for every collaborator trait: blob store, bulk
//! write store, error log, sequence allocator, and job queue.
//!
//! These implementations back the import pipeline's integration tests
//! and local development; they honor the same contracts the production
//! backends do (idempotent merge, advisory leases, queue re-attach,
//! cooperative cancellation) without any external service.

pub mod blob;
pub mod error_log;
pub mod queue;
pub mod sequence;
pub mod store;

pub use blob::InMemoryBlobStore;
pub use error_log::InMemoryErrorLogStore;
pub use queue::InMemoryJobQueue;
pub use sequence::InMemorySequenceAllocator;
pub use store::InMemoryBulkWriteStore;
