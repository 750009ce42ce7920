//! Generic background-job client surface.
//!
//! The durable job queue itself lives outside this repository; this
//! crate defines what the server needs from it: job definitions tagged
//! with an explicit type discriminator, a [`JobQueue`] client trait for
//! enqueueing / polling / cancelling / checkpointing, and a
//! [`JobRegistry`] that dispatches a tag to the executor implementing
//! that job type.

pub mod error;
pub mod queue;
pub mod registry;
pub mod types;

pub use error::JobError;
pub use queue::JobQueue;
pub use registry::{JobContext, JobExecutor, JobRegistry};
pub use types::{JobDefinition, JobInfo, JobStatus};
