pub mod error;
pub mod fhir;
pub mod id;
pub mod resource;
pub mod time;

pub use error::{CoreError, ErrorCategory, Result};
pub use fhir::ResourceType;
pub use id::generate_id;
pub use resource::{ResourceEnvelope, ResourceKey, ResourceMeta};
pub use time::{FhirDateTime, now_utc};
