//! Blob store client trait.
//!
//! The import pipeline consumes a narrow slice of whatever blob or file
//! store holds the input files: properties, byte-range reads, and
//! advisory leases. Backends that cannot lease simply return `None`
//! from [`BlobStore::try_acquire_lease`]; loading proceeds without one.

use async_trait::async_trait;
use tokio::io::AsyncRead;
use url::Url;

use crate::error::StorageError;
use crate::types::BlobProperties;

/// A readable byte stream positioned at the requested offset.
pub type BlobStream = Box<dyn AsyncRead + Send + Unpin>;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetches the blob's current length and etag.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::BlobNotFound` when the blob does not
    /// exist or cannot be read.
    async fn get_properties(&self, url: &Url) -> Result<BlobProperties, StorageError>;

    /// Opens the blob for reading starting at `offset` bytes.
    async fn open_byte_range(&self, url: &Url, offset: u64) -> Result<BlobStream, StorageError>;

    /// Attempts to take an advisory lease so the blob cannot be mutated
    /// while it is being read. Returns `None` when the store does not
    /// support leasing or the lease is currently held elsewhere.
    async fn try_acquire_lease(
        &self,
        url: &Url,
        owner_id: &str,
    ) -> Result<Option<String>, StorageError>;

    /// Releases a previously acquired lease. Best effort.
    async fn try_release_lease(&self, url: &Url, lease_id: &str) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_blob_store_object_safe(_: &dyn BlobStore) {}
}
