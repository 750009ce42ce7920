//! In-memory blob store with advisory leases.

use std::io::Cursor;

use async_trait::async_trait;
use dashmap::DashMap;
use ferrofhir_storage::{BlobProperties, BlobStore, BlobStream, StorageError};
use url::Url;

struct BlobEntry {
    data: Vec<u8>,
    etag: String,
    lease: Option<String>,
}

/// Blob store backed by a process-local concurrent map. Byte-range
/// reads return a cursor over a copy of the content, so concurrent
/// readers never block each other.
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: DashMap<String, BlobEntry>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores (or replaces) a blob, assigning it a fresh etag.
    pub fn put_blob(&self, url: &Url, data: &[u8]) -> String {
        let etag = format!("\"{}\"", uuid::Uuid::new_v4().simple());
        self.blobs.insert(
            url.to_string(),
            BlobEntry {
                data: data.to_vec(),
                etag: etag.clone(),
                lease: None,
            },
        );
        etag
    }

    /// Overwrites a blob's etag, simulating out-of-band mutation.
    pub fn set_etag(&self, url: &Url, etag: &str) {
        if let Some(mut entry) = self.blobs.get_mut(url.as_str()) {
            entry.etag = etag.to_string();
        }
    }

    /// The currently held lease id, if any.
    pub fn lease_holder(&self, url: &Url) -> Option<String> {
        self.blobs
            .get(url.as_str())
            .and_then(|entry| entry.lease.clone())
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get_properties(&self, url: &Url) -> Result<BlobProperties, StorageError> {
        let entry = self
            .blobs
            .get(url.as_str())
            .ok_or_else(|| StorageError::blob_not_found(url.as_str()))?;
        Ok(BlobProperties {
            length: entry.data.len() as u64,
            etag: Some(entry.etag.clone()),
        })
    }

    async fn open_byte_range(&self, url: &Url, offset: u64) -> Result<BlobStream, StorageError> {
        let entry = self
            .blobs
            .get(url.as_str())
            .ok_or_else(|| StorageError::blob_not_found(url.as_str()))?;
        let start = (offset as usize).min(entry.data.len());
        Ok(Box::new(Cursor::new(entry.data[start..].to_vec())))
    }

    async fn try_acquire_lease(
        &self,
        url: &Url,
        _owner_id: &str,
    ) -> Result<Option<String>, StorageError> {
        let mut entry = self
            .blobs
            .get_mut(url.as_str())
            .ok_or_else(|| StorageError::blob_not_found(url.as_str()))?;
        if entry.lease.is_some() {
            return Ok(None);
        }
        let lease_id = uuid::Uuid::new_v4().simple().to_string();
        entry.lease = Some(lease_id.clone());
        Ok(Some(lease_id))
    }

    async fn try_release_lease(&self, url: &Url, lease_id: &str) -> Result<(), StorageError> {
        if let Some(mut entry) = self.blobs.get_mut(url.as_str())
            && entry.lease.as_deref() == Some(lease_id)
        {
            entry.lease = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn url() -> Url {
        Url::parse("memory://blobs/input.ndjson").unwrap()
    }

    #[tokio::test]
    async fn test_properties_and_read() {
        let store = InMemoryBlobStore::new();
        let etag = store.put_blob(&url(), b"hello\nworld\n");

        let properties = store.get_properties(&url()).await.unwrap();
        assert_eq!(properties.length, 12);
        assert_eq!(properties.etag.as_deref(), Some(etag.as_str()));

        let mut stream = store.open_byte_range(&url(), 6).await.unwrap();
        let mut content = String::new();
        stream.read_to_string(&mut content).await.unwrap();
        assert_eq!(content, "world\n");
    }

    #[tokio::test]
    async fn test_missing_blob() {
        let store = InMemoryBlobStore::new();
        assert!(matches!(
            store.get_properties(&url()).await,
            Err(StorageError::BlobNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_lease_is_exclusive() {
        let store = InMemoryBlobStore::new();
        store.put_blob(&url(), b"x");

        let lease = store.try_acquire_lease(&url(), "a").await.unwrap().unwrap();
        assert!(store.try_acquire_lease(&url(), "b").await.unwrap().is_none());

        store.try_release_lease(&url(), &lease).await.unwrap();
        assert!(store.lease_holder(&url()).is_none());
        assert!(store.try_acquire_lease(&url(), "b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_release_with_wrong_lease_id_is_ignored() {
        let store = InMemoryBlobStore::new();
        store.put_blob(&url(), b"x");

        let lease = store.try_acquire_lease(&url(), "a").await.unwrap().unwrap();
        store.try_release_lease(&url(), "bogus").await.unwrap();
        assert_eq!(store.lease_holder(&url()), Some(lease));
    }
}
