//! In-memory error log store.

use async_trait::async_trait;
use dashmap::DashMap;
use ferrofhir_storage::{ErrorLogStore, StorageError};

/// Append-only error log held in a process-local map, one entry per
/// log name.
#[derive(Default)]
pub struct InMemoryErrorLogStore {
    logs: DashMap<String, Vec<String>>,
}

impl InMemoryErrorLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All lines appended to the named log so far.
    pub fn lines(&self, log_name: &str) -> Vec<String> {
        self.logs
            .get(log_name)
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    pub fn log_names(&self) -> Vec<String> {
        self.logs.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[async_trait]
impl ErrorLogStore for InMemoryErrorLogStore {
    async fn append(&self, log_name: &str, lines: &[String]) -> Result<(), StorageError> {
        self.logs
            .entry(log_name.to_string())
            .or_default()
            .extend(lines.iter().cloned());
        Ok(())
    }

    fn location(&self, log_name: &str) -> String {
        format!("memory://import-errors/{log_name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_accumulates() {
        let store = InMemoryErrorLogStore::new();
        store
            .append("errors.ndjson", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        store.append("errors.ndjson", &["c".to_string()]).await.unwrap();

        assert_eq!(store.lines("errors.ndjson"), vec!["a", "b", "c"]);
        assert!(store.lines("other.ndjson").is_empty());
    }

    #[test]
    fn test_location_is_stable() {
        let store = InMemoryErrorLogStore::new();
        assert_eq!(
            store.location("errors.ndjson"),
            "memory://import-errors/errors.ndjson"
        );
    }
}
