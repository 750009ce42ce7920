use crate::{FhirDateTime, ResourceType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// The natural identity of a resource: type plus logical id.
///
/// This is the key the storage backend merges on. Two payloads with the
/// same key refer to the same resource no matter which input file or
/// sequence id they arrived with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    #[serde(rename = "resourceType")]
    pub resource_type: ResourceType,
    pub id: String,
}

impl ResourceKey {
    pub fn new(resource_type: ResourceType, id: impl Into<String>) -> Self {
        Self {
            resource_type,
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResourceMeta {
    #[serde(rename = "versionId", skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(rename = "lastUpdated", skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<FhirDateTime>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub profile: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ResourceMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version_id(mut self, version_id: String) -> Self {
        self.version_id = Some(version_id);
        self
    }

    pub fn with_last_updated(mut self, last_updated: FhirDateTime) -> Self {
        self.last_updated = Some(last_updated);
        self
    }
}

/// A FHIR resource as it travels through the server: the identifying
/// fields pulled out, everything else kept as raw JSON.
///
/// Deserializing a newline-delimited input line into an envelope fails
/// when `resourceType` or `id` is missing, which is exactly the contract
/// the import parser needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEnvelope {
    pub id: String,
    #[serde(rename = "resourceType")]
    pub resource_type: ResourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResourceMeta>,
    #[serde(flatten)]
    pub data: HashMap<String, Value>,
}

impl ResourceEnvelope {
    pub fn new(id: String, resource_type: ResourceType) -> Self {
        Self {
            id,
            resource_type,
            meta: None,
            data: HashMap::new(),
        }
    }

    pub fn with_meta(mut self, meta: ResourceMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_data(mut self, data: HashMap<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn add_field(&mut self, key: String, value: Value) {
        self.data.insert(key, value);
    }

    pub fn get_field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// The natural identity of this resource.
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.resource_type.clone(), self.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_from_ndjson_line() {
        let line = r#"{"resourceType":"Patient","id":"p1","active":true}"#;
        let envelope: ResourceEnvelope = serde_json::from_str(line).unwrap();
        assert_eq!(envelope.id, "p1");
        assert_eq!(envelope.resource_type, ResourceType::Patient);
        assert_eq!(envelope.get_field("active"), Some(&json!(true)));
    }

    #[test]
    fn test_envelope_requires_id() {
        let line = r#"{"resourceType":"Patient","active":true}"#;
        assert!(serde_json::from_str::<ResourceEnvelope>(line).is_err());
    }

    #[test]
    fn test_envelope_requires_resource_type() {
        let line = r#"{"id":"p1","active":true}"#;
        assert!(serde_json::from_str::<ResourceEnvelope>(line).is_err());
    }

    #[test]
    fn test_envelope_key() {
        let envelope = ResourceEnvelope::new("p1".to_string(), ResourceType::Patient);
        let key = envelope.key();
        assert_eq!(key.to_string(), "Patient/p1");
    }

    #[test]
    fn test_meta_round_trip() {
        let line = r#"{"resourceType":"Patient","id":"p1","meta":{"versionId":"3","lastUpdated":"2024-03-15T10:30:00Z"}}"#;
        let envelope: ResourceEnvelope = serde_json::from_str(line).unwrap();
        let meta = envelope.meta.as_ref().unwrap();
        assert_eq!(meta.version_id.as_deref(), Some("3"));

        let back = serde_json::to_value(&envelope).unwrap();
        assert_eq!(back["meta"]["versionId"], json!("3"));
    }

    #[test]
    fn test_key_equality_ignores_payload() {
        let a: ResourceEnvelope =
            serde_json::from_str(r#"{"resourceType":"Patient","id":"p1","active":true}"#).unwrap();
        let b: ResourceEnvelope =
            serde_json::from_str(r#"{"resourceType":"Patient","id":"p1","active":false}"#).unwrap();
        assert_eq!(a.key(), b.key());
    }
}
