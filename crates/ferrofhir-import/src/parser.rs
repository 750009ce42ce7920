//! Parses one newline-delimited input line into a staged resource.

use ferrofhir_core::{CoreError, ResourceEnvelope};
use ferrofhir_storage::StagedResource;

use crate::definitions::ImportMode;

/// Turns a raw line into a typed, sequence-id-stamped resource.
///
/// A parse failure is data, not an exception: callers convert the error
/// into the failed variant of an import record and keep going.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportResourceParser;

impl ImportResourceParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(
        &self,
        line: &str,
        sequence_id: i64,
        declared_type: Option<&str>,
        mode: ImportMode,
    ) -> Result<StagedResource, CoreError> {
        let mut envelope: ResourceEnvelope = serde_json::from_str(line)?;

        if envelope.id.is_empty() {
            return Err(CoreError::invalid_resource("resource has an empty id"));
        }

        if let Some(expected) = declared_type
            && expected != envelope.resource_type.as_str()
        {
            return Err(CoreError::invalid_resource(format!(
                "resource type {} does not match declared type {expected}",
                envelope.resource_type
            )));
        }

        // On an initial load the server owns versioning; incremental
        // loads keep whatever the payload carries.
        if mode == ImportMode::InitialLoad
            && let Some(meta) = envelope.meta.as_mut()
        {
            meta.version_id = None;
        }

        Ok(StagedResource::new(sequence_id, envelope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrofhir_core::ResourceType;

    #[test]
    fn test_parse_valid_line() {
        let parser = ImportResourceParser::new();
        let staged = parser
            .parse(
                r#"{"resourceType":"Patient","id":"p1"}"#,
                42,
                None,
                ImportMode::InitialLoad,
            )
            .unwrap();
        assert_eq!(staged.sequence_id, 42);
        assert_eq!(staged.key.resource_type, ResourceType::Patient);
        assert_eq!(staged.key.id, "p1");
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        let parser = ImportResourceParser::new();
        assert!(
            parser
                .parse("{not json", 1, None, ImportMode::InitialLoad)
                .is_err()
        );
    }

    #[test]
    fn test_parse_rejects_missing_id() {
        let parser = ImportResourceParser::new();
        assert!(
            parser
                .parse(r#"{"resourceType":"Patient"}"#, 1, None, ImportMode::InitialLoad)
                .is_err()
        );
        assert!(
            parser
                .parse(
                    r#"{"resourceType":"Patient","id":""}"#,
                    1,
                    None,
                    ImportMode::InitialLoad
                )
                .is_err()
        );
    }

    #[test]
    fn test_parse_rejects_declared_type_mismatch() {
        let parser = ImportResourceParser::new();
        let result = parser.parse(
            r#"{"resourceType":"Observation","id":"o1"}"#,
            1,
            Some("Patient"),
            ImportMode::InitialLoad,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_accepts_matching_declared_type() {
        let parser = ImportResourceParser::new();
        let staged = parser
            .parse(
                r#"{"resourceType":"Patient","id":"p1"}"#,
                1,
                Some("Patient"),
                ImportMode::InitialLoad,
            )
            .unwrap();
        assert_eq!(staged.key.id, "p1");
    }

    #[test]
    fn test_initial_load_discards_payload_version() {
        let line = r#"{"resourceType":"Patient","id":"p1","meta":{"versionId":"9"}}"#;
        let parser = ImportResourceParser::new();

        let staged = parser.parse(line, 1, None, ImportMode::InitialLoad).unwrap();
        assert!(staged.envelope.meta.as_ref().unwrap().version_id.is_none());

        let staged = parser
            .parse(line, 1, None, ImportMode::IncrementalLoad)
            .unwrap();
        assert_eq!(
            staged.envelope.meta.as_ref().unwrap().version_id.as_deref(),
            Some("9")
        );
    }
}
