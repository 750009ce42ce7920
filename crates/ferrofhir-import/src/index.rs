//! Per-category index-row generation.
//!
//! For every merged resource a fixed set of generators populates the
//! denormalized index tables, one generator per [`IndexCategory`].
//! Generation is pure CPU over the already-parsed envelope; the
//! importer fans the generators out with bounded concurrency.

use ferrofhir_storage::{IndexCategory, IndexRow, IndexValue, StagedResource};
use serde_json::Value;

/// Produces the rows of one index category for one staged resource.
pub trait RowGenerator: Send + Sync {
    fn category(&self) -> IndexCategory;
    fn generate(&self, resource: &StagedResource) -> Vec<IndexRow>;
}

/// The full generator set, one per category, in bulk-copy order.
pub fn default_generators() -> Vec<std::sync::Arc<dyn RowGenerator>> {
    vec![
        std::sync::Arc::new(CompartmentRowGenerator),
        std::sync::Arc::new(WriteClaimRowGenerator),
        std::sync::Arc::new(DateRowGenerator),
        std::sync::Arc::new(NumberRowGenerator),
        std::sync::Arc::new(QuantityRowGenerator),
        std::sync::Arc::new(ReferenceRowGenerator),
        std::sync::Arc::new(ReferenceTokenCompositeRowGenerator),
        std::sync::Arc::new(StringRowGenerator),
        std::sync::Arc::new(TokenDateTimeCompositeRowGenerator),
        std::sync::Arc::new(TokenNumberNumberCompositeRowGenerator),
        std::sync::Arc::new(TokenQuantityCompositeRowGenerator),
        std::sync::Arc::new(TokenRowGenerator),
        std::sync::Arc::new(TokenStringCompositeRowGenerator),
        std::sync::Arc::new(TokenTextRowGenerator),
        std::sync::Arc::new(TokenTokenCompositeRowGenerator),
        std::sync::Arc::new(UriRowGenerator),
    ]
}

// ============================================================================
// Value extraction
// ============================================================================

/// Fields holding CodeableConcept or Coding values.
const TOKEN_FIELDS: [&str; 4] = ["code", "category", "type", "status"];
/// Fields holding human-readable names or titles.
const STRING_FIELDS: [&str; 2] = ["name", "title"];
/// Fields holding date or dateTime values.
const DATE_FIELDS: [&str; 4] = ["date", "effectiveDateTime", "birthDate", "period"];
/// Fields holding references to other resources.
const REFERENCE_FIELDS: [&str; 5] = ["subject", "patient", "encounter", "performer", "basedOn"];
/// Reference targets that define compartments.
const COMPARTMENT_TYPES: [&str; 4] = ["Patient", "Encounter", "Practitioner", "Device"];

fn extract_tokens(resource: &StagedResource) -> Vec<(String, IndexValue)> {
    let mut tokens = Vec::new();
    for field in TOKEN_FIELDS {
        let Some(value) = resource.envelope.get_field(field) else {
            continue;
        };
        match value {
            // Plain code, e.g. "status": "final".
            Value::String(code) => tokens.push((
                field.to_string(),
                IndexValue::Token {
                    system: None,
                    code: code.clone(),
                },
            )),
            // CodeableConcept with codings.
            Value::Object(_) => {
                for coding in codings_of(value) {
                    tokens.push((field.to_string(), coding));
                }
            }
            Value::Array(items) => {
                for item in items {
                    for coding in codings_of(item) {
                        tokens.push((field.to_string(), coding));
                    }
                }
            }
            _ => {}
        }
    }
    tokens
}

fn codings_of(concept: &Value) -> Vec<IndexValue> {
    let Some(codings) = concept.get("coding").and_then(Value::as_array) else {
        return Vec::new();
    };
    codings
        .iter()
        .filter_map(|coding| {
            let code = coding.get("code")?.as_str()?.to_string();
            let system = coding
                .get("system")
                .and_then(Value::as_str)
                .map(String::from);
            Some(IndexValue::Token { system, code })
        })
        .collect()
}

fn concept_texts(resource: &StagedResource) -> Vec<(String, String)> {
    let mut texts = Vec::new();
    for field in TOKEN_FIELDS {
        if let Some(text) = resource
            .envelope
            .get_field(field)
            .and_then(|v| v.get("text"))
            .and_then(Value::as_str)
        {
            texts.push((field.to_string(), text.to_string()));
        }
    }
    texts
}

fn extract_strings(resource: &StagedResource) -> Vec<(String, IndexValue)> {
    let mut strings = Vec::new();
    for field in STRING_FIELDS {
        let Some(value) = resource.envelope.get_field(field) else {
            continue;
        };
        match value {
            Value::String(text) => strings.push((field.to_string(), string_value(text))),
            // HumanName array: index family and given parts.
            Value::Array(names) => {
                for name in names {
                    if let Some(family) = name.get("family").and_then(Value::as_str) {
                        strings.push((field.to_string(), string_value(family)));
                    }
                    for given in name
                        .get("given")
                        .and_then(Value::as_array)
                        .into_iter()
                        .flatten()
                    {
                        if let Some(given) = given.as_str() {
                            strings.push((field.to_string(), string_value(given)));
                        }
                    }
                }
            }
            _ => {}
        }
    }
    strings
}

fn string_value(text: &str) -> IndexValue {
    IndexValue::String {
        normalized: text.trim().to_lowercase(),
        exact: text.to_string(),
    }
}

fn extract_dates(resource: &StagedResource) -> Vec<(String, IndexValue)> {
    let mut dates = Vec::new();
    for field in DATE_FIELDS {
        let Some(value) = resource.envelope.get_field(field) else {
            continue;
        };
        match value {
            Value::String(date) => {
                if let Some((start, end)) = date_to_range(date) {
                    dates.push((
                        field.to_string(),
                        IndexValue::Date {
                            range_start: start,
                            range_end: end,
                        },
                    ));
                }
            }
            // Period with start/end.
            Value::Object(_) => {
                let start = value
                    .get("start")
                    .and_then(Value::as_str)
                    .and_then(|s| date_to_range(s).map(|r| r.0));
                let end = value
                    .get("end")
                    .and_then(Value::as_str)
                    .and_then(|s| date_to_range(s).map(|r| r.1));
                if start.is_some() || end.is_some() {
                    dates.push((
                        field.to_string(),
                        IndexValue::Date {
                            range_start: start.unwrap_or_else(|| "0001-01-01T00:00:00Z".into()),
                            range_end: end.unwrap_or_else(|| "9999-12-31T23:59:59Z".into()),
                        },
                    ));
                }
            }
            _ => {}
        }
    }
    dates
}

/// Converts FHIR date precision (year, month, day, instant) into an
/// explicit start/end range for B-tree range queries.
fn date_to_range(date_str: &str) -> Option<(String, String)> {
    let trimmed = date_str.trim();
    let len = trimmed.len();

    // Year only: "2024"
    if len == 4 && trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Some((
            format!("{trimmed}-01-01T00:00:00Z"),
            format!("{trimmed}-12-31T23:59:59.999Z"),
        ));
    }

    // Year-Month: "2024-03"
    if len == 7 && trimmed.as_bytes()[4] == b'-' {
        let year: i32 = trimmed[..4].parse().ok()?;
        let month: u32 = trimmed[5..7].parse().ok()?;
        if !(1..=12).contains(&month) {
            return None;
        }
        let last_day = days_in_month(year, month);
        return Some((
            format!("{trimmed}-01T00:00:00Z"),
            format!("{trimmed}-{last_day:02}T23:59:59.999Z"),
        ));
    }

    // Full date: "2024-03-15"
    if len == 10 && !trimmed.contains('T') {
        return Some((
            format!("{trimmed}T00:00:00Z"),
            format!("{trimmed}T23:59:59.999Z"),
        ));
    }

    // Already a precise instant
    if trimmed.contains('T') {
        return Some((trimmed.to_string(), trimmed.to_string()));
    }

    None
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 => 29,
        _ => 28,
    }
}

fn extract_numbers(resource: &StagedResource) -> Vec<(String, f64)> {
    let mut numbers = Vec::new();
    for field in ["valueInteger", "valueDecimal"] {
        if let Some(number) = resource.envelope.get_field(field).and_then(Value::as_f64) {
            numbers.push((field.to_string(), number));
        }
    }
    numbers
}

fn extract_quantities(resource: &StagedResource) -> Vec<(String, IndexValue)> {
    let Some(quantity) = resource.envelope.get_field("valueQuantity") else {
        return Vec::new();
    };
    let Some(value) = quantity.get("value").and_then(Value::as_f64) else {
        return Vec::new();
    };
    vec![(
        "value-quantity".to_string(),
        IndexValue::Quantity {
            value,
            system: quantity
                .get("system")
                .and_then(Value::as_str)
                .map(String::from),
            code: quantity
                .get("code")
                .and_then(Value::as_str)
                .map(String::from),
        },
    )]
}

fn extract_references(resource: &StagedResource) -> Vec<(String, IndexValue)> {
    let mut references = Vec::new();
    for field in REFERENCE_FIELDS {
        let Some(value) = resource.envelope.get_field(field) else {
            continue;
        };
        let candidates: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for candidate in candidates {
            let Some(reference) = candidate.get("reference").and_then(Value::as_str) else {
                continue;
            };
            // Relative literal references: "Type/id".
            let (target_type, target_id) = match reference.split_once('/') {
                Some((target_type, target_id)) => {
                    (Some(target_type.to_string()), target_id.to_string())
                }
                None => (None, reference.to_string()),
            };
            references.push((
                field.to_string(),
                IndexValue::Reference {
                    target_type,
                    target_id,
                },
            ));
        }
    }
    references
}

fn rows(
    resource: &StagedResource,
    values: Vec<(String, IndexValue)>,
) -> Vec<IndexRow> {
    values
        .into_iter()
        .map(|(param_code, value)| IndexRow::new(resource.sequence_id, param_code, value))
        .collect()
}

fn composite(first: IndexValue, second: IndexValue) -> IndexValue {
    IndexValue::Composite(vec![first, second])
}

// ============================================================================
// Generators
// ============================================================================

pub struct TokenRowGenerator;

impl RowGenerator for TokenRowGenerator {
    fn category(&self) -> IndexCategory {
        IndexCategory::TokenSearchParam
    }

    fn generate(&self, resource: &StagedResource) -> Vec<IndexRow> {
        rows(resource, extract_tokens(resource))
    }
}

pub struct StringRowGenerator;

impl RowGenerator for StringRowGenerator {
    fn category(&self) -> IndexCategory {
        IndexCategory::StringSearchParam
    }

    fn generate(&self, resource: &StagedResource) -> Vec<IndexRow> {
        rows(resource, extract_strings(resource))
    }
}

pub struct DateRowGenerator;

impl RowGenerator for DateRowGenerator {
    fn category(&self) -> IndexCategory {
        IndexCategory::DateSearchParam
    }

    fn generate(&self, resource: &StagedResource) -> Vec<IndexRow> {
        rows(resource, extract_dates(resource))
    }
}

pub struct NumberRowGenerator;

impl RowGenerator for NumberRowGenerator {
    fn category(&self) -> IndexCategory {
        IndexCategory::NumberSearchParam
    }

    fn generate(&self, resource: &StagedResource) -> Vec<IndexRow> {
        extract_numbers(resource)
            .into_iter()
            .map(|(param_code, number)| {
                IndexRow::new(resource.sequence_id, param_code, IndexValue::Number(number))
            })
            .collect()
    }
}

pub struct QuantityRowGenerator;

impl RowGenerator for QuantityRowGenerator {
    fn category(&self) -> IndexCategory {
        IndexCategory::QuantitySearchParam
    }

    fn generate(&self, resource: &StagedResource) -> Vec<IndexRow> {
        rows(resource, extract_quantities(resource))
    }
}

pub struct ReferenceRowGenerator;

impl RowGenerator for ReferenceRowGenerator {
    fn category(&self) -> IndexCategory {
        IndexCategory::ReferenceSearchParam
    }

    fn generate(&self, resource: &StagedResource) -> Vec<IndexRow> {
        rows(resource, extract_references(resource))
    }
}

pub struct UriRowGenerator;

impl RowGenerator for UriRowGenerator {
    fn category(&self) -> IndexCategory {
        IndexCategory::UriSearchParam
    }

    fn generate(&self, resource: &StagedResource) -> Vec<IndexRow> {
        let Some(url) = resource
            .envelope
            .get_field("url")
            .and_then(Value::as_str)
        else {
            return Vec::new();
        };
        vec![IndexRow::new(
            resource.sequence_id,
            "url",
            IndexValue::Uri(url.to_string()),
        )]
    }
}

pub struct TokenTextRowGenerator;

impl RowGenerator for TokenTextRowGenerator {
    fn category(&self) -> IndexCategory {
        IndexCategory::TokenTextSearchParam
    }

    fn generate(&self, resource: &StagedResource) -> Vec<IndexRow> {
        concept_texts(resource)
            .into_iter()
            .map(|(param_code, text)| {
                IndexRow::new(resource.sequence_id, param_code, string_value(&text))
            })
            .collect()
    }
}

pub struct TokenTokenCompositeRowGenerator;

impl RowGenerator for TokenTokenCompositeRowGenerator {
    fn category(&self) -> IndexCategory {
        IndexCategory::TokenTokenCompositeSearchParam
    }

    fn generate(&self, resource: &StagedResource) -> Vec<IndexRow> {
        let tokens = extract_tokens(resource);
        let mut out = Vec::new();
        for window in tokens.windows(2) {
            let (first_code, first) = &window[0];
            let (second_code, second) = &window[1];
            out.push(IndexRow::new(
                resource.sequence_id,
                format!("{first_code}-{second_code}"),
                composite(first.clone(), second.clone()),
            ));
        }
        out
    }
}

pub struct TokenDateTimeCompositeRowGenerator;

impl RowGenerator for TokenDateTimeCompositeRowGenerator {
    fn category(&self) -> IndexCategory {
        IndexCategory::TokenDateTimeCompositeSearchParam
    }

    fn generate(&self, resource: &StagedResource) -> Vec<IndexRow> {
        pair_with_tokens(resource, extract_dates(resource))
    }
}

pub struct TokenQuantityCompositeRowGenerator;

impl RowGenerator for TokenQuantityCompositeRowGenerator {
    fn category(&self) -> IndexCategory {
        IndexCategory::TokenQuantityCompositeSearchParam
    }

    fn generate(&self, resource: &StagedResource) -> Vec<IndexRow> {
        pair_with_tokens(resource, extract_quantities(resource))
    }
}

pub struct TokenStringCompositeRowGenerator;

impl RowGenerator for TokenStringCompositeRowGenerator {
    fn category(&self) -> IndexCategory {
        IndexCategory::TokenStringCompositeSearchParam
    }

    fn generate(&self, resource: &StagedResource) -> Vec<IndexRow> {
        pair_with_tokens(resource, extract_strings(resource))
    }
}

pub struct TokenNumberNumberCompositeRowGenerator;

impl RowGenerator for TokenNumberNumberCompositeRowGenerator {
    fn category(&self) -> IndexCategory {
        IndexCategory::TokenNumberNumberCompositeSearchParam
    }

    fn generate(&self, resource: &StagedResource) -> Vec<IndexRow> {
        let numbers = extract_numbers(resource);
        if numbers.len() < 2 {
            return Vec::new();
        }
        let Some((token_code, token)) = extract_tokens(resource).into_iter().next() else {
            return Vec::new();
        };
        vec![IndexRow::new(
            resource.sequence_id,
            token_code,
            IndexValue::Composite(vec![
                token,
                IndexValue::Number(numbers[0].1),
                IndexValue::Number(numbers[1].1),
            ]),
        )]
    }
}

pub struct ReferenceTokenCompositeRowGenerator;

impl RowGenerator for ReferenceTokenCompositeRowGenerator {
    fn category(&self) -> IndexCategory {
        IndexCategory::ReferenceTokenCompositeSearchParam
    }

    fn generate(&self, resource: &StagedResource) -> Vec<IndexRow> {
        let Some((reference_code, reference)) = extract_references(resource).into_iter().next()
        else {
            return Vec::new();
        };
        let Some((token_code, token)) = extract_tokens(resource).into_iter().next() else {
            return Vec::new();
        };
        vec![IndexRow::new(
            resource.sequence_id,
            format!("{reference_code}-{token_code}"),
            composite(reference, token),
        )]
    }
}

/// Pairs the resource's first token with each extracted value.
fn pair_with_tokens(
    resource: &StagedResource,
    values: Vec<(String, IndexValue)>,
) -> Vec<IndexRow> {
    let Some((token_code, token)) = extract_tokens(resource).into_iter().next() else {
        return Vec::new();
    };
    values
        .into_iter()
        .map(|(value_code, value)| {
            IndexRow::new(
                resource.sequence_id,
                format!("{token_code}-{value_code}"),
                composite(token.clone(), value),
            )
        })
        .collect()
}

pub struct CompartmentRowGenerator;

impl RowGenerator for CompartmentRowGenerator {
    fn category(&self) -> IndexCategory {
        IndexCategory::CompartmentAssignment
    }

    fn generate(&self, resource: &StagedResource) -> Vec<IndexRow> {
        extract_references(resource)
            .into_iter()
            .filter_map(|(param_code, value)| {
                let IndexValue::Reference {
                    target_type: Some(target_type),
                    target_id,
                } = value
                else {
                    return None;
                };
                if !COMPARTMENT_TYPES.contains(&target_type.as_str()) {
                    return None;
                }
                Some(IndexRow::new(
                    resource.sequence_id,
                    param_code,
                    IndexValue::Compartment {
                        compartment_type: target_type,
                        compartment_id: target_id,
                    },
                ))
            })
            .collect()
    }
}

pub struct WriteClaimRowGenerator;

impl RowGenerator for WriteClaimRowGenerator {
    fn category(&self) -> IndexCategory {
        IndexCategory::ResourceWriteClaim
    }

    fn generate(&self, resource: &StagedResource) -> Vec<IndexRow> {
        vec![IndexRow::new(
            resource.sequence_id,
            "write-claim",
            IndexValue::WriteClaim {
                resource_key: resource.key.to_string(),
            },
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrofhir_core::ResourceEnvelope;
    use serde_json::json;

    fn observation() -> StagedResource {
        let line = json!({
            "resourceType": "Observation",
            "id": "o1",
            "status": "final",
            "code": {
                "coding": [{"system": "http://loinc.org", "code": "8867-4"}],
                "text": "Heart rate"
            },
            "subject": {"reference": "Patient/p1"},
            "effectiveDateTime": "2024-03-15T10:30:00Z",
            "valueQuantity": {"value": 72.0, "system": "http://unitsofmeasure.org", "code": "/min"}
        });
        let envelope: ResourceEnvelope = serde_json::from_value(line).unwrap();
        StagedResource::new(7, envelope)
    }

    #[test]
    fn test_generator_set_covers_every_category() {
        let generators = default_generators();
        assert_eq!(generators.len(), IndexCategory::ALL.len());
        let mut categories: Vec<IndexCategory> =
            generators.iter().map(|g| g.category()).collect();
        categories.sort_by_key(|c| c.table_name());
        categories.dedup();
        assert_eq!(categories.len(), IndexCategory::ALL.len());
    }

    #[test]
    fn test_token_rows() {
        let rows = TokenRowGenerator.generate(&observation());
        assert!(rows.iter().any(|r| matches!(
            &r.value,
            IndexValue::Token { code, .. } if code == "8867-4"
        )));
        assert!(rows.iter().any(|r| matches!(
            &r.value,
            IndexValue::Token { code, system: None } if code == "final"
        )));
        assert!(rows.iter().all(|r| r.sequence_id == 7));
    }

    #[test]
    fn test_reference_and_compartment_rows() {
        let resource = observation();
        let references = ReferenceRowGenerator.generate(&resource);
        assert_eq!(references.len(), 1);
        assert!(matches!(
            &references[0].value,
            IndexValue::Reference { target_type: Some(t), target_id } if t == "Patient" && target_id == "p1"
        ));

        let compartments = CompartmentRowGenerator.generate(&resource);
        assert_eq!(compartments.len(), 1);
        assert!(matches!(
            &compartments[0].value,
            IndexValue::Compartment { compartment_type, .. } if compartment_type == "Patient"
        ));
    }

    #[test]
    fn test_date_rows_expand_precision() {
        let envelope: ResourceEnvelope = serde_json::from_value(json!({
            "resourceType": "Patient",
            "id": "p1",
            "birthDate": "1980"
        }))
        .unwrap();
        let rows = DateRowGenerator.generate(&StagedResource::new(1, envelope));
        assert_eq!(rows.len(), 1);
        assert!(matches!(
            &rows[0].value,
            IndexValue::Date { range_start, range_end }
                if range_start == "1980-01-01T00:00:00Z" && range_end.starts_with("1980-12-31")
        ));
    }

    #[test]
    fn test_quantity_and_composite_rows() {
        let resource = observation();
        let quantities = QuantityRowGenerator.generate(&resource);
        assert_eq!(quantities.len(), 1);

        let composites = TokenQuantityCompositeRowGenerator.generate(&resource);
        assert_eq!(composites.len(), 1);
        assert!(matches!(&composites[0].value, IndexValue::Composite(parts) if parts.len() == 2));
    }

    #[test]
    fn test_write_claim_row_always_present() {
        let rows = WriteClaimRowGenerator.generate(&observation());
        assert_eq!(rows.len(), 1);
        assert!(matches!(
            &rows[0].value,
            IndexValue::WriteClaim { resource_key } if resource_key == "Observation/o1"
        ));
    }

    #[test]
    fn test_token_text_rows() {
        let rows = TokenTextRowGenerator.generate(&observation());
        assert_eq!(rows.len(), 1);
        assert!(matches!(
            &rows[0].value,
            IndexValue::String { normalized, .. } if normalized == "heart rate"
        ));
    }

    #[test]
    fn test_plain_patient_produces_no_observation_rows() {
        let envelope: ResourceEnvelope = serde_json::from_value(json!({
            "resourceType": "Patient",
            "id": "p1",
            "name": [{"family": "Chalmers", "given": ["Peter", "James"]}]
        }))
        .unwrap();
        let resource = StagedResource::new(1, envelope);

        assert!(QuantityRowGenerator.generate(&resource).is_empty());
        assert!(NumberRowGenerator.generate(&resource).is_empty());

        let strings = StringRowGenerator.generate(&resource);
        assert_eq!(strings.len(), 3);
        assert!(matches!(
            &strings[0].value,
            IndexValue::String { normalized, .. } if normalized == "chalmers"
        ));
    }
}
