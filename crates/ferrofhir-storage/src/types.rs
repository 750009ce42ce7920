//! Shared types for the storage abstraction layer.

use ferrofhir_core::{ResourceEnvelope, ResourceKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A resource staged for bulk write: the parsed payload plus the
/// sequence id reserved for it by the orchestration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedResource {
    /// Globally unique, orchestration-assigned surrogate id.
    pub sequence_id: i64,
    /// Natural identity the backend merges on.
    pub key: ResourceKey,
    /// The resource payload.
    pub envelope: ResourceEnvelope,
}

impl StagedResource {
    pub fn new(sequence_id: i64, envelope: ResourceEnvelope) -> Self {
        Self {
            sequence_id,
            key: envelope.key(),
            envelope,
        }
    }
}

/// Properties of a blob as reported by the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobProperties {
    /// Content length in bytes.
    pub length: u64,
    /// Optimistic-concurrency tag, when the store supports one.
    pub etag: Option<String>,
}

/// The denormalized per-category index tables populated for every
/// merged resource. One variant per destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexCategory {
    TokenSearchParam,
    StringSearchParam,
    DateSearchParam,
    NumberSearchParam,
    QuantitySearchParam,
    ReferenceSearchParam,
    UriSearchParam,
    TokenTextSearchParam,
    TokenTokenCompositeSearchParam,
    TokenDateTimeCompositeSearchParam,
    TokenQuantityCompositeSearchParam,
    TokenStringCompositeSearchParam,
    TokenNumberNumberCompositeSearchParam,
    ReferenceTokenCompositeSearchParam,
    CompartmentAssignment,
    ResourceWriteClaim,
}

impl IndexCategory {
    /// All categories, in bulk-copy order.
    pub const ALL: [IndexCategory; 16] = [
        IndexCategory::CompartmentAssignment,
        IndexCategory::ResourceWriteClaim,
        IndexCategory::DateSearchParam,
        IndexCategory::NumberSearchParam,
        IndexCategory::QuantitySearchParam,
        IndexCategory::ReferenceSearchParam,
        IndexCategory::ReferenceTokenCompositeSearchParam,
        IndexCategory::StringSearchParam,
        IndexCategory::TokenDateTimeCompositeSearchParam,
        IndexCategory::TokenNumberNumberCompositeSearchParam,
        IndexCategory::TokenQuantityCompositeSearchParam,
        IndexCategory::TokenSearchParam,
        IndexCategory::TokenStringCompositeSearchParam,
        IndexCategory::TokenTextSearchParam,
        IndexCategory::TokenTokenCompositeSearchParam,
        IndexCategory::UriSearchParam,
    ];

    /// The destination table name for this category.
    pub fn table_name(&self) -> &'static str {
        match self {
            IndexCategory::TokenSearchParam => "token_search_param",
            IndexCategory::StringSearchParam => "string_search_param",
            IndexCategory::DateSearchParam => "date_search_param",
            IndexCategory::NumberSearchParam => "number_search_param",
            IndexCategory::QuantitySearchParam => "quantity_search_param",
            IndexCategory::ReferenceSearchParam => "reference_search_param",
            IndexCategory::UriSearchParam => "uri_search_param",
            IndexCategory::TokenTextSearchParam => "token_text_search_param",
            IndexCategory::TokenTokenCompositeSearchParam => "token_token_composite_search_param",
            IndexCategory::TokenDateTimeCompositeSearchParam => {
                "token_datetime_composite_search_param"
            }
            IndexCategory::TokenQuantityCompositeSearchParam => {
                "token_quantity_composite_search_param"
            }
            IndexCategory::TokenStringCompositeSearchParam => "token_string_composite_search_param",
            IndexCategory::TokenNumberNumberCompositeSearchParam => {
                "token_number_number_composite_search_param"
            }
            IndexCategory::ReferenceTokenCompositeSearchParam => {
                "reference_token_composite_search_param"
            }
            IndexCategory::CompartmentAssignment => "compartment_assignment",
            IndexCategory::ResourceWriteClaim => "resource_write_claim",
        }
    }
}

impl fmt::Display for IndexCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table_name())
    }
}

/// One row destined for a per-category index table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRow {
    /// Sequence id of the resource this row belongs to.
    pub sequence_id: i64,
    /// Search parameter code (or claim/compartment discriminator).
    pub param_code: String,
    /// The extracted value.
    pub value: IndexValue,
}

impl IndexRow {
    pub fn new(sequence_id: i64, param_code: impl Into<String>, value: IndexValue) -> Self {
        Self {
            sequence_id,
            param_code: param_code.into(),
            value,
        }
    }
}

/// An extracted value ready for indexing, shaped per category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IndexValue {
    Token {
        system: Option<String>,
        code: String,
    },
    String {
        normalized: String,
        exact: String,
    },
    Date {
        range_start: String,
        range_end: String,
    },
    Number(f64),
    Quantity {
        value: f64,
        system: Option<String>,
        code: Option<String>,
    },
    Reference {
        target_type: Option<String>,
        target_id: String,
    },
    Uri(String),
    Composite(Vec<IndexValue>),
    Compartment {
        compartment_type: String,
        compartment_id: String,
    },
    WriteClaim {
        resource_key: String,
    },
}
