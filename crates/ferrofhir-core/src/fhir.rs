use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Common FHIR resource types, with a `Custom` escape hatch for everything
/// defined outside the well-known set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Patient,
    Practitioner,
    Organization,
    Encounter,
    Observation,
    Condition,
    DiagnosticReport,
    Medication,
    MedicationRequest,
    Procedure,
    Device,
    DocumentReference,
    Bundle,
    OperationOutcome,
    #[serde(untagged)]
    Custom(String),
}

impl ResourceType {
    /// Returns the canonical FHIR name of this resource type.
    pub fn as_str(&self) -> &str {
        match self {
            ResourceType::Patient => "Patient",
            ResourceType::Practitioner => "Practitioner",
            ResourceType::Organization => "Organization",
            ResourceType::Encounter => "Encounter",
            ResourceType::Observation => "Observation",
            ResourceType::Condition => "Condition",
            ResourceType::DiagnosticReport => "DiagnosticReport",
            ResourceType::Medication => "Medication",
            ResourceType::MedicationRequest => "MedicationRequest",
            ResourceType::Procedure => "Procedure",
            ResourceType::Device => "Device",
            ResourceType::DocumentReference => "DocumentReference",
            ResourceType::Bundle => "Bundle",
            ResourceType::OperationOutcome => "OperationOutcome",
            ResourceType::Custom(name) => name,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
            return Err(CoreError::invalid_resource_type(s));
        }

        Ok(match s {
            "Patient" => ResourceType::Patient,
            "Practitioner" => ResourceType::Practitioner,
            "Organization" => ResourceType::Organization,
            "Encounter" => ResourceType::Encounter,
            "Observation" => ResourceType::Observation,
            "Condition" => ResourceType::Condition,
            "DiagnosticReport" => ResourceType::DiagnosticReport,
            "Medication" => ResourceType::Medication,
            "MedicationRequest" => ResourceType::MedicationRequest,
            "Procedure" => ResourceType::Procedure,
            "Device" => ResourceType::Device,
            "DocumentReference" => ResourceType::DocumentReference,
            "Bundle" => ResourceType::Bundle,
            "OperationOutcome" => ResourceType::OperationOutcome,
            other => ResourceType::Custom(other.to_string()),
        })
    }
}
