//! Claim-side collaborators: service-level records, eligibility filtering, and extraction from
//! FHIR ExplanationOfBenefit resources or X12 837 interchanges.

mod fhir;
mod filter;
mod record;
mod x12;

pub use fhir::FhirEobExtractor;
pub use filter::{ClaimFilter, EligibilityFilter};
pub use record::{unique_diagnosis_codes, RecordError, ServiceLevelRecord};
pub use x12::X12ClaimExtractor;

use serde_json::Value;

/// Turns raw claim resources into service-level records.
pub trait ClaimExtractor: Send + Sync {
    fn extract(&self, resources: &[Value]) -> Result<Vec<ServiceLevelRecord>, ExtractionError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("claim payload must be a resource, a Bundle or an array of resources")]
    UnsupportedPayload,
    #[error("resource is not an ExplanationOfBenefit")]
    NotExplanationOfBenefit,
    #[error("malformed ExplanationOfBenefit: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("X12 interchange is empty")]
    EmptyInterchange,
    #[error("X12 interchange has no ST transaction header")]
    MissingTransactionHeader,
    #[error("X12 transaction set '{0}' is not an 837 claim")]
    UnsupportedTransaction(String),
}
