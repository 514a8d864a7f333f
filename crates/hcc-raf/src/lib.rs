//! CMS Hierarchical Condition Category risk adjustment scoring.
//!
//! Diagnosis codes (bare, from service-level records, or extracted from FHIR
//! ExplanationOfBenefit resources) are mapped to condition categories, resolved against the
//! model hierarchy and combined with demographic and interaction coefficients into a RAF score.

pub mod calculator;
pub mod claims;
pub mod config;
pub mod error;
pub mod model;
pub mod router;
pub mod scoring;
pub mod telemetry;

pub use calculator::{PopulationRequest, RafCalculator, ScoredClaims};
pub use model::{ModelName, ModelRegistry};
pub use scoring::{DemographicsInput, RafError, RafResult};
