//! The scoring pipeline: diagnosis mapping, hierarchy resolution, demographic and condition
//! coefficients, interaction rules and final aggregation.

mod aggregate;
mod demographics;
mod hierarchy;
mod interactions;
mod mapper;

pub use demographics::{
    score_demographics, DemographicScore, Demographics, DemographicsInput, DualStatus, Segment,
    Sex,
};
pub use hierarchy::{apply_category_rules, resolve_hierarchy, Resolution};
pub use interactions::score_interactions;
pub use mapper::{map_diagnoses, normalize_code, CategoryTrace, MappedDiagnoses};

use crate::claims::{ExtractionError, RecordError};
use crate::model::{CcId, ModelDefinition, ModelName, UnknownModelName};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RafError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unknown model name '{0}'")]
    UnknownModel(String),
    #[error("model '{model}' is not loaded")]
    Configuration { model: ModelName },
    #[error("coefficient '{key}' is missing from the {model} table")]
    Integrity { model: ModelName, key: String },
}

impl From<UnknownModelName> for RafError {
    fn from(value: UnknownModelName) -> Self {
        RafError::UnknownModel(value.0)
    }
}

impl From<ExtractionError> for RafError {
    fn from(value: ExtractionError) -> Self {
        RafError::InvalidInput(value.to_string())
    }
}

impl From<RecordError> for RafError {
    fn from(value: RecordError) -> Self {
        RafError::InvalidInput(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoefficientKind {
    Demographic,
    Condition,
    Interaction,
}

/// A single coefficient credited to the score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedCoefficient {
    pub key: String,
    pub term: String,
    pub kind: CoefficientKind,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiredInteraction {
    pub rule: String,
    pub coefficient: String,
    pub value: f64,
    pub demographic: bool,
}

/// Inputs that did not contribute to the score, and why.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    pub unmapped_codes: Vec<String>,
    pub rejected_codes: Vec<String>,
    pub trumped: BTreeMap<String, Vec<String>>,
    pub dropped_categories: Vec<String>,
    pub filtered_records: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RafResult {
    pub model_name: ModelName,
    pub risk_score: f64,
    pub risk_score_demographics: f64,
    pub risk_score_hcc: f64,
    pub risk_score_chronic_only: f64,
    pub segment: String,
    pub age_sex_category: String,
    pub hcc_list: Vec<String>,
    pub cc_to_dx: BTreeMap<String, BTreeSet<String>>,
    pub coefficients: Vec<AppliedCoefficient>,
    pub interactions: Vec<FiredInteraction>,
    pub demographics: Demographics,
    pub diagnostics: Diagnostics,
}

/// Scores already-validated demographics and a diagnosis list against one model.
pub fn score<I, S>(
    model: &ModelDefinition,
    codes: I,
    demographics: Demographics,
) -> Result<RafResult, RafError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mapped = map_diagnoses(codes, model, &demographics);
    for code in &mapped.unmapped {
        debug!(model = %model.name(), code = code.as_str(), "diagnosis code has no category");
    }

    let mut categories = mapped.categories;
    let dropped = apply_category_rules(&mut categories, model);
    let resolution = resolve_hierarchy(&categories, model);
    let demographic = score_demographics(&demographics, model)?;

    let active: BTreeSet<CcId> = resolution.active.keys().copied().collect();
    let (conditions, fired) = if demographic.segment.scores_conditions() {
        (
            aggregate::condition_coefficients(&active, demographic.segment, model)?,
            score_interactions(&active, &demographics, demographic.segment, model)?,
        )
    } else {
        (Vec::new(), Vec::new())
    };

    let catalog = model.catalog();
    let diagnostics = Diagnostics {
        unmapped_codes: mapped.unmapped.into_iter().collect(),
        rejected_codes: mapped.rejected.into_iter().collect(),
        trumped: resolution
            .trumped
            .iter()
            .map(|(cc, parents)| {
                (
                    catalog.label(*cc).to_string(),
                    aggregate::sorted_labels(parents.iter().copied(), model),
                )
            })
            .collect(),
        dropped_categories: aggregate::sorted_labels(dropped.into_iter(), model),
        filtered_records: 0,
    };

    Ok(aggregate::assemble(aggregate::Parts {
        model,
        active: &resolution.active,
        demographic,
        conditions,
        fired,
        demographics,
        diagnostics,
    }))
}

/// Looks a coefficient up, treating an absent key as a configuration integrity failure.
pub(crate) fn lookup(model: &ModelDefinition, key: &str) -> Result<f64, RafError> {
    model
        .coefficients()
        .get(key)
        .ok_or_else(|| RafError::Integrity {
            model: model.name(),
            key: key.to_string(),
        })
}
