use super::{
    lookup, AppliedCoefficient, CategoryTrace, CoefficientKind, DemographicScore, Demographics,
    Diagnostics, FiredInteraction, RafError, RafResult, Segment,
};
use crate::model::{CcId, ModelDefinition};
use std::collections::BTreeSet;

pub(super) struct Parts<'a> {
    pub model: &'a ModelDefinition,
    pub active: &'a CategoryTrace,
    pub demographic: DemographicScore,
    pub conditions: Vec<AppliedCoefficient>,
    pub fired: Vec<FiredInteraction>,
    pub demographics: Demographics,
    pub diagnostics: Diagnostics,
}

/// Condition coefficients for every active category, in catalogue sort order.
pub(super) fn condition_coefficients(
    active: &BTreeSet<CcId>,
    segment: Segment,
    model: &ModelDefinition,
) -> Result<Vec<AppliedCoefficient>, RafError> {
    let catalog = model.catalog();
    let prefix = model.name().condition_prefix();
    let mut ordered: Vec<CcId> = active.iter().copied().collect();
    ordered.sort_by(|a, b| catalog.sort_key(*a).cmp(&catalog.sort_key(*b)));

    ordered
        .into_iter()
        .map(|cc| {
            let term = format!("{prefix}{}", catalog.label(cc));
            let key = format!("{}{term}", segment.prefix());
            Ok(AppliedCoefficient {
                value: lookup(model, &key)?,
                key,
                term,
                kind: CoefficientKind::Condition,
            })
        })
        .collect()
}

pub(super) fn sorted_labels<I>(ids: I, model: &ModelDefinition) -> Vec<String>
where
    I: Iterator<Item = CcId>,
{
    let catalog = model.catalog();
    let mut ids: Vec<CcId> = ids.collect();
    ids.sort_by(|a, b| catalog.sort_key(*a).cmp(&catalog.sort_key(*b)));
    ids.dedup();
    ids.into_iter()
        .map(|cc| catalog.label(cc).to_string())
        .collect()
}

/// Sums the terms in a fixed order so repeated calculations are bit-identical.
pub(super) fn assemble(parts: Parts<'_>) -> RafResult {
    let Parts {
        model,
        active,
        demographic,
        conditions,
        fired,
        demographics,
        diagnostics,
    } = parts;
    let catalog = model.catalog();

    let risk_score_demographics: f64 = demographic.coefficients.iter().map(|c| c.value).sum();
    let condition_total: f64 = conditions.iter().map(|c| c.value).sum();
    let interaction_total: f64 = fired.iter().map(|f| f.value).sum();
    let risk_score_hcc = condition_total + interaction_total;

    let chronic_terms: BTreeSet<String> = active
        .keys()
        .filter(|cc| model.is_chronic(**cc))
        .map(|cc| format!("{}{}", model.name().condition_prefix(), catalog.label(*cc)))
        .collect();
    let risk_score_chronic_only: f64 = conditions
        .iter()
        .filter(|c| chronic_terms.contains(&c.term))
        .map(|c| c.value)
        .sum();

    let hcc_list = sorted_labels(active.keys().copied(), model);
    let cc_to_dx = active
        .iter()
        .map(|(cc, codes)| (catalog.label(*cc).to_string(), codes.clone()))
        .collect();

    let mut coefficients = demographic.coefficients;
    coefficients.extend(conditions);
    coefficients.extend(fired.iter().map(|f| AppliedCoefficient {
        key: f.coefficient.clone(),
        term: f.rule.clone(),
        kind: CoefficientKind::Interaction,
        value: f.value,
    }));

    let mut interactions = demographic.fired;
    interactions.extend(fired);

    RafResult {
        model_name: model.name(),
        risk_score: risk_score_demographics + risk_score_hcc,
        risk_score_demographics,
        risk_score_hcc,
        risk_score_chronic_only,
        segment: demographic.segment.label(),
        age_sex_category: demographic.age_sex_category,
        hcc_list,
        cc_to_dx,
        coefficients,
        interactions,
        demographics,
        diagnostics,
    }
}
