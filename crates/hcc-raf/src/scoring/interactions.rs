use super::{lookup, Demographics, FiredInteraction, RafError, Segment};
use crate::model::{CcId, ModelDefinition};
use std::collections::BTreeSet;

/// Evaluates the model's clinical interaction rules against the post-hierarchy categories.
///
/// Demographic-only rules are credited with the age/sex cell instead.
pub fn score_interactions(
    active: &BTreeSet<CcId>,
    demographics: &Demographics,
    segment: Segment,
    model: &ModelDefinition,
) -> Result<Vec<FiredInteraction>, RafError> {
    let mut fired = Vec::new();

    for rule in model.rules() {
        if rule.is_demographic() || !segment.admits(rule.scope()) {
            continue;
        }
        if !rule.fires(active, demographics) {
            continue;
        }
        let coefficient = format!("{}{}", segment.prefix(), rule.key());
        fired.push(FiredInteraction {
            rule: rule.key().to_string(),
            value: lookup(model, &coefficient)?,
            coefficient,
            demographic: false,
        });
    }

    Ok(fired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelDomain, ModelName};
    use crate::scoring::DemographicsInput;

    fn model() -> ModelDefinition {
        ModelDefinition::builder(ModelName::CmsHccV24)
            .map("E119", "19")
            .map("I509", "85")
            .coefficient("CNA_DIABETES_CHF", 0.121)
            .coefficient("CNA_D2", 0.0)
            .build()
            .expect("model builds")
    }

    fn active(model: &ModelDefinition, labels: &[&str]) -> BTreeSet<CcId> {
        labels
            .iter()
            .filter_map(|label| model.catalog().get(label))
            .collect()
    }

    #[test]
    fn fires_interaction_and_count_rules() {
        let model = model();
        let demo = DemographicsInput::new(67.0, "F")
            .validate()
            .expect("valid demographics");
        let segment = Segment::select(&demo, ModelDomain::General);

        let fired = score_interactions(&active(&model, &["19", "85"]), &demo, segment, &model)
            .expect("coefficients present");
        let keys: Vec<&str> = fired.iter().map(|f| f.coefficient.as_str()).collect();

        assert_eq!(keys, vec!["CNA_DIABETES_CHF", "CNA_D2"]);
        assert!(fired.iter().all(|f| !f.demographic));
    }

    #[test]
    fn missing_interaction_coefficient_is_an_integrity_error() {
        let model = ModelDefinition::builder(ModelName::CmsHccV24)
            .map("E119", "19")
            .map("I509", "85")
            .build()
            .expect("model builds");
        let demo = DemographicsInput::new(67.0, "F")
            .validate()
            .expect("valid demographics");
        let segment = Segment::select(&demo, ModelDomain::General);

        let err = score_interactions(&active(&model, &["19", "85"]), &demo, segment, &model)
            .expect_err("table incomplete");
        assert!(matches!(err, RafError::Integrity { .. }));
    }
}
