use super::Demographics;
use crate::model::{CcId, ModelDefinition};
use std::collections::{BTreeMap, BTreeSet};

/// Categories with the input codes that produced each one.
pub type CategoryTrace = BTreeMap<CcId, BTreeSet<String>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedDiagnoses {
    pub categories: CategoryTrace,
    /// Codes the model has no mapping for.
    pub unmapped: BTreeSet<String>,
    /// Codes whose every mapping was refused by its age/sex condition.
    pub rejected: BTreeSet<String>,
}

/// Uppercases and strips everything but ASCII letters and digits (`e11.9` -> `E119`).
pub fn normalize_code(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

pub fn map_diagnoses<I, S>(
    codes: I,
    model: &ModelDefinition,
    demographics: &Demographics,
) -> MappedDiagnoses
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut mapped = MappedDiagnoses::default();

    for raw in codes {
        let code = normalize_code(raw.as_ref());
        if code.is_empty() {
            continue;
        }
        let Some(targets) = model.targets(&code) else {
            mapped.unmapped.insert(code);
            continue;
        };

        let mut admitted = false;
        for target in targets {
            if target.condition.admits(demographics.sex, demographics.age) {
                admitted = true;
                mapped
                    .categories
                    .entry(target.cc)
                    .or_default()
                    .insert(code.clone());
            }
        }
        if !admitted {
            mapped.rejected.insert(code);
        }
    }

    mapped
}
