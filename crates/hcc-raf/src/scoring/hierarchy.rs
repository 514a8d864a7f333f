use super::CategoryTrace;
use crate::model::{CcId, ModelDefinition};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Categories that survive hierarchy resolution, with their source codes.
    pub active: CategoryTrace,
    /// Suppressed categories mapped to the present categories that dominate them.
    pub trumped: BTreeMap<CcId, BTreeSet<CcId>>,
}

/// Removes model-excluded categories and companions whose partners are all absent.
///
/// Companion checks look at the set as mapped, before anything is removed. Returns the dropped
/// categories.
pub fn apply_category_rules(categories: &mut CategoryTrace, model: &ModelDefinition) -> BTreeSet<CcId> {
    let mut dropped: BTreeSet<CcId> = categories
        .keys()
        .copied()
        .filter(|cc| model.is_excluded(*cc))
        .collect();

    for (cc, partners) in model.companions() {
        if categories.contains_key(cc) && !partners.iter().any(|p| categories.contains_key(p)) {
            dropped.insert(*cc);
        }
    }

    for cc in &dropped {
        categories.remove(cc);
    }
    dropped
}

/// Drops every category dominated by another present category.
///
/// Dominance is evaluated against the full input set, so a suppressed parent still trumps its own
/// children and the outcome does not depend on evaluation order.
pub fn resolve_hierarchy(categories: &CategoryTrace, model: &ModelDefinition) -> Resolution {
    let hierarchy = model.hierarchy();
    let mut trumped: BTreeMap<CcId, BTreeSet<CcId>> = BTreeMap::new();

    for parent in categories.keys() {
        for child in hierarchy.children_of(*parent) {
            if categories.contains_key(child) {
                trumped.entry(*child).or_default().insert(*parent);
            }
        }
    }

    let active = categories
        .iter()
        .filter(|(cc, _)| !trumped.contains_key(cc))
        .map(|(cc, codes)| (*cc, codes.clone()))
        .collect();

    Resolution { active, trumped }
}
