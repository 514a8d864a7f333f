//! Interaction rule data and category-level adjustments per model.
//!
//! Rules are declared against category labels and resolved against a model's catalogue when the
//! definition is built, so the scoring engine only ever sees arena indices.

use super::definition::{CategoryCatalog, CcId};
use super::ModelName;
use crate::scoring::{Demographics, DualStatus, Sex};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

/// Segment family a rule is credited in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    Any,
    Community,
    Institutional,
}

/// One conjunct of an interaction rule, resolved against the model catalogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Category(CcId),
    AnyCategory(Vec<CcId>),
    CategoryCount { min: usize, max: usize },
    Disabled,
    NonAged,
    Aged,
    Female,
    Male,
    OriginallyDisabled,
    FullDual,
    PartialDual,
    AnyDual,
    Institutional,
}

impl Condition {
    pub fn holds(&self, active: &BTreeSet<CcId>, demographics: &Demographics) -> bool {
        match self {
            Condition::Category(cc) => active.contains(cc),
            Condition::AnyCategory(group) => group.iter().any(|cc| active.contains(cc)),
            Condition::CategoryCount { min, max } => (*min..=*max).contains(&active.len()),
            Condition::Disabled => demographics.disabled,
            Condition::NonAged => demographics.non_aged,
            Condition::Aged => !demographics.non_aged,
            Condition::Female => demographics.sex == Sex::Female,
            Condition::Male => demographics.sex == Sex::Male,
            Condition::OriginallyDisabled => demographics.orig_disabled,
            Condition::FullDual => demographics.dual == DualStatus::Full,
            Condition::PartialDual => demographics.dual == DualStatus::Partial,
            Condition::AnyDual => demographics.dual != DualStatus::NonDual,
            Condition::Institutional => demographics.institutional,
        }
    }

    fn is_clinical(&self) -> bool {
        matches!(
            self,
            Condition::Category(_) | Condition::AnyCategory(_) | Condition::CategoryCount { .. }
        )
    }
}

/// Conjunction of conditions activating the coefficient `segment prefix + key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionRule {
    key: &'static str,
    scope: RuleScope,
    conditions: Vec<Condition>,
}

impl InteractionRule {
    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn scope(&self) -> RuleScope {
        self.scope
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Rules without a clinical conjunct are reported with the demographic terms.
    pub fn is_demographic(&self) -> bool {
        !self.conditions.iter().any(Condition::is_clinical)
    }

    pub fn fires(&self, active: &BTreeSet<CcId>, demographics: &Demographics) -> bool {
        self.conditions
            .iter()
            .all(|condition| condition.holds(active, demographics))
    }
}

#[derive(Debug, Clone, Copy)]
enum Term {
    Cc(&'static str),
    AnyCc(&'static [&'static str]),
    Count(usize, usize),
    Disabled,
    NonAged,
    Aged,
    Female,
    Male,
    OrigDisabled,
    FullDual,
    PartialDual,
    AnyDual,
    Institutional,
}

#[derive(Clone, Copy)]
struct RuleSpec {
    key: &'static str,
    scope: RuleScope,
    terms: &'static [Term],
}

const fn rule(key: &'static str, scope: RuleScope, terms: &'static [Term]) -> RuleSpec {
    RuleSpec { key, scope, terms }
}

/// A category credited only alongside at least one of its companions.
pub(crate) struct CompanionSpec {
    pub(crate) category: &'static str,
    pub(crate) requires_any: &'static [&'static str],
}

struct ModelProfile {
    rules: &'static [RuleSpec],
    excluded: &'static [&'static str],
    companions: &'static [CompanionSpec],
}

use RuleScope::{Any, Community, Institutional as Ins};
use Term::*;

const CANCER: &[&str] = &["8", "9", "10", "11", "12"];
const DIABETES: &[&str] = &["17", "18", "19"];
const CARD_RESP_FAIL: &[&str] = &["82", "83", "84"];
const COPD_CF: &[&str] = &["110", "111", "112"];
const RENAL_V24: &[&str] = &["134", "135", "136", "137", "138"];
const RENAL_V22: &[&str] = &["134", "135", "136", "137"];
const SUD_V24: &[&str] = &["54", "55", "56"];
const PSYCH_V24: &[&str] = &["57", "58", "59", "60"];
const SUD_V22: &[&str] = &["54", "55"];
const PSYCH_V22: &[&str] = &["57", "58"];
const ULCER_V24: &[&str] = &["157", "158", "159"];
const ULCER_V22: &[&str] = &["157", "158"];

const DIABETES_V28: &[&str] = &["35", "36", "37", "38"];
const HF_V28: &[&str] = &["221", "222", "223", "224", "225", "226"];
const CHR_LUNG_V28: &[&str] = &["276", "277", "278", "279", "280"];
const KIDNEY_V28: &[&str] = &["326", "327", "328", "329"];
const CARD_RESP_FAIL_V28: &[&str] = &["211", "212", "213"];
const SUD_V28: &[&str] = &["135", "136", "137", "138", "139"];
const PSYCH_V28: &[&str] = &["151", "152", "153", "154", "155"];
const CANCER_V28: &[&str] = &["17", "18", "19", "20", "21", "22", "23"];
const NEURO_V28: &[&str] = &[
    "180", "181", "182", "190", "191", "192", "195", "196", "198", "199",
];
const ULCER_V28: &[&str] = &["379", "380", "381", "382"];

const COUNT_TERMS: [RuleSpec; 10] = [
    rule("D1", Any, &[Count(1, 1)]),
    rule("D2", Any, &[Count(2, 2)]),
    rule("D3", Any, &[Count(3, 3)]),
    rule("D4", Any, &[Count(4, 4)]),
    rule("D5", Any, &[Count(5, 5)]),
    rule("D6", Any, &[Count(6, 6)]),
    rule("D7", Any, &[Count(7, 7)]),
    rule("D8", Any, &[Count(8, 8)]),
    rule("D9", Any, &[Count(9, 9)]),
    rule("D10P", Any, &[Count(10, usize::MAX)]),
];

const ORIGINALLY_DISABLED: [RuleSpec; 2] = [
    rule(
        "OriginallyDisabled_Female",
        Any,
        &[Aged, OrigDisabled, Female],
    ),
    rule("OriginallyDisabled_Male", Any, &[Aged, OrigDisabled, Male]),
];

const V24_RULES: &[RuleSpec] = &[
    rule("HCC47_gCancer", Community, &[Cc("47"), AnyCc(CANCER)]),
    rule("DIABETES_CHF", Any, &[AnyCc(DIABETES), Cc("85")]),
    rule("CHF_gCopdCF", Any, &[Cc("85"), AnyCc(COPD_CF)]),
    rule("HCC85_gRenal_V24", Community, &[Cc("85"), AnyCc(RENAL_V24)]),
    rule(
        "gCopdCF_CARD_RESP_FAIL",
        Any,
        &[AnyCc(COPD_CF), AnyCc(CARD_RESP_FAIL)],
    ),
    rule("HCC85_HCC96", Community, &[Cc("85"), Cc("96")]),
    rule(
        "gSubstanceAbuse_gPsych",
        Community,
        &[AnyCc(SUD_V24), AnyCc(PSYCH_V24)],
    ),
    rule("SEPSIS_PRESSURE_ULCER", Ins, &[Cc("2"), AnyCc(ULCER_V24)]),
    rule("SEPSIS_ARTIF_OPENINGS", Ins, &[Cc("2"), Cc("188")]),
    rule("ART_OPENINGS_PRESS_ULCER", Ins, &[Cc("188"), AnyCc(ULCER_V24)]),
    rule("gCopdCF_ASP_SPEC_B_PNEUM", Ins, &[AnyCc(COPD_CF), Cc("114")]),
    rule("ASP_SPEC_B_PNEUM_PRES_ULC", Ins, &[Cc("114"), AnyCc(ULCER_V24)]),
    rule("SEPSIS_ASP_SPEC_BACT_PNEUM", Ins, &[Cc("2"), Cc("114")]),
    rule("SCHIZOPHRENIA_gCopdCF", Ins, &[Cc("57"), AnyCc(COPD_CF)]),
    rule("SCHIZOPHRENIA_CHF", Ins, &[Cc("57"), Cc("85")]),
    rule("SCHIZOPHRENIA_SEIZURES", Ins, &[Cc("57"), Cc("79")]),
    rule("DISABLED_HCC85", Ins, &[Disabled, Cc("85")]),
    rule("DISABLED_PRESSURE_ULCER", Ins, &[Disabled, AnyCc(ULCER_V24)]),
    rule("DISABLED_HCC161", Ins, &[Disabled, Cc("161")]),
    rule("DISABLED_HCC39", Ins, &[Disabled, Cc("39")]),
    rule("DISABLED_HCC77", Ins, &[Disabled, Cc("77")]),
    rule("DISABLED_HCC6", Ins, &[Disabled, Cc("6")]),
    ORIGINALLY_DISABLED[0],
    ORIGINALLY_DISABLED[1],
    rule("LTIMCAID", Ins, &[Institutional, AnyDual]),
    COUNT_TERMS[0],
    COUNT_TERMS[1],
    COUNT_TERMS[2],
    COUNT_TERMS[3],
    COUNT_TERMS[4],
    COUNT_TERMS[5],
    COUNT_TERMS[6],
    COUNT_TERMS[7],
    COUNT_TERMS[8],
    COUNT_TERMS[9],
];

const V22_RULES: &[RuleSpec] = &[
    rule("HCC47_gCancer", Community, &[Cc("47"), AnyCc(CANCER)]),
    rule(
        "HCC85_gDiabetesMellitus",
        Community,
        &[Cc("85"), AnyCc(DIABETES)],
    ),
    rule("HCC85_gCopdCF", Community, &[Cc("85"), AnyCc(COPD_CF)]),
    rule("HCC85_gRenal", Community, &[Cc("85"), AnyCc(RENAL_V22)]),
    rule(
        "gRespDepandArre_gCopdCF",
        Community,
        &[AnyCc(CARD_RESP_FAIL), AnyCc(COPD_CF)],
    ),
    rule("HCC85_HCC96", Community, &[Cc("85"), Cc("96")]),
    rule(
        "gSubstanceAbuse_gPsychiatric",
        Community,
        &[AnyCc(SUD_V22), AnyCc(PSYCH_V22)],
    ),
    rule("DIABETES_CHF", Ins, &[AnyCc(DIABETES), Cc("85")]),
    rule("CHF_gCopdCF", Ins, &[Cc("85"), AnyCc(COPD_CF)]),
    rule(
        "gCopdCF_CARD_RESP_FAIL",
        Ins,
        &[AnyCc(COPD_CF), AnyCc(CARD_RESP_FAIL)],
    ),
    rule("SEPSIS_PRESSURE_ULCER", Ins, &[Cc("2"), AnyCc(ULCER_V22)]),
    rule("SEPSIS_ARTIF_OPENINGS", Ins, &[Cc("2"), Cc("188")]),
    rule(
        "ART_OPENINGS_PRESSURE_ULCER",
        Ins,
        &[Cc("188"), AnyCc(ULCER_V22)],
    ),
    rule(
        "gCopdCF_ASP_SPEC_BACT_PNEUM",
        Ins,
        &[AnyCc(COPD_CF), Cc("114")],
    ),
    rule(
        "ASP_SPEC_BACT_PNEUM_PRES_ULC",
        Ins,
        &[Cc("114"), AnyCc(ULCER_V22)],
    ),
    rule("SEPSIS_ASP_SPEC_BACT_PNEUM", Ins, &[Cc("2"), Cc("114")]),
    rule("SCHIZOPHRENIA_gCopdCF", Ins, &[Cc("57"), AnyCc(COPD_CF)]),
    rule("SCHIZOPHRENIA_CHF", Ins, &[Cc("57"), Cc("85")]),
    rule("SCHIZOPHRENIA_SEIZURES", Ins, &[Cc("57"), Cc("79")]),
    rule("DISABLED_HCC85", Ins, &[Disabled, Cc("85")]),
    rule("DISABLED_PRESSURE_ULCER", Ins, &[Disabled, AnyCc(ULCER_V22)]),
    rule("DISABLED_HCC161", Ins, &[Disabled, Cc("161")]),
    rule("DISABLED_HCC39", Ins, &[Disabled, Cc("39")]),
    rule("DISABLED_HCC77", Ins, &[Disabled, Cc("77")]),
    rule("DISABLED_HCC6", Ins, &[Disabled, Cc("6")]),
    ORIGINALLY_DISABLED[0],
    ORIGINALLY_DISABLED[1],
    rule("LTIMCAID", Ins, &[Institutional, AnyDual]),
];

const V28_RULES: &[RuleSpec] = &[
    rule(
        "DIABETES_HF_V28",
        Any,
        &[AnyCc(DIABETES_V28), AnyCc(HF_V28)],
    ),
    rule("HF_CHR_LUNG_V28", Any, &[AnyCc(HF_V28), AnyCc(CHR_LUNG_V28)]),
    rule("HF_KIDNEY_V28", Any, &[AnyCc(HF_V28), AnyCc(KIDNEY_V28)]),
    rule(
        "CHR_LUNG_CARD_RESP_FAIL_V28",
        Any,
        &[AnyCc(CHR_LUNG_V28), AnyCc(CARD_RESP_FAIL_V28)],
    ),
    rule(
        "gSubUseDisorder_gPsych_V28",
        Any,
        &[AnyCc(SUD_V28), AnyCc(PSYCH_V28)],
    ),
    rule("DISABLED_CANCER_V28", Ins, &[Disabled, AnyCc(CANCER_V28)]),
    rule("DISABLED_NEURO_V28", Ins, &[Disabled, AnyCc(NEURO_V28)]),
    rule("DISABLED_HF_V28", Ins, &[Disabled, AnyCc(HF_V28)]),
    rule("DISABLED_CHR_LUNG_V28", Ins, &[Disabled, AnyCc(CHR_LUNG_V28)]),
    rule("DISABLED_ULCER_V28", Ins, &[Disabled, AnyCc(ULCER_V28)]),
    ORIGINALLY_DISABLED[0],
    ORIGINALLY_DISABLED[1],
    rule("LTIMCAID", Ins, &[Institutional, AnyDual]),
    COUNT_TERMS[0],
    COUNT_TERMS[1],
    COUNT_TERMS[2],
    COUNT_TERMS[3],
    COUNT_TERMS[4],
    COUNT_TERMS[5],
    COUNT_TERMS[6],
    COUNT_TERMS[7],
    COUNT_TERMS[8],
    COUNT_TERMS[9],
];

const ESRD_DEMOGRAPHIC_RULES: [RuleSpec; 12] = [
    ORIGINALLY_DISABLED[0],
    ORIGINALLY_DISABLED[1],
    rule("LTI_Aged", Any, &[Institutional, Aged]),
    rule("LTI_NonAged", Any, &[Institutional, NonAged]),
    rule("FBDual_Female_Aged", Any, &[FullDual, Female, Aged]),
    rule("FBDual_Female_NonAged", Any, &[FullDual, Female, NonAged]),
    rule("FBDual_Male_Aged", Any, &[FullDual, Male, Aged]),
    rule("FBDual_Male_NonAged", Any, &[FullDual, Male, NonAged]),
    rule("PBDual_Female_Aged", Any, &[PartialDual, Female, Aged]),
    rule("PBDual_Female_NonAged", Any, &[PartialDual, Female, NonAged]),
    rule("PBDual_Male_Aged", Any, &[PartialDual, Male, Aged]),
    rule("PBDual_Male_NonAged", Any, &[PartialDual, Male, NonAged]),
];

const ESRD_V24_RULES: &[RuleSpec] = &[
    rule("HCC47_gCancer", Any, &[Cc("47"), AnyCc(CANCER)]),
    rule("DIABETES_CHF", Any, &[AnyCc(DIABETES), Cc("85")]),
    rule("CHF_gCopdCF", Any, &[Cc("85"), AnyCc(COPD_CF)]),
    rule("HCC85_gRenal_V24", Any, &[Cc("85"), AnyCc(RENAL_V24)]),
    rule(
        "gCopdCF_CARD_RESP_FAIL",
        Any,
        &[AnyCc(COPD_CF), AnyCc(CARD_RESP_FAIL)],
    ),
    rule("HCC85_HCC96", Any, &[Cc("85"), Cc("96")]),
    rule(
        "gSubUseDs_gPsych_V24",
        Any,
        &[AnyCc(SUD_V24), AnyCc(PSYCH_V24)],
    ),
    rule(
        "NONAGED_gSubUseDs_gPsych",
        Any,
        &[NonAged, AnyCc(SUD_V24), AnyCc(PSYCH_V24)],
    ),
    rule("NONAGED_HCC6", Any, &[NonAged, Cc("6")]),
    rule("NONAGED_HCC34", Any, &[NonAged, Cc("34")]),
    rule("NONAGED_HCC46", Any, &[NonAged, Cc("46")]),
    rule("NONAGED_HCC110", Any, &[NonAged, Cc("110")]),
    rule("NONAGED_HCC176", Any, &[NonAged, Cc("176")]),
    rule(
        "SEPSIS_PRESSURE_ULCER_V24",
        Any,
        &[Cc("2"), AnyCc(ULCER_V24)],
    ),
    rule("SEPSIS_ARTIF_OPENINGS", Any, &[Cc("2"), Cc("188")]),
    rule(
        "ART_OPENINGS_PRESS_ULCER_V24",
        Any,
        &[Cc("188"), AnyCc(ULCER_V24)],
    ),
    rule("gCopdCF_ASP_SPEC_B_PNEUM", Any, &[AnyCc(COPD_CF), Cc("114")]),
    rule(
        "ASP_SPEC_B_PNEUM_PRES_ULC_V24",
        Any,
        &[Cc("114"), AnyCc(ULCER_V24)],
    ),
    rule("SEPSIS_ASP_SPEC_BACT_PNEUM", Any, &[Cc("2"), Cc("114")]),
    rule("SCHIZOPHRENIA_gCopdCF", Any, &[Cc("57"), AnyCc(COPD_CF)]),
    rule("SCHIZOPHRENIA_CHF", Any, &[Cc("57"), Cc("85")]),
    rule("SCHIZOPHRENIA_SEIZURES", Any, &[Cc("57"), Cc("79")]),
    rule("NONAGED_HCC85", Any, &[NonAged, Cc("85")]),
    rule(
        "NONAGED_PRESSURE_ULCER_V24",
        Any,
        &[NonAged, AnyCc(ULCER_V24)],
    ),
    rule("NONAGED_HCC161", Any, &[NonAged, Cc("161")]),
    rule("NONAGED_HCC39", Any, &[NonAged, Cc("39")]),
    rule("NONAGED_HCC77", Any, &[NonAged, Cc("77")]),
    ESRD_DEMOGRAPHIC_RULES[0],
    ESRD_DEMOGRAPHIC_RULES[1],
    ESRD_DEMOGRAPHIC_RULES[2],
    ESRD_DEMOGRAPHIC_RULES[3],
    ESRD_DEMOGRAPHIC_RULES[4],
    ESRD_DEMOGRAPHIC_RULES[5],
    ESRD_DEMOGRAPHIC_RULES[6],
    ESRD_DEMOGRAPHIC_RULES[7],
    ESRD_DEMOGRAPHIC_RULES[8],
    ESRD_DEMOGRAPHIC_RULES[9],
    ESRD_DEMOGRAPHIC_RULES[10],
    ESRD_DEMOGRAPHIC_RULES[11],
];

const ESRD_V21_RULES: &[RuleSpec] = &[
    rule(
        "SEPSIS_CARD_RESP_FAIL",
        Any,
        &[Cc("2"), AnyCc(CARD_RESP_FAIL)],
    ),
    rule("CANCER_IMMUNE", Any, &[AnyCc(CANCER), Cc("47")]),
    rule("DIABETES_CHF", Any, &[AnyCc(DIABETES), Cc("85")]),
    rule("CHF_COPD", Any, &[Cc("85"), AnyCc(COPD_CF)]),
    rule("CHF_RENAL", Any, &[Cc("85"), AnyCc(RENAL_V22)]),
    rule(
        "COPD_CARD_RESP_FAIL",
        Any,
        &[AnyCc(COPD_CF), AnyCc(CARD_RESP_FAIL)],
    ),
    rule("NONAGED_HCC6", Any, &[NonAged, Cc("6")]),
    rule("NONAGED_HCC34", Any, &[NonAged, Cc("34")]),
    rule("NONAGED_HCC46", Any, &[NonAged, Cc("46")]),
    rule("NONAGED_HCC54", Any, &[NonAged, Cc("54")]),
    rule("NONAGED_HCC55", Any, &[NonAged, Cc("55")]),
    rule("NONAGED_HCC110", Any, &[NonAged, Cc("110")]),
    rule("NONAGED_HCC176", Any, &[NonAged, Cc("176")]),
    rule("SEPSIS_PRESSURE_ULCER", Any, &[Cc("2"), AnyCc(ULCER_V22)]),
    rule("SEPSIS_ARTIF_OPENINGS", Any, &[Cc("2"), Cc("188")]),
    rule(
        "ART_OPENINGS_PRESSURE_ULCER",
        Any,
        &[Cc("188"), AnyCc(ULCER_V22)],
    ),
    rule("COPD_ASP_SPEC_BACT_PNEUM", Any, &[AnyCc(COPD_CF), Cc("114")]),
    rule(
        "ASP_SPEC_BACT_PNEUM_PRES_ULC",
        Any,
        &[Cc("114"), AnyCc(ULCER_V22)],
    ),
    rule("SEPSIS_ASP_SPEC_BACT_PNEUM", Any, &[Cc("2"), Cc("114")]),
    rule("SCHIZOPHRENIA_COPD", Any, &[Cc("57"), AnyCc(COPD_CF)]),
    rule("SCHIZOPHRENIA_CHF", Any, &[Cc("57"), Cc("85")]),
    rule("SCHIZOPHRENIA_SEIZURES", Any, &[Cc("57"), Cc("79")]),
    rule("NONAGED_HCC85", Any, &[NonAged, Cc("85")]),
    rule("NONAGED_PRESSURE_ULCER", Any, &[NonAged, AnyCc(ULCER_V22)]),
    rule("NONAGED_HCC161", Any, &[NonAged, Cc("161")]),
    rule("NONAGED_HCC39", Any, &[NonAged, Cc("39")]),
    rule("NONAGED_HCC77", Any, &[NonAged, Cc("77")]),
    ESRD_DEMOGRAPHIC_RULES[0],
    ESRD_DEMOGRAPHIC_RULES[1],
    ESRD_DEMOGRAPHIC_RULES[2],
    ESRD_DEMOGRAPHIC_RULES[3],
    ESRD_DEMOGRAPHIC_RULES[4],
    ESRD_DEMOGRAPHIC_RULES[5],
    ESRD_DEMOGRAPHIC_RULES[6],
    ESRD_DEMOGRAPHIC_RULES[7],
    ESRD_DEMOGRAPHIC_RULES[8],
    ESRD_DEMOGRAPHIC_RULES[9],
    ESRD_DEMOGRAPHIC_RULES[10],
    ESRD_DEMOGRAPHIC_RULES[11],
];

const RX_V08_RULES: &[RuleSpec] = &[
    rule("NonAged_RXHCC1", Any, &[NonAged, Cc("1")]),
    rule("NonAged_RXHCC130", Any, &[NonAged, Cc("130")]),
    rule("NonAged_RXHCC131", Any, &[NonAged, Cc("131")]),
    rule("NonAged_RXHCC132", Any, &[NonAged, Cc("132")]),
    rule("NonAged_RXHCC133", Any, &[NonAged, Cc("133")]),
    rule("NonAged_RXHCC159", Any, &[NonAged, Cc("159")]),
    rule("NonAged_RXHCC163", Any, &[NonAged, Cc("163")]),
];

const V28_COMPANIONS: &[CompanionSpec] = &[CompanionSpec {
    category: "223",
    requires_any: &["221", "222", "224", "225", "226"],
}];

fn profile(model: ModelName) -> ModelProfile {
    match model {
        ModelName::CmsHccV22 => ModelProfile {
            rules: V22_RULES,
            excluded: &[],
            companions: &[],
        },
        ModelName::CmsHccV24 => ModelProfile {
            rules: V24_RULES,
            excluded: &[],
            companions: &[],
        },
        ModelName::CmsHccV28 => ModelProfile {
            rules: V28_RULES,
            excluded: &[],
            companions: V28_COMPANIONS,
        },
        ModelName::EsrdV21 => ModelProfile {
            rules: ESRD_V21_RULES,
            excluded: &["134"],
            companions: &[],
        },
        ModelName::EsrdV24 => ModelProfile {
            rules: ESRD_V24_RULES,
            excluded: &["134", "135", "136", "137"],
            companions: &[],
        },
        ModelName::RxHccV08 => ModelProfile {
            rules: RX_V08_RULES,
            excluded: &[],
            companions: &[],
        },
    }
}

/// Resolves the model's rule data against its catalogue.
///
/// A rule naming a category the catalogue does not know can never fire and is dropped; groups
/// keep only their known members.
pub(crate) fn resolve_rules(model: ModelName, catalog: &CategoryCatalog) -> Vec<InteractionRule> {
    let mut resolved = Vec::new();

    'rules: for spec in profile(model).rules {
        let mut conditions = Vec::with_capacity(spec.terms.len());
        for term in spec.terms {
            let condition = match *term {
                Cc(label) => match catalog.get(label) {
                    Some(cc) => Condition::Category(cc),
                    None => {
                        debug!(model = %model, rule = spec.key, cc = label, "rule references unknown category");
                        continue 'rules;
                    }
                },
                AnyCc(group) => {
                    let members: Vec<CcId> =
                        group.iter().filter_map(|label| catalog.get(label)).collect();
                    if members.is_empty() {
                        debug!(model = %model, rule = spec.key, "rule group has no known categories");
                        continue 'rules;
                    }
                    Condition::AnyCategory(members)
                }
                Count(min, max) => Condition::CategoryCount { min, max },
                Disabled => Condition::Disabled,
                NonAged => Condition::NonAged,
                Aged => Condition::Aged,
                Female => Condition::Female,
                Male => Condition::Male,
                OrigDisabled => Condition::OriginallyDisabled,
                FullDual => Condition::FullDual,
                PartialDual => Condition::PartialDual,
                AnyDual => Condition::AnyDual,
                Term::Institutional => Condition::Institutional,
            };
            conditions.push(condition);
        }

        resolved.push(InteractionRule {
            key: spec.key,
            scope: spec.scope,
            conditions,
        });
    }

    resolved
}

pub(crate) fn excluded_categories(model: ModelName) -> &'static [&'static str] {
    profile(model).excluded
}

pub(crate) fn companion_requirements(model: ModelName) -> &'static [CompanionSpec] {
    profile(model).companions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::DemographicsInput;

    fn catalog(labels: &[&str]) -> CategoryCatalog {
        let mut catalog = CategoryCatalog::default();
        for label in labels {
            catalog.intern(label);
        }
        catalog
    }

    fn demographics(age: f64, sex: &str) -> Demographics {
        DemographicsInput::new(age, sex)
            .validate()
            .expect("valid demographics")
    }

    #[test]
    fn rules_with_unknown_categories_are_dropped() {
        let catalog = catalog(&["19", "85"]);
        let rules = resolve_rules(ModelName::CmsHccV24, &catalog);
        let keys: Vec<&str> = rules.iter().map(InteractionRule::key).collect();

        assert!(keys.contains(&"DIABETES_CHF"));
        assert!(keys.contains(&"DISABLED_HCC85"));
        assert!(!keys.contains(&"HCC85_HCC96"));
        assert!(keys.contains(&"D10P"));
        assert!(keys.contains(&"OriginallyDisabled_Female"));
    }

    #[test]
    fn demographic_rules_are_flagged() {
        let catalog = catalog(&["19", "85"]);
        let rules = resolve_rules(ModelName::CmsHccV24, &catalog);
        let by_key = |key: &str| {
            rules
                .iter()
                .find(|rule| rule.key() == key)
                .expect("rule present")
        };

        assert!(by_key("LTIMCAID").is_demographic());
        assert!(by_key("OriginallyDisabled_Male").is_demographic());
        assert!(!by_key("D1").is_demographic());
        assert!(!by_key("DISABLED_HCC85").is_demographic());
    }

    #[test]
    fn conjunctions_require_every_condition() {
        let catalog = catalog(&["19", "85"]);
        let rules = resolve_rules(ModelName::CmsHccV24, &catalog);
        let diabetes_chf = rules
            .iter()
            .find(|rule| rule.key() == "DIABETES_CHF")
            .expect("rule present");
        let demo = demographics(70.0, "F");
        let diabetes = catalog.get("19").expect("known");
        let chf = catalog.get("85").expect("known");

        let only_diabetes: BTreeSet<CcId> = [diabetes].into_iter().collect();
        let both: BTreeSet<CcId> = [diabetes, chf].into_iter().collect();

        assert!(!diabetes_chf.fires(&only_diabetes, &demo));
        assert!(diabetes_chf.fires(&both, &demo));
    }

    #[test]
    fn esrd_profiles_exclude_dialysis_status() {
        assert_eq!(excluded_categories(ModelName::EsrdV21), &["134"]);
        assert_eq!(excluded_categories(ModelName::EsrdV24).len(), 4);
        assert!(excluded_categories(ModelName::CmsHccV24).is_empty());
        assert_eq!(companion_requirements(ModelName::CmsHccV28)[0].category, "223");
    }
}
