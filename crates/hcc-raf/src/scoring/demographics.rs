use super::{lookup, AppliedCoefficient, CoefficientKind, FiredInteraction, RafError};
use crate::model::{ModelDefinition, ModelDomain, RuleScope};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

const FULL_DUAL_CODES: &[&str] = &["02", "04", "08"];
const PARTIAL_DUAL_CODES: &[&str] = &["01", "03", "05", "06"];
const NEW_ENROLLEE_MEDICAID_CODES: &[&str] = &["01", "02", "03", "04", "05", "06", "08"];
const KNOWN_DUAL_CODES: &[&str] = &[
    "NA", "99", "00", "01", "02", "03", "04", "05", "06", "07", "08", "09", "10",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "M")]
    Male,
}

impl Sex {
    /// Accepts `M`/`F` or the CMS numeric codes `1` (male) and `2` (female).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "F" | "2" => Some(Sex::Female),
            "M" | "1" => Some(Sex::Male),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Sex::Female => "F",
            Sex::Male => "M",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DualStatus {
    NonDual,
    Partial,
    Full,
}

/// Caller-supplied demographics; every field is optional so missing ones can be reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemographicsInput {
    pub age: Option<f64>,
    #[serde(deserialize_with = "code_or_number")]
    pub sex: Option<String>,
    #[serde(deserialize_with = "code_or_number")]
    pub dual_elgbl_cd: Option<String>,
    #[serde(deserialize_with = "code_or_number")]
    pub orec: Option<String>,
    #[serde(deserialize_with = "code_or_number")]
    pub crec: Option<String>,
    pub new_enrollee: Option<bool>,
    pub snp: Option<bool>,
    pub low_income: Option<bool>,
    pub institutional: Option<bool>,
    pub graft_months: Option<u32>,
}

impl DemographicsInput {
    pub fn new(age: f64, sex: &str) -> Self {
        Self {
            age: Some(age),
            sex: Some(sex.to_string()),
            ..Self::default()
        }
    }

    /// Checks mandatory fields and code sets, defaulting optional flags to their neutral values.
    pub fn validate(&self) -> Result<Demographics, RafError> {
        let age = match self.age {
            None => return Err(invalid("age is required")),
            Some(age) if !age.is_finite() || age < 0.0 => {
                return Err(invalid(format!("age must be a non-negative number, got {age}")))
            }
            Some(age) => age.floor() as u32,
        };

        let sex = match self.sex.as_deref() {
            None => return Err(invalid("sex is required")),
            Some(raw) => Sex::parse(raw)
                .ok_or_else(|| invalid(format!("sex must be one of M, F, 1, 2; got '{raw}'")))?,
        };

        let dual_elgbl_cd = match self.dual_elgbl_cd.as_deref().map(str::trim) {
            None | Some("") => "NA".to_string(),
            Some(raw) => {
                let code = normalize_dual_code(raw);
                if !KNOWN_DUAL_CODES.contains(&code.as_str()) {
                    return Err(invalid(format!("unrecognised dual eligibility code '{raw}'")));
                }
                code
            }
        };

        let orec = parse_entitlement_code("orec", self.orec.as_deref())?;
        let crec = parse_entitlement_code("crec", self.crec.as_deref())?;
        let new_enrollee = self.new_enrollee.unwrap_or(false);

        let non_aged = age <= 64;
        let disabled = age < 65 && orec != 0;
        let dual = if FULL_DUAL_CODES.contains(&dual_elgbl_cd.as_str()) {
            DualStatus::Full
        } else if PARTIAL_DUAL_CODES.contains(&dual_elgbl_cd.as_str()) {
            DualStatus::Partial
        } else {
            DualStatus::NonDual
        };

        Ok(Demographics {
            age,
            sex,
            new_enrollee_medicaid: new_enrollee
                && NEW_ENROLLEE_MEDICAID_CODES.contains(&dual_elgbl_cd.as_str()),
            dual_elgbl_cd,
            orec,
            crec,
            new_enrollee,
            snp: self.snp.unwrap_or(false),
            low_income: self.low_income.unwrap_or(false),
            institutional: self.institutional.unwrap_or(false),
            graft_months: self.graft_months,
            non_aged,
            disabled,
            orig_disabled: orec == 1 && !disabled,
            dual,
            esrd: matches!(orec, 2 | 3) || matches!(crec, 2 | 3),
        })
    }
}

/// Validated demographics with the derived status flags used by segment and rule selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Demographics {
    pub age: u32,
    pub sex: Sex,
    pub dual_elgbl_cd: String,
    pub orec: u8,
    pub crec: u8,
    pub new_enrollee: bool,
    pub snp: bool,
    pub low_income: bool,
    pub institutional: bool,
    pub graft_months: Option<u32>,
    pub non_aged: bool,
    pub disabled: bool,
    pub orig_disabled: bool,
    pub dual: DualStatus,
    pub new_enrollee_medicaid: bool,
    pub esrd: bool,
}

/// Coefficient segment; exactly one applies to a calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Community { dual: DualStatus, aged: bool },
    Institutional,
    NewEnrollee,
    SnpNewEnrollee,
    Dialysis,
    DialysisNewEnrollee,
    KidneyTransplant { months: u32 },
    RxCommunity { low_income: bool, aged: bool },
    RxInstitutional,
    RxInstitutionalNewEnrollee,
    RxNewEnrollee { low_income: bool },
}

impl Segment {
    pub fn select(demographics: &Demographics, domain: ModelDomain) -> Self {
        match domain {
            ModelDomain::General => {
                if demographics.institutional {
                    Segment::Institutional
                } else if demographics.new_enrollee {
                    if demographics.snp {
                        Segment::SnpNewEnrollee
                    } else {
                        Segment::NewEnrollee
                    }
                } else {
                    Segment::Community {
                        dual: demographics.dual,
                        aged: !demographics.non_aged,
                    }
                }
            }
            ModelDomain::Esrd => match demographics.graft_months {
                Some(months @ 1..=3) => Segment::KidneyTransplant { months },
                _ if demographics.new_enrollee => Segment::DialysisNewEnrollee,
                _ => Segment::Dialysis,
            },
            ModelDomain::PrescriptionDrug => {
                if demographics.institutional {
                    if demographics.new_enrollee {
                        Segment::RxInstitutionalNewEnrollee
                    } else {
                        Segment::RxInstitutional
                    }
                } else if demographics.new_enrollee {
                    Segment::RxNewEnrollee {
                        low_income: demographics.low_income,
                    }
                } else {
                    Segment::RxCommunity {
                        low_income: demographics.low_income,
                        aged: !demographics.non_aged,
                    }
                }
            }
        }
    }

    /// Coefficient key prefix, including the trailing underscore.
    pub fn prefix(&self) -> &'static str {
        match self {
            Segment::Community { dual, aged } => match (dual, aged) {
                (DualStatus::Full, true) => "CFA_",
                (DualStatus::Full, false) => "CFD_",
                (DualStatus::Partial, true) => "CPA_",
                (DualStatus::Partial, false) => "CPD_",
                (DualStatus::NonDual, true) => "CNA_",
                (DualStatus::NonDual, false) => "CND_",
            },
            Segment::Institutional => "INS_",
            Segment::NewEnrollee => "NE_",
            Segment::SnpNewEnrollee => "SNPNE_",
            Segment::Dialysis => "DI_",
            Segment::DialysisNewEnrollee => "DNE_",
            Segment::KidneyTransplant { .. } => "TRANSPLANT_KIDNEY_ONLY_",
            Segment::RxCommunity { low_income, aged } => match (low_income, aged) {
                (true, true) => "Rx_CE_LowAged_",
                (true, false) => "Rx_CE_LowNoAged_",
                (false, true) => "Rx_CE_NoLowAged_",
                (false, false) => "Rx_CE_NoLowNoAged_",
            },
            Segment::RxInstitutional => "Rx_CE_LTI_",
            Segment::RxInstitutionalNewEnrollee => "Rx_NE_LTI_",
            Segment::RxNewEnrollee { low_income: true } => "Rx_NE_Lo_",
            Segment::RxNewEnrollee { low_income: false } => "Rx_NE_NoLo_",
        }
    }

    pub fn label(&self) -> String {
        match self {
            Segment::KidneyTransplant { months } => format!("TRANSPLANT_KIDNEY_ONLY_{months}M"),
            other => other.prefix().trim_end_matches('_').to_string(),
        }
    }

    /// Whether condition and interaction coefficients are credited in this segment.
    pub fn scores_conditions(&self) -> bool {
        !matches!(
            self,
            Segment::NewEnrollee
                | Segment::SnpNewEnrollee
                | Segment::DialysisNewEnrollee
                | Segment::KidneyTransplant { .. }
                | Segment::RxNewEnrollee { .. }
                | Segment::RxInstitutionalNewEnrollee
        )
    }

    pub fn admits(&self, scope: RuleScope) -> bool {
        if !self.scores_conditions() {
            return false;
        }
        let institutional = matches!(self, Segment::Institutional | Segment::RxInstitutional);
        match scope {
            RuleScope::Any => true,
            RuleScope::Community => !institutional,
            RuleScope::Institutional => institutional,
        }
    }

    fn uses_new_enrollee_bands(&self) -> bool {
        matches!(
            self,
            Segment::NewEnrollee
                | Segment::SnpNewEnrollee
                | Segment::RxNewEnrollee { .. }
                | Segment::RxInstitutionalNewEnrollee
        )
    }

    /// Age/sex cell label such as `F65_69` or `NEM66`.
    pub fn age_sex_category(&self, demographics: &Demographics) -> String {
        let sex = demographics.sex.code();
        if self.uses_new_enrollee_bands() {
            let band = new_enrollee_band(demographics.age, demographics.orec != 0);
            format!("NE{sex}{band}")
        } else if matches!(self, Segment::DialysisNewEnrollee) {
            format!("NE{sex}{}", continuing_band(demographics.age))
        } else {
            format!("{sex}{}", continuing_band(demographics.age))
        }
    }

    fn demographic_key(&self, category: &str, demographics: &Demographics) -> String {
        match self {
            Segment::KidneyTransplant { .. } => self.label(),
            Segment::NewEnrollee | Segment::SnpNewEnrollee | Segment::DialysisNewEnrollee => {
                let medicaid = if demographics.new_enrollee_medicaid {
                    "MCAID"
                } else {
                    "NMCAID"
                };
                let origdis = if !demographics.non_aged && demographics.orec == 1 {
                    "ORIGDIS"
                } else {
                    "NORIGDIS"
                };
                format!("{}{medicaid}_{origdis}_{category}", self.prefix())
            }
            _ => format!("{}{category}", self.prefix()),
        }
    }
}

fn continuing_band(age: u32) -> &'static str {
    match age {
        0..=34 => "0_34",
        35..=44 => "35_44",
        45..=54 => "45_54",
        55..=59 => "55_59",
        60..=64 => "60_64",
        65..=69 => "65_69",
        70..=74 => "70_74",
        75..=79 => "75_79",
        80..=84 => "80_84",
        85..=89 => "85_89",
        90..=94 => "90_94",
        _ => "95_GT",
    }
}

/// Age 64 falls in the `65` cell unless the beneficiary entered Medicare through disability.
fn new_enrollee_band(age: u32, orec_nonzero: bool) -> &'static str {
    match age {
        0..=34 => "0_34",
        35..=44 => "35_44",
        45..=54 => "45_54",
        55..=59 => "55_59",
        60..=63 => "60_64",
        64 if orec_nonzero => "60_64",
        64 | 65 => "65",
        66 => "66",
        67 => "67",
        68 => "68",
        69 => "69",
        70..=74 => "70_74",
        75..=79 => "75_79",
        80..=84 => "80_84",
        85..=89 => "85_89",
        90..=94 => "90_94",
        _ => "95_GT",
    }
}

/// Demographic terms of one calculation: the age/sex cell plus any fired demographic rules.
#[derive(Debug, Clone, PartialEq)]
pub struct DemographicScore {
    pub segment: Segment,
    pub age_sex_category: String,
    pub coefficients: Vec<AppliedCoefficient>,
    pub fired: Vec<FiredInteraction>,
}

pub fn score_demographics(
    demographics: &Demographics,
    model: &ModelDefinition,
) -> Result<DemographicScore, RafError> {
    let segment = Segment::select(demographics, model.name().domain());
    let age_sex_category = segment.age_sex_category(demographics);
    let cell_key = segment.demographic_key(&age_sex_category, demographics);
    let cell = AppliedCoefficient {
        value: lookup(model, &cell_key)?,
        term: age_sex_category.clone(),
        key: cell_key,
        kind: CoefficientKind::Demographic,
    };

    let mut coefficients = vec![cell];
    let mut fired = Vec::new();
    let no_categories = BTreeSet::new();

    for rule in model.rules().iter().filter(|rule| rule.is_demographic()) {
        if !segment.admits(rule.scope()) || !rule.fires(&no_categories, demographics) {
            continue;
        }
        let key = format!("{}{}", segment.prefix(), rule.key());
        let value = lookup(model, &key)?;
        fired.push(FiredInteraction {
            rule: rule.key().to_string(),
            coefficient: key.clone(),
            value,
            demographic: true,
        });
        coefficients.push(AppliedCoefficient {
            key,
            term: rule.key().to_string(),
            kind: CoefficientKind::Demographic,
            value,
        });
    }

    Ok(DemographicScore {
        segment,
        age_sex_category,
        coefficients,
        fired,
    })
}

fn invalid(message: impl Into<String>) -> RafError {
    RafError::InvalidInput(message.into())
}

fn normalize_dual_code(raw: &str) -> String {
    let code = raw.trim().to_ascii_uppercase();
    if code.len() == 1 && code.chars().all(|c| c.is_ascii_digit()) {
        format!("0{code}")
    } else {
        code
    }
}

fn parse_entitlement_code(field: &str, raw: Option<&str>) -> Result<u8, RafError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(0),
        Some(value) => value
            .parse::<u8>()
            .ok()
            .filter(|code| *code <= 3)
            .ok_or_else(|| invalid(format!("{field} must be one of 0, 1, 2, 3; got '{value}'"))),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CodeValue {
    Text(String),
    Number(i64),
}

fn code_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<CodeValue>::deserialize(deserializer)?;
    Ok(value.map(|value| match value {
        CodeValue::Text(text) => text,
        CodeValue::Number(number) => number.to_string(),
    }))
}
