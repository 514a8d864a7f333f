//! Model catalogue, reference data and the registry that serves loaded definitions.

mod definition;
mod loader;
mod registry;
mod rules;

pub use definition::{
    CategoryCatalog, CcId, CoefficientTable, Hierarchy, MappingCondition, MappingTarget,
    ModelDefinition, ModelDefinitionBuilder,
};
pub use loader::{LoadError, ReferenceTables};
pub use registry::ModelRegistry;
pub use rules::{Condition, InteractionRule, RuleScope};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Recognised risk adjustment model versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModelName {
    CmsHccV22,
    CmsHccV24,
    CmsHccV28,
    EsrdV21,
    EsrdV24,
    RxHccV08,
}

impl ModelName {
    pub const ALL: [ModelName; 6] = [
        ModelName::CmsHccV22,
        ModelName::CmsHccV24,
        ModelName::CmsHccV28,
        ModelName::EsrdV21,
        ModelName::EsrdV24,
        ModelName::RxHccV08,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ModelName::CmsHccV22 => "CMS-HCC Model V22",
            ModelName::CmsHccV24 => "CMS-HCC Model V24",
            ModelName::CmsHccV28 => "CMS-HCC Model V28",
            ModelName::EsrdV21 => "CMS-HCC ESRD Model V21",
            ModelName::EsrdV24 => "CMS-HCC ESRD Model V24",
            ModelName::RxHccV08 => "RxHCC Model V08",
        }
    }

    pub fn domain(self) -> ModelDomain {
        match self {
            ModelName::CmsHccV22 | ModelName::CmsHccV24 | ModelName::CmsHccV28 => {
                ModelDomain::General
            }
            ModelName::EsrdV21 | ModelName::EsrdV24 => ModelDomain::Esrd,
            ModelName::RxHccV08 => ModelDomain::PrescriptionDrug,
        }
    }

    /// Prefix used for condition coefficients (`HCC19`, `RXHCC45`).
    pub fn condition_prefix(self) -> &'static str {
        match self.domain() {
            ModelDomain::PrescriptionDrug => "RXHCC",
            _ => "HCC",
        }
    }

    /// Accepts the exact label, ignoring case and surrounding whitespace.
    pub fn parse(raw: &str) -> Result<Self, UnknownModelName> {
        let candidate = raw.trim();
        Self::ALL
            .into_iter()
            .find(|model| model.label().eq_ignore_ascii_case(candidate))
            .ok_or_else(|| UnknownModelName(raw.to_string()))
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ModelName {
    type Err = UnknownModelName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ModelName {
    type Error = UnknownModelName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ModelName> for String {
    fn from(value: ModelName) -> Self {
        value.label().to_string()
    }
}

/// Population a model is calibrated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelDomain {
    General,
    Esrd,
    PrescriptionDrug,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown model name '{0}'")]
pub struct UnknownModelName(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_labels_case_insensitively() {
        assert_eq!(
            ModelName::parse("  cms-hcc model v24 ").expect("parses"),
            ModelName::CmsHccV24
        );
        assert_eq!(
            "RxHCC Model V08".parse::<ModelName>().expect("parses"),
            ModelName::RxHccV08
        );
    }

    #[test]
    fn parse_rejects_unknown_versions() {
        let err = ModelName::parse("CMS-HCC Model V99").expect_err("unknown");
        assert_eq!(err.to_string(), "unknown model name 'CMS-HCC Model V99'");
    }

    #[test]
    fn serde_uses_the_label() {
        let json = serde_json::to_string(&ModelName::EsrdV21).expect("serializes");
        assert_eq!(json, "\"CMS-HCC ESRD Model V21\"");
        let parsed: ModelName = serde_json::from_str("\"CMS-HCC Model V28\"").expect("parses");
        assert_eq!(parsed, ModelName::CmsHccV28);
        assert!(serde_json::from_str::<ModelName>("\"V28\"").is_err());
    }

    #[test]
    fn domains_and_prefixes() {
        assert_eq!(ModelName::EsrdV24.domain(), ModelDomain::Esrd);
        assert_eq!(ModelName::RxHccV08.condition_prefix(), "RXHCC");
        assert_eq!(ModelName::CmsHccV22.condition_prefix(), "HCC");
    }
}
