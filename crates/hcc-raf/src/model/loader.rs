use super::definition::{MappingCondition, ModelDefinition, ModelDefinitionBuilder};
use super::ModelName;
use crate::scoring::Sex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeSet, HashSet};
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

pub const DX_TO_CC_FILE: &str = "ra_dx_to_cc.csv";
pub const HIERARCHIES_FILE: &str = "ra_hierarchies.csv";
pub const COEFFICIENTS_FILE: &str = "ra_coefficients.csv";
pub const CHRONIC_FILE: &str = "hcc_is_chronic.csv";
pub const ELIGIBLE_PROCEDURES_FILE: &str = "ra_eligible_cpt_hcpcs.csv";

const BUNDLED_DX_TO_CC: &str = include_str!("../../data/ra_dx_to_cc.csv");
const BUNDLED_HIERARCHIES: &str = include_str!("../../data/ra_hierarchies.csv");
const BUNDLED_COEFFICIENTS: &str = include_str!("../../data/ra_coefficients.csv");
const BUNDLED_CHRONIC: &str = include_str!("../../data/hcc_is_chronic.csv");
const BUNDLED_ELIGIBLE_PROCEDURES: &str = include_str!("../../data/ra_eligible_cpt_hcpcs.csv");

/// Failure while reading or assembling reference data.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{file} line {line}: {message}")]
    Malformed {
        file: &'static str,
        line: u64,
        message: String,
    },
    #[error("hierarchy for {model} contains a cycle through CC {cc}")]
    Cycle { model: ModelName, cc: String },
    #[error("{model} defines more than {limit} condition categories (first rejected: {label})")]
    TooManyCategories {
        model: ModelName,
        limit: usize,
        label: String,
    },
}

/// Parsed reference tables for every recognised model, prior to building definitions.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTables {
    mappings: Vec<(ModelName, ParsedMapping)>,
    hierarchies: Vec<(ModelName, HierarchyRow)>,
    coefficients: Vec<(ModelName, CoefficientRow)>,
    chronic: Vec<(ModelName, String)>,
    eligible_procedures: Vec<String>,
}

impl ReferenceTables {
    /// Sample tables compiled into the crate.
    pub fn bundled() -> Result<Self, LoadError> {
        Self::from_readers(
            BUNDLED_DX_TO_CC.as_bytes(),
            BUNDLED_HIERARCHIES.as_bytes(),
            BUNDLED_COEFFICIENTS.as_bytes(),
            BUNDLED_CHRONIC.as_bytes(),
            BUNDLED_ELIGIBLE_PROCEDURES.as_bytes(),
        )
    }

    /// Reads the five table files from a directory.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, LoadError> {
        let dir = dir.as_ref();
        let open = |name: &str| {
            let path = dir.join(name);
            std::fs::File::open(&path).map_err(|source| LoadError::Io {
                path: path.display().to_string(),
                source,
            })
        };

        Self::from_readers(
            open(DX_TO_CC_FILE)?,
            open(HIERARCHIES_FILE)?,
            open(COEFFICIENTS_FILE)?,
            open(CHRONIC_FILE)?,
            open(ELIGIBLE_PROCEDURES_FILE)?,
        )
    }

    pub fn from_readers<A, B, C, D, E>(
        dx_to_cc: A,
        hierarchies: B,
        coefficients: C,
        chronic: D,
        eligible_procedures: E,
    ) -> Result<Self, LoadError>
    where
        A: Read,
        B: Read,
        C: Read,
        D: Read,
        E: Read,
    {
        let mappings = with_known_models(
            DX_TO_CC_FILE,
            read_rows::<MappingRow, _>(DX_TO_CC_FILE, dx_to_cc)?,
        );
        let hierarchies = with_known_models(
            HIERARCHIES_FILE,
            read_rows::<HierarchyRow, _>(HIERARCHIES_FILE, hierarchies)?,
        );
        let coefficients = with_known_models(
            COEFFICIENTS_FILE,
            read_rows::<CoefficientRow, _>(COEFFICIENTS_FILE, coefficients)?,
        );

        let mut chronic_rows = Vec::new();
        for (line, row) in with_known_models(
            CHRONIC_FILE,
            read_rows::<ChronicRow, _>(CHRONIC_FILE, chronic)?,
        ) {
            if row.1.is_chronic(line)? {
                chronic_rows.push((row.0, row.1.cc));
            }
        }

        let eligible_procedures = read_rows::<ProcedureRow, _>(
            ELIGIBLE_PROCEDURES_FILE,
            eligible_procedures,
        )?
        .into_iter()
        .map(|(_, row)| row.procedure_code.to_ascii_uppercase())
        .filter(|code| !code.is_empty())
        .collect::<Vec<_>>();

        let mut mapping_rows = Vec::with_capacity(mappings.len());
        for (line, (model, row)) in mappings {
            let condition = row.condition(line)?;
            mapping_rows.push((
                model,
                ParsedMapping {
                    diagnosis_code: row.diagnosis_code,
                    cc: row.cc,
                    condition,
                },
            ));
        }

        let tables = Self {
            mappings: mapping_rows,
            hierarchies: hierarchies.into_iter().map(|(_, row)| row).collect(),
            coefficients: coefficients.into_iter().map(|(_, row)| row).collect(),
            chronic: chronic_rows,
            eligible_procedures,
        };

        info!(
            mappings = tables.mappings.len(),
            hierarchy_edges = tables.hierarchies.len(),
            coefficients = tables.coefficients.len(),
            eligible_procedures = tables.eligible_procedures.len(),
            "reference tables loaded"
        );

        Ok(tables)
    }

    /// Models with at least one diagnosis mapping row.
    pub fn models(&self) -> BTreeSet<ModelName> {
        self.mappings.iter().map(|(model, _)| *model).collect()
    }

    pub fn eligible_procedures(&self) -> &[String] {
        &self.eligible_procedures
    }

    /// Builds the immutable definition of one model from its rows.
    pub fn definition(&self, model: ModelName) -> Result<ModelDefinition, LoadError> {
        let mut builder = ModelDefinitionBuilder::new(model);

        for (_, row) in self.mappings.iter().filter(|(name, _)| *name == model) {
            builder.add_mapping(&row.diagnosis_code, &row.cc, row.condition);
        }
        for (_, row) in self.hierarchies.iter().filter(|(name, _)| *name == model) {
            builder.add_edge(&row.cc_parent, &row.cc_child);
        }
        for (_, row) in self.coefficients.iter().filter(|(name, _)| *name == model) {
            builder.add_coefficient(&row.coefficient, row.value);
        }
        for (_, cc) in self.chronic.iter().filter(|(name, _)| *name == model) {
            builder.add_chronic(cc);
        }

        builder.build()
    }
}

#[derive(Debug, Clone)]
struct ParsedMapping {
    diagnosis_code: String,
    cc: String,
    condition: MappingCondition,
}

trait ModelRow {
    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone, Deserialize)]
struct MappingRow {
    diagnosis_code: String,
    cc: String,
    model_name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    sex: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    age_min: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    age_max: Option<String>,
}

impl MappingRow {
    fn condition(&self, line: u64) -> Result<MappingCondition, LoadError> {
        let malformed = |message: String| LoadError::Malformed {
            file: DX_TO_CC_FILE,
            line,
            message,
        };

        let sex = match self.sex.as_deref() {
            None => None,
            Some(raw) => Some(
                Sex::parse(raw).ok_or_else(|| malformed(format!("invalid sex '{raw}'")))?,
            ),
        };
        let bound = |raw: Option<&str>, column: &str| -> Result<Option<u32>, LoadError> {
            raw.map(|value| {
                value
                    .parse::<u32>()
                    .map_err(|_| malformed(format!("invalid {column} '{value}'")))
            })
            .transpose()
        };

        Ok(MappingCondition {
            sex,
            age_min: bound(self.age_min.as_deref(), "age_min")?,
            age_max: bound(self.age_max.as_deref(), "age_max")?,
        })
    }
}

impl ModelRow for MappingRow {
    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[derive(Debug, Clone, Deserialize)]
struct HierarchyRow {
    cc_parent: String,
    cc_child: String,
    model_name: String,
}

impl ModelRow for HierarchyRow {
    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CoefficientRow {
    coefficient: String,
    value: f64,
    model_name: String,
}

impl ModelRow for CoefficientRow {
    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ChronicRow {
    cc: String,
    is_chronic: String,
    model_name: String,
}

impl ChronicRow {
    fn is_chronic(&self, line: u64) -> Result<bool, LoadError> {
        match self.is_chronic.to_ascii_uppercase().as_str() {
            "Y" | "YES" | "TRUE" | "1" => Ok(true),
            "N" | "NO" | "FALSE" | "0" => Ok(false),
            other => Err(LoadError::Malformed {
                file: CHRONIC_FILE,
                line,
                message: format!("invalid is_chronic flag '{other}'"),
            }),
        }
    }
}

impl ModelRow for ChronicRow {
    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ProcedureRow {
    procedure_code: String,
}

fn read_rows<T, R>(file: &'static str, reader: R) -> Result<Vec<(u64, T)>, LoadError>
where
    T: DeserializeOwned,
    R: Read,
{
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut rows = Vec::new();

    for (index, record) in csv_reader.deserialize::<T>().enumerate() {
        let line = index as u64 + 2;
        let row = record.map_err(|err| LoadError::Malformed {
            file,
            line: err.position().map_or(line, |position| position.line()),
            message: err.to_string(),
        })?;
        rows.push((line, row));
    }

    Ok(rows)
}

/// Keeps rows naming a recognised model; unknown names are reported once per file.
fn with_known_models<T: ModelRow>(
    file: &'static str,
    rows: Vec<(u64, T)>,
) -> Vec<(u64, (ModelName, T))> {
    let mut skipped = HashSet::new();
    let mut kept = Vec::with_capacity(rows.len());

    for (line, row) in rows {
        match ModelName::parse(row.model_name()) {
            Ok(model) => kept.push((line, (model, row))),
            Err(_) => {
                if skipped.insert(row.model_name().to_string()) {
                    warn!(file, line, model = row.model_name(), "skipping rows for unknown model");
                }
            }
        }
    }

    kept
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
