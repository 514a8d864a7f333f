use crate::infra::build_calculator;
use clap::Args;
use hcc_raf::config::AppConfig;
use hcc_raf::error::AppError;
use hcc_raf::telemetry;
use hcc_raf::{DemographicsInput, RafCalculator};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Args, Debug, Default)]
pub(crate) struct ScoreArgs {
    /// Model label, e.g. "CMS-HCC Model V24". Defaults to HCC_DEFAULT_MODEL.
    #[arg(long)]
    pub(crate) model: Option<String>,
    /// Beneficiary age in years
    #[arg(long)]
    pub(crate) age: f64,
    /// Beneficiary sex (F/M or 2/1)
    #[arg(long)]
    pub(crate) sex: String,
    /// Dual eligibility code (00-10, NA)
    #[arg(long)]
    pub(crate) dual: Option<String>,
    /// Original reason for entitlement code
    #[arg(long)]
    pub(crate) orec: Option<String>,
    /// Current reason for entitlement code
    #[arg(long)]
    pub(crate) crec: Option<String>,
    #[arg(long)]
    pub(crate) new_enrollee: bool,
    #[arg(long)]
    pub(crate) snp: bool,
    #[arg(long)]
    pub(crate) low_income: bool,
    #[arg(long)]
    pub(crate) institutional: bool,
    /// Months since kidney transplant (ESRD models)
    #[arg(long)]
    pub(crate) graft_months: Option<u32>,
    /// Diagnosis codes, repeatable or comma separated
    #[arg(long = "dx", value_delimiter = ',', conflicts_with_all = ["service_data", "eob", "x12"])]
    pub(crate) diagnosis_codes: Vec<String>,
    /// JSON file holding an array of service-level records
    #[arg(long, conflicts_with_all = ["eob", "x12"])]
    pub(crate) service_data: Option<PathBuf>,
    /// JSON file holding ExplanationOfBenefit resources or a Bundle
    #[arg(long, conflicts_with = "x12")]
    pub(crate) eob: Option<PathBuf>,
    /// X12 837 interchange file
    #[arg(long)]
    pub(crate) x12: Option<PathBuf>,
    /// Score every record, skipping the eligibility filter (HCC_FILTER_CLAIMS=false has the same effect)
    #[arg(long)]
    pub(crate) no_filter: bool,
}

impl ScoreArgs {
    fn demographics(&self) -> DemographicsInput {
        DemographicsInput {
            age: Some(self.age),
            sex: Some(self.sex.clone()),
            dual_elgbl_cd: self.dual.clone(),
            orec: self.orec.clone(),
            crec: self.crec.clone(),
            new_enrollee: Some(self.new_enrollee),
            snp: Some(self.snp),
            low_income: Some(self.low_income),
            institutional: Some(self.institutional),
            graft_months: self.graft_months,
        }
    }
}

pub(crate) fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    let calculator = build_calculator(&config.scoring)?;

    let output = score(&calculator, &args)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub(crate) fn score(calculator: &RafCalculator, args: &ScoreArgs) -> Result<Value, AppError> {
    let model_name = args
        .model
        .as_deref()
        .unwrap_or(calculator.default_model().label());
    let demographics = args.demographics();
    let filter = !args.no_filter && calculator.filters_claims_by_default();

    let output = if let Some(path) = &args.eob {
        let payload = read_json(path)?;
        let scored = calculator.run_detailed(&payload, model_name, &demographics, filter)?;
        info!(
            records = scored.service_records.len(),
            filtered = scored.result.diagnostics.filtered_records,
            "scored explanation of benefit payload"
        );
        to_value(&scored)?
    } else if let Some(path) = &args.service_data {
        let payload = read_json(path)?;
        let scored = calculator.run_from_service_values(
            &payload,
            model_name,
            &demographics,
            filter,
        )?;
        to_value(&scored)?
    } else if let Some(path) = &args.x12 {
        let interchange = std::fs::read_to_string(path)?;
        let scored = calculator.run_from_x12(&interchange, model_name, &demographics, filter)?;
        info!(
            records = scored.service_records.len(),
            filtered = scored.result.diagnostics.filtered_records,
            "scored 837 interchange"
        );
        to_value(&scored)?
    } else {
        to_value(&calculator.calculate_raf(&args.diagnosis_codes, model_name, &demographics)?)?
    };

    Ok(output)
}

fn read_json(path: &Path) -> Result<Value, AppError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, AppError> {
    Ok(serde_json::to_value(value)?)
}
