use crate::claims::{
    unique_diagnosis_codes, ClaimExtractor, ClaimFilter, EligibilityFilter, FhirEobExtractor,
    ServiceLevelRecord, X12ClaimExtractor,
};
use crate::model::{LoadError, ModelDefinition, ModelName, ModelRegistry, ReferenceTables};
use crate::scoring::{self, Demographics, DemographicsInput, RafError, RafResult};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// A score together with the service records it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredClaims {
    pub result: RafResult,
    pub service_records: Vec<ServiceLevelRecord>,
}

/// One member of a population batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationRequest {
    pub diagnosis_codes: Vec<String>,
    pub model_name: Option<String>,
    pub demographics: DemographicsInput,
}

/// Entry point composing the model registry with the extraction and filter collaborators.
pub struct RafCalculator<E = FhirEobExtractor, F = EligibilityFilter> {
    registry: Arc<ModelRegistry>,
    extractor: Arc<E>,
    filter: Arc<F>,
    default_model: ModelName,
    filter_claims: bool,
}

impl RafCalculator {
    /// Calculator over the reference tables shipped with the crate.
    pub fn bundled() -> Result<Self, LoadError> {
        Self::from_tables(&ReferenceTables::bundled()?)
    }

    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, LoadError> {
        Self::from_tables(&ReferenceTables::from_dir(dir)?)
    }

    pub fn from_tables(tables: &ReferenceTables) -> Result<Self, LoadError> {
        Ok(Self::new(
            Arc::new(ModelRegistry::from_tables(tables)?),
            Arc::new(FhirEobExtractor),
            Arc::new(EligibilityFilter::from_tables(tables)),
        ))
    }
}

impl<E, F> RafCalculator<E, F>
where
    E: ClaimExtractor + 'static,
    F: ClaimFilter + 'static,
{
    pub fn new(registry: Arc<ModelRegistry>, extractor: Arc<E>, filter: Arc<F>) -> Self {
        Self {
            registry,
            extractor,
            filter,
            default_model: ModelName::CmsHccV28,
            filter_claims: true,
        }
    }

    pub fn with_default_model(mut self, model: ModelName) -> Self {
        self.default_model = model;
        self
    }

    /// Whether clinical-resource scoring filters records when the caller does not say.
    pub fn with_claim_filtering(mut self, enabled: bool) -> Self {
        self.filter_claims = enabled;
        self
    }

    pub fn default_model(&self) -> ModelName {
        self.default_model
    }

    pub fn filters_claims_by_default(&self) -> bool {
        self.filter_claims
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Scores a bare diagnosis list. An empty list yields a demographics-only score.
    pub fn calculate_raf<I, S>(
        &self,
        diagnosis_codes: I,
        model_name: &str,
        demographics: &DemographicsInput,
    ) -> Result<RafResult, RafError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (model, demographics) = self.prepare(model_name, demographics)?;
        scoring::score(&model, diagnosis_codes, demographics)
    }

    /// Scores records that were already filtered upstream; no eligibility filter is applied.
    pub fn run_from_service_data(
        &self,
        records: &[ServiceLevelRecord],
        model_name: &str,
        demographics: &DemographicsInput,
    ) -> Result<RafResult, RafError> {
        let (model, demographics) = self.prepare(model_name, demographics)?;
        scoring::score(&model, unique_diagnosis_codes(records), demographics)
    }

    /// Validates loosely-typed records at the boundary, optionally filters, then scores.
    pub fn run_from_service_values(
        &self,
        records: &Value,
        model_name: &str,
        demographics: &DemographicsInput,
        filter_enabled: bool,
    ) -> Result<ScoredClaims, RafError> {
        let (model, demographics) = self.prepare(model_name, demographics)?;
        let records = ServiceLevelRecord::from_values(records)?;
        self.score_records(&model, records, demographics, filter_enabled)
    }

    /// Extracts service records from an ExplanationOfBenefit payload without scoring them.
    pub fn extract_service_data(&self, payload: &Value) -> Result<Vec<ServiceLevelRecord>, RafError> {
        let resources = FhirEobExtractor::resources(payload)?;
        let records = self.extractor.extract(&resources)?;
        debug!(
            resources = resources.len(),
            records = records.len(),
            "extracted service records"
        );
        Ok(records)
    }

    /// Scores clinical resources end to end.
    pub fn run(
        &self,
        payload: &Value,
        model_name: &str,
        demographics: &DemographicsInput,
        filter_enabled: bool,
    ) -> Result<RafResult, RafError> {
        self.run_detailed(payload, model_name, demographics, filter_enabled)
            .map(|scored| scored.result)
    }

    pub fn run_detailed(
        &self,
        payload: &Value,
        model_name: &str,
        demographics: &DemographicsInput,
        filter_enabled: bool,
    ) -> Result<ScoredClaims, RafError> {
        let (model, demographics) = self.prepare(model_name, demographics)?;
        let records = self.extract_service_data(payload)?;
        self.score_records(&model, records, demographics, filter_enabled)
    }

    /// Scores an X12 837 interchange, one service record per SV1/SV2 line.
    pub fn run_from_x12(
        &self,
        interchange: &str,
        model_name: &str,
        demographics: &DemographicsInput,
        filter_enabled: bool,
    ) -> Result<ScoredClaims, RafError> {
        let (model, demographics) = self.prepare(model_name, demographics)?;
        let records = X12ClaimExtractor.parse(interchange)?;
        debug!(records = records.len(), "extracted 837 service records");
        self.score_records(&model, records, demographics, filter_enabled)
    }

    /// Scores independent requests in parallel, returning one outcome per request in input order.
    pub fn score_population(
        &self,
        requests: &[PopulationRequest],
    ) -> Vec<Result<RafResult, RafError>> {
        requests
            .par_iter()
            .map(|request| {
                let model_name = request
                    .model_name
                    .as_deref()
                    .unwrap_or(self.default_model.label());
                self.calculate_raf(&request.diagnosis_codes, model_name, &request.demographics)
            })
            .collect()
    }

    /// Input checks run before any scoring: model name, then demographics, then registry lookup.
    fn prepare(
        &self,
        model_name: &str,
        demographics: &DemographicsInput,
    ) -> Result<(Arc<ModelDefinition>, Demographics), RafError> {
        let name = ModelName::parse(model_name)?;
        let demographics = demographics.validate()?;
        let model = self.registry.get(name)?;
        Ok((model, demographics))
    }

    fn score_records(
        &self,
        model: &ModelDefinition,
        records: Vec<ServiceLevelRecord>,
        demographics: Demographics,
        filter_enabled: bool,
    ) -> Result<ScoredClaims, RafError> {
        let received = records.len();
        let service_records = if filter_enabled {
            self.filter.filter(records)
        } else {
            records
        };
        let filtered_records = received - service_records.len();
        if filtered_records > 0 {
            debug!(received, filtered_records, "service records removed by eligibility filter");
        }

        let mut result = scoring::score(
            model,
            unique_diagnosis_codes(&service_records),
            demographics,
        )?;
        result.diagnostics.filtered_records = filtered_records;
        Ok(ScoredClaims {
            result,
            service_records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn calculator() -> RafCalculator {
        RafCalculator::bundled().expect("bundled tables load")
    }

    #[test]
    fn unknown_model_is_rejected_before_demographics() {
        let err = calculator()
            .calculate_raf(["E119"], "CMS-HCC Model V99", &DemographicsInput::default())
            .expect_err("unknown model");
        assert_eq!(err, RafError::UnknownModel("CMS-HCC Model V99".to_string()));
    }

    #[test]
    fn missing_sex_is_invalid_input() {
        let demographics = DemographicsInput {
            age: Some(70.0),
            ..DemographicsInput::default()
        };
        let err = calculator()
            .calculate_raf(["E119"], "CMS-HCC Model V24", &demographics)
            .expect_err("sex missing");
        assert!(matches!(err, RafError::InvalidInput(_)));
    }

    #[test]
    fn unloaded_model_is_a_configuration_error() {
        let calculator = RafCalculator::new(
            Arc::new(ModelRegistry::default()),
            Arc::new(FhirEobExtractor),
            Arc::new(EligibilityFilter::default()),
        );
        let err = calculator
            .calculate_raf(["E119"], "RxHCC Model V08", &DemographicsInput::new(70.0, "F"))
            .expect_err("not loaded");
        assert_eq!(
            err,
            RafError::Configuration {
                model: ModelName::RxHccV08
            }
        );
    }

    #[test]
    fn service_values_report_filtered_records() {
        let records = json!([
            {
                "claim_type": "71",
                "procedure_code": "99213",
                "claim_diagnosis_codes": ["E119"],
                "service_date": "2024-02-01"
            },
            {
                "claim_type": "71",
                "procedure_code": "36415",
                "claim_diagnosis_codes": ["I509"],
                "service_date": "2024-02-02"
            }
        ]);
        let demographics = DemographicsInput::new(67.0, "F");
        let calculator = calculator();

        let filtered = calculator
            .run_from_service_values(&records, "CMS-HCC Model V24", &demographics, true)
            .expect("scores");
        assert_eq!(filtered.service_records.len(), 1);
        assert_eq!(filtered.result.diagnostics.filtered_records, 1);
        assert_eq!(filtered.result.hcc_list, vec!["19"]);

        let unfiltered = calculator
            .run_from_service_values(&records, "CMS-HCC Model V24", &demographics, false)
            .expect("scores");
        assert_eq!(unfiltered.result.hcc_list, vec!["19", "85"]);
    }

    #[test]
    fn x12_interchange_is_scored_through_the_filter() {
        let interchange = "ST*837*0001*005010X222A1~
            NM1*IL*1*DOE*JANE****MI*12345~
            CLM*A1*125***11:B:1~
            HI*ABK:E119*ABF:I509~
            LX*1~
            SV1*HC:99213*50*UN*1*11**1~
            DTP*472*D8*20240214~
            LX*2~
            SV1*HC:36415*75*UN*1*11**2~
            DTP*472*D8*20240214~
            SE*10*0001~";
        let demographics = DemographicsInput::new(67.0, "F");
        let calculator = calculator();

        let filtered = calculator
            .run_from_x12(interchange, "CMS-HCC Model V24", &demographics, true)
            .expect("scores");
        assert_eq!(filtered.service_records.len(), 1);
        assert_eq!(filtered.result.diagnostics.filtered_records, 1);
        // Claim-level HI codes travel with every line, so the surviving office visit carries both.
        assert_eq!(filtered.result.hcc_list, vec!["19", "85"]);

        let err = calculator
            .run_from_x12("", "CMS-HCC Model V24", &demographics, true)
            .expect_err("empty interchange");
        assert!(matches!(err, RafError::InvalidInput(_)));
    }

    #[test]
    fn population_results_keep_request_order() {
        let requests = vec![
            PopulationRequest {
                diagnosis_codes: vec!["E119".into()],
                model_name: Some("CMS-HCC Model V24".into()),
                demographics: DemographicsInput::new(67.0, "F"),
            },
            PopulationRequest {
                diagnosis_codes: vec!["E119".into()],
                model_name: Some("nonsense".into()),
                demographics: DemographicsInput::new(67.0, "F"),
            },
            PopulationRequest {
                diagnosis_codes: vec![],
                model_name: None,
                demographics: DemographicsInput::new(80.0, "M"),
            },
        ];

        let results = calculator().score_population(&requests);
        assert_eq!(results.len(), 3);
        assert_eq!(
            results[0].as_ref().expect("scored").model_name,
            ModelName::CmsHccV24
        );
        assert!(matches!(results[1], Err(RafError::UnknownModel(_))));
        assert_eq!(
            results[2].as_ref().expect("scored").model_name,
            ModelName::CmsHccV28
        );
    }
}
