//! ExplanationOfBenefit extraction using the CMS Blue Button code systems.

use super::record::ServiceLevelRecord;
use super::{ClaimExtractor, ExtractionError};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

const ICD10_CM: &str = "http://hl7.org/fhir/sid/icd-10-cm";
const ICD10: &str = "http://hl7.org/fhir/sid/icd-10";
const HCPCS: &str = "https://bluebutton.cms.gov/resources/codesystem/hcpcs";
const NPI: &str = "http://hl7.org/fhir/sid/us-npi";
const NDC: &str = "http://hl7.org/fhir/sid/ndc";
const SPECIALTY: &str = "https://bluebutton.cms.gov/resources/variables/prvdr_spclty";
const CARE_TEAM_ROLE: &str = "http://hl7.org/fhir/us/carin-bb/CodeSystem/C4BBClaimCareTeamRole";
const CLAIM_TYPE: &str = "https://bluebutton.cms.gov/resources/variables/nch_clm_type_cd";
const FACILITY_TYPE: &str = "https://bluebutton.cms.gov/resources/variables/clm_fac_type_cd";
const SERVICE_TYPE: &str = "https://bluebutton.cms.gov/resources/variables/clm_srvc_clsfctn_type_cd";
const PLACE_OF_SERVICE: &str = "https://bluebutton.cms.gov/resources/variables/line_place_of_srvc_cd";

#[derive(Debug, Clone, Copy, Default)]
pub struct FhirEobExtractor;

impl FhirEobExtractor {
    /// Flattens a bare resource, a Bundle or an array of either into candidate resources.
    pub fn resources(payload: &Value) -> Result<Vec<Value>, ExtractionError> {
        match payload {
            Value::Array(items) => {
                let mut resources = Vec::new();
                for item in items {
                    resources.extend(Self::resources(item)?);
                }
                Ok(resources)
            }
            Value::Object(object) => match object.get("resourceType").and_then(Value::as_str) {
                Some("Bundle") => Ok(object
                    .get("entry")
                    .and_then(Value::as_array)
                    .map(|entries| {
                        entries
                            .iter()
                            .filter_map(|entry| entry.get("resource").cloned())
                            .collect()
                    })
                    .unwrap_or_default()),
                _ => Ok(vec![payload.clone()]),
            },
            _ => Err(ExtractionError::UnsupportedPayload),
        }
    }

    /// Extracts one ExplanationOfBenefit; errors are reported rather than skipped.
    pub fn extract_one(&self, resource: &Value) -> Result<Vec<ServiceLevelRecord>, ExtractionError> {
        let eob = ExplanationOfBenefit::deserialize(resource)?;
        if eob.resource_type.as_deref() != Some("ExplanationOfBenefit") {
            return Err(ExtractionError::NotExplanationOfBenefit);
        }
        Ok(eob.into_records())
    }
}

impl ClaimExtractor for FhirEobExtractor {
    fn extract(&self, resources: &[Value]) -> Result<Vec<ServiceLevelRecord>, ExtractionError> {
        let mut records = Vec::new();
        for (index, resource) in resources.iter().enumerate() {
            match self.extract_one(resource) {
                Ok(extracted) => records.extend(extracted),
                Err(err) => warn!(index, error = %err, "skipping invalid ExplanationOfBenefit"),
            }
        }
        Ok(records)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ExplanationOfBenefit {
    resource_type: Option<String>,
    id: Option<String>,
    #[serde(rename = "type")]
    claim_type: Option<CodeableConcept>,
    diagnosis: Vec<Diagnosis>,
    item: Vec<Item>,
    care_team: Vec<CareTeamMember>,
    billable_period: Option<Period>,
    patient: Option<Reference>,
    facility: Option<Extensible>,
    contained: Vec<Contained>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Coding {
    system: Option<String>,
    code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Extension {
    url: String,
    value_coding: Option<Coding>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Extensible {
    extension: Vec<Extension>,
}

impl Extensible {
    fn extension_code(&self, url: &str) -> Option<String> {
        self.extension
            .iter()
            .filter(|ext| ext.url == url)
            .find_map(|ext| ext.value_coding.as_ref()?.code.clone())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CodeableConcept {
    coding: Vec<Coding>,
    extension: Vec<Extension>,
}

impl CodeableConcept {
    fn code(&self, system: &str) -> Option<String> {
        self.coding
            .iter()
            .filter(|coding| coding.system.as_deref() == Some(system))
            .find_map(|coding| coding.code.clone().filter(|code| !code.is_empty()))
    }

    fn extension_code(&self, url: &str) -> Option<String> {
        self.extension
            .iter()
            .filter(|ext| ext.url == url)
            .find_map(|ext| ext.value_coding.as_ref()?.code.clone())
    }

    fn codes(&self) -> impl Iterator<Item = &str> + '_ {
        self.coding.iter().filter_map(|coding| coding.code.as_deref())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Period {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl Period {
    fn service_date(&self) -> Option<NaiveDate> {
        self.end.or(self.start)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Diagnosis {
    sequence: u32,
    diagnosis_codeable_concept: CodeableConcept,
}

#[derive(Debug, Deserialize)]
struct CareTeamMember {
    role: CodeableConcept,
    #[serde(default)]
    qualification: Option<CodeableConcept>,
    #[serde(default)]
    provider: Option<Reference>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Reference {
    reference: Option<String>,
    identifier: Option<Identifier>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Identifier {
    system: Option<String>,
    value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Contained {
    identifier: Vec<Identifier>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Quantity {
    value: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Money {
    value: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Adjudication {
    category: Option<CodeableConcept>,
    amount: Option<Money>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Item {
    #[serde(alias = "service")]
    product_or_service: Option<CodeableConcept>,
    quantity: Option<Quantity>,
    diagnosis_sequence: Vec<u32>,
    serviced_period: Option<Period>,
    location_codeable_concept: Option<CodeableConcept>,
    modifier: Vec<CodeableConcept>,
    adjudication: Vec<Adjudication>,
}

impl Item {
    fn allowed_amount(&self) -> Option<f64> {
        self.adjudication
            .iter()
            .filter(|adj| {
                adj.category
                    .as_ref()
                    .is_some_and(|category| category.codes().any(|code| code == "eligible"))
            })
            .find_map(|adj| adj.amount.as_ref()?.value)
    }
}

impl ExplanationOfBenefit {
    fn diagnosis_codes(&self) -> BTreeMap<u32, String> {
        self.diagnosis
            .iter()
            .filter_map(|dx| {
                let concept = &dx.diagnosis_codeable_concept;
                let code = concept.code(ICD10_CM).or_else(|| concept.code(ICD10))?;
                Some((dx.sequence, code))
            })
            .collect()
    }

    fn rendering_provider(&self) -> Option<&CareTeamMember> {
        self.care_team.iter().find(|member| {
            matches!(
                member.role.code(CARE_TEAM_ROLE).as_deref(),
                Some("performing" | "rendering")
            )
        })
    }

    fn billing_npi(&self) -> Option<String> {
        self.contained
            .iter()
            .flat_map(|resource| resource.identifier.iter())
            .filter(|identifier| identifier.system.as_deref() == Some(NPI))
            .find_map(|identifier| identifier.value.clone())
    }

    fn into_records(self) -> Vec<ServiceLevelRecord> {
        let dx_lookup = self.diagnosis_codes();
        let claim_diagnosis_codes: Vec<String> = dx_lookup.values().cloned().collect();
        let provider = self.rendering_provider();
        let claim_level = ServiceLevelRecord {
            claim_id: self.id.clone(),
            claim_type: self
                .claim_type
                .as_ref()
                .and_then(|concept| concept.code(CLAIM_TYPE)),
            provider_specialty: provider
                .and_then(|member| member.qualification.as_ref())
                .and_then(|qualification| qualification.code(SPECIALTY)),
            performing_provider_npi: provider
                .and_then(|member| member.provider.as_ref())
                .and_then(|reference| reference.identifier.as_ref())
                .and_then(|identifier| identifier.value.clone()),
            billing_provider_npi: self.billing_npi(),
            patient_id: self
                .patient
                .as_ref()
                .and_then(|patient| patient.reference.as_deref())
                .and_then(|reference| reference.rsplit('/').next())
                .map(str::to_string),
            facility_type: self
                .facility
                .as_ref()
                .and_then(|facility| facility.extension_code(FACILITY_TYPE)),
            service_type: self.claim_type.as_ref().and_then(|concept| {
                concept
                    .extension_code(SERVICE_TYPE)
                    .or_else(|| concept.code(SERVICE_TYPE))
            }),
            claim_diagnosis_codes,
            service_date: self.billable_period.as_ref().and_then(Period::service_date),
            ..ServiceLevelRecord::default()
        };

        let mut records = Vec::new();
        for item in &self.item {
            let Some(product) = item.product_or_service.as_ref() else {
                continue;
            };
            let procedure_code = product.code(HCPCS);
            let ndc = product.code(NDC).or_else(|| product.extension_code(NDC));
            if procedure_code.is_none() && ndc.is_none() {
                continue;
            }

            records.push(ServiceLevelRecord {
                procedure_code,
                ndc,
                quantity: item.quantity.as_ref().and_then(|quantity| quantity.value),
                linked_diagnosis_codes: item
                    .diagnosis_sequence
                    .iter()
                    .filter_map(|sequence| dx_lookup.get(sequence).cloned())
                    .collect(),
                service_date: item
                    .serviced_period
                    .as_ref()
                    .and_then(Period::service_date)
                    .or(claim_level.service_date),
                place_of_service: item
                    .location_codeable_concept
                    .as_ref()
                    .and_then(|location| location.code(PLACE_OF_SERVICE)),
                modifiers: item
                    .modifier
                    .iter()
                    .filter_map(|modifier| modifier.code(HCPCS))
                    .collect(),
                allowed_amount: item.allowed_amount(),
                ..claim_level.clone()
            });
        }

        if records.is_empty() {
            records.push(claim_level);
        }
        records
    }
}
