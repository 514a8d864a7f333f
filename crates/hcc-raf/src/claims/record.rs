use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashSet;

const REQUIRED_FIELDS: [&str; 4] = [
    "claim_type",
    "claim_diagnosis_codes",
    "procedure_code",
    "service_date",
];

/// One normalized claim line carrying the fields eligibility filtering and scoring need.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceLevelRecord {
    pub claim_id: Option<String>,
    pub procedure_code: Option<String>,
    pub ndc: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub linked_diagnosis_codes: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub claim_diagnosis_codes: Vec<String>,
    pub claim_type: Option<String>,
    pub provider_specialty: Option<String>,
    pub performing_provider_npi: Option<String>,
    pub billing_provider_npi: Option<String>,
    pub patient_id: Option<String>,
    pub facility_type: Option<String>,
    pub service_type: Option<String>,
    pub service_date: Option<NaiveDate>,
    pub place_of_service: Option<String>,
    pub quantity: Option<f64>,
    #[serde(deserialize_with = "null_as_empty")]
    pub modifiers: Vec<String>,
    pub allowed_amount: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("service data must be a JSON array of records")]
    NotAnArray,
    #[error("record {index} is not a JSON object")]
    NotAnObject { index: usize },
    #[error("record {index} is missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },
    #[error("record {index} is invalid: {source}")]
    Invalid {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl ServiceLevelRecord {
    /// Validates a loosely-typed JSON object into a record, naming the record index on failure.
    pub fn from_value(index: usize, value: &Value) -> Result<Self, RecordError> {
        let object = value
            .as_object()
            .ok_or(RecordError::NotAnObject { index })?;
        if let Some(field) = REQUIRED_FIELDS
            .into_iter()
            .find(|field| !object.contains_key(*field))
        {
            return Err(RecordError::MissingField { index, field });
        }
        Self::deserialize(value).map_err(|source| RecordError::Invalid { index, source })
    }

    pub fn from_values(value: &Value) -> Result<Vec<Self>, RecordError> {
        value
            .as_array()
            .ok_or(RecordError::NotAnArray)?
            .iter()
            .enumerate()
            .map(|(index, record)| Self::from_value(index, record))
            .collect()
    }

    /// Type of bill assembled from facility and service type (`11`, `13`, ...), when both exist.
    pub fn type_of_bill(&self) -> Option<String> {
        match (self.facility_type.as_deref(), self.service_type.as_deref()) {
            (Some(facility), Some(service)) if !facility.is_empty() && !service.is_empty() => {
                Some(format!("{}{}", facility.trim(), service.trim()))
            }
            _ => None,
        }
    }
}

/// Claim diagnosis codes across the records, deduplicated in first-seen order.
pub fn unique_diagnosis_codes(records: &[ServiceLevelRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .flat_map(|record| record.claim_diagnosis_codes.iter())
        .filter(|code| seen.insert(code.as_str()))
        .cloned()
        .collect()
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn professional() -> Value {
        json!({
            "claim_id": "C1",
            "claim_type": "71",
            "procedure_code": "99213",
            "claim_diagnosis_codes": ["E119", "I509"],
            "service_date": "2024-03-14",
            "quantity": 1.0
        })
    }

    #[test]
    fn accepts_records_with_required_fields() {
        let record = ServiceLevelRecord::from_value(0, &professional()).expect("valid record");
        assert_eq!(record.procedure_code.as_deref(), Some("99213"));
        assert_eq!(
            record.service_date,
            NaiveDate::from_ymd_opt(2024, 3, 14)
        );
        assert!(record.modifiers.is_empty());
        assert_eq!(record.type_of_bill(), None);
    }

    #[test]
    fn null_procedure_code_is_allowed_but_must_be_present() {
        let mut value = professional();
        value["procedure_code"] = Value::Null;
        assert!(ServiceLevelRecord::from_value(0, &value).is_ok());

        let mut value = professional();
        value
            .as_object_mut()
            .expect("object")
            .remove("procedure_code");
        let err = ServiceLevelRecord::from_value(3, &value).expect_err("missing field");
        assert!(matches!(
            err,
            RecordError::MissingField {
                index: 3,
                field: "procedure_code"
            }
        ));
    }

    #[test]
    fn invalid_dates_name_the_record() {
        let mut value = professional();
        value["service_date"] = json!("14/03/2024");
        let err = ServiceLevelRecord::from_values(&json!([professional(), value]))
            .expect_err("bad date");
        assert!(matches!(err, RecordError::Invalid { index: 1, .. }));
        assert!(err.to_string().starts_with("record 1"));
    }

    #[test]
    fn rejects_non_array_payloads() {
        assert!(matches!(
            ServiceLevelRecord::from_values(&professional()),
            Err(RecordError::NotAnArray)
        ));
        assert!(matches!(
            ServiceLevelRecord::from_values(&json!([1])),
            Err(RecordError::NotAnObject { index: 0 })
        ));
    }

    #[test]
    fn unique_codes_keep_first_seen_order() {
        let first = ServiceLevelRecord {
            claim_diagnosis_codes: vec!["I509".into(), "E119".into()],
            ..ServiceLevelRecord::default()
        };
        let second = ServiceLevelRecord {
            claim_diagnosis_codes: vec!["E119".into(), "N184".into()],
            ..ServiceLevelRecord::default()
        };
        assert_eq!(
            unique_diagnosis_codes(&[first, second]),
            vec!["I509", "E119", "N184"]
        );
    }
}
