use super::record::ServiceLevelRecord;
use crate::model::{LoadError, ReferenceTables};
use std::collections::HashSet;

const INPATIENT_BILL_TYPES: &[&str] = &["11", "41"];
const OUTPATIENT_BILL_TYPES: &[&str] = &["12", "13", "43", "71", "73", "76", "77", "85"];

/// Decides which service records are eligible risk-adjustment sources.
pub trait ClaimFilter: Send + Sync {
    fn is_eligible(&self, record: &ServiceLevelRecord) -> bool;

    fn filter(&self, records: Vec<ServiceLevelRecord>) -> Vec<ServiceLevelRecord> {
        records
            .into_iter()
            .filter(|record| self.is_eligible(record))
            .collect()
    }
}

/// Type-of-bill and CPT/HCPCS eligibility for encounter data.
#[derive(Debug, Clone, Default)]
pub struct EligibilityFilter {
    procedures: HashSet<String>,
}

impl EligibilityFilter {
    pub fn new<I, S>(procedures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            procedures: procedures
                .into_iter()
                .map(|code| code.as_ref().trim().to_ascii_uppercase())
                .filter(|code| !code.is_empty())
                .collect(),
        }
    }

    pub fn from_tables(tables: &ReferenceTables) -> Self {
        Self::new(tables.eligible_procedures())
    }

    pub fn bundled() -> Result<Self, LoadError> {
        Ok(Self::from_tables(&ReferenceTables::bundled()?))
    }

    fn procedure_eligible(&self, record: &ServiceLevelRecord) -> bool {
        record
            .procedure_code
            .as_deref()
            .map(|code| self.procedures.contains(&code.trim().to_ascii_uppercase()))
            .unwrap_or(false)
    }
}

impl ClaimFilter for EligibilityFilter {
    fn is_eligible(&self, record: &ServiceLevelRecord) -> bool {
        match record.type_of_bill() {
            Some(bill_type) if INPATIENT_BILL_TYPES.contains(&bill_type.as_str()) => true,
            Some(bill_type) if OUTPATIENT_BILL_TYPES.contains(&bill_type.as_str()) => {
                self.procedure_eligible(record)
            }
            Some(_) => false,
            None => self.procedure_eligible(record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> EligibilityFilter {
        EligibilityFilter::new(["99213", "g0402"])
    }

    fn record(facility: Option<&str>, service: Option<&str>, procedure: Option<&str>) -> ServiceLevelRecord {
        ServiceLevelRecord {
            facility_type: facility.map(str::to_string),
            service_type: service.map(str::to_string),
            procedure_code: procedure.map(str::to_string),
            ..ServiceLevelRecord::default()
        }
    }

    #[test]
    fn inpatient_bills_are_always_kept() {
        assert!(filter().is_eligible(&record(Some("1"), Some("1"), None)));
        assert!(filter().is_eligible(&record(Some("4"), Some("1"), Some("00000"))));
    }

    #[test]
    fn outpatient_bills_need_an_eligible_procedure() {
        assert!(filter().is_eligible(&record(Some("1"), Some("3"), Some("99213"))));
        assert!(filter().is_eligible(&record(Some("8"), Some("5"), Some("G0402"))));
        assert!(!filter().is_eligible(&record(Some("1"), Some("3"), Some("36415"))));
    }

    #[test]
    fn other_bill_types_are_dropped() {
        assert!(!filter().is_eligible(&record(Some("2"), Some("1"), Some("99213"))));
    }

    #[test]
    fn professional_records_use_the_procedure_list() {
        assert!(filter().is_eligible(&record(None, None, Some("99213"))));
        assert!(!filter().is_eligible(&record(Some("1"), None, Some("36415"))));
        assert!(!filter().is_eligible(&record(None, None, None)));
    }

    #[test]
    fn filter_keeps_input_order() {
        let kept = filter().filter(vec![
            record(None, None, Some("G0402")),
            record(None, None, Some("36415")),
            record(Some("1"), Some("1"), None),
        ]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].procedure_code.as_deref(), Some("G0402"));
    }

    #[test]
    fn bundled_list_contains_office_visits() {
        let filter = EligibilityFilter::bundled().expect("bundled tables load");
        assert!(filter.is_eligible(&record(None, None, Some("99213"))));
    }
}
