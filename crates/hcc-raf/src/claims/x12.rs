//! X12 837 (professional and institutional) claim extraction.

use super::record::ServiceLevelRecord;
use super::{ClaimExtractor, ExtractionError};
use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, warn};

const SEGMENT_TERMINATOR: char = '~';
const DEFAULT_ELEMENT_SEPARATOR: char = '*';
const DEFAULT_COMPONENT_SEPARATOR: char = ':';
const DIAGNOSIS_QUALIFIERS: &[&str] = &["ABK", "ABF", "BK", "BF"];

/// Carrier claim type for professional (837P) claims.
const PROFESSIONAL_CLAIM_TYPE: &str = "71";
const INPATIENT_CLAIM_TYPE: &str = "60";
const OUTPATIENT_CLAIM_TYPE: &str = "40";

/// Reads 837 interchanges: one record per SV1/SV2 service line.
#[derive(Debug, Clone, Copy, Default)]
pub struct X12ClaimExtractor;

impl X12ClaimExtractor {
    pub fn parse(&self, interchange: &str) -> Result<Vec<ServiceLevelRecord>, ExtractionError> {
        let interchange = interchange.trim();
        if interchange.is_empty() {
            return Err(ExtractionError::EmptyInterchange);
        }

        let separators = Separators::detect(interchange);
        let segments: Vec<Vec<&str>> = interchange
            .split(SEGMENT_TERMINATOR)
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                segment
                    .split(separators.element)
                    .map(str::trim)
                    .collect()
            })
            .collect();

        let header = segments
            .iter()
            .find(|segment| segment[0] == "ST")
            .ok_or(ExtractionError::MissingTransactionHeader)?;
        let transaction = element(header, 1).unwrap_or_default();
        if transaction != "837" {
            return Err(ExtractionError::UnsupportedTransaction(transaction.to_string()));
        }

        let mut state = ParseState::new(separators.component);
        for segment in &segments {
            state.apply(segment);
        }
        let records = state.finish();
        debug!(segments = segments.len(), records = records.len(), "parsed 837 interchange");
        Ok(records)
    }
}

impl ClaimExtractor for X12ClaimExtractor {
    /// Each resource must be a JSON string holding one interchange.
    fn extract(&self, resources: &[Value]) -> Result<Vec<ServiceLevelRecord>, ExtractionError> {
        let mut records = Vec::new();
        for (index, resource) in resources.iter().enumerate() {
            let Some(interchange) = resource.as_str() else {
                return Err(ExtractionError::UnsupportedPayload);
            };
            match self.parse(interchange) {
                Ok(extracted) => records.extend(extracted),
                Err(err) => warn!(index, error = %err, "skipping invalid 837 interchange"),
            }
        }
        Ok(records)
    }
}

struct Separators {
    element: char,
    component: char,
}

impl Separators {
    /// The ISA header fixes the element separator at offset 3 and the component separator in ISA16.
    fn detect(interchange: &str) -> Self {
        let mut separators = Separators {
            element: DEFAULT_ELEMENT_SEPARATOR,
            component: DEFAULT_COMPONENT_SEPARATOR,
        };
        if !interchange.starts_with("ISA") {
            return separators;
        }
        if let Some(element) = interchange[3..].chars().next() {
            separators.element = element;
        }
        if let Some(isa) = interchange.split(SEGMENT_TERMINATOR).next() {
            if let Some(component) = isa
                .split(separators.element)
                .nth(16)
                .map(str::trim)
                .filter(|value| value.chars().count() == 1)
                .and_then(|value| value.chars().next())
            {
                separators.component = component;
            }
        }
        separators
    }
}

#[derive(Default, Clone)]
struct ClaimContext {
    claim_id: Option<String>,
    claim_type: Option<String>,
    facility_type: Option<String>,
    service_type: Option<String>,
    place_of_service: Option<String>,
    statement_date: Option<NaiveDate>,
    diagnoses: Vec<String>,
    performing_provider_npi: Option<String>,
    provider_specialty: Option<String>,
}

/// Walks the segments in order; loops are recognised by their leading segments.
struct ParseState {
    component: char,
    institutional: bool,
    patient_id: Option<String>,
    billing_provider_npi: Option<String>,
    claim: Option<ClaimContext>,
    line: Option<ServiceLevelRecord>,
    /// Last NM1 entity code seen, so PRV and REF attach to the right party.
    entity: Option<String>,
    records: Vec<ServiceLevelRecord>,
}

impl ParseState {
    fn new(component: char) -> Self {
        Self {
            component,
            institutional: false,
            patient_id: None,
            billing_provider_npi: None,
            claim: None,
            line: None,
            entity: None,
            records: Vec::new(),
        }
    }

    fn apply(&mut self, segment: &[&str]) {
        match segment[0] {
            "ST" => {
                self.flush_line();
                self.claim = None;
                self.institutional = element(segment, 3).is_some_and(|v| v.contains("X223"));
            }
            "SE" => {
                self.flush_line();
                self.claim = None;
            }
            "NM1" => self.entity_name(segment),
            "PRV" => {
                let rendering = matches!(self.entity.as_deref(), Some("82" | "71"))
                    && matches!(element(segment, 1), Some("PE" | "AT"));
                if let (true, Some(claim)) = (rendering, self.claim.as_mut()) {
                    claim.provider_specialty = owned(element(segment, 3));
                }
            }
            "CLM" => {
                self.flush_line();
                self.claim = Some(self.claim_context(segment));
            }
            "HI" => {
                if let Some(claim) = self.claim.as_mut() {
                    for composite in &segment[1..] {
                        let mut parts = composite.split(self.component);
                        let qualifier = parts.next().unwrap_or_default();
                        let code = parts.next().unwrap_or_default();
                        if DIAGNOSIS_QUALIFIERS.contains(&qualifier) && !code.is_empty() {
                            claim.diagnoses.push(code.to_string());
                        }
                    }
                }
            }
            "DTP" => self.date(segment),
            "LX" => self.flush_line(),
            "SV1" => self.professional_line(segment),
            "SV2" => self.institutional_line(segment),
            "LIN" => {
                if let Some(line) = self.line.as_mut() {
                    if element(segment, 2) == Some("N4") {
                        line.ndc = owned(element(segment, 3));
                    }
                }
            }
            _ => {}
        }
    }

    fn entity_name(&mut self, segment: &[&str]) {
        let entity = element(segment, 1).unwrap_or_default();
        let id = owned(element(segment, 9));
        match entity {
            "IL" => {
                self.flush_line();
                self.claim = None;
                self.patient_id = id;
            }
            "85" => self.billing_provider_npi = id,
            "82" | "71" => {
                if let Some(line) = self.line.as_mut() {
                    line.performing_provider_npi = id;
                } else if let Some(claim) = self.claim.as_mut() {
                    if entity == "82" || claim.performing_provider_npi.is_none() {
                        claim.performing_provider_npi = id;
                    }
                }
            }
            _ => {}
        }
        self.entity = Some(entity.to_string());
    }

    fn claim_context(&self, segment: &[&str]) -> ClaimContext {
        let mut claim = ClaimContext {
            claim_id: owned(element(segment, 1)),
            ..ClaimContext::default()
        };

        let facility_code = element(segment, 5)
            .and_then(|composite| composite.split(self.component).next())
            .filter(|code| !code.is_empty());
        if self.institutional {
            // CLM05-1 is the two-digit facility type and classification of the bill type.
            let mut chars = facility_code.unwrap_or_default().chars();
            claim.facility_type = chars.next().map(String::from);
            claim.service_type = chars.next().map(String::from);
            let inpatient = matches!(
                (claim.facility_type.as_deref(), claim.service_type.as_deref()),
                (Some("1" | "4"), Some("1"))
            );
            claim.claim_type = Some(
                if inpatient {
                    INPATIENT_CLAIM_TYPE
                } else {
                    OUTPATIENT_CLAIM_TYPE
                }
                .to_string(),
            );
        } else {
            claim.place_of_service = facility_code.map(str::to_string);
            claim.claim_type = Some(PROFESSIONAL_CLAIM_TYPE.to_string());
        }
        claim
    }

    fn date(&mut self, segment: &[&str]) {
        let qualifier = element(segment, 1);
        let value = parse_period(element(segment, 2), element(segment, 3));
        match qualifier {
            Some("472") => {
                if let Some(line) = self.line.as_mut() {
                    line.service_date = value;
                } else if let Some(claim) = self.claim.as_mut() {
                    claim.statement_date = value;
                }
            }
            Some("434" | "435" | "096") => {
                if let Some(claim) = self.claim.as_mut() {
                    if claim.statement_date.is_none() || qualifier == Some("434") {
                        claim.statement_date = value.or(claim.statement_date);
                    }
                }
            }
            _ => {}
        }
    }

    fn professional_line(&mut self, segment: &[&str]) {
        self.flush_line();
        let Some(claim) = self.claim.as_ref() else {
            return;
        };
        let mut procedure = element(segment, 1).unwrap_or_default().split(self.component);
        let _qualifier = procedure.next();
        let procedure_code = owned(procedure.next());
        let modifiers = procedure.filter(|m| !m.is_empty()).map(str::to_string).collect();

        let pointers = element(segment, 7).unwrap_or_default();
        let linked = pointers
            .split(|c| c == self.component || c == ',')
            .filter_map(|pointer| pointer.trim().parse::<usize>().ok())
            .filter_map(|pointer| claim.diagnoses.get(pointer.checked_sub(1)?).cloned())
            .collect();

        self.line = Some(ServiceLevelRecord {
            procedure_code,
            modifiers,
            quantity: element(segment, 4).and_then(parse_amount),
            place_of_service: owned(element(segment, 5)).or_else(|| claim.place_of_service.clone()),
            linked_diagnosis_codes: linked,
            ..self.claim_record(claim)
        });
    }

    fn institutional_line(&mut self, segment: &[&str]) {
        self.flush_line();
        let Some(claim) = self.claim.as_ref() else {
            return;
        };
        let mut procedure = element(segment, 2).unwrap_or_default().split(self.component);
        let _qualifier = procedure.next();
        let procedure_code = owned(procedure.next());
        let modifiers = procedure.filter(|m| !m.is_empty()).map(str::to_string).collect();

        self.line = Some(ServiceLevelRecord {
            procedure_code,
            modifiers,
            quantity: element(segment, 5).and_then(parse_amount),
            ..self.claim_record(claim)
        });
    }

    fn claim_record(&self, claim: &ClaimContext) -> ServiceLevelRecord {
        ServiceLevelRecord {
            claim_id: claim.claim_id.clone(),
            claim_type: claim.claim_type.clone(),
            claim_diagnosis_codes: claim.diagnoses.clone(),
            provider_specialty: claim.provider_specialty.clone(),
            performing_provider_npi: claim.performing_provider_npi.clone(),
            billing_provider_npi: self.billing_provider_npi.clone(),
            patient_id: self.patient_id.clone(),
            facility_type: claim.facility_type.clone(),
            service_type: claim.service_type.clone(),
            place_of_service: claim.place_of_service.clone(),
            ..ServiceLevelRecord::default()
        }
    }

    fn flush_line(&mut self) {
        if let Some(mut line) = self.line.take() {
            if line.service_date.is_none() {
                line.service_date = self.claim.as_ref().and_then(|claim| claim.statement_date);
            }
            self.records.push(line);
        }
    }

    fn finish(mut self) -> Vec<ServiceLevelRecord> {
        self.flush_line();
        self.records
    }
}

fn element<'a>(segment: &[&'a str], index: usize) -> Option<&'a str> {
    segment.get(index).copied().filter(|value| !value.is_empty())
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

/// Parses a CCYYMMDD date.
pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y%m%d").ok()
}

/// `D8` is a single date; `RD8` is a `start-end` range, reduced to its end like a billable period.
fn parse_period(format: Option<&str>, value: Option<&str>) -> Option<NaiveDate> {
    let value = value?;
    match format {
        Some("RD8") => value.rsplit('-').next().and_then(parse_date),
        _ => parse_date(value),
    }
}

pub(crate) fn parse_amount(raw: &str) -> Option<f64> {
    raw.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PROFESSIONAL: &str = "ISA*00*          *00*          *ZZ*SUBMITTER ID  *ZZ*RECEIVER ID   *230415*1430*^*00501*000000001*0*P*:~
        GS*HC*SUBMITTER ID*RECEIVER ID*20230415*1430*1*X*005010X222A1~
        ST*837*0001*005010X222A1~
        BHT*0019*00*123*20230415*1430*CH~
        NM1*41*2*SUBMIT CLINIC*****46*12345~
        NM1*IL*1*DOE*JOHN****MI*12345~
        DMG*D8*19400101*M~
        CLM*ABC123*500***11:B:1*Y*A*Y*Y~
        HI*ABK:F1120*ABF:E119~
        NM1*82*1*SMITH*JANE****XX*1234567890~
        PRV*PE*PXC*207RC0000X~
        LX*1~
        SV1*HC:99213:25:59*50*UN*1*11**1:2~
        DTP*472*D8*20230415~
        LX*2~
        SV1*HC:99214*75*UN*2***2~
        DTP*472*D8*20230416~
        SE*17*0001~
        GE*1*1~
        IEA*1*000000001~";

    const INSTITUTIONAL: &str = "ISA*00*          *00*          *ZZ*SUBMITTER       *ZZ*RECEIVER        *240209*1230*^*00501*000000001*0*P*:~
        GS*HC*SUBMITTER*RECEIVER*20240209*1230*1*X*005010X223A2~
        ST*837*0001*005010X223A2~
        NM1*85*2*BILLING PROVIDER*****XX*1234567890~
        NM1*IL*1*DOE*JOHN****MI*123456789A~
        CLM*12345*500***11:A:1*Y*A*Y*Y~
        DTP*434*RD8*20240201-20240203~
        HI*ABK:R69.0*ABF:I509~
        NM1*71*1*ATTENDING*DOCTOR****XX*1999999999~
        PRV*AT*PXC*207R00000X~
        LX*1~
        SV2*0450*HC:99284*500*UN*1~
        DTP*472*D8*20240201~
        LX*2~
        SV2*0300*HC:80053*40*UN*3~
        SE*14*0001~
        GE*1*1~
        IEA*1*000000001~";

    #[test]
    fn parses_x12_dates_and_amounts() {
        assert_eq!(parse_date("20230415"), NaiveDate::from_ymd_opt(2023, 4, 15));
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("2023041"), None);
        assert_eq!(parse_date("abcdefgh"), None);
        assert_eq!(parse_amount("123.45"), Some(123.45));
        assert_eq!(parse_amount("0"), Some(0.0));
        assert_eq!(parse_amount("invalid"), None);
        assert_eq!(parse_amount(""), None);
    }

    #[test]
    fn professional_claim_yields_one_record_per_service_line() {
        let records = X12ClaimExtractor.parse(PROFESSIONAL).expect("parses");
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.claim_id.as_deref(), Some("ABC123"));
        assert_eq!(first.claim_type.as_deref(), Some("71"));
        assert_eq!(first.patient_id.as_deref(), Some("12345"));
        assert_eq!(first.performing_provider_npi.as_deref(), Some("1234567890"));
        assert_eq!(first.provider_specialty.as_deref(), Some("207RC0000X"));
        assert_eq!(first.procedure_code.as_deref(), Some("99213"));
        assert_eq!(first.modifiers, vec!["25", "59"]);
        assert_eq!(first.quantity, Some(1.0));
        assert_eq!(first.place_of_service.as_deref(), Some("11"));
        assert_eq!(first.service_date, NaiveDate::from_ymd_opt(2023, 4, 15));
        assert_eq!(first.claim_diagnosis_codes, vec!["F1120", "E119"]);
        assert_eq!(first.linked_diagnosis_codes, vec!["F1120", "E119"]);
        assert_eq!(first.facility_type, None);

        let second = &records[1];
        assert_eq!(second.procedure_code.as_deref(), Some("99214"));
        assert_eq!(second.place_of_service.as_deref(), Some("11"));
        assert_eq!(second.linked_diagnosis_codes, vec!["E119"]);
        assert_eq!(second.service_date, NaiveDate::from_ymd_opt(2023, 4, 16));
    }

    #[test]
    fn institutional_claim_reads_bill_type_and_statement_dates() {
        let records = X12ClaimExtractor.parse(INSTITUTIONAL).expect("parses");
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.patient_id.as_deref(), Some("123456789A"));
        assert_eq!(first.billing_provider_npi.as_deref(), Some("1234567890"));
        assert_eq!(first.performing_provider_npi.as_deref(), Some("1999999999"));
        assert_eq!(first.provider_specialty.as_deref(), Some("207R00000X"));
        assert_eq!(first.facility_type.as_deref(), Some("1"));
        assert_eq!(first.service_type.as_deref(), Some("1"));
        assert_eq!(first.type_of_bill().as_deref(), Some("11"));
        assert_eq!(first.claim_type.as_deref(), Some("60"));
        assert_eq!(first.procedure_code.as_deref(), Some("99284"));
        assert_eq!(first.service_date, NaiveDate::from_ymd_opt(2024, 2, 1));
        assert_eq!(first.claim_diagnosis_codes, vec!["R69.0", "I509"]);

        assert_eq!(records[1].quantity, Some(3.0));
        assert_eq!(records[1].service_date, NaiveDate::from_ymd_opt(2024, 2, 3));
    }

    #[test]
    fn new_subscriber_resets_claim_context() {
        let interchange = "ST*837*0001*005010X222A1~
            NM1*IL*1*DOE*JOHN****MI*111~
            CLM*A1*50***11:B:1~
            HI*ABK:E119~
            SV1*HC:99213*50*UN*1~
            NM1*IL*1*ROE*JANE****MI*222~
            CLM*B1*50***11:B:1~
            HI*ABK:I509~
            SV1*HC:99214*50*UN*1~
            SE*9*0001~";
        let records = X12ClaimExtractor.parse(interchange).expect("parses");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].patient_id.as_deref(), Some("111"));
        assert_eq!(records[0].claim_diagnosis_codes, vec!["E119"]);
        assert_eq!(records[1].patient_id.as_deref(), Some("222"));
        assert_eq!(records[1].claim_diagnosis_codes, vec!["I509"]);
    }

    #[test]
    fn interchanges_without_a_claim_transaction_are_rejected() {
        assert!(matches!(
            X12ClaimExtractor.parse("   "),
            Err(ExtractionError::EmptyInterchange)
        ));
        assert!(matches!(
            X12ClaimExtractor.parse("NM1*IL*1*DOE*JOHN****MI*12345~CLM*12345*500~"),
            Err(ExtractionError::MissingTransactionHeader)
        ));
        assert!(matches!(
            X12ClaimExtractor.parse("ST*835*0001~SE*1*0001~"),
            Err(ExtractionError::UnsupportedTransaction(ref set)) if set == "835"
        ));
    }

    #[test]
    fn extractor_trait_reads_string_resources_and_skips_invalid_ones() {
        let records = X12ClaimExtractor
            .extract(&[json!(PROFESSIONAL), json!("ST*835*0001~"), json!(INSTITUTIONAL)])
            .expect("extracts");
        assert_eq!(records.len(), 4);

        assert!(matches!(
            X12ClaimExtractor.extract(&[json!({ "resourceType": "Claim" })]),
            Err(ExtractionError::UnsupportedPayload)
        ));
    }
}
