use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{degraded, iso, put, ExtractedFields, ExtractionContext};
use crate::workflows::intake::domain::{ExtractionWarning, FieldMap, Warnings};
use crate::workflows::intake::normalize::{
    clean_lines, find_date, static_regex, strip_separators, value_after_anchor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    UtilityBill,
    Insurance,
    Lease,
    License,
}

impl EvidenceType {
    pub const fn key(self) -> &'static str {
        match self {
            Self::UtilityBill => "utility_bill",
            Self::Insurance => "insurance",
            Self::Lease => "lease",
            Self::License => "license",
        }
    }
}

impl FromStr for EvidenceType {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "utility_bill" | "utility" => Ok(Self::UtilityBill),
            "insurance" => Ok(Self::Insurance),
            "lease" => Ok(Self::Lease),
            "license" | "drivers_license" => Ok(Self::License),
            _ => Err(()),
        }
    }
}

/// Maximum document age, in days, per evidence type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecencyPolicy {
    pub utility_bill_days: u32,
    pub insurance_days: u32,
    pub lease_days: u32,
    pub license_days: u32,
}

impl Default for RecencyPolicy {
    fn default() -> Self {
        Self {
            utility_bill_days: 90,
            insurance_days: 90,
            lease_days: 365,
            license_days: 365,
        }
    }
}

impl RecencyPolicy {
    pub fn max_age(&self, evidence: EvidenceType) -> u32 {
        match evidence {
            EvidenceType::UtilityBill => self.utility_bill_days,
            EvidenceType::Insurance => self.insurance_days,
            EvidenceType::Lease => self.lease_days,
            EvidenceType::License => self.license_days,
        }
    }
}

/// Evidence type from lower-cased document text. Leases and licenses win over incidental
/// utility or insurance wording they commonly contain.
pub(crate) fn detect_evidence_type(lower: &str) -> Option<EvidenceType> {
    let has_any = |needles: &[&str]| needles.iter().any(|needle| lower.contains(needle));
    if has_any(&["residential lease", "lease agreement", "rental agreement"]) {
        Some(EvidenceType::Lease)
    } else if has_any(&["driver license", "driver's license", "identification card"]) {
        Some(EvidenceType::License)
    } else if has_any(&["homeowners", "renters insurance", "declarations page"]) {
        Some(EvidenceType::Insurance)
    } else if has_any(&["electric", "natural gas", "water service", "utility", "kwh"]) {
        Some(EvidenceType::UtilityBill)
    } else {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfAddressFields {
    pub evidence_type: Option<EvidenceType>,
    pub resident_name: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub document_date: Option<String>,
    pub age_days: Option<i64>,
    pub max_age_days: Option<u32>,
    pub is_recent: Option<bool>,
}

impl ProofOfAddressFields {
    pub fn field_map(&self) -> FieldMap {
        let mut map = FieldMap::new();
        put(&mut map, "address_evidence_type", self.evidence_type.map(EvidenceType::key));
        put(&mut map, "resident_name", self.resident_name.clone());
        put(&mut map, "address_street", self.street.clone());
        put(&mut map, "address_city", self.city.clone());
        put(&mut map, "address_state", self.state.clone());
        put(&mut map, "address_postal_code", self.postal_code.clone());
        put(&mut map, "address_document_date", self.document_date.clone());
        map
    }
}

static_regex!(
    city_state_zip,
    r"([A-Za-z][A-Za-z .'-]*?),\s*([A-Z]{2})\.?\s+(\d{5}(?:-\d{4})?)\s*$"
);
static_regex!(
    address_anchor,
    r"(?i)^(?:service\s+address|property\s+address|premises(?:\s+address)?|residence\s+address|mailing\s+address|address)\b"
);
static_regex!(
    resident_anchor,
    r"(?i)^(?:account\s+holder|customer\s+name|customer|tenants?(?:\(s\))?|lessee|named\s+insured|resident|name)\b"
);
static_regex!(
    dated_anchor,
    r"(?i)\b(?:statement\s+date|bill(?:ing)?\s+date|issue\s+date|date\s+issued|date\s+of\s+issue|lease\s+date|effective\s+date|iss)\b"
);

pub(super) fn extract(text: &str, context: &ExtractionContext) -> (ExtractedFields, f32, Warnings) {
    let lines = clean_lines(text);
    let evidence_type = context
        .hint("evidence_type")
        .and_then(|value| value.parse::<EvidenceType>().ok())
        .or_else(|| detect_evidence_type(&text.to_ascii_lowercase()));

    let mut fields = ProofOfAddressFields {
        evidence_type,
        resident_name: value_after_anchor(&lines, resident_anchor()).map(|(_, value)| value),
        ..ProofOfAddressFields::default()
    };
    locate_address(&lines, &mut fields);

    let document_date = lines
        .iter()
        .find_map(|line| {
            let found = dated_anchor().find(line)?;
            find_date(&line[found.end()..])
        })
        .or_else(|| lines.iter().find_map(|line| find_date(line)));
    fields.document_date = iso(document_date);

    let mut warnings = Warnings::new();
    match document_date {
        Some(date) => {
            let age = (context.as_of - date).num_days();
            fields.age_days = Some(age);
            if let Some(evidence) = evidence_type {
                let max_age = context.recency.max_age(evidence);
                let recent = age <= i64::from(max_age);
                fields.max_age_days = Some(max_age);
                fields.is_recent = Some(recent);
                if !recent {
                    warnings.insert(ExtractionWarning::StaleDocument);
                }
            }
        }
        None => {
            warnings.insert(ExtractionWarning::MissingDocumentDate);
        }
    }
    if fields.city.is_none() || fields.state.is_none() {
        warnings.insert(ExtractionWarning::MissingCityOrState);
    }

    let confidence = degraded(0.9, 0.15, &warnings);
    (ExtractedFields::ProofOfAddress(fields), confidence, warnings)
}

/// Fill street, city, state and postal code from the anchored address or the first
/// `City, ST 12345` line.
fn locate_address(lines: &[String], fields: &mut ProofOfAddressFields) {
    let anchored = value_after_anchor(lines, address_anchor());

    let candidates = anchored
        .iter()
        .map(|(index, value)| (*index, value.as_str()))
        .chain(lines.iter().enumerate().map(|(index, line)| (index, line.as_str())));

    for (index, line) in candidates {
        let Some(captures) = city_state_zip().captures(line) else {
            continue;
        };
        let Some(whole) = captures.get(0) else {
            continue;
        };
        fields.city = Some(captures[1].trim().to_string());
        fields.state = Some(captures[2].to_string());
        fields.postal_code = Some(captures[3].to_string());

        let prefix = line[..whole.start()].trim_end_matches([',', ' ']);
        let prefix = prefix.rsplit_once(':').map(|(_, rest)| rest).unwrap_or(prefix);
        let prefix = strip_separators(prefix);
        if !prefix.is_empty() {
            fields.street = Some(prefix.to_string());
        } else if let Some(previous) = index
            .checked_sub(1)
            .and_then(|previous| lines.get(previous))
            .filter(|previous| previous.starts_with(|c: char| c.is_ascii_digit()))
        {
            fields.street = Some(previous.clone());
        }
        return;
    }

    if let Some((_, value)) = anchored {
        fields.street = Some(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const UTILITY_BILL: &str = "Central Maine Power - Electric Service\n\
        Statement Date: 01/15/2024\n\
        Account Holder: Sunrise Bakery LLC\n\
        Service Address: 45 Main Street, Portland, ME 04102\n\
        Amount Due $123.45\n";

    const LEASE: &str = "RESIDENTIAL LEASE AGREEMENT\n\
        This lease is made on September 1, 2023.\n\
        Tenant: Maria Lopez\n\
        Premises:\n\
        88 Harbor Road\n\
        Salem, MA 01970\n";

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn run(text: &str, context: ExtractionContext) -> (ProofOfAddressFields, Warnings) {
        match extract(text, &context) {
            (ExtractedFields::ProofOfAddress(fields), _, warnings) => (fields, warnings),
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn recent_utility_bill() {
        let (fields, warnings) = run(UTILITY_BILL, ExtractionContext::new(date(2024, 2, 1)));
        assert!(warnings.is_empty(), "unexpected warnings {warnings:?}");
        assert_eq!(fields.evidence_type, Some(EvidenceType::UtilityBill));
        assert_eq!(fields.resident_name.as_deref(), Some("Sunrise Bakery LLC"));
        assert_eq!(fields.street.as_deref(), Some("45 Main Street"));
        assert_eq!(fields.city.as_deref(), Some("Portland"));
        assert_eq!(fields.state.as_deref(), Some("ME"));
        assert_eq!(fields.postal_code.as_deref(), Some("04102"));
        assert_eq!(fields.document_date.as_deref(), Some("2024-01-15"));
        assert_eq!(fields.age_days, Some(17));
        assert_eq!(fields.is_recent, Some(true));
    }

    #[test]
    fn old_utility_bill_is_stale() {
        let (fields, warnings) = run(UTILITY_BILL, ExtractionContext::new(date(2024, 6, 1)));
        assert_eq!(fields.max_age_days, Some(90));
        assert_eq!(fields.is_recent, Some(false));
        assert!(warnings.contains(&ExtractionWarning::StaleDocument));
    }

    #[test]
    fn lease_gets_the_longer_window() {
        let (fields, warnings) = run(LEASE, ExtractionContext::new(date(2024, 6, 1)));
        assert!(warnings.is_empty(), "unexpected warnings {warnings:?}");
        assert_eq!(fields.evidence_type, Some(EvidenceType::Lease));
        assert_eq!(fields.resident_name.as_deref(), Some("Maria Lopez"));
        assert_eq!(fields.street.as_deref(), Some("88 Harbor Road"));
        assert_eq!(fields.city.as_deref(), Some("Salem"));
        assert_eq!(fields.max_age_days, Some(365));
        assert_eq!(fields.is_recent, Some(true));
    }

    #[test]
    fn configured_window_applies() {
        let policy = RecencyPolicy {
            utility_bill_days: 10,
            ..RecencyPolicy::default()
        };
        let context = ExtractionContext::new(date(2024, 2, 1)).with_recency(policy);
        let (_, warnings) = run(UTILITY_BILL, context);
        assert!(warnings.contains(&ExtractionWarning::StaleDocument));
    }

    #[test]
    fn street_only_address_is_missing_city_or_state() {
        let text = "Water Service Bill\nBill Date: 03/01/2024\nService Address: 12 Elm Street\n";
        let (fields, warnings) = run(text, ExtractionContext::new(date(2024, 3, 10)));
        assert_eq!(fields.street.as_deref(), Some("12 Elm Street"));
        assert_eq!(warnings.codes(), vec!["missing_city_or_state".to_string()]);
    }

    #[test]
    fn undated_document_is_reported() {
        let text = "Electric Service\nService Address: 45 Main Street, Portland, ME 04102\n";
        let (_, warnings) = run(text, ExtractionContext::new(date(2024, 3, 10)));
        assert_eq!(warnings.codes(), vec!["missing_document_date".to_string()]);
    }
}
