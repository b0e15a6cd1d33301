use std::collections::BTreeMap;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{degraded, iso, put, ExtractedFields, ExtractionContext};
use crate::workflows::intake::domain::{ExtractionWarning, FieldMap, Warnings};
use crate::workflows::intake::normalize::{
    clean_lines, find_date, parse_amount, static_regex, value_after_anchor,
};

/// Producer, insured and similar name-plus-address blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insurer {
    pub letter: String,
    pub name: String,
    pub naic: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageKind {
    GeneralLiability,
    Automobile,
    Umbrella,
    WorkersCompensation,
    Property,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    pub kind: CoverageKind,
    pub policy_number: Option<String>,
    pub effective_date: Option<String>,
    pub expiration_date: Option<String>,
    pub limits: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsuranceCertificateFields {
    pub form: Option<String>,
    pub certificate_date: Option<String>,
    pub producer: Party,
    pub insured: Party,
    pub insurers: Vec<Insurer>,
    pub coverages: Vec<Coverage>,
    pub certificate_holder: Option<String>,
}

impl InsuranceCertificateFields {
    pub fn field_map(&self) -> FieldMap {
        let mut map = FieldMap::new();
        put(&mut map, "insurance_form", self.form.clone());
        put(&mut map, "insurance_certificate_date", self.certificate_date.clone());
        put(&mut map, "insurance_producer", self.producer.name.clone());
        put(&mut map, "insured_name", self.insured.name.clone());
        put(&mut map, "insured_address", self.insured.address.clone());
        if let Some(primary) = self.coverages.first() {
            put(&mut map, "insurance_policy_number", primary.policy_number.clone());
            put(&mut map, "insurance_effective_date", primary.effective_date.clone());
            put(&mut map, "insurance_expiration_date", primary.expiration_date.clone());
        }
        put(&mut map, "certificate_holder", self.certificate_holder.clone());
        map
    }
}

static_regex!(acord_regex, r"(?i)\bacord\s*(\d{2,3})\b");
static_regex!(
    certificate_date_anchor,
    r"(?i)\b(?:certificate\s+date|date\s+issued|date\s*\(mm/dd/yyyy\))"
);
static_regex!(producer_anchor, r"(?i)^producer\b");
static_regex!(insured_anchor, r"(?i)^(?:named\s+)?insured\b");
static_regex!(holder_anchor, r"(?i)^certificate\s+holder\b");
static_regex!(
    section_anchor,
    r"(?i)^(?:producer|(?:named\s+)?insured|insurers?\b|certificate\s+holder|coverages|contact|phone|e-?mail|fax)"
);
static_regex!(
    insurer_regex,
    r"(?i)^insurer\s+([a-f])\s*[:\-]\s*(.+?)(?:\s+naic\s*#?\s*:?\s*(\d{5}))?$"
);
static_regex!(
    policy_number_regex,
    r"(?i)\bpolicy\s*(?:number|no\.?|#)\s*:?\s*([a-z0-9][a-z0-9-]{3,})"
);
static_regex!(
    effective_label,
    r"(?i)\b(?:policy\s+)?eff(?:ective)?\b\.?(?:\s*date)?"
);
static_regex!(
    expiration_label,
    r"(?i)\b(?:policy\s+)?exp(?:iration|ires)?\b\.?(?:\s*date)?"
);
static_regex!(
    limit_row,
    r"(?i)^([a-z][a-z &./()'-]+?)\s*:?\s*\$\s?([\d,]+(?:\.\d{2})?)$"
);
static_regex!(
    block_end,
    r"(?i)^(?:certificate\s+holder|description\s+of\s+operations|cancellation)"
);

fn coverage_kind(line: &str) -> Option<CoverageKind> {
    let lower = line.to_ascii_lowercase();
    let kind = if lower.contains("general liability") || lower.contains("commercial general") {
        CoverageKind::GeneralLiability
    } else if lower.contains("automobile liability") || lower.contains("auto liability") || lower.contains("any auto") {
        CoverageKind::Automobile
    } else if lower.contains("umbrella") || lower.contains("excess liab") {
        CoverageKind::Umbrella
    } else if lower.contains("workers comp") || lower.contains("workers' comp") {
        CoverageKind::WorkersCompensation
    } else if lower.contains("commercial property") || lower.contains("property coverage") {
        CoverageKind::Property
    } else {
        return None;
    };
    Some(kind)
}

/// First date printed after `label` on the line.
fn date_after(line: &str, label: &Regex) -> Option<NaiveDate> {
    let found = label.find(line)?;
    find_date(&line[found.end()..])
}

/// Coverage block under construction; dates are kept typed until validation.
struct CoverageBlock {
    kind: CoverageKind,
    policy_number: Option<String>,
    effective: Option<NaiveDate>,
    expiration: Option<NaiveDate>,
    limits: BTreeMap<String, f64>,
}

impl CoverageBlock {
    fn new(kind: CoverageKind) -> Self {
        Self {
            kind,
            policy_number: None,
            effective: None,
            expiration: None,
            limits: BTreeMap::new(),
        }
    }

    fn absorb(&mut self, line: &str) {
        if self.policy_number.is_none() {
            if let Some(captures) = policy_number_regex().captures(line) {
                self.policy_number = Some(captures[1].to_ascii_uppercase());
            }
        }
        if self.effective.is_none() {
            self.effective = date_after(line, effective_label());
        }
        if self.expiration.is_none() {
            self.expiration = date_after(line, expiration_label());
        }
        if let Some(captures) = limit_row().captures(line) {
            if let Some(amount) = parse_amount(&captures[2]) {
                self.limits.entry(limit_key(&captures[1])).or_insert(amount);
            }
        }
    }

    fn has_invalid_range(&self) -> bool {
        matches!((self.effective, self.expiration), (Some(effective), Some(expiration)) if expiration <= effective)
    }

    fn finish(self) -> Coverage {
        Coverage {
            kind: self.kind,
            policy_number: self.policy_number,
            effective_date: iso(self.effective),
            expiration_date: iso(self.expiration),
            limits: self.limits,
        }
    }
}

fn limit_key(label: &str) -> String {
    label
        .to_ascii_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

pub(super) fn extract(text: &str, context: &ExtractionContext) -> (ExtractedFields, f32, Warnings) {
    let lines = clean_lines(text);

    let form = context.hint("form").map(str::to_string).or_else(|| {
        acord_regex()
            .captures(text)
            .map(|captures| format!("acord_{}", &captures[1]))
    });

    let certificate_date = lines.iter().find_map(|line| {
        let found = certificate_date_anchor().find(line)?;
        find_date(&line[found.end()..])
    });

    let fields = InsuranceCertificateFields {
        form,
        certificate_date: iso(certificate_date),
        producer: party(&lines, producer_anchor()),
        insured: party(&lines, insured_anchor()),
        insurers: lines
            .iter()
            .filter_map(|line| {
                let captures = insurer_regex().captures(line)?;
                Some(Insurer {
                    letter: captures[1].to_ascii_uppercase(),
                    name: captures[2].trim().to_string(),
                    naic: captures.get(3).map(|naic| naic.as_str().to_string()),
                })
            })
            .collect(),
        coverages: Vec::new(),
        certificate_holder: value_after_anchor(&lines, holder_anchor()).map(|(_, value)| value),
    };

    let blocks = coverage_blocks(&lines);

    let mut warnings = Warnings::new();
    if fields.producer.name.is_none() || fields.insured.name.is_none() {
        warnings.insert(ExtractionWarning::MissingRequiredSection);
    }
    if blocks.is_empty() {
        warnings.insert(ExtractionWarning::NoCoverageFound);
    }
    if blocks.iter().any(CoverageBlock::has_invalid_range) {
        warnings.insert(ExtractionWarning::InvalidDateRange);
    }

    let fields = InsuranceCertificateFields {
        coverages: blocks.into_iter().map(CoverageBlock::finish).collect(),
        ..fields
    };

    let confidence = degraded(0.9, 0.15, &warnings);
    (ExtractedFields::InsuranceCertificate(fields), confidence, warnings)
}

/// Name from the anchor, address from the following line when it looks like one.
fn party(lines: &[String], anchor: &Regex) -> Party {
    let Some((index, name)) = value_after_anchor(lines, anchor) else {
        return Party::default();
    };
    let address = lines
        .iter()
        .skip(index + 1)
        .find(|line| !line.trim().is_empty())
        .filter(|line| !section_anchor().is_match(line))
        .filter(|line| line.chars().any(|c| c.is_ascii_digit()))
        .cloned();
    Party {
        name: Some(name),
        address,
    }
}

fn coverage_blocks(lines: &[String]) -> Vec<CoverageBlock> {
    let mut blocks: Vec<CoverageBlock> = Vec::new();
    let mut current: Option<CoverageBlock> = None;

    for line in lines {
        if block_end().is_match(line) {
            blocks.extend(current.take());
            continue;
        }
        if let Some(kind) = coverage_kind(line) {
            let same_block = current.as_ref().map(|block| block.kind == kind).unwrap_or(false);
            if !same_block {
                blocks.extend(current.take());
                current = Some(CoverageBlock::new(kind));
            }
        }
        if let Some(block) = current.as_mut() {
            block.absorb(line);
        }
    }
    blocks.extend(current);
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACORD_25: &str = "ACORD 25 (2016/03)\n\
        CERTIFICATE OF LIABILITY INSURANCE\n\
        DATE (MM/DD/YYYY): 01/05/2024\n\
        PRODUCER\n\
        Harbor Insurance Agency\n\
        12 Wharf Street, Portland, ME 04101\n\
        INSURED\n\
        Sunrise Bakery LLC\n\
        45 Main Street, Portland, ME 04102\n\
        INSURER A: Atlantic Mutual Casualty NAIC # 12345\n\
        COMMERCIAL GENERAL LIABILITY\n\
        Policy Number: GL-2024-001\n\
        Eff Date 01/01/2024 Exp Date 01/01/2025\n\
        EACH OCCURRENCE $1,000,000\n\
        MED EXP (Any one person) $5,000\n\
        GENERAL AGGREGATE $2,000,000\n\
        CERTIFICATE HOLDER\n\
        City of Portland Grants Office\n";

    fn fields(text: &str) -> (InsuranceCertificateFields, Warnings) {
        let context = ExtractionContext::new(NaiveDate::from_ymd_opt(2024, 2, 1).expect("valid date"));
        match extract(text, &context) {
            (ExtractedFields::InsuranceCertificate(fields), _, warnings) => (fields, warnings),
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn acord_25_dates_are_normalized() {
        let (fields, warnings) = fields(ACORD_25);
        assert!(warnings.is_empty(), "unexpected warnings {warnings:?}");
        assert_eq!(fields.form.as_deref(), Some("acord_25"));
        assert_eq!(fields.certificate_date.as_deref(), Some("2024-01-05"));
        assert_eq!(fields.coverages.len(), 1);

        let coverage = &fields.coverages[0];
        assert_eq!(coverage.kind, CoverageKind::GeneralLiability);
        assert_eq!(coverage.policy_number.as_deref(), Some("GL-2024-001"));
        assert_eq!(coverage.effective_date.as_deref(), Some("2024-01-01"));
        assert_eq!(coverage.expiration_date.as_deref(), Some("2025-01-01"));
        assert_eq!(coverage.limits.get("each_occurrence"), Some(&1_000_000.0));
        assert_eq!(coverage.limits.get("general_aggregate"), Some(&2_000_000.0));
    }

    #[test]
    fn parties_and_insurers_are_parsed() {
        let (fields, _) = fields(ACORD_25);
        assert_eq!(fields.producer.name.as_deref(), Some("Harbor Insurance Agency"));
        assert_eq!(
            fields.insured.address.as_deref(),
            Some("45 Main Street, Portland, ME 04102")
        );
        assert_eq!(
            fields.insurers,
            vec![Insurer {
                letter: "A".to_string(),
                name: "Atlantic Mutual Casualty".to_string(),
                naic: Some("12345".to_string()),
            }]
        );
        assert_eq!(
            fields.certificate_holder.as_deref(),
            Some("City of Portland Grants Office")
        );
    }

    #[test]
    fn swapped_dates_are_an_invalid_range() {
        let text = ACORD_25.replace(
            "Eff Date 01/01/2024 Exp Date 01/01/2025",
            "Eff Date 01/01/2025 Exp Date 01/01/2024",
        );
        let (_, warnings) = fields(&text);
        assert!(warnings.contains(&ExtractionWarning::InvalidDateRange));
    }

    #[test]
    fn missing_insured_is_a_missing_section() {
        let text = ACORD_25
            .replace("INSURED\n", "")
            .replace("Sunrise Bakery LLC\n", "");
        let (fields, warnings) = fields(&text);
        assert_eq!(fields.insured.name, None);
        assert!(warnings.contains(&ExtractionWarning::MissingRequiredSection));
    }

    #[test]
    fn certificate_without_coverage_lines() {
        let (fields, warnings) = fields("CERTIFICATE OF INSURANCE\nProducer: Harbor Agency\nInsured: Sunrise Bakery\n");
        assert!(fields.coverages.is_empty());
        assert_eq!(warnings.codes(), vec!["no_coverage_found".to_string()]);
    }
}
