//! Per-type structured extractors.
//!
//! Each extractor is a pure function from text to a typed record. They never fail: malformed
//! input yields a best-effort record with degraded confidence and populated warnings.

mod bank_statement;
mod insurance_certificate;
mod invoice;
mod letter_of_support;
mod power_of_attorney;
mod proof_of_address;
mod resume;
mod veteran_status;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{DocType, ExtractionResult, FieldMap, Hints, Warnings};

pub use bank_statement::{BankStatementFields, StatementPeriod, Transaction};
pub use insurance_certificate::{Coverage, CoverageKind, InsuranceCertificateFields, Insurer, Party};
pub use invoice::{InvoiceFields, InvoiceKind, LineItem};
pub use letter_of_support::{LetterAuthor, LetterOfSupportFields};
pub use power_of_attorney::{AuthorityScope, PowerOfAttorneyFields};
pub use proof_of_address::{EvidenceType, ProofOfAddressFields, RecencyPolicy};
pub use resume::{DegreeLevel, Education, Experience, ResumeContact, ResumeFields};
pub use veteran_status::{
    Relationship, ServiceRecord, VeteranApplication, VeteranFormVariant, VeteranStatusFields,
};

pub(crate) use proof_of_address::detect_evidence_type;

/// Inputs shared by every extractor besides the text itself.
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    pub hints: Hints,
    /// Confidence reported by the classifier; caps the extractor's own confidence.
    pub classifier_confidence: Option<f32>,
    /// Reference date for recency checks.
    pub as_of: NaiveDate,
    pub recency: RecencyPolicy,
}

impl ExtractionContext {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            hints: Hints::new(),
            classifier_confidence: None,
            as_of,
            recency: RecencyPolicy::default(),
        }
    }

    pub fn with_hints(mut self, hints: Hints) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_classifier_confidence(mut self, confidence: f32) -> Self {
        self.classifier_confidence = Some(confidence);
        self
    }

    pub fn with_recency(mut self, recency: RecencyPolicy) -> Self {
        self.recency = recency;
        self
    }

    pub(crate) fn hint(&self, key: &str) -> Option<&str> {
        self.hints
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }
}

/// Typed record produced by an extractor, one variant per document type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractedFields {
    BankStatement(BankStatementFields),
    InsuranceCertificate(InsuranceCertificateFields),
    VeteranStatus(VeteranStatusFields),
    ProofOfAddress(ProofOfAddressFields),
    PowerOfAttorney(PowerOfAttorneyFields),
    Resume(ResumeFields),
    LetterOfSupport(LetterOfSupportFields),
    InvoiceOrQuote(InvoiceFields),
}

impl ExtractedFields {
    pub fn doc_type(&self) -> DocType {
        match self {
            Self::BankStatement(_) => DocType::BankStatement,
            Self::InsuranceCertificate(_) => DocType::InsuranceCertificate,
            Self::VeteranStatus(_) => DocType::VeteranStatus,
            Self::ProofOfAddress(_) => DocType::ProofOfAddress,
            Self::PowerOfAttorney(_) => DocType::PowerOfAttorney,
            Self::Resume(_) => DocType::Resume,
            Self::LetterOfSupport(_) => DocType::LetterOfSupport,
            Self::InvoiceOrQuote(_) => DocType::InvoiceOrQuote,
        }
    }

    pub fn field_map(&self) -> FieldMap {
        match self {
            Self::BankStatement(fields) => fields.field_map(),
            Self::InsuranceCertificate(fields) => fields.field_map(),
            Self::VeteranStatus(fields) => fields.field_map(),
            Self::ProofOfAddress(fields) => fields.field_map(),
            Self::PowerOfAttorney(fields) => fields.field_map(),
            Self::Resume(fields) => fields.field_map(),
            Self::LetterOfSupport(fields) => fields.field_map(),
            Self::InvoiceOrQuote(fields) => fields.field_map(),
        }
    }
}

type Extractor = fn(&str, &ExtractionContext) -> (ExtractedFields, f32, Warnings);

/// Fixed dispatch table keyed by document type.
fn extractor_for(doc_type: DocType) -> Extractor {
    match doc_type {
        DocType::BankStatement => bank_statement::extract,
        DocType::InsuranceCertificate => insurance_certificate::extract,
        DocType::VeteranStatus => veteran_status::extract,
        DocType::ProofOfAddress => proof_of_address::extract,
        DocType::PowerOfAttorney => power_of_attorney::extract,
        DocType::Resume => resume::extract,
        DocType::LetterOfSupport => letter_of_support::extract,
        DocType::InvoiceOrQuote => invoice::extract,
    }
}

/// Run the extractor registered for `doc_type`.
pub fn extract(doc_type: DocType, text: &str, context: &ExtractionContext) -> ExtractionResult {
    let (fields, own_confidence, warnings) = extractor_for(doc_type)(text, context);
    let capped = match context.classifier_confidence {
        Some(classifier) if classifier > 0.0 => own_confidence.min(classifier),
        _ => own_confidence,
    };

    ExtractionResult {
        doc_type,
        fields,
        confidence: round_confidence(capped),
        warnings,
    }
}

/// Base confidence minus a fixed penalty per warning, floored so a noisy record still reads as
/// "something was extracted".
pub(crate) fn degraded(base: f32, penalty: f32, warnings: &Warnings) -> f32 {
    (base - penalty * warnings.len() as f32).max(0.3)
}

fn round_confidence(value: f32) -> f32 {
    (value.clamp(0.0, 1.0) * 100.0).round() / 100.0
}

/// Insert `value` under `key` when it carries something.
pub(crate) fn put(map: &mut FieldMap, key: &str, value: impl Into<super::domain::FieldValue>) {
    let value = value.into();
    if !value.is_empty() {
        map.insert(key.to_string(), value);
    }
}

pub(crate) fn iso(date: Option<NaiveDate>) -> Option<String> {
    date.map(|value| value.format("%Y-%m-%d").to_string())
}
