use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::extractors::ExtractedFields;

/// Caller supplied attributes travelling alongside a document (e.g. a known form code).
pub type Hints = BTreeMap<String, String>;

/// Flat, canonical field state for a case.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Identifier wrapper for applicant cases.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CaseId(pub String);

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Document categories the classifier and extractors understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    BankStatement,
    InsuranceCertificate,
    VeteranStatus,
    ProofOfAddress,
    PowerOfAttorney,
    Resume,
    LetterOfSupport,
    InvoiceOrQuote,
}

impl DocType {
    pub const fn ordered() -> [Self; 8] {
        [
            Self::BankStatement,
            Self::InsuranceCertificate,
            Self::VeteranStatus,
            Self::ProofOfAddress,
            Self::PowerOfAttorney,
            Self::Resume,
            Self::LetterOfSupport,
            Self::InvoiceOrQuote,
        ]
    }

    pub const fn key(self) -> &'static str {
        match self {
            Self::BankStatement => "bank_statement",
            Self::InsuranceCertificate => "insurance_certificate",
            Self::VeteranStatus => "veteran_status",
            Self::ProofOfAddress => "proof_of_address",
            Self::PowerOfAttorney => "power_of_attorney",
            Self::Resume => "resume",
            Self::LetterOfSupport => "letter_of_support",
            Self::InvoiceOrQuote => "invoice_or_quote",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::BankStatement => "Bank Statement",
            Self::InsuranceCertificate => "Certificate of Insurance",
            Self::VeteranStatus => "Veteran Status Form",
            Self::ProofOfAddress => "Proof of Address",
            Self::PowerOfAttorney => "Power of Attorney",
            Self::Resume => "Resume",
            Self::LetterOfSupport => "Letter of Support",
            Self::InvoiceOrQuote => "Invoice or Quote",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported document type '{0}'")]
pub struct UnknownDocType(pub String);

impl FromStr for DocType {
    type Err = UnknownDocType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Self::ordered()
            .into_iter()
            .find(|doc_type| doc_type.key() == normalized)
            .ok_or_else(|| UnknownDocType(value.to_string()))
    }
}

/// Outcome of the classifier. `doc_type` is `None` when nothing was corroborated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    #[serde(rename = "type", with = "doc_type_or_unknown")]
    pub doc_type: Option<DocType>,
    pub confidence: f32,
    pub hints: Hints,
}

impl ClassificationResult {
    pub fn unknown(confidence: f32, hints: Hints) -> Self {
        Self {
            doc_type: None,
            confidence,
            hints,
        }
    }

    /// The document type when the confidence clears `threshold`.
    pub fn trusted(&self, threshold: f32) -> Option<DocType> {
        self.doc_type.filter(|_| self.confidence >= threshold)
    }

    pub fn type_label(&self) -> &'static str {
        self.doc_type.map(DocType::key).unwrap_or("unknown")
    }
}

mod doc_type_or_unknown {
    use super::DocType;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<DocType>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.map(DocType::key).unwrap_or("unknown"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DocType>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.eq_ignore_ascii_case("unknown") {
            return Ok(None);
        }
        raw.parse::<DocType>()
            .map(Some)
            .map_err(serde::de::Error::custom)
    }
}

/// Transient upload payload: already-extracted text plus optional hints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDocument {
    pub text: String,
    #[serde(default)]
    pub hints: Hints,
}

/// Non-fatal anomalies surfaced to a human reviewer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionWarning {
    BalanceMismatch,
    MissingBalance,
    InvalidDateRange,
    MissingRequiredSection,
    NoCoverageFound,
    InvalidServiceDates,
    UnrecognizedRelationship,
    StaleDocument,
    MissingDocumentDate,
    MissingCityOrState,
    PrincipalMissing,
    AgentMissing,
    MissingContactInfo,
    MissingRecipient,
    MissingSignature,
    TotalMismatch,
    LineItemMismatch,
    MissingField(String),
}

impl fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::BalanceMismatch => "balance_mismatch",
            Self::MissingBalance => "missing_balance",
            Self::InvalidDateRange => "invalid_date_range",
            Self::MissingRequiredSection => "missing_required_section",
            Self::NoCoverageFound => "no_coverage_found",
            Self::InvalidServiceDates => "invalid_service_dates",
            Self::UnrecognizedRelationship => "unrecognized_relationship",
            Self::StaleDocument => "stale_document",
            Self::MissingDocumentDate => "missing_document_date",
            Self::MissingCityOrState => "missing_city_or_state",
            Self::PrincipalMissing => "principal_missing",
            Self::AgentMissing => "agent_missing",
            Self::MissingContactInfo => "missing_contact_info",
            Self::MissingRecipient => "missing_recipient",
            Self::MissingSignature => "missing_signature",
            Self::TotalMismatch => "total_mismatch",
            Self::LineItemMismatch => "line_item_mismatch",
            Self::MissingField(field) => return write!(f, "missing_field:{field}"),
        };
        f.write_str(code)
    }
}

/// Insertion-ordered set of warnings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Warnings(Vec<ExtractionWarning>);

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `warning` unless it is already present. Returns whether it was added.
    pub fn insert(&mut self, warning: ExtractionWarning) -> bool {
        if self.0.contains(&warning) {
            return false;
        }
        self.0.push(warning);
        true
    }

    pub fn contains(&self, warning: &ExtractionWarning) -> bool {
        self.0.contains(warning)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtractionWarning> {
        self.0.iter()
    }

    pub fn codes(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl FromIterator<ExtractionWarning> for Warnings {
    fn from_iter<I: IntoIterator<Item = ExtractionWarning>>(iter: I) -> Self {
        let mut warnings = Self::new();
        for warning in iter {
            warnings.insert(warning);
        }
        warnings
    }
}

/// Extractor output: typed fields, a confidence, and reviewer warnings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub doc_type: DocType,
    pub fields: ExtractedFields,
    pub confidence: f32,
    pub warnings: Warnings,
}

impl ExtractionResult {
    /// Flatten the typed record into canonical case field names.
    pub fn field_map(&self) -> FieldMap {
        self.fields.field_map()
    }
}

/// Value stored in a case's field bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Empty values never overwrite anything during an extraction merge.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(value) => value.trim().is_empty(),
            FieldValue::List(values) => values.iter().all(|value| value.trim().is_empty()),
            FieldValue::Boolean(_) | FieldValue::Number(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(values: Vec<String>) -> Self {
        FieldValue::List(values)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// Provenance tier of a field value; questionnaire answers outrank extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Extraction,
    Questionnaire,
}

/// Fulfillment state of a required document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    NotUploaded,
    Uploaded,
    Parsing,
    Extracted,
    Approved,
    Mismatch,
    Generated,
}

impl DocumentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotUploaded => "not_uploaded",
            Self::Uploaded => "uploaded",
            Self::Parsing => "parsing",
            Self::Extracted => "extracted",
            Self::Approved => "approved",
            Self::Mismatch => "mismatch",
            Self::Generated => "generated",
        }
    }

    /// Legal transitions. A fresh upload may replace any applicant-supplied document;
    /// `generated` is terminal.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::NotUploaded, Self::Uploaded)
                | (Self::NotUploaded, Self::Generated)
                | (Self::Uploaded, Self::Parsing)
                | (Self::Parsing, Self::Extracted)
                | (Self::Extracted, Self::Approved)
                | (Self::Extracted, Self::Mismatch)
                | (Self::Extracted, Self::Uploaded)
                | (Self::Approved, Self::Uploaded)
                | (Self::Mismatch, Self::Uploaded)
                | (Self::Uploaded, Self::Uploaded)
        )
    }
}

/// A document slot on a case: a placeholder until something is uploaded or generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseDocument {
    pub doc_type: Option<String>,
    pub status: DocumentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<ClassificationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<ExtractionResult>,
    #[serde(default)]
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl CaseDocument {
    pub fn placeholder(doc_type: impl Into<String>) -> Self {
        Self {
            doc_type: Some(doc_type.into()),
            status: DocumentStatus::NotUploaded,
            classification: None,
            fields: None,
            uploaded_at: None,
        }
    }
}
