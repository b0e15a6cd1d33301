//! Document intake: classification, per-type extraction, and field reconciliation for a case.
//!
//! Uploaded text flows through the classifier, the extractor registered for the detected type,
//! and the merge resolver before the case's checklist is recomputed.

pub mod classifier;
pub mod domain;
pub mod extractors;
pub mod merge;
pub(crate) mod normalize;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use classifier::classify;
pub use domain::{
    CaseDocument, CaseId, ClassificationResult, DocType, DocumentStatus, ExtractionResult,
    ExtractionWarning, FieldMap, FieldSource, FieldValue, Hints, RawDocument, UnknownDocType,
    Warnings,
};
pub use extractors::{extract, ExtractedFields, ExtractionContext, RecencyPolicy};
pub use merge::{merge_fields, FieldBag, MergeOptions, MergeOutcome};
pub use repository::{CaseRecord, CaseRepository, CaseView, RepositoryError};
pub use router::intake_router;
pub use service::{
    DocumentUpload, ExtractRequest, IntakePolicy, IntakeService, IntakeServiceError,
    ReviewDecision, UploadReceipt, UNCLASSIFIED_SLOT,
};
