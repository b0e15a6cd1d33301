use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::classifier::classify;
use super::domain::{
    CaseDocument, CaseId, ClassificationResult, DocType, DocumentStatus, ExtractionResult,
    ExtractionWarning, FieldMap, FieldSource, Hints, UnknownDocType,
};
use super::extractors::{self, ExtractionContext, RecencyPolicy};
use super::repository::{CaseRecord, CaseRepository, CaseView, RepositoryError};
use crate::workflows::checklist::{build_checklist, ChecklistItem, ProgramKey, RequirementsLibrary};

/// Prefix of the per-upload slots (`unclassified-1`, `unclassified-2`, ...) holding uploads that
/// could neither be classified nor were aimed at a slot.
pub const UNCLASSIFIED_SLOT: &str = "unclassified";

/// Dials applied to every upload.
#[derive(Debug, Clone, PartialEq)]
pub struct IntakePolicy {
    pub trust_threshold: f32,
    pub recency: RecencyPolicy,
}

impl IntakePolicy {
    pub const DEFAULT_TRUST_THRESHOLD: f32 = 0.5;

    pub fn new(trust_threshold: f32, recency: RecencyPolicy) -> Self {
        Self {
            trust_threshold,
            recency,
        }
    }
}

impl Default for IntakePolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TRUST_THRESHOLD, RecencyPolicy::default())
    }
}

/// A document arriving for a case. `slot` pins the checklist entry it is meant to fill.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentUpload {
    pub text: String,
    #[serde(default)]
    pub hints: Hints,
    #[serde(default)]
    pub slot: Option<String>,
    /// Reference date for recency checks; defaults to today.
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
}

/// Standalone extraction request for a known document type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractRequest {
    pub doc_type: String,
    pub text: String,
    #[serde(default)]
    pub hints: Hints,
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadReceipt {
    pub case_id: CaseId,
    pub slot: String,
    pub status: DocumentStatus,
    pub classification: ClassificationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction: Option<ExtractionResult>,
    pub updated_keys: Vec<String>,
    pub checklist: Vec<ChecklistItem>,
}

/// Reviewer verdict on an extracted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Mismatch,
}

impl ReviewDecision {
    const fn status(self) -> DocumentStatus {
        match self {
            Self::Approved => DocumentStatus::Approved,
            Self::Mismatch => DocumentStatus::Mismatch,
        }
    }
}

/// Service composing the classifier, extractors, merge resolver and checklist builder over a
/// repository of cases.
pub struct IntakeService<R> {
    repository: Arc<R>,
    library: Arc<RequirementsLibrary>,
    policy: IntakePolicy,
    /// One lock per case so each read-modify-write of a record runs alone.
    case_locks: Mutex<HashMap<CaseId, Arc<Mutex<()>>>>,
}

static CASE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_case_id() -> CaseId {
    let id = CASE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    CaseId(format!("case-{id:06}"))
}

impl<R> IntakeService<R>
where
    R: CaseRepository + 'static,
{
    pub fn new(repository: Arc<R>, library: Arc<RequirementsLibrary>, policy: IntakePolicy) -> Self {
        Self {
            repository,
            library,
            policy,
            case_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn library(&self) -> &RequirementsLibrary {
        &self.library
    }

    pub fn policy(&self) -> &IntakePolicy {
        &self.policy
    }

    /// Create a case, apply the applicant's questionnaire answers and seed placeholders for every
    /// required document.
    pub fn open_case(
        &self,
        shortlist: BTreeSet<ProgramKey>,
        questionnaire: FieldMap,
    ) -> Result<CaseView, IntakeServiceError> {
        let mut record = CaseRecord::new(next_case_id(), shortlist);
        record.fields.apply(FieldSource::Questionnaire, &questionnaire);
        self.seed_placeholders(&mut record);

        let stored = self.repository.insert(record)?;
        tracing::info!(
            case_id = %stored.case_id,
            programs = stored.shortlist.len(),
            documents = stored.documents.len(),
            "opened intake case"
        );
        Ok(self.view(&stored))
    }

    /// Merge questionnaire answers; returns the keys whose value changed.
    pub fn record_questionnaire(
        &self,
        case_id: &CaseId,
        fields: FieldMap,
    ) -> Result<Vec<String>, IntakeServiceError> {
        let lock = self.case_lock(case_id);
        let _guard = hold(&lock);
        let mut record = self.load(case_id)?;
        let updated_keys = record.fields.apply(FieldSource::Questionnaire, &fields);
        self.repository.update(record)?;
        tracing::debug!(case_id = %case_id, ?updated_keys, "merged questionnaire answers");
        Ok(updated_keys)
    }

    /// Classify, extract and merge one document, then recompute the checklist.
    pub fn upload_document(
        &self,
        case_id: &CaseId,
        upload: DocumentUpload,
    ) -> Result<UploadReceipt, IntakeServiceError> {
        let lock = self.case_lock(case_id);
        let _guard = hold(&lock);
        let mut record = self.load(case_id)?;

        let classification = classify(&upload.text);
        let trusted = classification.trusted(self.policy.trust_threshold);
        let unclassified = upload.slot.is_none() && trusted.is_none();
        let slot = match upload.slot.as_deref() {
            Some(slot) => {
                if self.library.document(slot).is_none() {
                    return Err(UnknownDocType(slot.to_string()).into());
                }
                slot.to_string()
            }
            None => match trusted {
                Some(doc_type) => self
                    .library
                    .slot_for(doc_type)
                    .unwrap_or(doc_type.key())
                    .to_string(),
                None => unclassified_slot(&record),
            },
        };

        let previous = record
            .document(&slot)
            .map(|document| document.status)
            .unwrap_or(DocumentStatus::NotUploaded);
        ensure_transition(&slot, previous, DocumentStatus::Uploaded)?;

        let mut document = CaseDocument {
            doc_type: (!unclassified).then(|| slot.clone()),
            status: DocumentStatus::Uploaded,
            classification: Some(classification.clone()),
            fields: None,
            uploaded_at: Some(Utc::now()),
        };
        log_transition(case_id, &slot, previous, document.status);

        let mut updated_keys = Vec::new();
        match trusted {
            Some(doc_type) => {
                self.advance(case_id, &slot, &mut document, DocumentStatus::Parsing);

                let mut hints = classification.hints.clone();
                hints.extend(upload.hints);
                let context = ExtractionContext::new(
                    upload.as_of.unwrap_or_else(|| Utc::now().date_naive()),
                )
                .with_hints(hints)
                .with_classifier_confidence(classification.confidence)
                .with_recency(self.policy.recency.clone());

                let mut extraction = extractors::extract(doc_type, &upload.text, &context);
                let accepted = self
                    .library
                    .document(&slot)
                    .map(|spec| spec.accepts(doc_type))
                    .unwrap_or(true);
                if accepted {
                    self.audit_required_fields(&slot, &mut extraction);
                }
                self.advance(case_id, &slot, &mut document, DocumentStatus::Extracted);

                if accepted {
                    updated_keys = record
                        .fields
                        .apply(FieldSource::Extraction, &extraction.field_map());
                    tracing::debug!(case_id = %case_id, ?updated_keys, "merged extracted fields");
                } else {
                    tracing::warn!(
                        case_id = %case_id,
                        slot = %slot,
                        classified = %doc_type,
                        "uploaded document does not match its slot"
                    );
                    self.advance(case_id, &slot, &mut document, DocumentStatus::Mismatch);
                }
                document.fields = Some(extraction);
            }
            None => {
                tracing::info!(
                    case_id = %case_id,
                    slot = %slot,
                    confidence = classification.confidence,
                    "classification below trust threshold; awaiting manual review"
                );
            }
        }

        let status = document.status;
        let extraction = document.fields.clone();
        record.documents.insert(slot.clone(), document);
        self.repository.update(record.clone())?;

        Ok(UploadReceipt {
            case_id: case_id.clone(),
            slot,
            status,
            classification,
            extraction,
            updated_keys,
            checklist: self.checklist_for(&record),
        })
    }

    /// Replace the shortlist; stored documents are kept even when no longer required.
    pub fn update_shortlist(
        &self,
        case_id: &CaseId,
        shortlist: BTreeSet<ProgramKey>,
    ) -> Result<CaseView, IntakeServiceError> {
        let lock = self.case_lock(case_id);
        let _guard = hold(&lock);
        let mut record = self.load(case_id)?;
        record.shortlist = shortlist;
        self.seed_placeholders(&mut record);
        self.repository.update(record.clone())?;
        tracing::info!(
            case_id = %case_id,
            programs = record.shortlist.len(),
            "updated program shortlist"
        );
        Ok(self.view(&record))
    }

    pub fn review_document(
        &self,
        case_id: &CaseId,
        doc_type: &str,
        decision: ReviewDecision,
    ) -> Result<CaseDocument, IntakeServiceError> {
        self.set_status(case_id, doc_type, decision.status())
    }

    /// Mark a system-produced document as generated.
    pub fn mark_generated(
        &self,
        case_id: &CaseId,
        doc_type: &str,
    ) -> Result<CaseDocument, IntakeServiceError> {
        let generated = self
            .library
            .document(doc_type)
            .map(|spec| spec.generated)
            .unwrap_or(false);
        if !generated {
            return Err(IntakeServiceError::NotGenerated(doc_type.to_string()));
        }
        self.set_status(case_id, doc_type, DocumentStatus::Generated)
    }

    pub fn checklist(&self, case_id: &CaseId) -> Result<Vec<ChecklistItem>, IntakeServiceError> {
        let record = self.load(case_id)?;
        Ok(self.checklist_for(&record))
    }

    pub fn get(&self, case_id: &CaseId) -> Result<CaseView, IntakeServiceError> {
        let record = self.load(case_id)?;
        Ok(self.view(&record))
    }

    /// Run one extractor without touching any case.
    pub fn extract(&self, request: ExtractRequest) -> Result<ExtractionResult, IntakeServiceError> {
        let doc_type: DocType = request.doc_type.parse()?;
        let context = ExtractionContext::new(
            request.as_of.unwrap_or_else(|| Utc::now().date_naive()),
        )
        .with_hints(request.hints)
        .with_recency(self.policy.recency.clone());
        Ok(extractors::extract(doc_type, &request.text, &context))
    }

    fn case_lock(&self, case_id: &CaseId) -> Arc<Mutex<()>> {
        let mut locks = hold(&self.case_locks);
        locks.entry(case_id.clone()).or_default().clone()
    }

    fn load(&self, case_id: &CaseId) -> Result<CaseRecord, IntakeServiceError> {
        self.repository
            .fetch(case_id)?
            .ok_or_else(|| IntakeServiceError::CaseNotFound(case_id.clone()))
    }

    fn set_status(
        &self,
        case_id: &CaseId,
        doc_type: &str,
        next: DocumentStatus,
    ) -> Result<CaseDocument, IntakeServiceError> {
        let lock = self.case_lock(case_id);
        let _guard = hold(&lock);
        let mut record = self.load(case_id)?;
        let document = record
            .documents
            .get_mut(doc_type)
            .ok_or_else(|| IntakeServiceError::DocumentNotFound(doc_type.to_string()))?;
        let previous = document.status;
        ensure_transition(doc_type, previous, next)?;
        document.status = next;
        let updated = document.clone();

        self.repository.update(record)?;
        log_transition(case_id, doc_type, previous, next);
        Ok(updated)
    }

    fn advance(&self, case_id: &CaseId, slot: &str, document: &mut CaseDocument, next: DocumentStatus) {
        log_transition(case_id, slot, document.status, next);
        document.status = next;
    }

    /// Append a `missing_field` warning for every library-required field the extractor left
    /// empty.
    fn audit_required_fields(&self, slot: &str, extraction: &mut ExtractionResult) {
        let Some(spec) = self.library.document(slot) else {
            return;
        };
        let fields = extraction.field_map();
        for name in spec.required_fields() {
            let present = fields.get(name).map(|value| !value.is_empty()).unwrap_or(false);
            if !present {
                extraction
                    .warnings
                    .insert(ExtractionWarning::MissingField(name.to_string()));
            }
        }
    }

    fn seed_placeholders(&self, record: &mut CaseRecord) {
        for doc_type in self.library.required_doc_types(&record.shortlist) {
            record
                .documents
                .entry(doc_type.clone())
                .or_insert_with(|| CaseDocument::placeholder(doc_type));
        }
    }

    fn checklist_for(&self, record: &CaseRecord) -> Vec<ChecklistItem> {
        build_checklist(&self.library, &record.shortlist, record.documents.values())
    }

    fn view(&self, record: &CaseRecord) -> CaseView {
        record.view(self.checklist_for(record))
    }
}

/// The guarded data is either `()` or a lock table, so a poisoned lock is still usable.
fn hold<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unclassified_slot(record: &CaseRecord) -> String {
    let prefix = format!("{UNCLASSIFIED_SLOT}-");
    let taken = record
        .documents
        .keys()
        .filter(|key| key.starts_with(&prefix))
        .count();
    format!("{prefix}{}", taken + 1)
}

fn ensure_transition(
    doc_type: &str,
    from: DocumentStatus,
    to: DocumentStatus,
) -> Result<(), IntakeServiceError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(IntakeServiceError::InvalidTransition {
            doc_type: doc_type.to_string(),
            from,
            to,
        })
    }
}

fn log_transition(case_id: &CaseId, doc_type: &str, from: DocumentStatus, to: DocumentStatus) {
    tracing::info!(
        case_id = %case_id,
        doc_type = %doc_type,
        from = from.label(),
        to = to.label(),
        "document status changed"
    );
}

/// Error raised by the intake service.
#[derive(Debug, thiserror::Error)]
pub enum IntakeServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("case '{0}' not found")]
    CaseNotFound(CaseId),
    #[error("no document stored for '{0}'")]
    DocumentNotFound(String),
    #[error("'{doc_type}' cannot move from {} to {}", .from.label(), .to.label())]
    InvalidTransition {
        doc_type: String,
        from: DocumentStatus,
        to: DocumentStatus,
    },
    #[error(transparent)]
    UnknownDocType(#[from] UnknownDocType),
    #[error("'{0}' is not a system-generated document")]
    NotGenerated(String),
}
