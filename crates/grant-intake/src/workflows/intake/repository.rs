use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::domain::{CaseDocument, CaseId};
use super::merge::FieldBag;
use crate::workflows::checklist::{ChecklistItem, ProgramKey};

/// Everything the engine knows about one applicant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub case_id: CaseId,
    pub shortlist: BTreeSet<ProgramKey>,
    pub fields: FieldBag,
    /// Stored documents keyed by checklist slot. Entries outlive shortlist changes.
    pub documents: BTreeMap<String, CaseDocument>,
}

impl CaseRecord {
    pub fn new(case_id: CaseId, shortlist: BTreeSet<ProgramKey>) -> Self {
        Self {
            case_id,
            shortlist,
            fields: FieldBag::new(),
            documents: BTreeMap::new(),
        }
    }

    pub fn document(&self, doc_type: &str) -> Option<&CaseDocument> {
        self.documents.get(doc_type)
    }

    pub fn view(&self, checklist: Vec<ChecklistItem>) -> CaseView {
        CaseView {
            case_id: self.case_id.clone(),
            shortlist: self.shortlist.clone(),
            fields: self.fields.clone(),
            documents: self.documents.clone(),
            checklist,
        }
    }
}

/// Storage abstraction so the intake service can be exercised in isolation.
pub trait CaseRepository: Send + Sync {
    fn insert(&self, record: CaseRecord) -> Result<CaseRecord, RepositoryError>;
    fn update(&self, record: CaseRecord) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &CaseId) -> Result<Option<CaseRecord>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("case already exists")]
    Conflict,
    #[error("case not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Case state plus its freshly computed checklist, as returned to API callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseView {
    pub case_id: CaseId,
    pub shortlist: BTreeSet<ProgramKey>,
    pub fields: FieldBag,
    pub documents: BTreeMap<String, CaseDocument>,
    pub checklist: Vec<ChecklistItem>,
}
