use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::library::{ProgramKey, RequirementsLibrary};
use crate::workflows::intake::{CaseDocument, DocumentStatus};

/// Whether a document is shared by every program or specific to a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistSource {
    Common,
    Grant,
}

/// One deduplicated row of the applicant-facing document list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub doc_type: String,
    pub display_name: String,
    pub source: ChecklistSource,
    pub grants: BTreeSet<ProgramKey>,
    pub status: DocumentStatus,
    pub description: String,
    pub example_url: Option<String>,
}

/// Compute the checklist for `shortlist` against the documents already on the case.
///
/// Common documents come first in declared order, followed by grant-specific documents sorted by
/// doc_type. Programs missing from the library contribute nothing. Statuses are read from
/// `documents` and default to `not_uploaded`; the case itself is never touched.
pub fn build_checklist<'a, I>(
    library: &RequirementsLibrary,
    shortlist: &BTreeSet<ProgramKey>,
    documents: I,
) -> Vec<ChecklistItem>
where
    I: IntoIterator<Item = &'a CaseDocument>,
{
    let mut statuses: BTreeMap<&str, DocumentStatus> = BTreeMap::new();
    for document in documents {
        if let Some(doc_type) = document.doc_type.as_deref() {
            statuses.entry(doc_type).or_insert(document.status);
        }
    }

    let resolved: Vec<_> = shortlist
        .iter()
        .filter_map(|program| library.program(program).map(|requirements| (program, requirements)))
        .collect();

    let mut items: Vec<ChecklistItem> = Vec::new();
    let mut positions: BTreeMap<String, usize> = BTreeMap::new();
    let mut insert = |program: &ProgramKey, doc_type: &str, source: ChecklistSource| {
        if let Some(&index) = positions.get(doc_type) {
            items[index].grants.insert(program.clone());
            return;
        }
        let Some(spec) = library.document(doc_type) else {
            return;
        };
        positions.insert(doc_type.to_string(), items.len());
        items.push(ChecklistItem {
            doc_type: doc_type.to_string(),
            display_name: spec.display_name.clone(),
            source,
            grants: BTreeSet::from([program.clone()]),
            status: statuses
                .get(doc_type)
                .copied()
                .unwrap_or(DocumentStatus::NotUploaded),
            description: spec.description.clone(),
            example_url: spec.example_url.clone(),
        });
    };

    for &(program, requirements) in &resolved {
        for doc_type in &requirements.common_docs {
            insert(program, doc_type.as_str(), ChecklistSource::Common);
        }
    }
    for &(program, requirements) in &resolved {
        let mut grant_docs: Vec<&String> = requirements.required_docs.iter().collect();
        grant_docs.sort();
        for doc_type in grant_docs {
            insert(program, doc_type.as_str(), ChecklistSource::Grant);
        }
    }

    items
}

/// Items the applicant still has to act on.
pub fn outstanding(items: &[ChecklistItem]) -> impl Iterator<Item = &ChecklistItem> {
    items.iter().filter(|item| {
        matches!(
            item.status,
            DocumentStatus::NotUploaded | DocumentStatus::Mismatch
        )
    })
}
