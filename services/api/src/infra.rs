use chrono::NaiveDate;
use grant_intake::workflows::intake::{
    CaseId, CaseRecord, CaseRepository, DocumentStatus, RepositoryError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

const STATUSES: [DocumentStatus; 7] = [
    DocumentStatus::NotUploaded,
    DocumentStatus::Uploaded,
    DocumentStatus::Parsing,
    DocumentStatus::Extracted,
    DocumentStatus::Approved,
    DocumentStatus::Mismatch,
    DocumentStatus::Generated,
];

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryCaseRepository {
    records: Arc<Mutex<HashMap<CaseId, CaseRecord>>>,
}

impl CaseRepository for InMemoryCaseRepository {
    fn insert(&self, record: CaseRecord) -> Result<CaseRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&record.case_id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.case_id.clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: CaseRecord) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&record.case_id) {
            guard.insert(record.case_id.clone(), record);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch(&self, id: &CaseId) -> Result<Option<CaseRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

/// `key=value` pairs for `--hint` and `--uploaded`.
pub(crate) fn parse_pair(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{raw}'"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

pub(crate) fn parse_status(raw: &str) -> Result<DocumentStatus, String> {
    let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
    STATUSES
        .into_iter()
        .find(|status| status.label() == normalized)
        .ok_or_else(|| format!("unknown document status '{raw}'"))
}

/// `doc_type=status` pairs for the checklist command.
pub(crate) fn parse_uploaded(raw: &str) -> Result<(String, DocumentStatus), String> {
    let (doc_type, status) = parse_pair(raw)?;
    Ok((doc_type, parse_status(&status)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_split_on_first_equals() {
        assert_eq!(
            parse_pair("statement_date=2024-01-15"),
            Ok(("statement_date".to_string(), "2024-01-15".to_string()))
        );
        assert_eq!(
            parse_pair("note=a=b"),
            Ok(("note".to_string(), "a=b".to_string()))
        );
        assert!(parse_pair("=value").is_err());
        assert!(parse_pair("novalue").is_err());
    }

    #[test]
    fn statuses_accept_loose_spelling() {
        assert_eq!(parse_status("Not Uploaded"), Ok(DocumentStatus::NotUploaded));
        assert_eq!(parse_status("approved"), Ok(DocumentStatus::Approved));
        assert!(parse_status("lost").is_err());
    }

    #[test]
    fn update_requires_existing_case() {
        let repository = InMemoryCaseRepository::default();
        let record = CaseRecord::new(CaseId("case-9".to_string()), Default::default());
        assert!(matches!(
            repository.update(record.clone()),
            Err(RepositoryError::NotFound)
        ));
        repository.insert(record.clone()).expect("insert succeeds");
        assert!(matches!(
            repository.insert(record),
            Err(RepositoryError::Conflict)
        ));
    }
}
