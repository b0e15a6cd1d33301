//! Integration scenarios for the document intake and checklist workflow.
//!
//! Scenarios exercise the public facade only: the classifier, the extractor dispatch, the merge
//! resolver, and the case service with its checklist.

mod common {
    use std::collections::{BTreeSet, HashMap};
    use std::sync::{Arc, Mutex};

    use grant_intake::workflows::checklist::{ProgramKey, RequirementsLibrary};
    use grant_intake::workflows::intake::{
        CaseId, CaseRecord, CaseRepository, IntakePolicy, IntakeService, RepositoryError,
    };

    pub(super) const BANK_STATEMENT: &str = "Wells Fargo Bank\n\
        Account Holder: Sunrise Bakery LLC\n\
        Account Number: XXXX-XXXX-1234\n\
        Statement Period: Jan 1, 2024 through Jan 31, 2024\n\
        Beginning Balance $1,000.00\n\
        Deposits and Additions $600.00\n\
        Withdrawals and Subtractions $100.00\n\
        Ending Balance $1,500.00\n\
        Transactions\n\
        01/05 Mobile Deposit 600.00\n\
        01/12 Card Purchase - Flour Supply -100.00\n";

    pub(super) const ACORD_25: &str = "ACORD 25 (2016/03)\n\
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
        CERTIFICATE HOLDER\n\
        City of Portland Grants Office\n";

    pub(super) const VENDOR_QUOTE: &str = "Harbor Kitchen Supply Co.\n\
        QUOTE\n\
        Quote #: Q-1042\n\
        Date: 02/10/2024\n\
        Valid Until: 03/10/2024\n\
        Prepared For: Sunrise Bakery LLC\n\
        Description Qty Unit Price Amount\n\
        Deck oven 1 $8,000.00 $8,000.00\n\
        Proofing cabinet 2 $1,250.00 $2,500.00\n\
        Subtotal $10,500.00\n\
        Tax $577.50\n\
        Total $11,077.50\n";

    pub(super) fn programs(keys: &[&str]) -> BTreeSet<ProgramKey> {
        keys.iter().map(|key| ProgramKey::from(*key)).collect()
    }

    #[derive(Default)]
    pub(super) struct MemoryRepository {
        records: Mutex<HashMap<CaseId, CaseRecord>>,
    }

    impl CaseRepository for MemoryRepository {
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
            guard.insert(record.case_id.clone(), record);
            Ok(())
        }

        fn fetch(&self, id: &CaseId) -> Result<Option<CaseRecord>, RepositoryError> {
            let guard = self.records.lock().expect("repository mutex poisoned");
            Ok(guard.get(id).cloned())
        }
    }

    pub(super) fn service() -> IntakeService<MemoryRepository> {
        IntakeService::new(
            Arc::new(MemoryRepository::default()),
            Arc::new(RequirementsLibrary::standard()),
            IntakePolicy::default(),
        )
    }
}

use chrono::NaiveDate;
use common::*;
use grant_intake::workflows::checklist::{build_checklist, RequirementsLibrary};
use grant_intake::workflows::intake::{
    classify, extract, merge_fields, DocType, DocumentStatus, DocumentUpload, ExtractionContext,
    FieldMap, FieldSource, FieldValue, MergeOptions,
};

fn context() -> ExtractionContext {
    ExtractionContext::new(NaiveDate::from_ymd_opt(2024, 2, 15).expect("valid date"))
}

#[test]
fn balanced_statement_extracts_without_warnings() {
    let classification = classify(BANK_STATEMENT);
    assert_eq!(classification.doc_type, Some(DocType::BankStatement));
    assert!(classification.confidence >= 0.8);

    let result = extract(
        DocType::BankStatement,
        BANK_STATEMENT,
        &context().with_classifier_confidence(classification.confidence),
    );
    assert!(result.warnings.is_empty(), "unexpected {:?}", result.warnings);
    let fields = result.field_map();
    assert_eq!(fields.get("bank_account_last4"), Some(&FieldValue::from("1234")));
    assert_eq!(
        fields.get("bank_statement_period_start"),
        Some(&FieldValue::from("2024-01-01"))
    );
    assert_eq!(fields.get("bank_ending_balance"), Some(&FieldValue::from(1500.0)));
}

#[test]
fn certificate_dates_are_validated() {
    let result = extract(DocType::InsuranceCertificate, ACORD_25, &context());
    assert!(result.warnings.is_empty(), "unexpected {:?}", result.warnings);
    assert_eq!(
        result.field_map().get("insurance_effective_date"),
        Some(&FieldValue::from("2024-01-01"))
    );

    let swapped = ACORD_25.replace(
        "Eff Date 01/01/2024 Exp Date 01/01/2025",
        "Eff Date 01/01/2025 Exp Date 01/01/2024",
    );
    let result = extract(DocType::InsuranceCertificate, &swapped, &context());
    assert!(result
        .warnings
        .codes()
        .contains(&"invalid_date_range".to_string()));
}

#[test]
fn merge_precedence_quadrants() {
    let questionnaire: FieldMap = [("ein".to_string(), FieldValue::from("111111111"))].into();
    let kept = merge_fields(
        &questionnaire,
        &[("ein".to_string(), FieldValue::from(""))].into(),
        MergeOptions {
            source: FieldSource::Extraction,
            questionnaire: &questionnaire,
        },
    );
    assert_eq!(kept.merged.get("ein"), Some(&FieldValue::from("111111111")));

    let filled = merge_fields(
        &FieldMap::new(),
        &[("ein".to_string(), FieldValue::from("222222222"))].into(),
        MergeOptions {
            source: FieldSource::Extraction,
            questionnaire: &FieldMap::new(),
        },
    );
    assert_eq!(filled.merged.get("ein"), Some(&FieldValue::from("222222222")));
    assert_eq!(filled.updated_keys, vec!["ein".to_string()]);
}

#[test]
fn quote_fulfils_shared_slot_until_programs_drop_out() {
    let service = service();
    let case = service
        .open_case(
            programs(&["main_street_recovery", "equipment_modernization"]),
            FieldMap::new(),
        )
        .expect("case opens");

    let receipt = service
        .upload_document(
            &case.case_id,
            DocumentUpload {
                text: VENDOR_QUOTE.to_string(),
                as_of: NaiveDate::from_ymd_opt(2024, 2, 15),
                ..DocumentUpload::default()
            },
        )
        .expect("upload succeeds");
    assert_eq!(receipt.slot, "Invoices_or_Quotes");
    let item = receipt
        .checklist
        .iter()
        .find(|item| item.doc_type == "Invoices_or_Quotes")
        .expect("invoice slot listed");
    assert_eq!(item.status, DocumentStatus::Extracted);
    assert_eq!(item.grants.len(), 2);

    let narrowed = service
        .update_shortlist(&case.case_id, programs(&["main_street_recovery"]))
        .expect("shortlist updates");
    let item = narrowed
        .checklist
        .iter()
        .find(|item| item.doc_type == "Invoices_or_Quotes")
        .expect("still required");
    assert_eq!(item.status, DocumentStatus::Extracted);

    let cleared = service
        .update_shortlist(&case.case_id, programs(&[]))
        .expect("shortlist updates");
    assert!(cleared
        .checklist
        .iter()
        .all(|item| item.doc_type != "Invoices_or_Quotes"));
    assert!(cleared.documents.contains_key("Invoices_or_Quotes"));
}

#[test]
fn checklist_output_is_stable() {
    let library = RequirementsLibrary::standard();
    let shortlist = programs(&["veteran_owned_business", "community_partnership"]);
    let first = serde_json::to_string(&build_checklist(&library, &shortlist, &[])).expect("json");
    let second = serde_json::to_string(&build_checklist(&library, &shortlist, &[])).expect("json");
    assert_eq!(first, second);
}
