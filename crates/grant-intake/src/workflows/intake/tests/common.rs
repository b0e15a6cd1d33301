use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::workflows::checklist::{ProgramKey, RequirementsLibrary};
use crate::workflows::intake::domain::{CaseId, FieldMap, FieldValue};
use crate::workflows::intake::repository::{CaseRecord, CaseRepository, RepositoryError};
use crate::workflows::intake::service::{DocumentUpload, IntakePolicy, IntakeService};
use crate::workflows::intake::intake_router;

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

pub(super) const DD214: &str = "CERTIFICATE OF RELEASE OR DISCHARGE FROM ACTIVE DUTY\n\
    DD FORM 214\n\
    1. NAME (Last, First, Middle)\n\
    DOE, JOHN ALLEN\n\
    2. DEPARTMENT, COMPONENT AND BRANCH\n\
    ARMY/RA\n\
    12a. DATE ENTERED ACTIVE DUTY THIS PERIOD: 2010-06-15\n\
    12b. SEPARATION DATE THIS PERIOD: 2014-06-14\n\
    24. CHARACTER OF SERVICE (Include upgrades): HONORABLE\n";

pub(super) const UTILITY_BILL: &str = "Central Maine Power - Electric Service\n\
    Statement Date: 01/15/2024\n\
    Account Holder: Sunrise Bakery LLC\n\
    Service Address: 45 Main Street, Portland, ME 04102\n\
    Amount Due $123.45\n";

pub(super) const DURABLE_POA: &str = "DURABLE POWER OF ATTORNEY\n\
    I, Maria Lopez, of Salem, Massachusetts, hereby appoint Daniel Lopez as my agent\n\
    (attorney-in-fact). My agent may act for me in banking transactions and tax matters.\n\
    Signed this 5th day of March, 2024.\n\
    Notary Public\n";

pub(super) const RESUME: &str = "Maria Lopez\n\
    maria@sunrisebakery.com | (207) 555-0100 | Portland, ME\n\
    \n\
    SUMMARY\n\
    Pastry chef and owner with twelve years of commercial baking experience.\n\
    \n\
    EXPERIENCE\n\
    Head Baker, Sunrise Bakery LLC\n\
    Jan 2019 - Present\n\
    - Grew wholesale accounts to 40 cafes\n\
    \n\
    EDUCATION\n\
    B.S. in Hospitality Management, University of Southern Maine, 2015\n\
    \n\
    SKILLS\n\
    Menu costing, QuickBooks, Excel\n";

pub(super) const SUPPORT_LETTER: &str = "March 4, 2024\n\
    \n\
    Dear Grants Committee,\n\
    \n\
    I am writing in strong support of Sunrise Bakery's application. As a longtime customer\n\
    and neighbor, I have seen the bakery anchor our block.\n\
    \n\
    Sincerely,\n\
    Daniel Reyes\n\
    Executive Director, Portland Main Street\n";

pub(super) fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 2, 15).expect("valid date")
}

pub(super) fn upload(text: &str) -> DocumentUpload {
    DocumentUpload {
        text: text.to_string(),
        as_of: Some(as_of()),
        ..DocumentUpload::default()
    }
}

pub(super) fn upload_into(text: &str, slot: &str) -> DocumentUpload {
    DocumentUpload {
        slot: Some(slot.to_string()),
        ..upload(text)
    }
}

pub(super) fn programs(keys: &[&str]) -> BTreeSet<ProgramKey> {
    keys.iter().map(|key| ProgramKey::from(*key)).collect()
}

pub(super) fn answers(entries: &[(&str, &str)]) -> FieldMap {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), FieldValue::from(*value)))
        .collect()
}

pub(super) fn build_service() -> (IntakeService<MemoryRepository>, Arc<MemoryRepository>) {
    let repository = Arc::new(MemoryRepository::default());
    let service = IntakeService::new(
        repository.clone(),
        Arc::new(RequirementsLibrary::standard()),
        IntakePolicy::default(),
    );
    (service, repository)
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<HashMap<CaseId, CaseRecord>>>,
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

pub(super) struct UnavailableRepository;

impl CaseRepository for UnavailableRepository {
    fn insert(&self, _record: CaseRecord) -> Result<CaseRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _record: CaseRecord) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &CaseId) -> Result<Option<CaseRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) fn unavailable_service() -> IntakeService<UnavailableRepository> {
    IntakeService::new(
        Arc::new(UnavailableRepository),
        Arc::new(RequirementsLibrary::standard()),
        IntakePolicy::default(),
    )
}

pub(super) fn router_with_service(service: IntakeService<MemoryRepository>) -> axum::Router {
    intake_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
