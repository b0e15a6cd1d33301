use crate::infra::{parse_date, parse_pair, parse_uploaded, InMemoryCaseRepository};
use chrono::{NaiveDate, Utc};
use clap::Args;
use grant_intake::config::AppConfig;
use grant_intake::error::AppError;
use grant_intake::workflows::checklist::{
    build_checklist, outstanding, ChecklistItem, ChecklistSource, ProgramKey, RequirementsLibrary,
};
use grant_intake::workflows::intake::{
    classify, CaseDocument, CaseId, DocumentStatus, DocumentUpload, ExtractRequest,
    ExtractionResult, FieldValue, IntakePolicy, IntakeService, ReviewDecision, UploadReceipt,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct ClassifyArgs {
    /// Plain-text document to classify
    #[arg(long)]
    pub(crate) file: PathBuf,
}

#[derive(Args, Debug)]
pub(crate) struct ExtractArgs {
    /// Document type to extract (e.g. bank_statement, insurance_certificate)
    #[arg(long)]
    pub(crate) doc_type: String,
    /// Plain-text document to extract from
    #[arg(long)]
    pub(crate) file: PathBuf,
    /// Extraction hint as key=value; repeatable
    #[arg(long = "hint", value_parser = parse_pair)]
    pub(crate) hints: Vec<(String, String)>,
    /// Reference date for recency checks (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) as_of: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub(crate) struct ChecklistArgs {
    /// Shortlisted program key; repeatable
    #[arg(long = "program")]
    pub(crate) programs: Vec<String>,
    /// Known document status as doc_type=status; repeatable
    #[arg(long, value_parser = parse_uploaded)]
    pub(crate) uploaded: Vec<(String, DocumentStatus)>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Reference date for recency checks (YYYY-MM-DD). Defaults to the sample documents' date.
    #[arg(long, value_parser = parse_date)]
    pub(crate) as_of: Option<NaiveDate>,
}

pub(crate) fn run_classify(args: ClassifyArgs) -> Result<(), AppError> {
    let text = std::fs::read_to_string(&args.file)?;
    let classification = classify(&text);
    println!(
        "{} -> {} (confidence {:.2})",
        args.file.display(),
        classification.type_label(),
        classification.confidence
    );
    print_json("Classification", &classification);
    Ok(())
}

pub(crate) fn run_extract(args: ExtractArgs) -> Result<(), AppError> {
    let ExtractArgs {
        doc_type,
        file,
        hints,
        as_of,
    } = args;

    let config = AppConfig::load()?;
    let text = std::fs::read_to_string(&file)?;
    let service = IntakeService::new(
        Arc::new(InMemoryCaseRepository::default()),
        Arc::new(config.intake.library()?),
        config.intake.policy(),
    );
    let result = service.extract(ExtractRequest {
        doc_type,
        text,
        hints: hints.into_iter().collect(),
        as_of,
    })?;

    render_extraction(&result);
    print_json("Fields", &result.fields);
    Ok(())
}

pub(crate) fn run_checklist(args: ChecklistArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let library = config.intake.library()?;

    let shortlist: BTreeSet<ProgramKey> = args.programs.iter().map(ProgramKey::new).collect();
    for key in &shortlist {
        if library.program(key).is_none() {
            println!("Skipping unknown program '{key}'");
        }
    }

    let documents: Vec<CaseDocument> = args
        .uploaded
        .into_iter()
        .map(|(doc_type, status)| CaseDocument {
            status,
            ..CaseDocument::placeholder(doc_type)
        })
        .collect();

    let items = build_checklist(&library, &shortlist, &documents);
    render_checklist(&items);
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let as_of = args
        .as_of
        .or_else(|| NaiveDate::from_ymd_opt(2024, 2, 15))
        .unwrap_or_else(|| Utc::now().date_naive());

    println!("Grant intake demo (reference date {as_of})");
    let service = IntakeService::new(
        Arc::new(InMemoryCaseRepository::default()),
        Arc::new(RequirementsLibrary::standard()),
        IntakePolicy::default(),
    );

    let shortlist: BTreeSet<ProgramKey> = ["main_street_recovery", "veteran_owned_business"]
        .into_iter()
        .map(ProgramKey::from)
        .collect();
    let questionnaire = [
        ("business_name", "Sunrise Bakery LLC"),
        ("bank_account_holder", "Sunrise Bakery Holdings"),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), FieldValue::from(value)))
    .collect();

    let case = service.open_case(shortlist, questionnaire)?;
    let case_id = case.case_id.clone();
    println!(
        "\nOpened case {} for {} program(s); {} documents required",
        case_id,
        case.shortlist.len(),
        case.checklist.len()
    );
    render_checklist(&case.checklist);

    println!("\nUploads");
    for (label, text) in SAMPLE_UPLOADS {
        let receipt = service.upload_document(
            &case_id,
            DocumentUpload {
                text: text.to_string(),
                as_of: Some(as_of),
                ..DocumentUpload::default()
            },
        )?;
        render_receipt(label, &receipt);
    }

    println!("\nField bag after merge (questionnaire answers win)");
    let view = service.get(&case_id)?;
    for (key, value) in view.fields.values() {
        let source = view
            .fields
            .source_of(key)
            .map(|source| format!("{source:?}").to_ascii_lowercase())
            .unwrap_or_else(|| "unknown".to_string());
        println!("  - {key} = {} [{source}]", render_value(value));
    }

    println!("\nReviewer approves the bank statement and the grant use statement is generated");
    service.review_document(&case_id, "Bank_Statements", ReviewDecision::Approved)?;
    service.mark_generated(&case_id, "Grant_Use_Statement")?;
    render_checklist(&service.checklist(&case_id)?);

    println!("\nApplicant drops main_street_recovery");
    let narrowed = service.update_shortlist(
        &case_id,
        [ProgramKey::from("veteran_owned_business")].into_iter().collect(),
    )?;
    render_checklist(&narrowed.checklist);
    println!(
        "  Documents retained on the case: {}",
        narrowed.documents.len()
    );

    print_outstanding(&service.checklist(&case_id)?, &case_id);
    Ok(())
}

fn render_receipt(label: &str, receipt: &UploadReceipt) {
    println!(
        "- {label}: classified {} ({:.2}) -> slot {} [{}]",
        receipt.classification.type_label(),
        receipt.classification.confidence,
        receipt.slot,
        receipt.status.label()
    );
    match &receipt.extraction {
        Some(extraction) => {
            let warnings = extraction.warnings.codes();
            println!(
                "  extraction confidence {:.2}; warnings: {}",
                extraction.confidence,
                if warnings.is_empty() {
                    "none".to_string()
                } else {
                    warnings.join(", ")
                }
            );
        }
        None => println!("  no extraction run"),
    }
    if !receipt.updated_keys.is_empty() {
        println!("  updated fields: {}", receipt.updated_keys.join(", "));
    }
}

fn render_extraction(result: &ExtractionResult) {
    println!(
        "{} extraction (confidence {:.2})",
        result.doc_type.label(),
        result.confidence
    );
    if result.warnings.is_empty() {
        println!("Warnings: none");
    } else {
        println!("Warnings:");
        for code in result.warnings.codes() {
            println!("  - {code}");
        }
    }
}

fn render_checklist(items: &[ChecklistItem]) {
    if items.is_empty() {
        println!("  (no documents required)");
        return;
    }
    for item in items {
        let scope = match item.source {
            ChecklistSource::Common => "common".to_string(),
            ChecklistSource::Grant => item
                .grants
                .iter()
                .map(ProgramKey::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        };
        println!(
            "  - {:<26} {:<13} {}",
            item.display_name,
            item.status.label(),
            scope
        );
    }
}

fn print_outstanding(items: &[ChecklistItem], case_id: &CaseId) {
    let remaining: Vec<&ChecklistItem> = outstanding(items).collect();
    if remaining.is_empty() {
        println!("\nCase {case_id} has every document in hand");
        return;
    }
    println!("\nStill needed for case {case_id}:");
    for item in remaining {
        println!("  - {} ({})", item.display_name, item.description);
    }
}

fn render_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Null => "null".to_string(),
        FieldValue::Boolean(flag) => flag.to_string(),
        FieldValue::Number(number) => format!("{number:.2}"),
        FieldValue::Text(text) => text.clone(),
        FieldValue::List(values) => values.join("; "),
    }
}

fn print_json<T: Serialize>(title: &str, value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{title}:\n{json}"),
        Err(err) => println!("{title} unavailable: {err}"),
    }
}

const SAMPLE_UPLOADS: [(&str, &str); 4] = [
    ("bank statement", BANK_STATEMENT),
    ("vendor quote", VENDOR_QUOTE),
    ("insurance certificate", ACORD_25),
    ("discharge form", DD214),
];

const BANK_STATEMENT: &str = "Wells Fargo Bank\n\
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

const VENDOR_QUOTE: &str = "Harbor Kitchen Supply Co.\n\
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
    CERTIFICATE HOLDER\n\
    City of Portland Grants Office\n";

const DD214: &str = "CERTIFICATE OF RELEASE OR DISCHARGE FROM ACTIVE DUTY\n\
    DD FORM 214\n\
    1. NAME (Last, First, Middle)\n\
    DOE, JOHN ALLEN\n\
    2. DEPARTMENT, COMPONENT AND BRANCH\n\
    ARMY/RA\n\
    12a. DATE ENTERED ACTIVE DUTY THIS PERIOD: 2010-06-15\n\
    12b. SEPARATION DATE THIS PERIOD: 2014-06-14\n\
    24. CHARACTER OF SERVICE (Include upgrades): HONORABLE\n";
