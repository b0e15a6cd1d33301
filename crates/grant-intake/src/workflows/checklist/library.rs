use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::workflows::intake::DocType;

/// Identifier for a funding program, as supplied by the eligibility scorer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgramKey(pub String);

impl ProgramKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProgramKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProgramKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRequirement {
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractSpec {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldRequirement>,
}

/// Catalog entry for a required document slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSpec {
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub example_url: Option<String>,
    /// Classified document types that can fill this slot.
    #[serde(default)]
    pub accepts: Vec<DocType>,
    /// Produced by the system rather than uploaded by the applicant.
    #[serde(default)]
    pub generated: bool,
    #[serde(default)]
    pub extract: ExtractSpec,
}

impl DocumentSpec {
    pub fn accepts(&self, doc_type: DocType) -> bool {
        self.accepts.contains(&doc_type)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.extract
            .fields
            .iter()
            .filter(|(_, requirement)| requirement.required)
            .map(|(name, _)| name.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramRequirements {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub common_docs: Vec<String>,
    #[serde(default)]
    pub required_docs: Vec<String>,
}

impl ProgramRequirements {
    fn references(&self) -> impl Iterator<Item = &String> {
        self.common_docs.iter().chain(self.required_docs.iter())
    }
}

/// Read-only catalog of programs and the documents they require.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementsLibrary {
    programs: BTreeMap<ProgramKey, ProgramRequirements>,
    documents: BTreeMap<String, DocumentSpec>,
}

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("failed to read requirements library: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid requirements library json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid requirements matrix: {0}")]
    Csv(#[from] csv::Error),
    #[error("program '{program}' references undefined document '{doc_type}'")]
    UndefinedDocument { program: ProgramKey, doc_type: String },
    #[error("unknown requirement scope '{scope}' for program '{program}'")]
    UnknownScope { program: ProgramKey, scope: String },
    #[error("requirements library defines no programs")]
    Empty,
}

impl RequirementsLibrary {
    /// Validate and assemble a library from its two tables.
    pub fn new(
        programs: BTreeMap<ProgramKey, ProgramRequirements>,
        documents: BTreeMap<String, DocumentSpec>,
    ) -> Result<Self, LibraryError> {
        if programs.is_empty() {
            return Err(LibraryError::Empty);
        }
        for (program, requirements) in &programs {
            if let Some(missing) = requirements
                .references()
                .find(|doc_type| !documents.contains_key(doc_type.as_str()))
            {
                return Err(LibraryError::UndefinedDocument {
                    program: program.clone(),
                    doc_type: missing.clone(),
                });
            }
        }
        Ok(Self {
            programs,
            documents,
        })
    }

    /// Built-in catalog shipped with the service.
    pub fn standard() -> Self {
        Self {
            programs: standard_programs(),
            documents: standard_documents(),
        }
    }

    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, LibraryError> {
        let raw: RawLibrary = serde_json::from_reader(reader)?;
        Self::new(raw.programs, raw.documents)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LibraryError> {
        let file = File::open(path)?;
        Self::from_json_reader(BufReader::new(file))
    }

    /// Load a `program,doc_type,scope` matrix against the standard document catalog. Rows keep
    /// their file order within each scope.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, LibraryError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut programs: BTreeMap<ProgramKey, ProgramRequirements> = BTreeMap::new();

        for row in csv_reader.deserialize::<MatrixRow>() {
            let row = row?;
            let program = ProgramKey(row.program);
            let entry = programs.entry(program.clone()).or_default();
            if entry.display_name.is_empty() {
                entry.display_name = row.display_name.unwrap_or_else(|| program.0.clone());
            }
            let target = match row.scope.to_ascii_lowercase().as_str() {
                "common" => &mut entry.common_docs,
                "grant" | "required" | "program" => &mut entry.required_docs,
                _ => {
                    return Err(LibraryError::UnknownScope {
                        program,
                        scope: row.scope,
                    })
                }
            };
            if !target.contains(&row.doc_type) {
                target.push(row.doc_type);
            }
        }

        Self::new(programs, standard_documents())
    }

    pub fn program(&self, key: &ProgramKey) -> Option<&ProgramRequirements> {
        self.programs.get(key)
    }

    pub fn programs(&self) -> impl Iterator<Item = (&ProgramKey, &ProgramRequirements)> {
        self.programs.iter()
    }

    pub fn document(&self, doc_type: &str) -> Option<&DocumentSpec> {
        self.documents.get(doc_type)
    }

    pub fn documents(&self) -> impl Iterator<Item = (&str, &DocumentSpec)> {
        self.documents
            .iter()
            .map(|(doc_type, spec)| (doc_type.as_str(), spec))
    }

    /// Every document slot required by at least one of `shortlist`.
    pub fn required_doc_types(&self, shortlist: &BTreeSet<ProgramKey>) -> BTreeSet<String> {
        shortlist
            .iter()
            .filter_map(|program| self.programs.get(program))
            .flat_map(|requirements| requirements.references().cloned())
            .collect()
    }

    /// The first slot, in catalog order, that accepts a classified document type.
    pub fn slot_for(&self, doc_type: DocType) -> Option<&str> {
        self.documents
            .iter()
            .find(|(_, spec)| spec.accepts(doc_type))
            .map(|(slot, _)| slot.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct RawLibrary {
    programs: BTreeMap<ProgramKey, ProgramRequirements>,
    documents: BTreeMap<String, DocumentSpec>,
}

#[derive(Debug, Deserialize)]
struct MatrixRow {
    program: String,
    doc_type: String,
    scope: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    display_name: Option<String>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

const COMMON_DOCS: &[&str] = &["Proof_of_Address", "Bank_Statements", "Owner_Resume"];

fn program(display_name: &str, required_docs: &[&str]) -> ProgramRequirements {
    ProgramRequirements {
        display_name: display_name.to_string(),
        common_docs: COMMON_DOCS.iter().map(|doc| doc.to_string()).collect(),
        required_docs: required_docs.iter().map(|doc| doc.to_string()).collect(),
    }
}

fn standard_programs() -> BTreeMap<ProgramKey, ProgramRequirements> {
    [
        (
            "main_street_recovery",
            program(
                "Main Street Recovery Grant",
                &[
                    "Invoices_or_Quotes",
                    "Certificate_of_Insurance",
                    "Grant_Use_Statement",
                ],
            ),
        ),
        (
            "equipment_modernization",
            program(
                "Equipment Modernization Fund",
                &["Invoices_or_Quotes", "Certificate_of_Insurance"],
            ),
        ),
        (
            "veteran_owned_business",
            program(
                "Veteran-Owned Business Grant",
                &["Veteran_Status", "Power_of_Attorney", "Grant_Use_Statement"],
            ),
        ),
        (
            "community_partnership",
            program(
                "Community Partnership Award",
                &["Letter_of_Support", "Grant_Use_Statement"],
            ),
        ),
    ]
    .into_iter()
    .map(|(key, requirements)| (ProgramKey::from(key), requirements))
    .collect()
}

fn document(
    display_name: &str,
    description: &str,
    example_url: Option<&str>,
    accepts: &[DocType],
    fields: &[(&str, bool)],
) -> DocumentSpec {
    DocumentSpec {
        display_name: display_name.to_string(),
        description: description.to_string(),
        example_url: example_url.map(str::to_string),
        accepts: accepts.to_vec(),
        generated: false,
        extract: ExtractSpec {
            fields: fields
                .iter()
                .map(|(name, required)| {
                    (
                        name.to_string(),
                        FieldRequirement {
                            required: *required,
                        },
                    )
                })
                .collect(),
        },
    }
}

fn standard_documents() -> BTreeMap<String, DocumentSpec> {
    let mut grant_use = document(
        "Grant Use Statement",
        "Narrative of how award funds will be spent, drafted from the questionnaire.",
        None,
        &[],
        &[],
    );
    grant_use.generated = true;

    [
        (
            "Bank_Statements",
            document(
                "Business Bank Statements",
                "Most recent full month statement for the operating account.",
                Some("https://example.org/samples/bank-statement.pdf"),
                &[DocType::BankStatement],
                &[
                    ("bank_name", true),
                    ("bank_account_last4", true),
                    ("bank_statement_period_end", true),
                    ("bank_ending_balance", true),
                    ("bank_account_holder", false),
                ],
            ),
        ),
        (
            "Certificate_of_Insurance",
            document(
                "Certificate of Liability Insurance",
                "ACORD 25 certificate showing active general liability coverage.",
                Some("https://example.org/samples/acord-25.pdf"),
                &[DocType::InsuranceCertificate],
                &[
                    ("insured_name", true),
                    ("insurance_policy_number", true),
                    ("insurance_expiration_date", true),
                    ("insurance_producer", false),
                ],
            ),
        ),
        (
            "Grant_Use_Statement",
            grant_use,
        ),
        (
            "Invoices_or_Quotes",
            document(
                "Invoices or Quotes",
                "Vendor quotes or paid invoices for the items the award will fund.",
                Some("https://example.org/samples/vendor-quote.pdf"),
                &[DocType::InvoiceOrQuote],
                &[
                    ("vendor_name", true),
                    ("invoice_total", true),
                    ("invoice_date", false),
                ],
            ),
        ),
        (
            "Letter_of_Support",
            document(
                "Letter of Support",
                "Signed letter from a community partner describing the relationship.",
                None,
                &[DocType::LetterOfSupport],
                &[
                    ("support_letter_author", true),
                    ("support_letter_organization", false),
                    ("support_letter_relationship", false),
                ],
            ),
        ),
        (
            "Owner_Resume",
            document(
                "Owner Resume",
                "Current resume for each majority owner.",
                None,
                &[DocType::Resume],
                &[
                    ("owner_name", true),
                    ("owner_email", false),
                    ("highest_degree", false),
                ],
            ),
        ),
        (
            "Power_of_Attorney",
            document(
                "Power of Attorney",
                "Required when a representative signs on the owner's behalf.",
                None,
                &[DocType::PowerOfAttorney],
                &[("poa_principal", true), ("poa_agent", true)],
            ),
        ),
        (
            "Proof_of_Address",
            document(
                "Proof of Business Address",
                "Utility bill or insurance statement from the last 90 days, or a current lease.",
                Some("https://example.org/samples/utility-bill.pdf"),
                &[DocType::ProofOfAddress],
                &[
                    ("address_street", false),
                    ("address_city", true),
                    ("address_state", true),
                    ("address_document_date", true),
                ],
            ),
        ),
        (
            "Veteran_Status",
            document(
                "Veteran Status Documentation",
                "DD-214 or a request pertaining to military records.",
                Some("https://example.org/samples/dd214.pdf"),
                &[DocType::VeteranStatus],
                &[("veteran_form_variant", true), ("veteran_name", false)],
            ),
        ),
    ]
    .into_iter()
    .map(|(doc_type, spec)| (doc_type.to_string(), spec))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_library_is_self_consistent() {
        let standard = RequirementsLibrary::standard();
        let rebuilt = RequirementsLibrary::new(standard.programs.clone(), standard.documents.clone())
            .expect("standard library validates");
        assert_eq!(rebuilt, standard);
    }

    #[test]
    fn slot_lookup_follows_accepted_types() {
        let library = RequirementsLibrary::standard();
        assert_eq!(library.slot_for(DocType::InvoiceOrQuote), Some("Invoices_or_Quotes"));
        assert_eq!(library.slot_for(DocType::Resume), Some("Owner_Resume"));
        let required: Vec<_> = library
            .document("Bank_Statements")
            .expect("bank statements defined")
            .required_fields()
            .collect();
        assert!(required.contains(&"bank_account_last4"));
        assert!(!required.contains(&"bank_account_holder"));
    }

    #[test]
    fn json_library_rejects_undefined_documents() {
        let json = r#"{
            "programs": { "p1": { "required_docs": ["Missing_Doc"] } },
            "documents": {}
        }"#;
        match RequirementsLibrary::from_json_reader(json.as_bytes()) {
            Err(LibraryError::UndefinedDocument { program, doc_type }) => {
                assert_eq!(program, ProgramKey::from("p1"));
                assert_eq!(doc_type, "Missing_Doc");
            }
            other => panic!("expected undefined document error, got {other:?}"),
        }
    }

    #[test]
    fn json_library_loads_documented_shape() {
        let json = r#"{
            "programs": {
                "p1": { "display_name": "Pilot", "common_docs": ["W9"], "required_docs": ["Quote"] }
            },
            "documents": {
                "W9": { "display_name": "Form W-9" },
                "Quote": {
                    "display_name": "Quote",
                    "example_url": "https://example.org/q.pdf",
                    "accepts": ["invoice_or_quote"],
                    "extract": { "fields": { "vendor_name": { "required": true } } }
                }
            }
        }"#;
        let library = RequirementsLibrary::from_json_reader(json.as_bytes()).expect("loads");
        let quote = library.document("Quote").expect("quote defined");
        assert!(quote.accepts(DocType::InvoiceOrQuote));
        assert_eq!(quote.required_fields().collect::<Vec<_>>(), vec!["vendor_name"]);
        assert_eq!(
            library.program(&ProgramKey::from("p1")).map(|p| p.common_docs.clone()),
            Some(vec!["W9".to_string()])
        );
    }

    #[test]
    fn csv_matrix_builds_programs() {
        let csv = "program,doc_type,scope\n\
            pilot,Proof_of_Address,common\n\
            pilot,Invoices_or_Quotes,grant\n\
            pilot,Invoices_or_Quotes,grant\n\
            second,Letter_of_Support,grant\n";
        let library = RequirementsLibrary::from_csv_reader(csv.as_bytes()).expect("matrix loads");
        let pilot = library.program(&ProgramKey::from("pilot")).expect("pilot defined");
        assert_eq!(pilot.common_docs, vec!["Proof_of_Address".to_string()]);
        assert_eq!(pilot.required_docs, vec!["Invoices_or_Quotes".to_string()]);
        assert_eq!(pilot.display_name, "pilot");
    }

    #[test]
    fn csv_matrix_rejects_unknown_scope() {
        let csv = "program,doc_type,scope\npilot,Owner_Resume,optional\n";
        assert!(matches!(
            RequirementsLibrary::from_csv_reader(csv.as_bytes()),
            Err(LibraryError::UnknownScope { .. })
        ));
    }
}
