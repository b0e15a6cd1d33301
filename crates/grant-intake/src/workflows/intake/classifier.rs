//! Heuristic document type classification.
//!
//! Every supported type has an independent scan that counts corroborating signals in the text.
//! A scan only claims its type once its own corroboration rule is met; a lone incidental token
//! (a bank name, the word "insured") produces at best a low-confidence `unknown` result.

use super::domain::{ClassificationResult, DocType, Hints};
use super::extractors::detect_evidence_type;
use super::normalize::{clean_lines, static_regex};

/// Confidence reported for an `unknown` result when some scan saw partial evidence.
const WEAK_EVIDENCE_CONFIDENCE: f32 = 0.3;
const CONFIDENCE_CAP: f32 = 0.95;

/// Signals a scan found in the text plus any exact-form hints it recognised.
#[derive(Debug, Default)]
struct Evidence {
    signals: usize,
    hints: Hints,
}

impl Evidence {
    fn count(&mut self, present: bool) {
        if present {
            self.signals += 1;
        }
    }

    fn hint(&mut self, key: &str, value: &str) {
        self.hints
            .entry(key.to_string())
            .or_insert_with(|| value.to_string());
    }
}

/// A single detector in the battery.
struct Detector {
    doc_type: DocType,
    base: f32,
    step: f32,
    min_signals: usize,
    scan: fn(&Corpus) -> Evidence,
}

impl Detector {
    fn confidence(&self, signals: usize) -> f32 {
        let raw = self.base + self.step * signals as f32;
        (raw.min(CONFIDENCE_CAP) * 100.0).round() / 100.0
    }
}

/// Priority order doubles as the tie-break when two scans reach the same confidence.
const DETECTORS: &[Detector] = &[
    Detector {
        doc_type: DocType::InsuranceCertificate,
        base: 0.7,
        step: 0.05,
        min_signals: 2,
        scan: scan_insurance_certificate,
    },
    Detector {
        doc_type: DocType::VeteranStatus,
        base: 0.7,
        step: 0.05,
        min_signals: 2,
        scan: scan_veteran_status,
    },
    Detector {
        doc_type: DocType::PowerOfAttorney,
        base: 0.6,
        step: 0.1,
        min_signals: 2,
        scan: scan_power_of_attorney,
    },
    Detector {
        doc_type: DocType::BankStatement,
        base: 0.6,
        step: 0.1,
        min_signals: 2,
        scan: scan_bank_statement,
    },
    Detector {
        doc_type: DocType::InvoiceOrQuote,
        base: 0.6,
        step: 0.1,
        min_signals: 2,
        scan: scan_invoice_or_quote,
    },
    Detector {
        doc_type: DocType::ProofOfAddress,
        base: 0.6,
        step: 0.1,
        min_signals: 2,
        scan: scan_proof_of_address,
    },
    Detector {
        doc_type: DocType::Resume,
        base: 0.6,
        step: 0.1,
        min_signals: 2,
        scan: scan_resume,
    },
    Detector {
        doc_type: DocType::LetterOfSupport,
        base: 0.6,
        step: 0.1,
        min_signals: 2,
        scan: scan_letter_of_support,
    },
];

/// Lower-cased text and its trimmed lines, computed once per classification.
struct Corpus {
    lower: String,
    lines: Vec<String>,
}

impl Corpus {
    fn new(text: &str) -> Self {
        let lines = clean_lines(text)
            .into_iter()
            .map(|line| line.to_ascii_lowercase())
            .collect();
        Self {
            lower: text.to_ascii_lowercase(),
            lines,
        }
    }

    fn has(&self, needle: &str) -> bool {
        self.lower.contains(needle)
    }

    fn has_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|needle| self.has(needle))
    }

    /// A heading alone on its line, or an inline `heading: content` line.
    fn heading(&self, names: &[&str]) -> bool {
        self.lines.iter().any(|line| {
            let bare = line.trim_end_matches(':').trim();
            let inline = line.split_once(':').map(|(head, _)| head.trim());
            names
                .iter()
                .any(|name| bare == *name || inline == Some(*name))
        })
    }
}

/// Classify a single text blob.
pub fn classify(text: &str) -> ClassificationResult {
    if text.trim().is_empty() {
        return ClassificationResult::unknown(0.0, Hints::new());
    }

    let corpus = Corpus::new(text);
    let mut best: Option<(f32, &Detector, Evidence)> = None;
    let mut weak_candidate: Option<DocType> = None;

    for detector in DETECTORS {
        let evidence = (detector.scan)(&corpus);
        if evidence.signals < detector.min_signals {
            if evidence.signals > 0 && weak_candidate.is_none() {
                weak_candidate = Some(detector.doc_type);
            }
            continue;
        }

        let confidence = detector.confidence(evidence.signals);
        let better = best
            .as_ref()
            .map(|(current, _, _)| confidence > *current)
            .unwrap_or(true);
        if better {
            best = Some((confidence, detector, evidence));
        }
    }

    match best {
        Some((confidence, detector, evidence)) => ClassificationResult {
            doc_type: Some(detector.doc_type),
            confidence,
            hints: evidence.hints,
        },
        None => {
            let mut hints = Hints::new();
            let confidence = match weak_candidate {
                Some(candidate) => {
                    hints.insert("weak_candidate".to_string(), candidate.key().to_string());
                    WEAK_EVIDENCE_CONFIDENCE
                }
                None => 0.1,
            };
            ClassificationResult::unknown(confidence, hints)
        }
    }
}

static_regex!(acord_form_regex, r"(?i)\bacord\s*(\d{2,3})\b");
static_regex!(dd214_regex, r"(?i)\bdd[\s-]?(?:form\s*)?214\b");
static_regex!(va_form_regex, r"(?i)\bva\s+form\s+([0-9]{2}-[0-9]{3,5}[a-z]?)\b");
static_regex!(
    currency_line_regex,
    r"(?im)^\s*\d{1,2}/\d{1,2}(?:/\d{2,4})?\s+.+\s+-?\$?[\d,]+\.\d{2}\s*$"
);
static_regex!(email_regex, r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b");
static_regex!(salutation_regex, r"(?im)^\s*dear\s+[^\n,]{2,60}[,:]");
static_regex!(
    closing_regex,
    r"(?im)^\s*(?:sincerely|respectfully(?: yours)?|best regards|warm regards|yours truly)\s*[,.]?\s*$"
);

/// Institution names that mark a bank statement; shared with the bank statement extractor.
pub(crate) const BANK_NAMES: &[&str] = &[
    "bank of america",
    "wells fargo",
    "chase",
    "citibank",
    "u.s. bank",
    "us bank",
    "pnc bank",
    "capital one",
    "td bank",
    "truist",
    "credit union",
    "savings bank",
    "national bank",
];

fn scan_insurance_certificate(corpus: &Corpus) -> Evidence {
    let mut evidence = Evidence::default();
    if let Some(captures) = acord_form_regex().captures(&corpus.lower) {
        // An embedded ACORD form code is exact enough to count twice.
        evidence.signals += 2;
        evidence.hint("form", &format!("acord_{}", &captures[1]));
    }
    evidence.count(corpus.has("certificate of liability insurance") || corpus.has("certificate of insurance"));
    evidence.count(corpus.heading(&["producer"]) || corpus.has("producer:"));
    evidence.count(corpus.heading(&["insured"]) || corpus.has("insured:"));
    evidence.count(corpus.has("certificate holder"));
    evidence.count(corpus.has_any(&["general liability", "workers compensation", "umbrella liab", "automobile liability"]));
    evidence.count(corpus.has_any(&["policy eff", "eff date", "policy exp", "exp date"]));
    evidence
}

fn scan_veteran_status(corpus: &Corpus) -> Evidence {
    let mut evidence = Evidence::default();
    if dd214_regex().is_match(&corpus.lower) {
        evidence.signals += 2;
        evidence.hint("form", "dd214");
        evidence.hint("variant", "certificate");
    }
    if let Some(captures) = va_form_regex().captures(&corpus.lower) {
        evidence.signals += 1;
        evidence.hint("form", &format!("va_{}", &captures[1]));
    }
    evidence.count(corpus.has("certificate of release or discharge"));
    evidence.count(corpus.has_any(&["branch of service", "component and branch"]));
    evidence.count(corpus.has("character of service"));
    evidence.count(corpus.has_any(&["date entered active duty", "entered ad this period", "service start"]));
    evidence.count(corpus.has_any(&["separation date", "date of separation", "service end"]));
    if corpus.has_any(&["relationship to veteran", "relationship to the veteran"]) {
        evidence.signals += 1;
        evidence.hint("variant", "application");
    }
    evidence
}

fn scan_power_of_attorney(corpus: &Corpus) -> Evidence {
    let mut evidence = Evidence::default();
    let titled = corpus.has("power of attorney");
    evidence.count(titled);
    if titled && corpus.has("durable") {
        evidence.hint("form", "durable_poa");
    }
    evidence.count(corpus.has("principal"));
    evidence.count(corpus.has_any(&["attorney-in-fact", "attorney in fact", "as my agent", "agent:"]));
    evidence.count(corpus.has_any(&["hereby appoint", "do hereby make"]));
    evidence.count(corpus.has_any(&["notary public", "acknowledged before me"]));
    evidence
}

fn scan_bank_statement(corpus: &Corpus) -> Evidence {
    let mut evidence = Evidence::default();
    // A bank name alone is incidental; it only counts alongside statement structure.
    evidence.count(corpus.has_any(BANK_NAMES));
    evidence.count(corpus.has("statement period") || corpus.has("statement date"));
    evidence.count(corpus.has_any(&["beginning balance", "opening balance", "previous balance"]));
    evidence.count(corpus.has_any(&["ending balance", "closing balance"]));
    evidence.count(corpus.has_any(&["deposits and additions", "total deposits", "withdrawals"]));
    evidence.count(currency_line_regex().is_match(&corpus.lower));
    evidence
}

fn scan_invoice_or_quote(corpus: &Corpus) -> Evidence {
    let mut evidence = Evidence::default();
    let invoice = corpus.heading(&["invoice"]) || corpus.has_any(&["invoice #", "invoice number", "invoice no"]);
    let quote = corpus.heading(&["quote", "quotation", "estimate"])
        || corpus.has_any(&["quote #", "quote number", "quotation number", "estimate #"]);
    evidence.count(invoice || quote);
    if quote && !invoice {
        evidence.hint("kind", "quote");
    } else if invoice {
        evidence.hint("kind", "invoice");
    }
    evidence.count(corpus.has("bill to") || corpus.has("prepared for"));
    evidence.count(corpus.has("subtotal"));
    evidence.count(corpus.has_any(&["total due", "amount due", "grand total", "total:"]) && !corpus.has("ending balance"));
    evidence.count(corpus.has_any(&["qty", "quantity", "unit price"]));
    evidence
}

fn scan_proof_of_address(corpus: &Corpus) -> Evidence {
    let mut evidence = Evidence::default();
    if let Some(kind) = detect_evidence_type(&corpus.lower) {
        evidence.count(true);
        evidence.hint("evidence_type", kind.key());
    }
    evidence.count(corpus.has_any(&["service address", "property address", "premises", "residence address"]));
    evidence.count(corpus.has_any(&["billing period", "service period", "lease term", "policy period", "expires"]));
    evidence.count(corpus.has_any(&["amount due", "monthly rent", "premium", "date of birth"]));
    evidence
}

fn scan_resume(corpus: &Corpus) -> Evidence {
    let mut evidence = Evidence::default();
    evidence.count(corpus.heading(&["summary", "professional summary", "objective", "profile"]));
    evidence.count(corpus.heading(&["education"]));
    evidence.count(corpus.heading(&[
        "experience",
        "work experience",
        "professional experience",
        "employment history",
    ]));
    evidence.count(corpus.heading(&["skills", "technical skills", "core competencies"]));
    evidence.count(corpus.heading(&["certifications", "licenses and certifications"]));
    evidence.count(email_regex().is_match(&corpus.lower) && !salutation_regex().is_match(&corpus.lower));
    evidence
}

fn scan_letter_of_support(corpus: &Corpus) -> Evidence {
    let mut evidence = Evidence::default();
    evidence.count(salutation_regex().is_match(&corpus.lower) || corpus.has("to whom it may concern"));
    evidence.count(closing_regex().is_match(&corpus.lower));
    evidence.count(corpus.has_any(&["letter of support", "in support of", "support the application", "recommend"]));
    evidence.count(corpus.has_any(&["i have worked with", "i have known", "as a ", "i know "]));
    evidence
}
