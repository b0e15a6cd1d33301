use serde::{Deserialize, Serialize};

use super::{degraded, iso, put, ExtractedFields, ExtractionContext};
use crate::workflows::intake::domain::{ExtractionWarning, FieldMap, Warnings};
use crate::workflows::intake::normalize::{
    clean_lines, collapse_whitespace, find_date, static_regex, truncate, value_after_anchor,
};

const ENDORSEMENT_LIMIT: usize = 1000;
const RELATIONSHIP_LIMIT: usize = 300;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LetterAuthor {
    pub name: Option<String>,
    pub title: Option<String>,
    pub organization: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LetterOfSupportFields {
    pub recipient: Option<String>,
    pub subject: Option<String>,
    pub letter_date: Option<String>,
    pub author: LetterAuthor,
    pub relationship_summary: Option<String>,
    pub endorsement: Option<String>,
}

impl LetterOfSupportFields {
    pub fn field_map(&self) -> FieldMap {
        let mut map = FieldMap::new();
        put(&mut map, "support_letter_recipient", self.recipient.clone());
        put(&mut map, "support_letter_date", self.letter_date.clone());
        put(&mut map, "support_letter_author", self.author.name.clone());
        put(&mut map, "support_letter_author_title", self.author.title.clone());
        put(&mut map, "support_letter_organization", self.author.organization.clone());
        put(&mut map, "support_letter_relationship", self.relationship_summary.clone());
        map
    }
}

static_regex!(salutation_regex, r"(?i)^dear\s+(.+?)\s*[,:]\s*$");
static_regex!(whom_regex, r"(?i)^to\s+whom\s+it\s+may\s+concern\s*[,:]?\s*$");
static_regex!(subject_anchor, r"(?i)^(?:re|subject)\s*:");
static_regex!(
    closing_regex,
    r"(?i)^(?:sincerely(?:\s+yours)?|respectfully(?:\s+yours|\s+submitted)?|best\s+regards|warm\s+regards|kind\s+regards|regards|yours\s+truly|with\s+gratitude)\s*[,.]?$"
);
static_regex!(signature_mark, r"^(?:/s/|\(signed\)|x_+)");

/// Sentences that state how the author knows the applicant.
fn relationship_patterns() -> &'static [regex::Regex] {
    static PATTERNS: std::sync::OnceLock<Vec<regex::Regex>> = std::sync::OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)\bI\s+have\s+(?:worked|known|partnered|collaborated|served)\b",
            r"(?i)^As\s+(?:a|an|the|their|her|his)\b",
            r"(?i)\bI\s+(?:know|met|first\s+met)\b",
            r"(?i)\bin\s+my\s+(?:role|capacity)\s+as\b",
            r"(?i)\bfor\s+(?:the\s+(?:past|last)\s+)?(?:\d+|two|three|four|five|several|many)\s+years\b",
        ]
        .iter()
        .map(|pattern| regex::Regex::new(pattern).expect("valid relationship regex"))
        .collect()
    })
}

pub(super) fn extract(text: &str, _context: &ExtractionContext) -> (ExtractedFields, f32, Warnings) {
    let lines = clean_lines(text);

    let salutation = lines.iter().enumerate().find_map(|(index, line)| {
        if let Some(captures) = salutation_regex().captures(line) {
            return Some((index, captures[1].trim().to_string()));
        }
        whom_regex()
            .is_match(line)
            .then(|| (index, "To Whom It May Concern".to_string()))
    });
    let closing = lines.iter().position(|line| closing_regex().is_match(line));

    let body_start = salutation.as_ref().map(|(index, _)| index + 1).unwrap_or(0);
    let body_end = closing.unwrap_or(lines.len()).max(body_start);
    let body = collapse_whitespace(&lines[body_start..body_end].join(" "));

    let letter_date = lines[..salutation.as_ref().map(|(index, _)| *index).unwrap_or(lines.len())]
        .iter()
        .find_map(|line| find_date(line));

    let fields = LetterOfSupportFields {
        recipient: salutation.map(|(_, recipient)| recipient),
        subject: value_after_anchor(&lines, subject_anchor()).map(|(_, value)| value),
        letter_date: iso(letter_date),
        author: closing.map(|index| author(&lines[index + 1..])).unwrap_or_default(),
        relationship_summary: sentences(&body)
            .into_iter()
            .find(|sentence| relationship_patterns().iter().any(|pattern| pattern.is_match(sentence)))
            .map(|sentence| truncate(sentence, RELATIONSHIP_LIMIT)),
        endorsement: (!body.is_empty()).then(|| truncate(&body, ENDORSEMENT_LIMIT)),
    };

    let mut warnings = Warnings::new();
    if fields.recipient.is_none() {
        warnings.insert(ExtractionWarning::MissingRecipient);
    }
    if fields.author.name.is_none() {
        warnings.insert(ExtractionWarning::MissingSignature);
    }

    let confidence = degraded(0.85, 0.15, &warnings);
    (ExtractedFields::LetterOfSupport(fields), confidence, warnings)
}

/// Name, then title, then organization, from the lines under the closing.
fn author(lines: &[String]) -> LetterAuthor {
    let mut signature = lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !signature_mark().is_match(line))
        .take(3);

    let name = signature.next().map(str::to_string);
    let (title, organization) = match (signature.next(), signature.next()) {
        (Some(title), Some(organization)) => (Some(title.to_string()), Some(organization.to_string())),
        (Some(line), None) => match line.split_once(", ") {
            Some((title, organization)) => (Some(title.to_string()), Some(organization.to_string())),
            None => (Some(line.to_string()), None),
        },
        _ => (None, None),
    };

    LetterAuthor {
        name,
        title,
        organization,
    }
}

/// Words whose trailing period does not end a sentence.
const ABBREVIATIONS: &[&str] = &[
    "dr", "mr", "mrs", "ms", "prof", "rev", "hon", "sr", "jr", "st", "mt", "gen", "col", "capt",
    "lt", "sgt", "inc", "co", "corp", "ltd", "no", "vs", "etc", "e.g", "i.e",
];

/// Whether the period at `index` closes an abbreviation or an initial rather than a sentence.
fn abbreviation_before(body: &str, index: usize) -> bool {
    let word = body[..index]
        .rsplit(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default();
    let is_initial = {
        let mut chars = word.chars();
        matches!((chars.next(), chars.next()), (Some(first), None) if first.is_ascii_uppercase())
    };
    is_initial
        || ABBREVIATIONS
            .iter()
            .any(|abbreviation| word.eq_ignore_ascii_case(abbreviation))
}

/// Split prose into sentences on terminal punctuation followed by whitespace.
fn sentences(body: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = body.char_indices().peekable();
    while let Some((index, c)) = chars.next() {
        let at_boundary = matches!(c, '.' | '!' | '?')
            && chars.peek().map(|(_, next)| next.is_whitespace()).unwrap_or(true)
            && !(c == '.' && abbreviation_before(body, index));
        if at_boundary {
            let end = index + c.len_utf8();
            let sentence = body[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }
    let tail = body[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}
