use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{iso, put, ExtractedFields, ExtractionContext};
use crate::workflows::intake::domain::{ExtractionWarning, FieldMap, Warnings};
use crate::workflows::intake::normalize::{
    clean_lines, collapse_whitespace, find_date, parse_date, static_regex, value_after_anchor,
    MONTHS,
};

/// Canonical powers a principal can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityScope {
    Banking,
    RealEstate,
    Taxes,
    Insurance,
    Claims,
    PersonalProperty,
}

impl AuthorityScope {
    pub const fn key(self) -> &'static str {
        match self {
            Self::Banking => "banking",
            Self::RealEstate => "real_estate",
            Self::Taxes => "taxes",
            Self::Insurance => "insurance",
            Self::Claims => "claims",
            Self::PersonalProperty => "personal_property",
        }
    }
}

const SCOPE_KEYWORDS: &[(AuthorityScope, &[&str])] = &[
    (
        AuthorityScope::Banking,
        &["banking", "bank account", "financial institution"],
    ),
    (AuthorityScope::RealEstate, &["real estate", "real property"]),
    (AuthorityScope::Taxes, &["tax"]),
    (AuthorityScope::Insurance, &["insurance", "annuit"]),
    (AuthorityScope::Claims, &["claims", "litigation"]),
    (
        AuthorityScope::PersonalProperty,
        &["personal property", "tangible personal"],
    ),
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerOfAttorneyFields {
    pub principal: Option<String>,
    pub agent: Option<String>,
    pub durable: bool,
    pub effective_date: Option<String>,
    pub notarized: bool,
    pub authority_scopes: BTreeSet<AuthorityScope>,
}

impl PowerOfAttorneyFields {
    pub fn field_map(&self) -> FieldMap {
        let mut map = FieldMap::new();
        put(&mut map, "poa_principal", self.principal.clone());
        put(&mut map, "poa_agent", self.agent.clone());
        put(&mut map, "poa_durable", self.durable);
        put(&mut map, "poa_effective_date", self.effective_date.clone());
        put(&mut map, "poa_notarized", self.notarized);
        put(
            &mut map,
            "poa_authority_scopes",
            self.authority_scopes
                .iter()
                .map(|scope| scope.key().to_string())
                .collect::<Vec<_>>(),
        );
        map
    }
}

static_regex!(principal_anchor, r"(?i)^principal(?:'s\s+name)?\s*:");
static_regex!(
    agent_anchor,
    r"(?i)^(?:agent|attorney[- ]in[- ]fact)(?:'s\s+name)?\s*:"
);
static_regex!(
    principal_clause,
    r"\bI,\s+([A-Z][A-Za-z.'-]+(?:\s+[A-Z][A-Za-z.'-]+){0,3}),?\s+(?:[Oo]f|residing|hereby|[Dd]o)\b"
);
static_regex!(
    appoint_clause,
    r"\b[Aa]ppoint\s+([A-Z][A-Za-z.'-]+(?:\s+[A-Z][A-Za-z.'-]+){0,3})"
);
static_regex!(
    day_of_clause,
    &format!(r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+day\s+of\s+((?:{MONTHS})\.?),?\s+(\d{{4}})")
);
static_regex!(
    dated_anchor,
    r"(?i)\b(?:effective(?:\s+date)?|dated|executed\s+on)\b"
);

pub(super) fn extract(text: &str, _context: &ExtractionContext) -> (ExtractedFields, f32, Warnings) {
    let lines = clean_lines(text);
    let flowing = collapse_whitespace(text);
    let lower = flowing.to_ascii_lowercase();

    let principal = value_after_anchor(&lines, principal_anchor())
        .map(|(_, value)| value)
        .or_else(|| {
            principal_clause()
                .captures(&flowing)
                .map(|captures| captures[1].to_string())
        });
    let agent = value_after_anchor(&lines, agent_anchor())
        .map(|(_, value)| value)
        .or_else(|| {
            appoint_clause()
                .captures(&flowing)
                .map(|captures| captures[1].to_string())
        });

    let authority_scopes = SCOPE_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|keyword| lower.contains(keyword)))
        .map(|(scope, _)| *scope)
        .collect();

    let fields = PowerOfAttorneyFields {
        durable: lower.contains("durable")
            || lower.contains("subsequent disability")
            || lower.contains("subsequent incapacity"),
        effective_date: iso(effective_date(&flowing, &lines)),
        notarized: ["notary public", "acknowledged before me", "subscribed and sworn"]
            .iter()
            .any(|marker| lower.contains(marker)),
        authority_scopes,
        principal,
        agent,
    };

    let mut warnings = Warnings::new();
    if fields.principal.is_none() {
        warnings.insert(ExtractionWarning::PrincipalMissing);
    }
    if fields.agent.is_none() {
        warnings.insert(ExtractionWarning::AgentMissing);
    }
    let confidence = if warnings.is_empty() { 0.9 } else { 0.7 };

    (ExtractedFields::PowerOfAttorney(fields), confidence, warnings)
}

/// "this 5th day of March, 2024" wins; otherwise the first date after an effective/dated label.
fn effective_date(flowing: &str, lines: &[String]) -> Option<NaiveDate> {
    day_of_clause()
        .captures(flowing)
        .and_then(|captures| parse_date(&format!("{} {}, {}", &captures[2], &captures[1], &captures[3])))
        .or_else(|| {
            lines.iter().find_map(|line| {
                let found = dated_anchor().find(line)?;
                find_date(&line[found.end()..])
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DURABLE_POA: &str = "DURABLE POWER OF ATTORNEY\n\
        I, Maria Lopez, of Salem, Massachusetts, hereby appoint Daniel Lopez as my agent\n\
        (attorney-in-fact). My agent may act for me in banking transactions, real estate\n\
        transactions, tax matters, and claims and litigation. Banking includes all bank accounts.\n\
        This power of attorney shall not be affected by my subsequent disability.\n\
        Signed this 5th day of March, 2024.\n\
        Notary Public\n";

    fn run(text: &str) -> (PowerOfAttorneyFields, f32, Warnings) {
        let context = ExtractionContext::new(NaiveDate::from_ymd_opt(2024, 4, 1).expect("valid date"));
        match extract(text, &context) {
            (ExtractedFields::PowerOfAttorney(fields), confidence, warnings) => {
                (fields, confidence, warnings)
            }
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn parties_scopes_and_dates() {
        let (fields, confidence, warnings) = run(DURABLE_POA);
        assert!(warnings.is_empty(), "unexpected warnings {warnings:?}");
        assert!((confidence - 0.9).abs() < f32::EPSILON);
        assert_eq!(fields.principal.as_deref(), Some("Maria Lopez"));
        assert_eq!(fields.agent.as_deref(), Some("Daniel Lopez"));
        assert!(fields.durable);
        assert!(fields.notarized);
        assert_eq!(fields.effective_date.as_deref(), Some("2024-03-05"));
        assert_eq!(
            fields.authority_scopes.into_iter().collect::<Vec<_>>(),
            vec![
                AuthorityScope::Banking,
                AuthorityScope::RealEstate,
                AuthorityScope::Taxes,
                AuthorityScope::Claims,
            ]
        );
    }

    #[test]
    fn labelled_parties_take_precedence() {
        let text = "POWER OF ATTORNEY\nPrincipal: Ana Reyes\nAgent:\nCarlos Reyes\nEffective Date: 04/01/2024\n";
        let (fields, _, warnings) = run(text);
        assert!(warnings.is_empty());
        assert_eq!(fields.principal.as_deref(), Some("Ana Reyes"));
        assert_eq!(fields.agent.as_deref(), Some("Carlos Reyes"));
        assert_eq!(fields.effective_date.as_deref(), Some("2024-04-01"));
        assert!(!fields.durable);
    }

    #[test]
    fn missing_parties_degrade_confidence() {
        let (fields, confidence, warnings) =
            run("POWER OF ATTORNEY\nThe undersigned grants authority over insurance matters.\n");
        assert!((confidence - 0.7).abs() < f32::EPSILON);
        assert_eq!(
            warnings.codes(),
            vec!["principal_missing".to_string(), "agent_missing".to_string()]
        );
        assert!(fields.authority_scopes.contains(&AuthorityScope::Insurance));
    }
}
