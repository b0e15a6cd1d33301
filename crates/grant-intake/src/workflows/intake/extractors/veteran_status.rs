use serde::{Deserialize, Serialize};

use super::{degraded, iso, put, ExtractedFields, ExtractionContext};
use crate::workflows::intake::domain::{ExtractionWarning, FieldMap, Warnings};
use crate::workflows::intake::normalize::{
    clean_lines, find_date, reading_order_name, static_regex, title_case, truncate,
    value_after_anchor,
};

/// Separation certificates (DD-214 style) carry the veteran's own service record; record
/// requests are filed by someone who states their relationship to the veteran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VeteranFormVariant {
    Certificate,
    Application,
}

impl VeteranFormVariant {
    pub const fn key(self) -> &'static str {
        match self {
            Self::Certificate => "certificate",
            Self::Application => "application",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub veteran_name: Option<String>,
    pub branch: Option<String>,
    pub grade: Option<String>,
    pub service_start_date: Option<String>,
    pub service_end_date: Option<String>,
    pub character_of_service: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    #[serde(rename = "self")]
    Veteran,
    Spouse,
    Child,
    Parent,
    Attorney,
    GovernmentOfficial,
}

impl Relationship {
    pub const fn key(self) -> &'static str {
        match self {
            Self::Veteran => "self",
            Self::Spouse => "spouse",
            Self::Child => "child",
            Self::Parent => "parent",
            Self::Attorney => "attorney",
            Self::GovernmentOfficial => "government_official",
        }
    }

    /// Map free-form relationship wording onto the closed vocabulary.
    pub fn normalize(raw: &str) -> Option<Self> {
        let lower = raw.to_ascii_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|word| !word.is_empty())
            .collect();
        let any = |candidates: &[&str]| words.iter().any(|word| candidates.contains(word));

        if any(&["attorney", "lawyer", "counsel", "representative"]) {
            Some(Self::Attorney)
        } else if any(&["government", "official", "agency", "congressional", "congressman", "senator"]) {
            Some(Self::GovernmentOfficial)
        } else if any(&["spouse", "wife", "husband", "widow", "widower"]) {
            Some(Self::Spouse)
        } else if any(&["child", "son", "daughter", "stepchild"]) {
            Some(Self::Child)
        } else if any(&["parent", "mother", "father", "stepparent"]) {
            Some(Self::Parent)
        } else if any(&["self", "veteran", "myself", "me"]) {
            Some(Self::Veteran)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VeteranApplication {
    pub applicant_name: Option<String>,
    pub relationship: Option<Relationship>,
    pub relationship_raw: Option<String>,
    pub applicant_address: Option<String>,
    pub request_purpose: Option<String>,
    pub signature_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VeteranStatusFields {
    pub variant: VeteranFormVariant,
    pub form: Option<String>,
    pub service: Option<ServiceRecord>,
    pub application: Option<VeteranApplication>,
}

impl VeteranStatusFields {
    pub fn field_map(&self) -> FieldMap {
        let mut map = FieldMap::new();
        put(&mut map, "veteran_form_variant", self.variant.key());
        put(&mut map, "veteran_form", self.form.clone());
        if let Some(service) = &self.service {
            put(&mut map, "veteran_name", service.veteran_name.clone());
            put(&mut map, "veteran_branch", service.branch.clone());
            put(&mut map, "veteran_service_start", service.service_start_date.clone());
            put(&mut map, "veteran_service_end", service.service_end_date.clone());
            put(&mut map, "veteran_discharge", service.character_of_service.clone());
        }
        if let Some(application) = &self.application {
            put(&mut map, "veteran_applicant_name", application.applicant_name.clone());
            put(
                &mut map,
                "veteran_relationship",
                application.relationship.map(Relationship::key),
            );
        }
        map
    }
}

const NUMBERED: &str = r"^(?:\d+[a-z]?\.\s*)?";

static_regex!(dd214_regex, r"(?i)\bdd[\s-]?(?:form\s*)?214\b");
static_regex!(
    name_anchor,
    &format!(r"(?i){NUMBERED}(?:name\s*\(last,\s*first,\s*middle\)|veteran'?s\s+name|name\s+of\s+veteran|name)\b")
);
static_regex!(
    branch_anchor,
    &format!(r"(?i){NUMBERED}(?:department,?\s+component\s+and\s+branch|component\s+and\s+branch|branch\s+of\s+service|branch)\b")
);
static_regex!(
    grade_anchor,
    &format!(r"(?i){NUMBERED}(?:grade,?\s*rate,?\s*or\s+rank|pay\s+grade|grade|rank)\b")
);
static_regex!(
    start_anchor,
    r"(?i)\b(?:date\s+entered\s+active\s+duty|entered\s+ad)(?:\s+this\s+period)?\b|\bservice\s+start(?:\s+date)?\b"
);
static_regex!(
    end_anchor,
    r"(?i)\b(?:separation\s+date|date\s+of\s+separation)(?:\s+this\s+period)?\b|\bservice\s+end(?:\s+date)?\b"
);
static_regex!(
    character_anchor,
    r"(?i)\bcharacter\s+of\s+service(?:\s*\(include\s+upgrades\))?"
);
static_regex!(
    applicant_anchor,
    r"(?i)^(?:applicant'?s?\s+name|name\s+of\s+(?:applicant|requester)|requester'?s?\s+name)\b"
);
static_regex!(relationship_anchor, r"(?i)\brelationship\s+to\s+(?:the\s+)?veteran\b");
static_regex!(address_anchor, r"(?i)^(?:mailing\s+address|address)\b");
static_regex!(
    purpose_anchor,
    r"(?i)^(?:purpose(?:\s+of\s+request)?|reason\s+for\s+request)\b"
);
static_regex!(
    signature_date_anchor,
    r"(?i)^(?:date\s+signed|signature\s+date|date\s+of\s+signature)\b"
);

pub(super) fn extract(text: &str, context: &ExtractionContext) -> (ExtractedFields, f32, Warnings) {
    let lines = clean_lines(text);
    let variant = match context.hint("variant").map(str::to_ascii_lowercase).as_deref() {
        Some("application") => VeteranFormVariant::Application,
        Some("certificate") => VeteranFormVariant::Certificate,
        _ if relationship_anchor().is_match(text) => VeteranFormVariant::Application,
        _ => VeteranFormVariant::Certificate,
    };
    let form = context
        .hint("form")
        .map(str::to_string)
        .or_else(|| dd214_regex().is_match(text).then(|| "dd214".to_string()));

    let anchored = |anchor| value_after_anchor(&lines, anchor).map(|(_, value)| value);
    let mut warnings = Warnings::new();

    let fields = match variant {
        VeteranFormVariant::Certificate => {
            let start = anchored(start_anchor()).and_then(|value| find_date(&value));
            let end = anchored(end_anchor()).and_then(|value| find_date(&value));
            if matches!((start, end), (Some(start), Some(end)) if end <= start) {
                warnings.insert(ExtractionWarning::InvalidServiceDates);
            }

            let service = ServiceRecord {
                veteran_name: anchored(name_anchor()).map(|value| reading_order_name(&value)),
                branch: anchored(branch_anchor()).map(|value| normalize_branch(&value)),
                grade: anchored(grade_anchor()),
                service_start_date: iso(start),
                service_end_date: iso(end),
                character_of_service: anchored(character_anchor()).map(|value| title_case(&value)),
            };
            if service.veteran_name.is_none() {
                warnings.insert(ExtractionWarning::MissingRequiredSection);
            }

            VeteranStatusFields {
                variant,
                form,
                service: Some(service),
                application: None,
            }
        }
        VeteranFormVariant::Application => {
            let relationship_raw = anchored(relationship_anchor());
            let relationship = relationship_raw.as_deref().and_then(Relationship::normalize);
            let application = VeteranApplication {
                applicant_name: anchored(applicant_anchor()),
                relationship,
                applicant_address: anchored(address_anchor()),
                request_purpose: anchored(purpose_anchor()).map(|value| truncate(&value, 300)),
                signature_date: iso(anchored(signature_date_anchor()).and_then(|value| find_date(&value))),
                relationship_raw,
            };

            if application.applicant_name.is_none() || application.relationship_raw.is_none() {
                warnings.insert(ExtractionWarning::MissingRequiredSection);
            }
            if application.relationship_raw.is_some() && application.relationship.is_none() {
                warnings.insert(ExtractionWarning::UnrecognizedRelationship);
            }

            VeteranStatusFields {
                variant,
                form,
                service: None,
                application: Some(application),
            }
        }
    };

    let confidence = degraded(0.9, 0.15, &warnings);
    (ExtractedFields::VeteranStatus(fields), confidence, warnings)
}

fn normalize_branch(raw: &str) -> String {
    let lower = raw.to_ascii_lowercase();
    let branch = if lower.contains("air force") || lower.contains("usaf") {
        "Air Force"
    } else if lower.contains("space force") {
        "Space Force"
    } else if lower.contains("marine") || lower.contains("usmc") {
        "Marine Corps"
    } else if lower.contains("coast guard") || lower.contains("uscg") {
        "Coast Guard"
    } else if lower.contains("navy") || lower.contains("usn") {
        "Navy"
    } else if lower.contains("army") {
        "Army"
    } else {
        return title_case(raw);
    };
    branch.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::intake::domain::Hints;
    use chrono::NaiveDate;

    const DD214: &str = "CERTIFICATE OF RELEASE OR DISCHARGE FROM ACTIVE DUTY\n\
        DD FORM 214\n\
        1. NAME (Last, First, Middle)\n\
        DOE, JOHN ALLEN\n\
        2. DEPARTMENT, COMPONENT AND BRANCH\n\
        ARMY/RA\n\
        4a. GRADE, RATE OR RANK: SGT\n\
        12a. DATE ENTERED ACTIVE DUTY THIS PERIOD: 2010-06-15\n\
        12b. SEPARATION DATE THIS PERIOD: 2014-06-14\n\
        24. CHARACTER OF SERVICE (Include upgrades): HONORABLE\n";

    const REQUEST: &str = "REQUEST PERTAINING TO MILITARY RECORDS\n\
        Name of Applicant: Maria Lopez\n\
        Relationship to Veteran: Surviving spouse\n\
        Mailing Address: 88 Harbor Road, Salem, MA 01970\n\
        Purpose of Request: Verify service for small business grant\n\
        Date Signed: 03/02/2024\n";

    fn run(text: &str, hints: Hints) -> (VeteranStatusFields, Warnings) {
        let context = ExtractionContext::new(NaiveDate::from_ymd_opt(2024, 4, 1).expect("valid date"))
            .with_hints(hints);
        match extract(text, &context) {
            (ExtractedFields::VeteranStatus(fields), _, warnings) => (fields, warnings),
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn separation_certificate_service_record() {
        let (fields, warnings) = run(DD214, Hints::new());
        assert!(warnings.is_empty(), "unexpected warnings {warnings:?}");
        assert_eq!(fields.variant, VeteranFormVariant::Certificate);
        assert_eq!(fields.form.as_deref(), Some("dd214"));
        assert!(fields.application.is_none());

        let service = fields.service.expect("service record");
        assert_eq!(service.veteran_name.as_deref(), Some("John Allen Doe"));
        assert_eq!(service.branch.as_deref(), Some("Army"));
        assert_eq!(service.grade.as_deref(), Some("SGT"));
        assert_eq!(service.service_start_date.as_deref(), Some("2010-06-15"));
        assert_eq!(service.service_end_date.as_deref(), Some("2014-06-14"));
        assert_eq!(service.character_of_service.as_deref(), Some("Honorable"));
    }

    #[test]
    fn reversed_service_dates_are_flagged() {
        let text = DD214
            .replace("PERIOD: 2010-06-15", "PERIOD: 2016-06-15")
            .replace("PERIOD: 2014-06-14", "PERIOD: 2012-01-01");
        let (_, warnings) = run(&text, Hints::new());
        assert!(warnings.contains(&ExtractionWarning::InvalidServiceDates));
    }

    #[test]
    fn application_variant_from_hint() {
        let mut hints = Hints::new();
        hints.insert("variant".to_string(), "application".to_string());
        let (fields, warnings) = run(REQUEST, hints);
        assert!(warnings.is_empty(), "unexpected warnings {warnings:?}");
        assert!(fields.service.is_none());

        let application = fields.application.expect("application fields");
        assert_eq!(application.applicant_name.as_deref(), Some("Maria Lopez"));
        assert_eq!(application.relationship, Some(Relationship::Spouse));
        assert_eq!(application.signature_date.as_deref(), Some("2024-03-02"));
        assert_eq!(
            application.applicant_address.as_deref(),
            Some("88 Harbor Road, Salem, MA 01970")
        );
    }

    #[test]
    fn application_is_detected_without_hint() {
        let (fields, _) = run(REQUEST, Hints::new());
        assert_eq!(fields.variant, VeteranFormVariant::Application);
    }

    #[test]
    fn unknown_relationship_is_reported() {
        let text = REQUEST.replace("Surviving spouse", "Neighbor");
        let (fields, warnings) = run(&text, Hints::new());
        let application = fields.application.expect("application fields");
        assert_eq!(application.relationship, None);
        assert_eq!(application.relationship_raw.as_deref(), Some("Neighbor"));
        assert!(warnings.contains(&ExtractionWarning::UnrecognizedRelationship));
    }

    #[test]
    fn relationship_vocabulary() {
        assert_eq!(Relationship::normalize("I am the veteran"), Some(Relationship::Veteran));
        assert_eq!(Relationship::normalize("Daughter"), Some(Relationship::Child));
        assert_eq!(
            Relationship::normalize("Attorney for the veteran"),
            Some(Relationship::Attorney)
        );
        assert_eq!(
            Relationship::normalize("Government official"),
            Some(Relationship::GovernmentOfficial)
        );
        assert_eq!(Relationship::normalize("Person of interest"), None);
    }
}
