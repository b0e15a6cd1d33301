use serde::{Deserialize, Serialize};

use super::{degraded, put, ExtractedFields, ExtractionContext};
use crate::workflows::intake::domain::{ExtractionWarning, FieldMap, Warnings};
use crate::workflows::intake::normalize::{
    clean_lines, month_year, static_regex, strip_separators, truncate, MONTHS,
};

const SUMMARY_LIMIT: usize = 500;
const HIGHLIGHT_LIMIT: usize = 6;

/// Fixed allowlist separating technical skills from general ones.
const TECHNICAL_SKILLS: &[&str] = &[
    "python", "java", "javascript", "typescript", "rust", "go", "c", "c++", "c#", "sql",
    "postgresql", "mysql", "excel", "quickbooks", "aws", "azure", "gcp", "docker", "kubernetes",
    "linux", "git", "html", "css", "react", "tableau", "power bi", "salesforce", "autocad", "sap",
    "matlab", "r", "pos systems", "cnc", "plc", "haccp",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeContact {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
}

/// Closed degree vocabulary, ordered so the highest degree is the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegreeLevel {
    Other,
    Certificate,
    Associate,
    Bachelor,
    Master,
    Phd,
}

impl DegreeLevel {
    pub const fn key(self) -> &'static str {
        match self {
            Self::Other => "other",
            Self::Certificate => "certificate",
            Self::Associate => "associate",
            Self::Bachelor => "bachelor",
            Self::Master => "master",
            Self::Phd => "phd",
        }
    }

    fn detect(line: &str) -> Option<Self> {
        let lower = line.to_ascii_lowercase();
        let has_any = |needles: &[&str]| needles.iter().any(|needle| lower.contains(needle));
        if has_any(&["ph.d", "phd", "doctor of", "doctorate"]) {
            Some(Self::Phd)
        } else if has_any(&["master", "m.s.", "m.a.", "mba", "m.b.a", "msc", "m.sc"]) {
            Some(Self::Master)
        } else if has_any(&["bachelor", "b.s.", "b.a.", "bsc", "b.sc", "b.f.a"]) {
            Some(Self::Bachelor)
        } else if has_any(&["associate of", "associate's", "associates", "associate degree", "a.a.s", "a.s.", "a.a."]) {
            Some(Self::Associate)
        } else if has_any(&["certificate", "diploma"]) {
            Some(Self::Certificate)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Education {
    pub degree: DegreeLevel,
    pub field: Option<String>,
    pub institution: Option<String>,
    /// `YYYY-MM` or `YYYY`.
    pub graduation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experience {
    pub title: Option<String>,
    pub organization: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub current: bool,
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeFields {
    pub contact: ResumeContact,
    pub summary: Option<String>,
    pub education: Vec<Education>,
    pub highest_degree: Option<DegreeLevel>,
    pub experience: Vec<Experience>,
    pub technical_skills: Vec<String>,
    pub general_skills: Vec<String>,
    pub certifications: Vec<String>,
}

impl ResumeFields {
    pub fn field_map(&self) -> FieldMap {
        let mut map = FieldMap::new();
        put(&mut map, "owner_name", self.contact.name.clone());
        put(&mut map, "owner_email", self.contact.email.clone());
        put(&mut map, "owner_phone", self.contact.phone.clone());
        put(&mut map, "owner_location", self.contact.location.clone());
        put(&mut map, "highest_degree", self.highest_degree.map(DegreeLevel::key));
        put(&mut map, "owner_certifications", self.certifications.clone());
        map
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Summary,
    Education,
    Experience,
    Skills,
    Certifications,
}

static_regex!(
    heading_regex,
    r"(?i)^(?:professional\s+|career\s+|work\s+|technical\s+|core\s+|relevant\s+)?(summary|profile|objective|education|experience|employment\s+history|skills|competencies|certifications|licenses\s+(?:and|&)\s+certifications)\s*(?::\s*(.*))?$"
);
static_regex!(email_regex, r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b");
static_regex!(
    phone_regex,
    r"(?:\+?1[\s.-]?)?\(?\b\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}\b"
);
static_regex!(location_regex, r"\b([A-Z][A-Za-z .'-]+,\s*[A-Z]{2})\b");
static_regex!(
    date_range_regex,
    &format!(
        r"(?i)((?:{MONTHS})\.?\s+\d{{4}}|\d{{1,2}}/\d{{4}}|\d{{4}})\s*(?:-|–|—|to|through)\s*((?:{MONTHS})\.?\s+\d{{4}}|\d{{1,2}}/\d{{4}}|\d{{4}}|present|current|now)"
    )
);
static_regex!(field_of_study, r"(?i)\b(?:in|of)\s+([A-Za-z][A-Za-z &]+)$");
static_regex!(bullet_regex, r"^[-•*▪◦]\s*");

/// The section a heading line opens, plus any content written inline after its colon.
fn section_for(line: &str) -> Option<(Section, Option<&str>)> {
    let captures = heading_regex().captures(line)?;
    let inline = captures
        .get(2)
        .map(|content| content.as_str().trim())
        .filter(|content| !content.is_empty());
    let name = captures[1].to_ascii_lowercase();
    let section = match name.as_str() {
        "summary" | "profile" | "objective" => Section::Summary,
        "education" => Section::Education,
        "experience" => Section::Experience,
        "skills" | "competencies" => Section::Skills,
        _ if name.starts_with("employment") => Section::Experience,
        _ => Section::Certifications,
    };
    Some((section, inline))
}

pub(super) fn extract(text: &str, _context: &ExtractionContext) -> (ExtractedFields, f32, Warnings) {
    let lines = clean_lines(text);

    let mut sections: Vec<(Section, Vec<&str>)> = vec![(Section::Header, Vec::new())];
    for line in &lines {
        match section_for(line) {
            Some((section, inline)) => sections.push((section, inline.into_iter().collect())),
            None if line.is_empty() => {}
            None => {
                if let Some((_, body)) = sections.last_mut() {
                    body.push(line.as_str());
                }
            }
        }
    }
    let section = |wanted: Section| {
        let matching: Vec<&Vec<&str>> = sections
            .iter()
            .filter(|(kind, _)| *kind == wanted)
            .map(|(_, body)| body)
            .collect();
        (!matching.is_empty()).then(|| matching.into_iter().flatten().copied().collect::<Vec<&str>>())
    };

    let header = section(Section::Header).unwrap_or_default();
    let contact = ResumeContact {
        name: header
            .iter()
            .find(|line| {
                line.chars().count() <= 60
                    && !line.contains('@')
                    && !line.chars().any(|c| c.is_ascii_digit())
            })
            .map(|line| line.to_string()),
        email: email_regex().find(text).map(|found| found.as_str().to_string()),
        phone: phone_regex().find(text).map(|found| found.as_str().trim().to_string()),
        location: header
            .iter()
            .skip(1)
            .find_map(|line| location_regex().captures(line).map(|captures| captures[1].to_string())),
    };

    let education_lines = section(Section::Education);
    let experience_lines = section(Section::Experience);
    let education = education_lines.as_deref().map(parse_education).unwrap_or_default();
    let (technical_skills, general_skills) = section(Section::Skills)
        .map(|body| split_skills(&body))
        .unwrap_or_default();

    let fields = ResumeFields {
        summary: section(Section::Summary)
            .filter(|body| !body.is_empty())
            .map(|body| truncate(&body.join(" "), SUMMARY_LIMIT)),
        highest_degree: education.iter().map(|entry| entry.degree).max(),
        education,
        experience: experience_lines.as_deref().map(parse_experience).unwrap_or_default(),
        technical_skills,
        general_skills,
        certifications: section(Section::Certifications)
            .unwrap_or_default()
            .into_iter()
            .map(|line| bullet_regex().replace(line, "").trim().to_string())
            .filter(|line| !line.is_empty())
            .collect(),
        contact,
    };

    let mut warnings = Warnings::new();
    if fields.contact.email.is_none() && fields.contact.phone.is_none() {
        warnings.insert(ExtractionWarning::MissingContactInfo);
    }
    if education_lines.is_none() || experience_lines.is_none() {
        warnings.insert(ExtractionWarning::MissingRequiredSection);
    }

    let confidence = degraded(0.85, 0.15, &warnings);
    (ExtractedFields::Resume(fields), confidence, warnings)
}

fn parse_education(lines: &[&str]) -> Vec<Education> {
    let mut entries: Vec<Education> = Vec::new();
    for line in lines {
        let line = bullet_regex().replace(line, "");
        let segments: Vec<&str> = line
            .split([',', '|', '–', '—'])
            .flat_map(|segment| segment.split(" - "))
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .collect();
        let institution = segments
            .iter()
            .find(|segment| is_institution(segment))
            .map(|segment| segment.to_string());
        let graduation = month_year(&line);

        match DegreeLevel::detect(&line) {
            Some(degree) => {
                let field = segments
                    .iter()
                    .find(|segment| DegreeLevel::detect(segment).is_some())
                    .and_then(|segment| field_of_study().captures(segment))
                    .map(|captures| captures[1].trim().to_string());
                entries.push(Education {
                    degree,
                    field,
                    institution,
                    graduation,
                });
            }
            None => match (entries.last_mut(), institution) {
                (Some(last), Some(institution)) if last.institution.is_none() => {
                    last.institution = Some(institution);
                    if last.graduation.is_none() {
                        last.graduation = graduation;
                    }
                }
                (_, Some(institution)) => entries.push(Education {
                    degree: DegreeLevel::Other,
                    field: None,
                    institution: Some(institution),
                    graduation,
                }),
                (Some(last), None) if last.graduation.is_none() => last.graduation = graduation,
                _ => {}
            },
        }
    }
    entries
}

fn is_institution(segment: &str) -> bool {
    let lower = segment.to_ascii_lowercase();
    ["university", "college", "institute", "school", "academy"]
        .iter()
        .any(|marker| lower.contains(marker))
}

fn parse_experience(lines: &[&str]) -> Vec<Experience> {
    let mut entries: Vec<Experience> = Vec::new();
    let mut pending: Vec<&str> = Vec::new();

    for &line in lines {
        if bullet_regex().is_match(line) {
            if let Some(entry) = entries.last_mut() {
                if entry.highlights.len() < HIGHLIGHT_LIMIT {
                    entry.highlights.push(bullet_regex().replace(line, "").trim().to_string());
                }
            }
            continue;
        }

        let Some(captures) = date_range_regex().captures(line) else {
            pending.push(line);
            continue;
        };
        let Some(range) = captures.get(0) else {
            continue;
        };

        let inline = format!("{} {}", &line[..range.start()], &line[range.end()..]);
        let inline = strip_separators(inline.trim().trim_end_matches(['|', ',', '-', '(']).trim()).to_string();
        let heading = if inline.is_empty() {
            pending.last().map(|line| line.to_string()).unwrap_or_default()
        } else {
            inline
        };
        let (title, organization) = split_role(&heading);

        let end_raw = captures[2].to_ascii_lowercase();
        let current = matches!(end_raw.as_str(), "present" | "current" | "now");
        entries.push(Experience {
            title,
            organization,
            start: month_year(&captures[1]),
            end: if current { None } else { month_year(&captures[2]) },
            current,
            highlights: Vec::new(),
        });
        pending.clear();
    }
    entries
}

/// Split "Title, Organization" / "Title at Organization" / "Title | Organization".
fn split_role(heading: &str) -> (Option<String>, Option<String>) {
    let heading = heading.trim();
    if heading.is_empty() {
        return (None, None);
    }
    for separator in [" at ", " | ", ", ", " - ", " – "] {
        if let Some((title, organization)) = heading.split_once(separator) {
            let title = title.trim();
            let organization = organization.trim();
            if !title.is_empty() && !organization.is_empty() {
                return (Some(title.to_string()), Some(organization.to_string()));
            }
        }
    }
    (Some(heading.to_string()), None)
}

fn split_skills(lines: &[&str]) -> (Vec<String>, Vec<String>) {
    let mut technical: Vec<String> = Vec::new();
    let mut general: Vec<String> = Vec::new();

    for line in lines {
        let line = bullet_regex().replace(line, "");
        let listed = match line.split_once(':') {
            Some((_, rest)) => rest,
            None => &*line,
        };
        for skill in listed.split([',', ';', '|', '•']).map(str::trim).filter(|skill| !skill.is_empty()) {
            let bucket = if TECHNICAL_SKILLS.contains(&skill.to_ascii_lowercase().as_str()) {
                &mut technical
            } else {
                &mut general
            };
            if !bucket.iter().any(|known| known.eq_ignore_ascii_case(skill)) {
                bucket.push(skill.to_string());
            }
        }
    }
    (technical, general)
}
