//! Text normalization shared by the classifier and the extractors.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

/// Declares a lazily compiled, process-wide regular expression accessor.
macro_rules! static_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static ::regex::Regex {
            static PATTERN: ::std::sync::OnceLock<::regex::Regex> = ::std::sync::OnceLock::new();
            PATTERN.get_or_init(|| ::regex::Regex::new($pattern).expect("valid static regex"))
        }
    };
}
pub(crate) use static_regex;

pub(crate) const MONTHS: &str = "jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?";

fn date_token_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let pattern = format!(
            r"(?i)\b(?:\d{{4}}-\d{{1,2}}-\d{{1,2}}|\d{{1,2}}[/-]\d{{1,2}}[/-]\d{{2,4}}|(?:{MONTHS})\.?\s+\d{{1,2}}(?:st|nd|rd|th)?,?\s+\d{{4}}|\d{{1,2}}\s+(?:{MONTHS})\.?,?\s+\d{{4}})\b"
        );
        Regex::new(&pattern).expect("valid date regex")
    })
}

fn month_year_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let pattern = format!(
            r"(?i)\b(?:(?P<name>{MONTHS})\.?,?\s+(?P<named_year>\d{{4}})|(?P<month>\d{{1,2}})/(?P<slash_year>\d{{4}})|(?P<iso_year>\d{{4}})-(?P<iso_month>\d{{2}})|(?P<year>(?:19|20)\d{{2}}))\b"
        );
        Regex::new(&pattern).expect("valid month-year regex")
    })
}

static_regex!(numeric_date_regex, r"^(\d{1,2})[/-](\d{1,2})[/-](\d{2,4})$");
static_regex!(iso_date_regex, r"^(\d{4})-(\d{1,2})-(\d{1,2})$");
static_regex!(compact_date_regex, r"^((?:19|20)\d{2})(\d{2})(\d{2})$");
static_regex!(
    amount_regex,
    r"\(?-?\$\s?\d[\d,]*(?:\.\d{1,2})?\)?|\(?-?\d[\d,]*\.\d{2}\b\)?"
);
static_regex!(whitespace_regex, r"[ \t\u{a0}]+");

/// Split text into trimmed lines with zero-width characters removed and inner runs of
/// whitespace collapsed. Blank lines are kept so callers can detect block boundaries.
pub(crate) fn clean_lines(text: &str) -> Vec<String> {
    text.replace(['\u{feff}', '\u{200b}'], "")
        .lines()
        .map(|line| whitespace_regex().replace_all(line.trim(), " ").into_owned())
        .collect()
}

pub(crate) fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Title-case an all-caps or all-lowercase name; mixed-case input is left alone.
pub(crate) fn title_case(value: &str) -> String {
    let collapsed = collapse_whitespace(value);
    let has_upper = collapsed.chars().any(|c| c.is_uppercase());
    let has_lower = collapsed.chars().any(|c| c.is_lowercase());
    if has_upper && has_lower {
        return collapsed;
    }
    collapsed
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reorder a `LAST, FIRST MIDDLE` name into reading order.
pub(crate) fn reading_order_name(value: &str) -> String {
    let trimmed = strip_separators(value);
    match trimmed.split_once(',') {
        Some((last, rest)) if !rest.trim().is_empty() && !last.trim().contains(' ') => {
            title_case(&format!("{} {}", rest.trim(), last.trim()))
        }
        _ => title_case(trimmed),
    }
}

/// Cut `value` down to at most `max_chars` characters on a char boundary.
pub(crate) fn truncate(value: &str, max_chars: usize) -> String {
    let collapsed = collapse_whitespace(value);
    match collapsed.char_indices().nth(max_chars) {
        Some((index, _)) => collapsed[..index].trim_end().to_string(),
        None => collapsed,
    }
}

/// Strip separators an anchor leaves behind (`Producer: `, `Name - `, `# `).
pub(crate) fn strip_separators(value: &str) -> &str {
    value
        .trim()
        .trim_start_matches([':', '-', '#', '|', '.'])
        .trim()
}

/// Locate the first line matching `anchor` and return `(line_index, value)`, where the value is
/// whatever follows the anchor on that line or, when that is empty, the next non-empty line.
pub(crate) fn value_after_anchor(lines: &[String], anchor: &Regex) -> Option<(usize, String)> {
    lines
        .iter()
        .enumerate()
        .find_map(|(index, line)| anchor.find(line).map(|found| (index, found.end())))
        .and_then(|(index, end)| {
            let inline = strip_separators(&lines[index][end..]);
            if !inline.is_empty() {
                return Some((index, inline.to_string()));
            }
            lines
                .iter()
                .enumerate()
                .skip(index + 1)
                .take(3)
                .find(|(_, line)| !line.trim().is_empty())
                .map(|(next, line)| (next, strip_separators(line).to_string()))
        })
        .filter(|(_, value)| !value.is_empty())
}

/// Parse a single date token into a calendar date.
pub(crate) fn parse_date(value: &str) -> Option<NaiveDate> {
    let token = value
        .trim()
        .trim_end_matches(['.', ',', ';', ')'])
        .trim_start_matches('(');
    if token.is_empty() {
        return None;
    }

    if let Some(captures) = numeric_date_regex().captures(token) {
        let month = captures[1].parse::<u32>().ok()?;
        let day = captures[2].parse::<u32>().ok()?;
        let year = expand_year(captures[3].parse::<i32>().ok()?, captures[3].len());
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    for regex in [iso_date_regex(), compact_date_regex()] {
        if let Some(captures) = regex.captures(token) {
            let year = captures[1].parse::<i32>().ok()?;
            let month = captures[2].parse::<u32>().ok()?;
            let day = captures[3].parse::<u32>().ok()?;
            return NaiveDate::from_ymd_opt(year, month, day);
        }
    }

    let normalized = token
        .replace(',', " ")
        .replace('.', " ")
        .split_whitespace()
        .map(|part| {
            let lower = part.to_ascii_lowercase();
            let stripped = lower
                .strip_suffix("st")
                .or_else(|| lower.strip_suffix("nd"))
                .or_else(|| lower.strip_suffix("rd"))
                .or_else(|| lower.strip_suffix("th"))
                .filter(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()));
            match stripped {
                Some(digits) => digits.to_string(),
                None if lower.starts_with("sept") => "sep".to_string(),
                None => lower,
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    ["%b %d %Y", "%B %d %Y", "%d %b %Y", "%d %B %Y"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&normalized, format).ok())
}

fn expand_year(year: i32, digits: usize) -> i32 {
    if digits > 2 {
        year
    } else if year < 69 {
        2000 + year
    } else {
        1900 + year
    }
}

/// Every parseable date in `value`, in textual order.
pub(crate) fn find_dates(value: &str) -> Vec<NaiveDate> {
    date_token_regex()
        .find_iter(value)
        .filter_map(|found| parse_date(found.as_str()))
        .collect()
}

pub(crate) fn find_date(value: &str) -> Option<NaiveDate> {
    find_dates(value).into_iter().next()
}

/// Parse a month/year style value into `YYYY-MM` (or `YYYY` when only the year is known).
pub(crate) fn month_year(value: &str) -> Option<String> {
    let captures = month_year_regex().captures(value)?;

    if let (Some(name), Some(year)) = (captures.name("name"), captures.name("named_year")) {
        let month = month_number(name.as_str())?;
        return Some(format!("{}-{month:02}", year.as_str()));
    }
    if let (Some(month), Some(year)) = (captures.name("month"), captures.name("slash_year")) {
        let month = month.as_str().parse::<u32>().ok().filter(|m| (1..=12).contains(m))?;
        return Some(format!("{}-{month:02}", year.as_str()));
    }
    if let (Some(year), Some(month)) = (captures.name("iso_year"), captures.name("iso_month")) {
        let month = month.as_str().parse::<u32>().ok().filter(|m| (1..=12).contains(m))?;
        return Some(format!("{}-{month:02}", year.as_str()));
    }
    captures.name("year").map(|year| year.as_str().to_string())
}

fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_ascii_lowercase();
    let prefix = lower.get(..3)?;
    let month = match prefix {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Round to cents.
pub(crate) fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Parse a monetary token (`$1,234.56`, `(45.00)`, `-12.50`) into a cents-precision float.
pub(crate) fn parse_amount(value: &str) -> Option<f64> {
    let token = value.trim();
    let negative = token.starts_with('-') || (token.starts_with('(') && token.ends_with(')'));
    let digits: String = token
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if digits.is_empty() {
        return None;
    }
    let magnitude = digits.parse::<f64>().ok()?;
    Some(round_cents(if negative { -magnitude } else { magnitude }))
}

/// All monetary amounts in `value`, in textual order.
pub(crate) fn find_amounts(value: &str) -> Vec<f64> {
    amount_regex()
        .find_iter(value)
        .filter_map(|found| parse_amount(found.as_str()))
        .collect()
}

/// The right-most amount on a line, which is where statements print the figure.
pub(crate) fn last_amount(value: &str) -> Option<f64> {
    find_amounts(value).pop()
}

/// Within one dollar, the tolerance applied to every reconciliation check.
pub(crate) fn reconciles(left: f64, right: f64) -> bool {
    (left - right).abs() <= 1.0
}
