use serde::{Deserialize, Serialize};

use super::{degraded, iso, put, ExtractedFields, ExtractionContext};
use crate::workflows::intake::domain::{ExtractionWarning, FieldMap, Warnings};
use crate::workflows::intake::normalize::{
    clean_lines, find_date, last_amount, parse_amount, reconciles, round_cents, static_regex,
    value_after_anchor,
};

const MAX_LINE_ITEMS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceKind {
    Invoice,
    Quote,
}

impl InvoiceKind {
    pub const fn key(self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Quote => "quote",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceFields {
    pub kind: InvoiceKind,
    pub vendor: Option<String>,
    pub document_number: Option<String>,
    pub issue_date: Option<String>,
    /// Payment due date for invoices, validity end for quotes.
    pub due_or_valid_until: Option<String>,
    pub bill_to: Option<String>,
    pub line_items: Vec<LineItem>,
    pub line_items_truncated: bool,
    pub subtotal: Option<f64>,
    pub tax: Option<f64>,
    pub total: Option<f64>,
}

impl InvoiceFields {
    pub fn field_map(&self) -> FieldMap {
        let mut map = FieldMap::new();
        put(&mut map, "vendor_name", self.vendor.clone());
        put(&mut map, "invoice_kind", self.kind.key());
        put(&mut map, "invoice_number", self.document_number.clone());
        put(&mut map, "invoice_date", self.issue_date.clone());
        put(&mut map, "invoice_bill_to", self.bill_to.clone());
        put(&mut map, "invoice_total", self.total);
        map
    }
}

static_regex!(
    heading_regex,
    r"(?i)^(?:invoice|quote|quotation|estimate|proforma\s+invoice|sales\s+quote)\s*$"
);
static_regex!(
    number_regex,
    r"(?i)\b(?:invoice|quote|quotation|estimate)\s*(?:#|no\.?|number)\s*:?\s*([a-z0-9][a-z0-9-]*)"
);
static_regex!(vendor_anchor, r"(?i)^(?:vendor|supplier|from|company)\s*:");
static_regex!(
    issue_date_anchor,
    r"(?i)^(?:invoice\s+date|quote\s+date|date\s+issued|issue\s+date|date)\s*:?"
);
static_regex!(
    due_anchor,
    r"(?i)^(?:due\s+date|payment\s+due|valid\s+until|valid\s+through|expires|expiration\s+date)\b"
);
static_regex!(
    bill_to_anchor,
    r"(?i)^(?:bill(?:ed)?\s+to|prepared\s+for|customer|sold\s+to)\b"
);
static_regex!(subtotal_label, r"(?i)^sub\s*-?\s*total\b");
static_regex!(tax_label, r"(?i)^(?:sales\s+)?tax\b");
static_regex!(
    total_label,
    r"(?i)^(?:(?:grand|invoice|quote)\s+)?total(?:\s+due)?\b|^(?:amount|balance)\s+due\b"
);
static_regex!(
    items_header,
    r"(?i)\b(?:description|item)\b.*\b(?:qty|quantity|amount|price|total)\b"
);
static_regex!(
    priced_row,
    r"^(.+?)\s+(\d+(?:\.\d+)?)\s+\$?([\d,]+\.\d{2})\s+\$?([\d,]+\.\d{2})$"
);
static_regex!(amount_row, r"^(.+?)\s+\$?([\d,]+\.\d{2})$");

fn is_totals_line(line: &str) -> bool {
    subtotal_label().is_match(line) || tax_label().is_match(line) || total_label().is_match(line)
}

pub(super) fn extract(text: &str, context: &ExtractionContext) -> (ExtractedFields, f32, Warnings) {
    let lines = clean_lines(text);

    let kind = match context.hint("kind").map(str::to_ascii_lowercase).as_deref() {
        Some("quote") => InvoiceKind::Quote,
        Some("invoice") => InvoiceKind::Invoice,
        _ => detect_kind(&lines),
    };

    let anchored = |anchor| value_after_anchor(&lines, anchor).map(|(_, value)| value);
    let vendor = anchored(vendor_anchor()).or_else(|| {
        lines
            .iter()
            .find(|line| !line.is_empty())
            .filter(|line| !heading_regex().is_match(line) && !number_regex().is_match(line))
            .cloned()
    });

    let (line_items, line_items_truncated) = line_items(&lines);
    let mut fields = InvoiceFields {
        kind,
        vendor,
        document_number: lines
            .iter()
            .find_map(|line| number_regex().captures(line).map(|captures| captures[1].to_ascii_uppercase())),
        issue_date: iso(anchored(issue_date_anchor()).and_then(|value| find_date(&value))),
        due_or_valid_until: iso(anchored(due_anchor()).and_then(|value| find_date(&value))),
        bill_to: anchored(bill_to_anchor()),
        line_items,
        line_items_truncated,
        subtotal: None,
        tax: None,
        total: None,
    };

    for line in &lines {
        let Some(amount) = last_amount(line) else {
            continue;
        };
        let slot = if subtotal_label().is_match(line) {
            &mut fields.subtotal
        } else if tax_label().is_match(line) {
            &mut fields.tax
        } else if total_label().is_match(line) {
            &mut fields.total
        } else {
            continue;
        };
        slot.get_or_insert(amount);
    }

    let mut warnings = Warnings::new();
    if fields.vendor.is_none() || fields.total.is_none() {
        warnings.insert(ExtractionWarning::MissingRequiredSection);
    }
    if let (Some(subtotal), Some(total)) = (fields.subtotal, fields.total) {
        if !reconciles(subtotal + fields.tax.unwrap_or(0.0), total) {
            warnings.insert(ExtractionWarning::TotalMismatch);
        }
    }
    if let Some(subtotal) = fields.subtotal {
        if !fields.line_items.is_empty() && !fields.line_items_truncated {
            let itemized = round_cents(fields.line_items.iter().map(|item| item.amount).sum());
            if !reconciles(itemized, subtotal) {
                warnings.insert(ExtractionWarning::LineItemMismatch);
            }
        }
    }

    let confidence = degraded(0.9, 0.15, &warnings);
    (ExtractedFields::InvoiceOrQuote(fields), confidence, warnings)
}

fn detect_kind(lines: &[String]) -> InvoiceKind {
    let quote = lines.iter().any(|line| {
        let lower = line.to_ascii_lowercase();
        (heading_regex().is_match(line) && !lower.contains("invoice"))
            || lower.starts_with("quote #")
            || lower.starts_with("quotation")
            || lower.starts_with("valid until")
    });
    let invoice = lines
        .iter()
        .any(|line| line.to_ascii_lowercase().contains("invoice"));
    if quote && !invoice {
        InvoiceKind::Quote
    } else {
        InvoiceKind::Invoice
    }
}

/// Rows between the items header and the first totals line; without a header only fully priced
/// rows (description, quantity, unit price, amount) are taken.
fn line_items(lines: &[String]) -> (Vec<LineItem>, bool) {
    let header = lines.iter().position(|line| items_header().is_match(line));
    let start = header.map(|index| index + 1).unwrap_or(0);

    let mut rows = lines[start..]
        .iter()
        .take_while(|line| !is_totals_line(line))
        .filter_map(|line| {
            if let Some(captures) = priced_row().captures(line) {
                return Some(LineItem {
                    description: captures[1].trim().to_string(),
                    quantity: captures[2].parse::<f64>().ok(),
                    unit_price: parse_amount(&captures[3]),
                    amount: parse_amount(&captures[4])?,
                });
            }
            if header.is_none() {
                return None;
            }
            let captures = amount_row().captures(line)?;
            Some(LineItem {
                description: captures[1].trim().to_string(),
                quantity: None,
                unit_price: None,
                amount: parse_amount(&captures[2])?,
            })
        });

    let items: Vec<LineItem> = rows.by_ref().take(MAX_LINE_ITEMS).collect();
    let truncated = rows.next().is_some();
    (items, truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const QUOTE: &str = "Harbor Kitchen Supply Co.\n\
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

    fn run(text: &str) -> (InvoiceFields, Warnings) {
        let context = ExtractionContext::new(NaiveDate::from_ymd_opt(2024, 2, 15).expect("valid date"));
        match extract(text, &context) {
            (ExtractedFields::InvoiceOrQuote(fields), _, warnings) => (fields, warnings),
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn quote_reconciles() {
        let (fields, warnings) = run(QUOTE);
        assert!(warnings.is_empty(), "unexpected warnings {warnings:?}");
        assert_eq!(fields.kind, InvoiceKind::Quote);
        assert_eq!(fields.vendor.as_deref(), Some("Harbor Kitchen Supply Co."));
        assert_eq!(fields.document_number.as_deref(), Some("Q-1042"));
        assert_eq!(fields.issue_date.as_deref(), Some("2024-02-10"));
        assert_eq!(fields.due_or_valid_until.as_deref(), Some("2024-03-10"));
        assert_eq!(fields.bill_to.as_deref(), Some("Sunrise Bakery LLC"));
        assert_eq!(fields.subtotal, Some(10_500.0));
        assert_eq!(fields.tax, Some(577.5));
        assert_eq!(fields.total, Some(11_077.5));
    }

    #[test]
    fn line_items_are_parsed() {
        let (fields, _) = run(QUOTE);
        assert_eq!(fields.line_items.len(), 2);
        assert_eq!(fields.line_items[1].description, "Proofing cabinet");
        assert_eq!(fields.line_items[1].quantity, Some(2.0));
        assert_eq!(fields.line_items[1].unit_price, Some(1250.0));
        assert_eq!(fields.line_items[1].amount, 2500.0);
    }

    #[test]
    fn total_that_does_not_add_up() {
        let (_, warnings) = run(&QUOTE.replace("Total $11,077.50", "Total $12,000.00"));
        assert_eq!(warnings.codes(), vec!["total_mismatch".to_string()]);
    }

    #[test]
    fn items_that_do_not_add_up() {
        let (_, warnings) = run(&QUOTE.replace("Deck oven 1 $8,000.00 $8,000.00", "Deck oven 1 $7,000.00 $7,000.00"));
        assert!(warnings.contains(&ExtractionWarning::LineItemMismatch));
        assert!(!warnings.contains(&ExtractionWarning::TotalMismatch));
    }

    #[test]
    fn invoice_kind_is_detected() {
        let text = QUOTE
            .replace("QUOTE\n", "INVOICE\n")
            .replace("Quote #: Q-1042", "Invoice Number: INV-77")
            .replace("Valid Until", "Due Date");
        let (fields, _) = run(&text);
        assert_eq!(fields.kind, InvoiceKind::Invoice);
        assert_eq!(fields.document_number.as_deref(), Some("INV-77"));
        assert_eq!(fields.due_or_valid_until.as_deref(), Some("2024-03-10"));
    }
}
