use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::{degraded, iso, put, ExtractedFields, ExtractionContext};
use crate::workflows::intake::classifier::BANK_NAMES;
use crate::workflows::intake::domain::{ExtractionWarning, FieldMap, Warnings};
use crate::workflows::intake::normalize::{
    clean_lines, find_dates, last_amount, parse_amount, reconciles, round_cents, static_regex,
    title_case, value_after_anchor,
};

const MAX_TRANSACTIONS: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementPeriod {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: Option<String>,
    pub description: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BankStatementFields {
    pub bank_name: Option<String>,
    pub account_holder: Option<String>,
    pub account_last4: Option<String>,
    pub statement_period: StatementPeriod,
    pub beginning_balance: Option<f64>,
    pub ending_balance: Option<f64>,
    pub deposits: Option<f64>,
    pub withdrawals: Option<f64>,
    pub checks_paid: Option<f64>,
    /// `beginning + deposits - withdrawals - checks_paid`, when a beginning balance was found.
    pub computed_ending_balance: Option<f64>,
    pub transactions: Vec<Transaction>,
    /// Set when more than the first 20 rows were present.
    pub transactions_truncated: bool,
}

impl BankStatementFields {
    pub fn field_map(&self) -> FieldMap {
        let mut map = FieldMap::new();
        put(&mut map, "bank_name", self.bank_name.clone());
        put(&mut map, "bank_account_holder", self.account_holder.clone());
        put(&mut map, "bank_account_last4", self.account_last4.clone());
        put(&mut map, "bank_statement_period_start", self.statement_period.start.clone());
        put(&mut map, "bank_statement_period_end", self.statement_period.end.clone());
        put(&mut map, "bank_beginning_balance", self.beginning_balance);
        put(&mut map, "bank_ending_balance", self.ending_balance);
        map
    }
}

static_regex!(
    holder_anchor,
    r"(?i)^(?:primary\s+)?(?:account\s+holder|account\s+name|customer\s+name)\b"
);
static_regex!(
    account_number_regex,
    r"(?i)\b(?:account|acct)\.?\s*(?:number|no\.?|#)\s*:?\s*(.+)$"
);
static_regex!(
    period_anchor,
    r"(?i)\b(?:statement\s+period|statement\s+dates?|for\s+the\s+period|period\s+covered)\b"
);
static_regex!(checks_label, r"(?i)\bchecks\s+paid\b");
static_regex!(
    beginning_label,
    r"(?i)\b(?:beginning|opening|previous|starting)\s+balance\b"
);
static_regex!(ending_label, r"(?i)\b(?:ending|closing|new)\s+balance\b");
static_regex!(deposits_label, r"(?i)\b(?:total\s+)?deposits\b");
static_regex!(
    withdrawals_label,
    r"(?i)\b(?:total\s+)?(?:withdrawals|debits|electronic\s+payments)\b"
);
static_regex!(total_prefix, r"(?i)^total\b");
static_regex!(dated_line, r"^\d{1,2}/\d{1,2}\b");
static_regex!(
    transaction_row,
    r"^(\d{1,2})/(\d{1,2})(?:/(\d{2,4}))?\s+(.+?)\s+(\(?-?\$?[\d,]+\.\d{2}\)?)(?:\s+\$?[\d,]+\.\d{2})?$"
);

#[derive(Clone, Copy)]
enum Summary {
    Checks,
    Beginning,
    Ending,
    Deposits,
    Withdrawals,
}

fn summary_label(line: &str) -> Option<Summary> {
    if checks_label().is_match(line) {
        Some(Summary::Checks)
    } else if beginning_label().is_match(line) {
        Some(Summary::Beginning)
    } else if ending_label().is_match(line) {
        Some(Summary::Ending)
    } else if deposits_label().is_match(line) {
        Some(Summary::Deposits)
    } else if withdrawals_label().is_match(line) {
        Some(Summary::Withdrawals)
    } else {
        None
    }
}

/// Running total for one activity category. Statements either print one total line or split the
/// category across several lines (`ATM Withdrawals`, `Electronic Withdrawals`); an explicit
/// `Total ...` line wins over the sum of category lines.
#[derive(Default)]
struct Tally {
    categories: Option<f64>,
    total: Option<f64>,
}

impl Tally {
    fn add(&mut self, line: &str, amount: f64) {
        if total_prefix().is_match(line) {
            self.total.get_or_insert(amount);
        } else {
            *self.categories.get_or_insert(0.0) += amount;
        }
    }

    fn value(&self) -> Option<f64> {
        self.total.or(self.categories).map(round_cents)
    }
}

pub(super) fn extract(text: &str, _context: &ExtractionContext) -> (ExtractedFields, f32, Warnings) {
    let lines = clean_lines(text);
    let mut fields = BankStatementFields {
        bank_name: bank_name(&lines),
        account_holder: value_after_anchor(&lines, holder_anchor()).map(|(_, value)| value),
        account_last4: account_last4(&lines),
        ..BankStatementFields::default()
    };

    let (start, end) = statement_period(&lines);
    fields.statement_period = StatementPeriod {
        start: iso(start),
        end: iso(end),
    };

    let mut deposits = Tally::default();
    let mut withdrawals = Tally::default();
    let mut checks = Tally::default();
    for line in &lines {
        // Dated rows are activity, never summary figures.
        if dated_line().is_match(line) {
            continue;
        }
        let (Some(label), Some(amount)) = (summary_label(line), last_amount(line)) else {
            continue;
        };
        match label {
            Summary::Beginning => {
                fields.beginning_balance.get_or_insert(amount);
            }
            Summary::Ending => {
                fields.ending_balance.get_or_insert(amount);
            }
            Summary::Deposits => deposits.add(line, amount.abs()),
            Summary::Withdrawals => withdrawals.add(line, amount.abs()),
            Summary::Checks => checks.add(line, amount.abs()),
        }
    }
    fields.deposits = deposits.value();
    fields.withdrawals = withdrawals.value();
    fields.checks_paid = checks.value();

    let statement_year = end.or(start).map(|date| date.year());
    let mut rows = lines
        .iter()
        .filter_map(|line| transaction(line, statement_year));
    fields.transactions = rows.by_ref().take(MAX_TRANSACTIONS).collect();
    fields.transactions_truncated = rows.next().is_some();

    let mut warnings = Warnings::new();
    fields.computed_ending_balance = fields.beginning_balance.map(|beginning| {
        round_cents(
            beginning + fields.deposits.unwrap_or(0.0)
                - fields.withdrawals.unwrap_or(0.0)
                - fields.checks_paid.unwrap_or(0.0),
        )
    });
    match (fields.computed_ending_balance, fields.ending_balance) {
        (Some(computed), Some(ending)) => {
            if !reconciles(computed, ending) {
                warnings.insert(ExtractionWarning::BalanceMismatch);
            }
        }
        _ => {
            warnings.insert(ExtractionWarning::MissingBalance);
        }
    }

    let confidence = degraded(0.9, 0.15, &warnings);
    (ExtractedFields::BankStatement(fields), confidence, warnings)
}

fn bank_name(lines: &[String]) -> Option<String> {
    lines.iter().find_map(|line| {
        let lower = line.to_ascii_lowercase();
        let known = BANK_NAMES.iter().find(|name| lower.contains(*name))?;
        if line.chars().count() <= 60 && !line.chars().any(|c| c.is_ascii_digit()) {
            Some(line.clone())
        } else {
            Some(title_case(known))
        }
    })
}

fn account_last4(lines: &[String]) -> Option<String> {
    lines.iter().find_map(|line| {
        let captures = account_number_regex().captures(line)?;
        let digits: String = captures[1].chars().filter(char::is_ascii_digit).collect();
        (digits.len() >= 4).then(|| digits[digits.len() - 4..].to_string())
    })
}

fn statement_period(lines: &[String]) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let anchored = lines
        .iter()
        .position(|line| period_anchor().is_match(line))
        .map(|index| {
            let mut dates = find_dates(&lines[index]);
            if dates.len() < 2 {
                if let Some(next) = lines.get(index + 1) {
                    dates.extend(find_dates(next));
                }
            }
            dates
        });

    let dates = anchored
        .filter(|dates| !dates.is_empty())
        .or_else(|| {
            lines
                .iter()
                .map(|line| find_dates(line))
                .find(|dates| dates.len() >= 2)
        })
        .unwrap_or_default();

    (dates.first().copied(), dates.get(1).copied())
}

fn transaction(line: &str, statement_year: Option<i32>) -> Option<Transaction> {
    let captures = transaction_row().captures(line)?;
    let month = captures[1].parse::<u32>().ok()?;
    let day = captures[2].parse::<u32>().ok()?;
    let year = match captures.get(3) {
        Some(year) => {
            let raw = year.as_str().parse::<i32>().ok()?;
            if year.as_str().len() == 2 {
                2000 + raw
            } else {
                raw
            }
        }
        None => statement_year?,
    };
    let date = NaiveDate::from_ymd_opt(year, month, day);
    Some(Transaction {
        date: iso(date),
        description: captures[4].trim().to_string(),
        amount: parse_amount(&captures[5])?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATEMENT: &str = "Wells Fargo Bank\n\
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

    fn context() -> ExtractionContext {
        ExtractionContext::new(NaiveDate::from_ymd_opt(2024, 2, 15).expect("valid date"))
    }

    fn fields(text: &str) -> (BankStatementFields, f32, Warnings) {
        match extract(text, &context()) {
            (ExtractedFields::BankStatement(fields), confidence, warnings) => {
                (fields, confidence, warnings)
            }
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn reconciled_statement_has_no_warnings() {
        let (fields, confidence, warnings) = fields(STATEMENT);
        assert!(warnings.is_empty(), "unexpected warnings {warnings:?}");
        assert!((confidence - 0.9).abs() < f32::EPSILON);
        assert_eq!(fields.bank_name.as_deref(), Some("Wells Fargo Bank"));
        assert_eq!(fields.account_holder.as_deref(), Some("Sunrise Bakery LLC"));
        assert_eq!(fields.account_last4.as_deref(), Some("1234"));
        assert_eq!(fields.statement_period.start.as_deref(), Some("2024-01-01"));
        assert_eq!(fields.statement_period.end.as_deref(), Some("2024-01-31"));
        assert_eq!(fields.beginning_balance, Some(1000.0));
        assert_eq!(fields.deposits, Some(600.0));
        assert_eq!(fields.withdrawals, Some(100.0));
        assert_eq!(fields.ending_balance, Some(1500.0));
        assert_eq!(fields.computed_ending_balance, Some(1500.0));
    }

    #[test]
    fn transactions_take_the_statement_year() {
        let (fields, _, _) = fields(STATEMENT);
        assert_eq!(fields.transactions.len(), 2);
        assert_eq!(fields.transactions[0].date.as_deref(), Some("2024-01-05"));
        assert_eq!(fields.transactions[0].description, "Mobile Deposit");
        assert_eq!(fields.transactions[1].amount, -100.0);
        assert!(!fields.transactions_truncated);
    }

    #[test]
    fn unbalanced_statement_is_flagged() {
        let text = STATEMENT.replace("Ending Balance $1,500.00", "Ending Balance $1,420.00");
        let (fields, confidence, warnings) = fields(&text);
        assert!(warnings.contains(&ExtractionWarning::BalanceMismatch));
        assert_eq!(fields.ending_balance, Some(1420.0));
        assert!(confidence < 0.9);
    }

    #[test]
    fn within_a_dollar_still_reconciles() {
        let text = STATEMENT.replace("Ending Balance $1,500.00", "Ending Balance $1,500.75");
        let (_, _, warnings) = fields(&text);
        assert!(warnings.is_empty());
    }

    #[test]
    fn missing_balances_are_reported() {
        let (fields, _, warnings) = fields("Chase\nStatement Period: 02/01/2024 - 02/29/2024\n");
        assert_eq!(warnings.codes(), vec!["missing_balance".to_string()]);
        assert_eq!(fields.statement_period.end.as_deref(), Some("2024-02-29"));
    }

    #[test]
    fn dated_rows_are_not_summary_figures() {
        let text = "Chase\n\
            Statement Period: 01/01/2024 - 01/31/2024\n\
            Beginning Balance $1,000.00\n\
            01/03 Returned deposits fee 25.00\n\
            Total Deposits $625.00\n\
            Total Withdrawals $125.00\n\
            Ending Balance $1,500.00\n";
        let (fields, _, warnings) = fields(text);
        assert_eq!(fields.deposits, Some(625.0));
        assert_eq!(fields.withdrawals, Some(125.0));
        assert!(warnings.is_empty(), "unexpected warnings {warnings:?}");
    }

    #[test]
    fn withdrawal_categories_are_summed() {
        let text = "Chase\n\
            Statement Period: 01/01/2024 - 01/31/2024\n\
            Beginning Balance $1,000.00\n\
            Deposits and Additions $600.00\n\
            ATM & Debit Card Withdrawals $50.00\n\
            Electronic Withdrawals $50.00\n\
            Ending Balance $1,500.00\n";
        let (fields, _, warnings) = fields(text);
        assert_eq!(fields.withdrawals, Some(100.0));
        assert_eq!(fields.computed_ending_balance, Some(1500.0));
        assert!(warnings.is_empty(), "unexpected warnings {warnings:?}");
    }

    #[test]
    fn total_line_wins_over_categories() {
        let text = STATEMENT.replace(
            "Withdrawals and Subtractions $100.00\n",
            "Electronic Withdrawals $60.00\nATM Withdrawals $40.00\nTotal Withdrawals $100.00\n",
        );
        let (fields, _, warnings) = fields(&text);
        assert_eq!(fields.withdrawals, Some(100.0));
        assert!(warnings.is_empty(), "unexpected warnings {warnings:?}");
    }

    #[test]
    fn transactions_are_capped() {
        let mut text = STATEMENT.to_string();
        for day in 1..=25 {
            text.push_str(&format!("01/{day:02} Coffee beans 12.50\n"));
        }
        let (fields, _, _) = fields(&text);
        assert_eq!(fields.transactions.len(), MAX_TRANSACTIONS);
        assert!(fields.transactions_truncated);
    }
}
