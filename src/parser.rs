// 🏗️ Transaction Extractor
// Page-delimited statement text → ordered transactions + parse-quality tally.
//
// Line classification is an ordered chain of LineMatcher strategies
// (bank-specific fixed formats first, the generic heuristic last); the first
// matcher that returns Some wins. Lines without a leading date are stitched
// onto the open record until a line yields an amount.

use crate::error::ExtractionError;
use crate::normalize::{parse_amount_token, parse_full_date, parse_leading_date, rightmost_amount, DateToken, ParsedAmount};
use crate::rules::RuleEngine;
use crate::transaction::{StatementPeriod, Transaction, TransactionType};
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{debug, warn};

// ============================================================================
// CORE TYPES
// ============================================================================

/// BankFormat - which fixed-format matcher to try before the generic one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankFormat {
    Chase,
    BankOfAmerica,
    IsoDated,
    Generic,
}

impl BankFormat {
    /// Human-readable name for display
    pub fn name(&self) -> &str {
        match self {
            BankFormat::Chase => "JPMorgan Chase",
            BankFormat::BankOfAmerica => "Bank of America",
            BankFormat::IsoDated => "ISO-dated export",
            BankFormat::Generic => "Generic",
        }
    }

    /// Short code for internal use
    pub fn code(&self) -> &str {
        match self {
            BankFormat::Chase => "chase",
            BankFormat::BankOfAmerica => "bofa",
            BankFormat::IsoDated => "iso",
            BankFormat::Generic => "generic",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_lowercase().as_str() {
            "chase" => Some(BankFormat::Chase),
            "bofa" | "bank_of_america" => Some(BankFormat::BankOfAmerica),
            "iso" => Some(BankFormat::IsoDated),
            "generic" => Some(BankFormat::Generic),
            _ => None,
        }
    }
}

/// One line recognized as the start of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct LineMatch {
    pub date: DateToken,
    pub description: String,

    /// None when the amount has not appeared yet (multi-line record)
    pub amount: Option<ParsedAmount>,
}

/// Extraction tuning knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Continuation lines an open record may collect before it is discarded
    pub max_continuation_lines: usize,

    /// Longest line the generic heuristic accepts as a transaction line
    pub max_line_length: usize,

    /// Warnings kept verbatim; the rest are only counted
    pub max_warnings: usize,

    /// Share of control characters above which input is rejected as non-text
    pub max_control_ratio: f64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfig {
            max_continuation_lines: 6,
            max_line_length: 200,
            max_warnings: 100,
            max_control_ratio: 0.10,
        }
    }
}

/// Caller hints; all optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionHints {
    pub format: Option<BankFormat>,
    pub statement_year: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningReason {
    NoPattern,
    OrphanAmount,
    DateWithoutYear,
    InvalidDate,
    ContinuationOverflow,
    InterruptedRecord,
    UnterminatedRecord,
}

/// A line (or record) that did not become a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseWarning {
    pub page: usize,
    pub line_number: usize,
    pub text: String,
    pub reason: WarningReason,
}

/// Per-line parse-quality tally
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseQuality {
    pub total_lines: usize,
    pub matched_lines: usize,
    pub unmatched_lines: usize,
    pub skipped_lines: usize,
    pub continuation_lines: usize,
    pub discarded_records: usize,
    pub warnings: Vec<ParseWarning>,
    pub warnings_dropped: usize,
}

impl ParseQuality {
    /// matched / (matched + unmatched); 0.0 when nothing looked like data
    pub fn match_ratio(&self) -> f64 {
        let considered = self.matched_lines + self.unmatched_lines;
        if considered == 0 {
            0.0
        } else {
            self.matched_lines as f64 / considered as f64
        }
    }

    fn warn(&mut self, limit: usize, warning: ParseWarning) {
        if self.warnings.len() < limit {
            self.warnings.push(warning);
        } else {
            self.warnings_dropped += 1;
        }
    }
}

/// Figures printed in the statement header/summary, if found
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementSummary {
    pub opening_balance: Option<f64>,
    pub closing_balance: Option<f64>,
    pub period: Option<StatementPeriod>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub format: BankFormat,
    pub transactions: Vec<Transaction>,
    pub quality: ParseQuality,
    pub summary: StatementSummary,
}

// ============================================================================
// LINE MATCHER STRATEGIES
// ============================================================================

/// LineMatcher - one way of recognizing a transaction line
///
/// Adding a bank = implementing this trait and placing it in the chain;
/// nothing else changes.
pub trait LineMatcher: Send + Sync {
    fn match_line(&self, line: &str) -> Option<LineMatch>;

    fn format(&self) -> BankFormat;
}

fn chase_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"^(?P<date>\d{2}/\d{2})\s+(?P<desc>.+?)\s+",
            r"(?P<amount>-?\$?\d{1,3}(?:,\d{3})*\.\d{2})",
            r"(?:\s+(?P<balance>-?\$?\d{1,3}(?:,\d{3})*\.\d{2}))?\s*$"
        ))
        .expect("chase regex")
    })
}

fn bofa_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<date>\d{2}/\d{2}/\d{2})\s+(?P<desc>.+?)\s+(?P<amount>-?\d{1,3}(?:,\d{3})*\.\d{2})\s*$")
            .expect("bofa regex")
    })
}

fn iso_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<date>\d{4}-\d{2}-\d{2})\s+(?P<desc>.+?)\s+(?P<amount>\S+)\s*$")
            .expect("iso line regex")
    })
}

fn fixed_format_match(re: &Regex, line: &str) -> Option<LineMatch> {
    let caps = re.captures(line.trim())?;
    let (date, _) = parse_leading_date(&caps["date"])?;
    let amount = parse_amount_token(&caps["amount"])?;
    Some(LineMatch {
        date,
        description: collapse_whitespace(&caps["desc"]),
        amount: Some(amount),
    })
}

/// Chase checking: `MM/DD  DESCRIPTION  AMOUNT  [BALANCE]`
pub struct ChaseMatcher;

impl LineMatcher for ChaseMatcher {
    fn match_line(&self, line: &str) -> Option<LineMatch> {
        fixed_format_match(chase_re(), line)
    }

    fn format(&self) -> BankFormat {
        BankFormat::Chase
    }
}

/// Bank of America: `MM/DD/YY  DESCRIPTION  -AMOUNT`
pub struct BankOfAmericaMatcher;

impl LineMatcher for BankOfAmericaMatcher {
    fn match_line(&self, line: &str) -> Option<LineMatch> {
        fixed_format_match(bofa_re(), line)
    }

    fn format(&self) -> BankFormat {
        BankFormat::BankOfAmerica
    }
}

/// Online-bank exports: `YYYY-MM-DD  DESCRIPTION  AMOUNT`
pub struct IsoDateMatcher;

impl LineMatcher for IsoDateMatcher {
    fn match_line(&self, line: &str) -> Option<LineMatch> {
        fixed_format_match(iso_line_re(), line)
    }

    fn format(&self) -> BankFormat {
        BankFormat::IsoDated
    }
}

/// Fallback: any supported leading date; the rightmost amount token wins.
///
/// A dated line with no amount still matches (amount = None) and opens a
/// multi-line record.
pub struct GenericMatcher {
    pub max_line_length: usize,
}

impl LineMatcher for GenericMatcher {
    fn match_line(&self, line: &str) -> Option<LineMatch> {
        if line.chars().count() > self.max_line_length {
            return None;
        }
        let (date, rest) = parse_leading_date(line)?;

        match rightmost_amount(rest) {
            Some((amount, description)) => Some(LineMatch {
                date,
                description: collapse_whitespace(description),
                amount: Some(amount),
            }),
            None => Some(LineMatch {
                date,
                description: collapse_whitespace(rest),
                amount: None,
            }),
        }
    }

    fn format(&self) -> BankFormat {
        BankFormat::Generic
    }
}

/// Build the matcher chain for a format (first match wins)
///
/// Generic statements try every fixed format before the heuristic.
pub fn matcher_chain(format: BankFormat, config: &ExtractorConfig) -> Vec<Box<dyn LineMatcher>> {
    let mut chain: Vec<Box<dyn LineMatcher>> = match format {
        BankFormat::Chase => vec![Box::new(ChaseMatcher)],
        BankFormat::BankOfAmerica => vec![Box::new(BankOfAmericaMatcher)],
        BankFormat::IsoDated => vec![Box::new(IsoDateMatcher)],
        BankFormat::Generic => vec![
            Box::new(BankOfAmericaMatcher),
            Box::new(IsoDateMatcher),
            Box::new(ChaseMatcher),
        ],
    };
    chain.push(Box::new(GenericMatcher {
        max_line_length: config.max_line_length,
    }));
    chain
}

/// Sniff the bank format from statement text
pub fn detect_format(pages: &[String]) -> BankFormat {
    let sample: String = pages.iter().take(2).map(|p| p.to_lowercase()).collect::<Vec<_>>().join("\n");

    if sample.contains("jpmorgan chase") || sample.contains("chase.com") {
        return BankFormat::Chase;
    }
    if sample.contains("bank of america") || sample.contains("bankofamerica.com") {
        return BankFormat::BankOfAmerica;
    }

    let iso_lines = pages
        .iter()
        .flat_map(|p| p.lines())
        .filter(|line| iso_line_re().is_match(line.trim()))
        .count();
    if iso_lines >= 3 {
        return BankFormat::IsoDated;
    }

    BankFormat::Generic
}

/// Split a whole document on form feeds into pages
pub fn split_pages(text: &str) -> Vec<String> {
    text.split('\u{000C}').map(|page| page.to_string()).collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// NOISE, SECTIONS AND SUMMARY LINES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Unknown,
    Deposits,
    Withdrawals,
    /// "Daily ending balance" tables: dated lines that are not transactions
    Balances,
}

const DEPOSIT_HEADERS: &[&str] = &[
    "deposits",
    "deposits and additions",
    "deposits and other credits",
    "deposits & other credits",
    "electronic deposits",
    "other credits",
    "credits",
    "additions",
];

const WITHDRAWAL_HEADERS: &[&str] = &[
    "withdrawals",
    "withdrawals and other debits",
    "withdrawals & other debits",
    "electronic withdrawals",
    "other withdrawals",
    "atm & debit card withdrawals",
    "atm and debit card withdrawals",
    "checks paid",
    "checks",
    "debits",
    "other debits",
    "fees",
    "service fees",
    "other subtractions",
    "subtractions",
    "card purchases",
];

const BALANCE_HEADERS: &[&str] = &["daily ending balance", "daily balance", "daily ledger balance"];

/// A header is the whole line: a known phrase, optionally followed by ":"
/// or "(continued)". "CHECKS UNLIMITED LLC" is a description, not a header.
fn section_header(line: &str) -> Option<Section> {
    let lower = line.trim().to_lowercase();
    let mut phrase = lower.trim_end_matches(':').trim_end();
    for suffix in ["(continued)", "- continued", "continued"] {
        if let Some(stripped) = phrase.strip_suffix(suffix) {
            phrase = stripped.trim_end();
            break;
        }
    }
    let phrase = phrase.trim_end_matches(':').trim_end();

    if BALANCE_HEADERS.contains(&phrase) {
        return Some(Section::Balances);
    }
    if DEPOSIT_HEADERS.contains(&phrase) {
        return Some(Section::Deposits);
    }
    if WITHDRAWAL_HEADERS.contains(&phrase) {
        return Some(Section::Withdrawals);
    }
    None
}

fn page_marker_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:^\s*page\s+\d{1,3}\s*$|\bpage\s+\d{1,3}\s*(?:of|/)\s*\d{1,3}\b|^\s*\d{1,3}\s*(?:/|of)\s*\d{1,3}\s*$)")
            .expect("page marker line regex")
    })
}

fn opening_balance_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:beginning|opening|starting|previous)\s+balance\b").expect("opening balance regex")
    })
}

fn closing_balance_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:ending|closing|new)\s+balance\b").expect("closing balance regex")
    })
}

fn total_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(?:sub)?total\b").expect("total regex"))
}

fn period_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let date = r"(?:\d{1,2}/\d{1,2}/\d{2,4}|\d{4}-\d{2}-\d{2}|[A-Za-z]{3,9}\.?\s+\d{1,2},?\s+\d{4})";
        Regex::new(&format!(
            r"(?i)(?P<a>{date})\s*(?:-|–|to|through|thru)\s*(?P<b>{date})"
        ))
        .expect("period regex")
    })
}

fn full_date_anywhere_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:\d{1,2}/\d{1,2}/\d{4}|\d{4}-\d{2}-\d{2}|(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2},\s+\d{4})\b")
            .expect("full date regex")
    })
}

fn is_column_header(lower: &str) -> bool {
    lower.contains("date")
        && (lower.contains("description") || lower.contains("amount"))
        && rightmost_amount(lower).is_none()
}

/// Statement period printed on its own line.
///
/// A dated line that merely mentions a range in its description
/// ("03/05 ADOBE 03/01/2024 - 03/31/2024 29.99") is a transaction; a line
/// that starts with a date only counts when the range is the whole line.
fn parse_period(line: &str) -> Option<StatementPeriod> {
    let line = line.trim();
    let caps = period_re().captures(line)?;
    let range = caps.get(0)?;
    if parse_leading_date(line).is_some() && (range.start() != 0 || range.end() != line.len()) {
        return None;
    }

    let start = parse_full_date(&caps["a"])?;
    let end = parse_full_date(&caps["b"])?;
    Some(StatementPeriod::new(start, end))
}

/// Pre-pass over the document for the printed summary figures
pub fn scan_summary(pages: &[String]) -> StatementSummary {
    let mut summary = StatementSummary::default();

    for line in pages.iter().flat_map(|p| p.lines()).map(str::trim) {
        if summary.period.is_none() {
            summary.period = parse_period(line);
        }
        if summary.opening_balance.is_none() && opening_balance_re().is_match(line) {
            summary.opening_balance = rightmost_amount(line).map(|(a, _)| signed_balance(a));
        }
        if summary.closing_balance.is_none() && closing_balance_re().is_match(line) {
            summary.closing_balance = rightmost_amount(line).map(|(a, _)| signed_balance(a));
        }
    }

    summary
}

fn signed_balance(amount: ParsedAmount) -> f64 {
    match amount.hint {
        Some(TransactionType::Debit) => -amount.magnitude,
        _ => amount.magnitude,
    }
}

/// Year for dates printed without one
fn infer_statement_year(pages: &[String], summary: &StatementSummary) -> Option<i32> {
    if let Some(period) = summary.period {
        return Some(period.start.year());
    }
    pages
        .iter()
        .flat_map(|p| p.lines())
        .find_map(|line| {
            full_date_anywhere_re()
                .find_iter(line)
                .find_map(|m| parse_full_date(m.as_str()))
        })
        .map(|date| date.year())
}

fn is_noise(line: &str) -> bool {
    let lower = line.to_lowercase();
    page_marker_line_re().is_match(line)
        || opening_balance_re().is_match(line)
        || closing_balance_re().is_match(line)
        || total_line_re().is_match(line)
        || parse_period(line).is_some()
        || is_column_header(&lower)
}

// ============================================================================
// YEAR RESOLUTION
// ============================================================================

struct YearResolver {
    base: Option<i32>,
    period: Option<StatementPeriod>,
    last: Option<NaiveDate>,
}

impl YearResolver {
    /// A printed period spanning New Year decides the year directly.
    fn from_period(&self, token: DateToken) -> Option<NaiveDate> {
        let period = self.period?;
        (period.start.year()..=period.end.year())
            .filter_map(|year| token.with_year(year))
            .find(|date| period.contains(*date))
    }

    fn resolve(&mut self, token: DateToken) -> Result<NaiveDate, WarningReason> {
        let date = match (token.year, self.from_period(token)) {
            (Some(_), _) => token.to_date().ok_or(WarningReason::InvalidDate)?,
            (None, Some(date)) => date,
            (None, None) => {
                let year = self
                    .last
                    .map(|d| d.year())
                    .or(self.base)
                    .ok_or(WarningReason::DateWithoutYear)?;
                let candidate = token.with_year(year).ok_or(WarningReason::InvalidDate)?;
                match self.last {
                    // December → January wrap
                    Some(last) if (last - candidate).num_days() > 180 => {
                        token.with_year(year + 1).ok_or(WarningReason::InvalidDate)?
                    }
                    _ => candidate,
                }
            }
        };
        self.last = Some(date);
        Ok(date)
    }
}

// ============================================================================
// EXTRACTOR
// ============================================================================

struct OpenRecord {
    date: NaiveDate,
    page: usize,
    line_number: usize,
    section: Section,
    parts: Vec<String>,
    raw: Vec<String>,
    continuation: usize,
}

pub struct TransactionExtractor {
    config: ExtractorConfig,
    rules: RuleEngine,
}

impl TransactionExtractor {
    pub fn new(config: ExtractorConfig, rules: RuleEngine) -> Self {
        TransactionExtractor { config, rules }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract transactions from per-page text.
    ///
    /// Only unreadable input is an error; every bad line is tallied instead.
    pub fn extract(&self, pages: &[String], hints: &ExtractionHints) -> Result<ExtractionResult, ExtractionError> {
        self.check_readable(pages)?;

        let format = hints.format.unwrap_or_else(|| detect_format(pages));
        let chain = matcher_chain(format, &self.config);
        let summary = scan_summary(pages);
        let mut years = YearResolver {
            base: hints.statement_year.or_else(|| infer_statement_year(pages, &summary)),
            period: summary.period,
            last: None,
        };

        let mut quality = ParseQuality::default();
        let mut transactions = Vec::new();
        let mut section = Section::Unknown;
        let mut open: Option<OpenRecord> = None;

        for (page_idx, page_text) in pages.iter().enumerate() {
            let page = page_idx + 1;

            for (line_idx, raw_line) in page_text.lines().enumerate() {
                let line = raw_line.trim();
                if line.is_empty() {
                    continue;
                }
                let line_number = line_idx + 1;
                quality.total_lines += 1;

                if is_noise(line) {
                    quality.skipped_lines += 1;
                    continue;
                }

                if let Some(next) = section_header(line) {
                    if let Some(record) = open.take() {
                        self.discard(record, WarningReason::InterruptedRecord, &mut quality);
                    }
                    section = next;
                    quality.skipped_lines += 1;
                    continue;
                }

                if section == Section::Balances && parse_leading_date(line).is_some() {
                    quality.skipped_lines += 1;
                    continue;
                }

                if let Some(found) = chain.iter().find_map(|m| m.match_line(line)) {
                    let date = match years.resolve(found.date) {
                        Ok(date) => date,
                        Err(reason) => {
                            quality.unmatched_lines += 1;
                            quality.warn(
                                self.config.max_warnings,
                                ParseWarning { page, line_number, text: line.to_string(), reason },
                            );
                            continue;
                        }
                    };

                    if let Some(record) = open.take() {
                        self.discard(record, WarningReason::InterruptedRecord, &mut quality);
                    }

                    match found.amount {
                        Some(amount) => {
                            quality.matched_lines += 1;
                            transactions.push(self.build(
                                date,
                                amount,
                                found.description,
                                page,
                                line.to_string(),
                                section,
                            ));
                        }
                        None => {
                            open = Some(OpenRecord {
                                date,
                                page,
                                line_number,
                                section,
                                parts: vec![found.description],
                                raw: vec![line.to_string()],
                                continuation: 0,
                            });
                        }
                    }
                    continue;
                }

                match open.take() {
                    Some(mut record) => match rightmost_amount(line) {
                        Some((amount, before)) => {
                            record.parts.push(before.to_string());
                            record.raw.push(line.to_string());
                            quality.matched_lines += record.raw.len();
                            quality.continuation_lines += record.raw.len() - 1;
                            let description = collapse_whitespace(&record.parts.join(" "));
                            transactions.push(self.build(
                                record.date,
                                amount,
                                description,
                                record.page,
                                record.raw.join("\n"),
                                record.section,
                            ));
                        }
                        None => {
                            record.parts.push(line.to_string());
                            record.raw.push(line.to_string());
                            record.continuation += 1;
                            if record.continuation > self.config.max_continuation_lines {
                                self.discard(record, WarningReason::ContinuationOverflow, &mut quality);
                            } else {
                                open = Some(record);
                            }
                        }
                    },
                    None => {
                        let reason = if rightmost_amount(line).is_some() {
                            WarningReason::OrphanAmount
                        } else {
                            WarningReason::NoPattern
                        };
                        quality.unmatched_lines += 1;
                        quality.warn(
                            self.config.max_warnings,
                            ParseWarning { page, line_number, text: line.to_string(), reason },
                        );
                    }
                }
            }
        }

        if let Some(record) = open.take() {
            self.discard(record, WarningReason::UnterminatedRecord, &mut quality);
        }

        // Stable: same-day records keep statement order
        transactions.sort_by_key(|tx| tx.date);

        debug!(
            format = format.code(),
            transactions = transactions.len(),
            matched = quality.matched_lines,
            unmatched = quality.unmatched_lines,
            "statement text extracted"
        );

        Ok(ExtractionResult {
            format,
            transactions,
            quality,
            summary,
        })
    }

    fn check_readable(&self, pages: &[String]) -> Result<(), ExtractionError> {
        let mut total = 0usize;
        let mut control = 0usize;
        for c in pages.iter().flat_map(|p| p.chars()) {
            if c.is_whitespace() {
                continue;
            }
            total += 1;
            if c.is_control() || c == '\u{FFFD}' {
                control += 1;
            }
        }

        if total == 0 {
            return Err(ExtractionError::EmptyInput);
        }
        let ratio = control as f64 / total as f64;
        if ratio > self.config.max_control_ratio {
            return Err(ExtractionError::NotText {
                control_ratio: ratio * 100.0,
            });
        }
        Ok(())
    }

    /// Section header beats a literal sign marker, which beats keyword rules.
    fn build(
        &self,
        date: NaiveDate,
        amount: ParsedAmount,
        description: String,
        page: usize,
        raw_line: String,
        section: Section,
    ) -> Transaction {
        let classification = self.rules.classify(&description);
        let transaction_type = match section {
            Section::Deposits => TransactionType::Credit,
            Section::Withdrawals => TransactionType::Debit,
            Section::Unknown | Section::Balances => amount
                .hint
                .or(classification.transaction_type)
                .unwrap_or(TransactionType::Debit),
        };

        let tx = Transaction::new(date, amount.magnitude, transaction_type, description, page, raw_line);
        match classification.category {
            Some(category) => tx.with_category(category),
            None => tx,
        }
    }

    fn discard(&self, record: OpenRecord, reason: WarningReason, quality: &mut ParseQuality) {
        warn!(
            page = record.page,
            line = record.line_number,
            lines = record.raw.len(),
            ?reason,
            "discarding unterminated transaction record"
        );
        quality.unmatched_lines += record.raw.len();
        quality.discarded_records += 1;
        quality.warn(
            self.config.max_warnings,
            ParseWarning {
                page: record.page,
                line_number: record.line_number,
                text: record.raw.join(" / "),
                reason,
            },
        );
    }
}

impl Default for TransactionExtractor {
    fn default() -> Self {
        TransactionExtractor::new(ExtractorConfig::default(), RuleEngine::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(text: &str) -> Vec<String> {
        split_pages(text)
    }

    fn extract(text: &str) -> ExtractionResult {
        TransactionExtractor::default()
            .extract(&pages(text), &ExtractionHints { format: None, statement_year: Some(2024) })
            .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_bank_format_codes() {
        assert_eq!(BankFormat::Chase.code(), "chase");
        assert_eq!(BankFormat::BankOfAmerica.name(), "Bank of America");
        assert_eq!(BankFormat::from_code("BOFA"), Some(BankFormat::BankOfAmerica));
        assert_eq!(BankFormat::from_code("wells"), None);
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(&pages("JPMorgan Chase Bank, N.A.\n")), BankFormat::Chase);
        assert_eq!(detect_format(&pages("Bank of America business advantage\n")), BankFormat::BankOfAmerica);
        assert_eq!(
            detect_format(&pages("2024-01-02 A 1.00\n2024-01-03 B 2.00\n2024-01-04 C 3.00\n")),
            BankFormat::IsoDated
        );
        assert_eq!(detect_format(&pages("Community Credit Union\n")), BankFormat::Generic);
    }

    #[test]
    fn test_chase_matcher_takes_amount_not_balance() {
        let m = ChaseMatcher.match_line("01/05  DEPOSIT ID 778  1,000.00  5,432.10").unwrap();
        assert_eq!(m.description, "DEPOSIT ID 778");
        assert_eq!(m.amount.unwrap().magnitude, 1000.0);
    }

    #[test]
    fn test_bofa_matcher_reads_minus_sign() {
        let m = BankOfAmericaMatcher.match_line("01/12/24 CHECKCARD 0111 OFFICE DEPOT -84.19").unwrap();
        assert_eq!(m.date.year, Some(2024));
        assert_eq!(m.amount.unwrap().hint, Some(TransactionType::Debit));
        assert!(BankOfAmericaMatcher.match_line("01/12 CHECKCARD -84.19").is_none());
    }

    #[test]
    fn test_generic_matcher_respects_line_bound() {
        let matcher = GenericMatcher { max_line_length: 40 };
        assert!(matcher.match_line("03/15 COFFEE 4.50").is_some());
        let long = format!("03/15 {} 4.50", "X".repeat(60));
        assert!(matcher.match_line(&long).is_none());
    }

    #[test]
    fn test_generic_matcher_dated_line_without_amount() {
        let m = GenericMatcher { max_line_length: 200 }.match_line("03/15 ACH CREDIT").unwrap();
        assert_eq!(m.amount, None);
        assert_eq!(m.description, "ACH CREDIT");
    }

    #[test]
    fn test_multiline_record_resolves_to_one_transaction() {
        let result = extract(
            "Deposits and Additions\n\
             03/15 ACH CREDIT\n\
             ACME CORP PAYROLL\n\
             PPD ID 12345\n\
             1,892.00\n",
        );

        assert_eq!(result.transactions.len(), 1);
        let tx = &result.transactions[0];
        assert_eq!(tx.amount, 1892.00);
        assert_eq!(tx.description, "ACH CREDIT ACME CORP PAYROLL PPD ID 12345");
        assert_eq!(tx.date, date(2024, 3, 15));
        assert_eq!(tx.transaction_type, TransactionType::Credit);
        assert_eq!(result.quality.matched_lines, 4);
        assert_eq!(result.quality.continuation_lines, 3);
        assert_eq!(result.quality.unmatched_lines, 0);
    }

    #[test]
    fn test_continuation_overflow_discards_record() {
        let mut text = String::from("03/15 WIRE IN\n");
        for i in 0..7 {
            text.push_str(&format!("DETAIL LINE {}\n", i));
        }
        text.push_str("250.00\n");

        let result = extract(&text);
        assert!(result.transactions.is_empty());
        assert_eq!(result.quality.discarded_records, 1);
        assert_eq!(result.quality.warnings[0].reason, WarningReason::ContinuationOverflow);
        // the trailing amount has nothing left to attach to
        assert_eq!(result.quality.warnings[1].reason, WarningReason::OrphanAmount);
    }

    #[test]
    fn test_six_continuation_lines_still_resolve() {
        let mut text = String::from("03/15 WIRE IN\n");
        for i in 0..6 {
            text.push_str(&format!("DETAIL LINE {}\n", i));
        }
        text.push_str("250.00\n");

        let result = extract(&text);
        assert_eq!(result.transactions.len(), 1);
        assert_eq!(result.quality.discarded_records, 0);
    }

    #[test]
    fn test_sign_comes_from_section() {
        let result = extract(
            "DEPOSITS AND ADDITIONS\n\
             03/01 Remote Online Deposit 500.00\n\
             ELECTRONIC WITHDRAWALS\n\
             03/02 Online Payment To Landlord 1,200.00\n",
        );

        assert_eq!(result.transactions.len(), 2);
        assert_eq!(result.transactions[0].amount, 500.0);
        assert_eq!(result.transactions[1].amount, -1200.0);
    }

    #[test]
    fn test_trailing_text_after_amount() {
        let result = extract("03/05 COFFEE SHOP 4.50 USD\n03/06 WIRE FEE 15.00 CR\n");

        assert_eq!(result.format, BankFormat::Generic);
        assert_eq!(result.transactions.len(), 2);
        assert_eq!(result.transactions[0].description, "COFFEE SHOP");
        assert_eq!(result.transactions[0].amount, -4.50);
        assert_eq!(result.transactions[1].amount, 15.00);
        assert_eq!(result.quality.unmatched_lines, 0);
        assert_eq!(result.quality.discarded_records, 0);
    }

    #[test]
    fn test_description_starting_with_header_word() {
        let result = extract(
            "DEPOSITS AND ADDITIONS\n\
             03/15 ACH CREDIT\n\
             CHECKS UNLIMITED LLC\n\
             1,892.00\n\
             03/20 REMOTE ONLINE DEPOSIT 200.00\n",
        );

        assert_eq!(result.transactions.len(), 2);
        assert_eq!(result.transactions[0].description, "ACH CREDIT CHECKS UNLIMITED LLC");
        assert_eq!(result.transactions[0].amount, 1892.00);
        // still inside the deposits section
        assert_eq!(result.transactions[1].amount, 200.00);
        assert_eq!(result.quality.discarded_records, 0);
    }

    #[test]
    fn test_section_header_phrases() {
        assert_eq!(section_header("DEPOSITS AND ADDITIONS"), Some(Section::Deposits));
        assert_eq!(section_header("Checks Paid (continued)"), Some(Section::Withdrawals));
        assert_eq!(section_header("ATM & DEBIT CARD WITHDRAWALS:"), Some(Section::Withdrawals));
        assert_eq!(section_header("FEES WAIVED THIS PERIOD"), None);
        assert_eq!(section_header("CHECKS UNLIMITED LLC"), None);
    }

    #[test]
    fn test_date_range_in_description_is_a_transaction() {
        let result = extract("03/05 ADOBE SUBSCRIPTION 03/01/2024 - 03/31/2024 29.99\n");

        assert_eq!(result.transactions.len(), 1);
        assert_eq!(result.transactions[0].amount, -29.99);
        assert_eq!(
            result.transactions[0].description,
            "ADOBE SUBSCRIPTION 03/01/2024 - 03/31/2024"
        );
        assert_eq!(result.quality.skipped_lines, 0);
        assert_eq!(result.summary.period, None);

        // a bare range line is still the statement period
        let result = extract("03/01/2024 - 03/31/2024\n03/05 COFFEE SHOP 4.50\n");
        assert_eq!(result.transactions.len(), 1);
        assert_eq!(
            result.summary.period,
            Some(StatementPeriod::new(date(2024, 3, 1), date(2024, 3, 31)))
        );
    }

    #[test]
    fn test_sign_falls_back_to_rules_then_debit() {
        let result = extract(
            "03/01 MOBILE DEPOSIT 500.00\n\
             03/02 OFFICE SUPPLIES 20.00\n\
             03/03 REVERSAL (15.00)\n",
        );

        assert_eq!(result.transactions[0].amount, 500.0);
        assert_eq!(result.transactions[0].category.as_deref(), Some("Deposits"));
        assert_eq!(result.transactions[1].amount, -20.0);
        assert_eq!(result.transactions[2].amount, -15.0);
    }

    #[test]
    fn test_noise_and_summary_lines_are_skipped() {
        let result = extract(
            "Statement Period: 03/01/2024 - 03/31/2024\n\
             Beginning Balance $1,000.00\n\
             Date Description Amount\n\
             03/05 COFFEE SHOP 4.50\n\
             Page 1 of 2\n\
             Total Withdrawals 4.50\n\
             Ending Balance $995.50\n",
        );

        assert_eq!(result.transactions.len(), 1);
        assert_eq!(result.quality.skipped_lines, 6);
        assert_eq!(result.quality.unmatched_lines, 0);
        assert_eq!(result.summary.opening_balance, Some(1000.0));
        assert_eq!(result.summary.closing_balance, Some(995.5));
        assert_eq!(
            result.summary.period,
            Some(StatementPeriod::new(date(2024, 3, 1), date(2024, 3, 31)))
        );
    }

    #[test]
    fn test_daily_balance_table_is_not_transactions() {
        let result = extract(
            "03/05 COFFEE SHOP 4.50\n\
             Daily Ending Balance\n\
             03/05 995.50\n\
             03/06 995.50\n",
        );
        assert_eq!(result.transactions.len(), 1);
    }

    #[test]
    fn test_unmatched_lines_are_tallied_not_raised() {
        let result = extract("03/05 COFFEE SHOP 4.50\nrandom footer text\n$12.00\n");
        assert_eq!(result.transactions.len(), 1);
        assert_eq!(result.quality.unmatched_lines, 2);
        assert_eq!(result.quality.warnings[0].reason, WarningReason::NoPattern);
        assert_eq!(result.quality.warnings[1].reason, WarningReason::OrphanAmount);
        assert!((result.quality.match_ratio() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_year_inferred_from_text_and_rollover() {
        let extractor = TransactionExtractor::default();
        let text = "Statement Period December 15, 2023 through January 14, 2024\n\
                    12/20 CARD PURCHASE 10.00\n\
                    01/03 CARD PURCHASE 20.00\n";
        let result = extractor.extract(&pages(text), &ExtractionHints::default()).unwrap();

        assert_eq!(result.transactions[0].date, date(2023, 12, 20));
        assert_eq!(result.transactions[1].date, date(2024, 1, 3));
    }

    #[test]
    fn test_date_without_year_and_no_context() {
        let extractor = TransactionExtractor::default();
        let result = extractor
            .extract(&pages("03/05 COFFEE SHOP 4.50\n"), &ExtractionHints::default())
            .unwrap();
        assert!(result.transactions.is_empty());
        assert_eq!(result.quality.warnings[0].reason, WarningReason::DateWithoutYear);
    }

    #[test]
    fn test_transactions_sorted_by_date_and_page_tracked() {
        let result = extract("03/09 B 2.00\n\u{000C}03/02 A 1.00\n");
        assert_eq!(result.transactions[0].description, "A");
        assert_eq!(result.transactions[0].page, 2);
        assert_eq!(result.transactions[1].page, 1);
    }

    #[test]
    fn test_unreadable_input_is_an_error() {
        let extractor = TransactionExtractor::default();
        assert_eq!(
            extractor.extract(&pages("   \n\n"), &ExtractionHints::default()),
            Err(ExtractionError::EmptyInput)
        );
        let binary = "\u{0001}\u{0002}\u{0003}\u{0004}abc".to_string();
        assert!(matches!(
            extractor.extract(&[binary], &ExtractionHints::default()),
            Err(ExtractionError::NotText { .. })
        ));
    }
}
