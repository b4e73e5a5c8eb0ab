// 🔢 Amount and date normalization
// Statement text mixes "$1,892.00", "(14.05)", "03/15", "Mar 15, 2024" and
// "2024-03-15". Everything funnels through these two grammars.

use crate::transaction::TransactionType;
use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

// ============================================================================
// AMOUNTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedAmount {
    /// Always non-negative, rounded to cents
    pub magnitude: f64,

    /// Literal sign marker found on the token (minus, parentheses, CR/DR)
    pub hint: Option<TransactionType>,
}

fn amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"^(?P<open>\()?(?P<lead>[-+])?(?P<dollar>\$)?",
            r"(?P<body>\d{1,3}(?:,\d{3})+|\d+)",
            r"(?P<frac>\.\d{0,2})?",
            r"(?P<close>\))?(?P<trail>-|CR|DR)?$"
        ))
        .expect("amount regex")
    })
}

/// Parse one whitespace-free token as a currency amount.
///
/// Accepted: optional sign or parentheses, optional `$`, digits with optional
/// `,` thousands groups, optional `.` with 0-2 decimals. A bare integer with
/// no `$`, grouping or decimal point is rejected: on statements those are
/// check numbers, reference ids and years.
pub fn parse_amount_token(token: &str) -> Option<ParsedAmount> {
    let caps = amount_re().captures(token.trim())?;

    if caps.name("open").is_some() != caps.name("close").is_some() {
        return None;
    }

    let has_dollar = caps.name("dollar").is_some();
    let body = caps.name("body")?.as_str();
    let frac = caps.name("frac").map(|m| m.as_str()).unwrap_or("");
    if !has_dollar && !body.contains(',') && frac.is_empty() {
        return None;
    }

    let digits = format!("{}{}", body.replace(',', ""), frac.trim_end_matches('.'));
    let value: f64 = digits.parse().ok()?;
    if !value.is_finite() {
        return None;
    }

    let negative = caps.name("open").is_some()
        || caps.name("lead").map(|m| m.as_str() == "-").unwrap_or(false)
        || matches!(caps.name("trail").map(|m| m.as_str()), Some("-") | Some("DR"));
    let hint = if negative {
        Some(TransactionType::Debit)
    } else if caps.name("trail").map(|m| m.as_str()) == Some("CR") {
        Some(TransactionType::Credit)
    } else {
        None
    };

    Some(ParsedAmount {
        magnitude: round_cents(value),
        hint,
    })
}

/// Whitespace-separated tokens with their byte offsets
fn token_spans(line: &str) -> Vec<(usize, &str)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (idx, c) in line.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, &line[s..idx]));
                start = None;
            }
            (false, None) => start = Some(idx),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, &line[s..]));
    }
    spans
}

/// Find the rightmost amount token on a line.
///
/// Tokens are tried right to left, so trailing text such as "USD" or "*POS"
/// does not hide the amount. A standalone `CR`/`DR` right after the amount
/// is its sign marker. Returns the amount and the text before it.
pub fn rightmost_amount(line: &str) -> Option<(ParsedAmount, &str)> {
    let tokens = token_spans(line);

    for (idx, &(start, token)) in tokens.iter().enumerate().rev() {
        let Some(mut amount) = parse_amount_token(token) else {
            continue;
        };
        if amount.hint.is_none() {
            amount.hint = match tokens.get(idx + 1).map(|(_, next)| next.to_ascii_uppercase()) {
                Some(marker) if marker == "CR" => Some(TransactionType::Credit),
                Some(marker) if marker == "DR" => Some(TransactionType::Debit),
                _ => None,
            };
        }
        return Some((amount, line[..start].trim_end()));
    }

    None
}

/// Round half away from zero to two decimals.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// DATES
// ============================================================================

/// A date as printed; the year may be missing ("03/15", "Mar 15").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateToken {
    pub month: u32,
    pub day: u32,
    pub year: Option<i32>,
}

impl DateToken {
    pub fn with_year(&self, year: i32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.month, self.day)
    }

    pub fn to_date(&self) -> Option<NaiveDate> {
        self.with_year(self.year?)
    }
}

fn iso_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<y>\d{4})-(?P<m>\d{1,2})-(?P<d>\d{1,2})(?:\s+|$)").expect("iso date regex")
    })
}

fn numeric_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<m>\d{1,2})(?P<sep>[/-])(?P<d>\d{1,2})(?:[/-](?P<y>\d{4}|\d{2}))?(?:\s+|$)")
            .expect("numeric date regex")
    })
}

fn month_name_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)^(?P<mon>jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?",
            r"|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\b\.?",
            r"\s+(?P<d>\d{1,2})(?:,?\s+(?P<y>\d{4}))?,?(?:\s+|$)"
        ))
        .expect("month name date regex")
    })
}

fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    let month = match lower.get(..3)? {
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

fn expand_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.parse().ok()?;
    if raw.len() == 2 {
        Some(if year < 70 { 2000 + year } else { 1900 + year })
    } else {
        Some(year)
    }
}

fn plausible(month: u32, day: u32) -> bool {
    (1..=12).contains(&month) && (1..=31).contains(&day)
}

/// Parse a date token at the very start of `line`.
///
/// Returns the token and the remainder of the line after it.
pub fn parse_leading_date(line: &str) -> Option<(DateToken, &str)> {
    let text = line.trim_start();

    if let Some(caps) = iso_date_re().captures(text) {
        let token = DateToken {
            year: caps["y"].parse().ok(),
            month: caps["m"].parse().ok()?,
            day: caps["d"].parse().ok()?,
        };
        if plausible(token.month, token.day) {
            let rest = &text[caps.get(0)?.end()..];
            return Some((token, rest));
        }
        return None;
    }

    if let Some(caps) = numeric_date_re().captures(text) {
        // "03-15" without a year reads like a range or an id; only slashes may omit it
        if &caps["sep"] == "-" && caps.name("y").is_none() {
            return None;
        }
        let token = DateToken {
            month: caps["m"].parse().ok()?,
            day: caps["d"].parse().ok()?,
            year: match caps.name("y") {
                Some(y) => Some(expand_year(y.as_str())?),
                None => None,
            },
        };
        if plausible(token.month, token.day) {
            let rest = &text[caps.get(0)?.end()..];
            return Some((token, rest));
        }
        return None;
    }

    if let Some(caps) = month_name_date_re().captures(text) {
        let token = DateToken {
            month: month_from_name(&caps["mon"])?,
            day: caps["d"].parse().ok()?,
            year: match caps.name("y") {
                Some(y) => Some(y.as_str().parse().ok()?),
                None => None,
            },
        };
        if plausible(token.month, token.day) {
            let rest = &text[caps.get(0)?.end()..];
            return Some((token, rest));
        }
    }

    None
}

/// Parse a complete date string that carries its own year.
pub fn parse_full_date(text: &str) -> Option<NaiveDate> {
    let (token, rest) = parse_leading_date(text.trim())?;
    if !rest.trim().is_empty() {
        return None;
    }
    token.to_date()
}
