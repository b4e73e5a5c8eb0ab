// 💵 Transaction model
// Output of the extractor; immutable once built except for category enrichment.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Credit,
    Debit,
}

impl TransactionType {
    /// Apply this type's sign to an unsigned magnitude.
    pub fn signed(&self, magnitude: f64) -> f64 {
        match self {
            TransactionType::Credit => magnitude.abs(),
            TransactionType::Debit => -magnitude.abs(),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            TransactionType::Credit => "credit",
            TransactionType::Debit => "debit",
        }
    }
}

/// One extracted statement line (or stitched group of lines).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDate,

    /// Signed: deposits positive, withdrawals negative
    pub amount: f64,

    pub transaction_type: TransactionType,

    #[serde(default)]
    pub description: String,

    /// 1-based page the record started on
    pub page: usize,

    /// Original text, continuation lines joined with '\n'
    pub raw_line: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Transaction {
    pub fn new(
        date: NaiveDate,
        magnitude: f64,
        transaction_type: TransactionType,
        description: String,
        page: usize,
        raw_line: String,
    ) -> Self {
        Transaction {
            date,
            amount: transaction_type.signed(magnitude),
            transaction_type,
            description,
            page,
            raw_line,
            category: None,
        }
    }

    /// Builder pattern: attach a category (local rules or external enrichment)
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn is_credit(&self) -> bool {
        self.transaction_type == TransactionType::Credit
    }

    pub fn is_debit(&self) -> bool {
        self.transaction_type == TransactionType::Debit
    }

    /// Amount in integer cents, used as a grouping key.
    pub fn amount_cents(&self) -> i64 {
        (self.amount * 100.0).round() as i64
    }

    /// Hash of the normalized description (case, digits and spacing removed),
    /// so "PAYROLL ACME 0113" and "Payroll Acme 0127" collide.
    pub fn description_hash(&self) -> String {
        description_hash(&self.description)
    }
}

/// Inclusive date range a statement covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl StatementPeriod {
    /// Orders the endpoints so `start <= end`.
    pub fn new(a: NaiveDate, b: NaiveDate) -> Self {
        StatementPeriod {
            start: a.min(b),
            end: a.max(b),
        }
    }

    /// Number of calendar days, both endpoints included.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

pub fn normalize_description(description: &str) -> String {
    description
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_ascii_digit())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn description_hash(description: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_description(description));
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}
