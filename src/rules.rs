// 🏷️ Category Rules - Rules as Data
// Local, deterministic tagging of descriptions with a category and a
// credit/debit hint. External categorization services override the category
// later through Transaction::with_category.

use crate::transaction::TransactionType;
use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Rule ID for tracking
    pub id: String,

    /// Pattern to match (supports wildcards with *)
    pub pattern: String,

    /// Category to assign
    #[serde(default)]
    pub category: Option<String>,

    /// Direction the description implies, used when no section header did
    #[serde(default)]
    pub transaction_type: Option<TransactionType>,

    /// Confidence score (0.0 - 1.0)
    #[serde(default = "default_confidence")]
    pub confidence: f64,

    /// Priority (higher = applied first)
    #[serde(default)]
    pub priority: i32,
}

fn default_confidence() -> f64 {
    0.8
}

impl CategoryRule {
    pub fn new(id: &str, pattern: &str, category: &str, transaction_type: TransactionType, priority: i32) -> Self {
        CategoryRule {
            id: id.to_string(),
            pattern: pattern.to_string(),
            category: Some(category.to_string()),
            transaction_type: Some(transaction_type),
            confidence: default_confidence(),
            priority,
        }
    }

    /// Case-insensitive match. Without `*` the pattern may appear anywhere;
    /// with `*` the pieces must appear in order, anchored at the ends the
    /// pattern does not start/end with a wildcard.
    pub fn matches(&self, text: &str) -> bool {
        let pattern = self.pattern.to_lowercase();
        let text = text.to_lowercase();

        if !pattern.contains('*') {
            return !pattern.is_empty() && text.contains(&pattern);
        }

        let pieces: Vec<&str> = pattern.split('*').collect();
        let first = pieces[0];
        let last = pieces[pieces.len() - 1];

        if !text.starts_with(first) {
            return false;
        }
        let mut cursor = first.len();

        for piece in &pieces[1..pieces.len() - 1] {
            if piece.is_empty() {
                continue;
            }
            match text[cursor..].find(piece) {
                Some(pos) => cursor += pos + piece.len(),
                None => return false,
            }
        }

        text.len() >= cursor + last.len() && text[cursor..].ends_with(last)
    }
}

// ============================================================================
// CLASSIFICATION RESULT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationResult {
    pub category: Option<String>,
    pub transaction_type: Option<TransactionType>,
    pub confidence: f64,
    pub rule_id: Option<String>,
}

// ============================================================================
// RULE ENGINE
// ============================================================================

#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: Vec<CategoryRule>,
}

impl RuleEngine {
    /// Create a new empty rule engine
    pub fn new() -> Self {
        RuleEngine { rules: Vec::new() }
    }

    /// Load rules from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read rules file: {:?}", path.as_ref()))?;

        let rules: Vec<CategoryRule> =
            serde_json::from_str(&content).context("Failed to parse rules JSON")?;

        Ok(RuleEngine::from_rules(rules))
    }

    /// Create engine from a list of rules; stable sort keeps file order on ties
    pub fn from_rules(mut rules: Vec<CategoryRule>) -> Self {
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        RuleEngine { rules }
    }

    /// Rules in priority order
    pub fn into_rules(self) -> Vec<CategoryRule> {
        self.rules
    }

    /// First matching rule wins (rules are kept sorted by priority)
    pub fn classify(&self, text: &str) -> ClassificationResult {
        self.rules
            .iter()
            .find(|rule| rule.matches(text))
            .map(|rule| ClassificationResult {
                category: rule.category.clone(),
                transaction_type: rule.transaction_type,
                confidence: rule.confidence,
                rule_id: Some(rule.id.clone()),
            })
            .unwrap_or_default()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        RuleEngine::from_rules(default_rules())
    }
}

/// Built-in vocabulary for US business checking statements.
pub fn default_rules() -> Vec<CategoryRule> {
    use TransactionType::{Credit, Debit};

    vec![
        // "nsf" alone would also hit "traNSFer"
        CategoryRule::new("nsf-fee", "nsf fee", "Bank Fees", Debit, 100),
        CategoryRule::new("nsf-item", "nsf item", "Bank Fees", Debit, 100),
        CategoryRule::new("insufficient", "insufficient funds", "Bank Fees", Debit, 100),
        CategoryRule::new("overdraft", "overdraft", "Bank Fees", Debit, 100),
        CategoryRule::new("returned-item", "returned item", "Bank Fees", Debit, 100),
        CategoryRule::new("service-charge", "service charge", "Bank Fees", Debit, 90),
        CategoryRule::new("monthly-fee", "monthly fee", "Bank Fees", Debit, 90),
        CategoryRule::new("payroll-in", "payroll*dep", "Payroll Income", Credit, 85),
        CategoryRule::new("direct-deposit", "direct dep", "Payroll Income", Credit, 80),
        CategoryRule::new("loan-payment", "loan pmt", "Loan Payments", Debit, 75),
        CategoryRule::new("loan-payment-long", "loan payment", "Loan Payments", Debit, 75),
        CategoryRule::new("card-settlement", "merchant*deposit", "Card Settlements", Credit, 70),
        CategoryRule::new("ach-credit", "ach credit", "Transfers In", Credit, 60),
        CategoryRule::new("ach-debit", "ach debit", "Transfers Out", Debit, 60),
        CategoryRule::new("transfer-from", "transfer from", "Transfers In", Credit, 60),
        CategoryRule::new("transfer-to", "transfer to", "Transfers Out", Debit, 60),
        CategoryRule::new("wire-in", "incoming wire", "Transfers In", Credit, 60),
        CategoryRule::new("wire-out", "outgoing wire", "Transfers Out", Debit, 60),
        CategoryRule::new("refund", "refund", "Refunds", Credit, 55),
        CategoryRule::new("interest", "interest paid", "Interest", Credit, 55),
        CategoryRule::new("deposit", "deposit", "Deposits", Credit, 50),
        CategoryRule::new("atm", "atm withdrawal", "Cash Withdrawals", Debit, 45),
        CategoryRule::new("withdrawal", "withdrawal", "Cash Withdrawals", Debit, 45),
        CategoryRule::new("payment-to", "payment to", "Payments", Debit, 45),
        CategoryRule::new("card-purchase", "purchase", "Card Purchases", Debit, 40),
        CategoryRule::new("check", "check #", "Checks", Debit, 40),
    ]
}

// ============================================================================
// TESTS
// ============================================================================
