// ⚖️ Reconciliation Engine - Validate balances match
// Printed opening balance + extracted credits - extracted debits should land
// on the printed closing balance. A miss means lines were lost or misread.

use crate::parser::StatementSummary;
use crate::transaction::{StatementPeriod, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// RECONCILIATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconciliationResult {
    /// All balances match perfectly
    Balanced {
        opening_balance: f64,
        total_credits: f64,
        total_debits: f64,
        closing_balance: f64,
    },

    /// Off by less than the major threshold
    MinorDiscrepancy {
        expected_balance: f64,
        actual_balance: f64,
        difference: f64,
        tolerance: f64,
    },

    /// Off by the major threshold or more
    MajorDiscrepancy {
        expected_balance: f64,
        actual_balance: f64,
        difference: f64,
    },

    /// Statement did not print both balances
    Unavailable,
}

impl ReconciliationResult {
    pub fn is_balanced(&self) -> bool {
        matches!(self, ReconciliationResult::Balanced { .. })
    }

    pub fn has_discrepancy(&self) -> bool {
        matches!(
            self,
            ReconciliationResult::MinorDiscrepancy { .. } | ReconciliationResult::MajorDiscrepancy { .. }
        )
    }

    pub fn difference(&self) -> f64 {
        match self {
            ReconciliationResult::Balanced { .. } | ReconciliationResult::Unavailable => 0.0,
            ReconciliationResult::MinorDiscrepancy { difference, .. } => *difference,
            ReconciliationResult::MajorDiscrepancy { difference, .. } => *difference,
        }
    }
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub result: ReconciliationResult,
    pub transaction_count: usize,
    pub total_credits: f64,
    pub total_debits: f64,
    pub calculated_balance: Option<f64>,
    pub discrepancies: Vec<Discrepancy>,
}

impl ReconciliationReport {
    pub fn is_balanced(&self) -> bool {
        self.result.is_balanced()
    }

    pub fn summary(&self) -> String {
        match self.calculated_balance {
            Some(calculated) => format!(
                "{} transactions, calculated ${:.2}, difference ${:.2}",
                self.transaction_count,
                calculated,
                self.result.difference()
            ),
            None => format!("{} transactions, no printed balances to reconcile", self.transaction_count),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub description: String,
    pub amount: f64,
    pub category: DiscrepancyCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyCategory {
    PossibleDuplicate,
    AmountMismatch,
    DateOutsidePeriod,
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationEngine {
    /// Tolerance for floating-point comparisons (default: $0.01)
    pub tolerance: f64,

    /// Threshold for minor vs major discrepancy (default: $10.00)
    pub major_discrepancy_threshold: f64,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine {
            tolerance: 0.01,
            major_discrepancy_threshold: 10.0,
        }
    }

    /// Reconcile extracted transactions against the printed summary
    ///
    /// Formula: opening_balance + credits - debits = closing_balance
    pub fn reconcile(&self, transactions: &[Transaction], summary: &StatementSummary) -> ReconciliationReport {
        let total_credits = calculate_credits(transactions);
        let total_debits = calculate_debits(transactions);

        let mut discrepancies = Vec::new();
        let (result, calculated_balance) = match (summary.opening_balance, summary.closing_balance) {
            (Some(opening), Some(closing)) => {
                let calculated = opening + total_credits - total_debits;
                let difference = (calculated - closing).abs();

                let result = if difference < self.tolerance {
                    ReconciliationResult::Balanced {
                        opening_balance: opening,
                        total_credits,
                        total_debits,
                        closing_balance: closing,
                    }
                } else if difference < self.major_discrepancy_threshold {
                    ReconciliationResult::MinorDiscrepancy {
                        expected_balance: closing,
                        actual_balance: calculated,
                        difference,
                        tolerance: self.tolerance,
                    }
                } else {
                    ReconciliationResult::MajorDiscrepancy {
                        expected_balance: closing,
                        actual_balance: calculated,
                        difference,
                    }
                };

                if difference >= self.tolerance {
                    discrepancies.push(Discrepancy {
                        description: format!("Balance mismatch: ${:.2} difference", difference),
                        amount: difference,
                        category: DiscrepancyCategory::AmountMismatch,
                    });
                }
                (result, Some(calculated))
            }
            _ => (ReconciliationResult::Unavailable, None),
        };

        discrepancies.extend(detect_duplicates(transactions));
        if let Some(period) = summary.period {
            discrepancies.extend(detect_out_of_period(transactions, period));
        }

        ReconciliationReport {
            result,
            transaction_count: transactions.len(),
            total_credits,
            total_debits,
            calculated_balance,
            discrepancies,
        }
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn calculate_credits(transactions: &[Transaction]) -> f64 {
    transactions
        .iter()
        .filter(|tx| tx.is_credit())
        .map(|tx| tx.amount.abs())
        .sum()
}

fn calculate_debits(transactions: &[Transaction]) -> f64 {
    transactions
        .iter()
        .filter(|tx| tx.is_debit())
        .map(|tx| tx.amount.abs())
        .sum()
}

/// Same day + same cents + same normalized description, seen more than once.
/// Flagged only; genuine repeats (two identical coffees) do happen.
fn detect_duplicates(transactions: &[Transaction]) -> Vec<Discrepancy> {
    let mut seen: HashMap<(chrono::NaiveDate, i64, String), usize> = HashMap::new();
    let mut found = Vec::new();

    for tx in transactions {
        let key = (tx.date, tx.amount_cents(), tx.description_hash());
        let count = seen.entry(key).or_insert(0);
        *count += 1;
        if *count == 2 {
            found.push(Discrepancy {
                description: format!("Repeated line on {}: {}", tx.date, tx.description),
                amount: tx.amount,
                category: DiscrepancyCategory::PossibleDuplicate,
            });
        }
    }

    found
}

fn detect_out_of_period(transactions: &[Transaction], period: StatementPeriod) -> Vec<Discrepancy> {
    transactions
        .iter()
        .filter(|tx| !period.contains(tx.date))
        .map(|tx| Discrepancy {
            description: format!("{} is outside {} - {}", tx.date, period.start, period.end),
            amount: tx.amount,
            category: DiscrepancyCategory::DateOutsidePeriod,
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
