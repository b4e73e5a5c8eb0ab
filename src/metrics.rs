// 📊 Financial Metrics Engine
// Ordered transactions (+ opening balance) → balance curve, NSF count,
// deposit patterns and velocity. Pure: same input, same metrics.

use crate::error::ValidationError;
use crate::normalize::round_cents;
use crate::transaction::{StatementPeriod, Transaction};
use chrono::{Duration, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// End-of-day balances strictly below this count as low-balance days
    pub low_balance_threshold: f64,

    /// Whole-word, case-insensitive NSF/overdraft markers
    pub nsf_keywords: Vec<String>,

    /// Same amount + description seen this many times = recurring deposit
    pub recurring_min_occurrences: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            low_balance_threshold: 500.0,
            nsf_keywords: vec![
                "nsf".to_string(),
                "non-sufficient".to_string(),
                "insufficient".to_string(),
                "overdraft".to_string(),
                "od fee".to_string(),
                "returned item".to_string(),
            ],
            recurring_min_occurrences: 2,
        }
    }
}

// ============================================================================
// OUTPUT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyBalance {
    pub date: NaiveDate,
    /// End-of-day balance
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringDeposit {
    pub amount: f64,
    pub description: String,
    pub description_hash: String,
    pub occurrences: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialMetrics {
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub period_days: i64,

    pub opening_balance: f64,
    pub closing_balance: f64,
    pub daily_balances: Vec<DailyBalance>,

    /// Time-weighted: each balance counts for the days it was held
    pub average_daily_balance: f64,
    pub min_balance: f64,
    pub max_balance: f64,
    pub balance_std_dev: f64,
    pub low_balance_threshold: f64,
    pub days_below_threshold: usize,
    pub negative_balance_days: usize,
    pub first_negative_date: Option<NaiveDate>,

    pub nsf_count: usize,

    pub transaction_count: usize,
    pub deposit_count: usize,
    pub withdrawal_count: usize,
    pub total_deposits: f64,
    pub total_withdrawals: f64,
    pub largest_deposit: f64,
    pub largest_withdrawal: f64,
    pub net_cash_flow: f64,

    /// withdrawals / deposits; None without deposits
    pub expense_ratio: Option<f64>,

    /// Days between consecutive deposit days
    pub deposit_interval_count: usize,
    pub deposit_interval_mean: f64,
    pub deposit_interval_variance: f64,
    pub recurring_deposits: Vec<RecurringDeposit>,
    pub recurring_deposit_total: f64,

    /// Transactions per day over the period
    pub velocity_ratio: f64,
    /// (deposits + withdrawals) per day over the period
    pub volume_per_day: f64,

    /// Net flow per 7-day bucket from period start
    pub weekly_net_flows: Vec<f64>,
}

impl FinancialMetrics {
    /// Share of deposit volume that recurs
    pub fn recurring_share(&self) -> f64 {
        if self.total_deposits > 0.0 {
            (self.recurring_deposit_total / self.total_deposits).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn has_negative_balance(&self) -> bool {
        self.negative_balance_days > 0
    }
}

// ============================================================================
// OPENING BALANCE BOUNDARY
// ============================================================================

/// Read a caller-supplied opening balance from untrusted JSON.
///
/// Absent → Ok(None). `null`, non-finite or non-numeric → error.
/// Numeric strings ("1500.25") are accepted.
pub fn parse_opening_balance(value: Option<&serde_json::Value>) -> Result<Option<f64>, ValidationError> {
    let Some(value) = value else {
        return Ok(None);
    };

    let parsed = match value {
        serde_json::Value::Null => return Err(ValidationError::NullOpeningBalance),
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ValidationError::NonNumericOpeningBalance(n.to_string()))?,
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ValidationError::NonNumericOpeningBalance(s.clone()))?,
        other => return Err(ValidationError::NonNumericOpeningBalance(other.to_string())),
    };

    if !parsed.is_finite() {
        return Err(ValidationError::NonFiniteOpeningBalance(parsed));
    }
    Ok(Some(parsed))
}

// ============================================================================
// ENGINE
// ============================================================================

#[derive(Debug, Clone)]
pub struct MetricsEngine {
    config: MetricsConfig,
    nsf_pattern: Option<Regex>,
}

impl MetricsEngine {
    pub fn new(config: MetricsConfig) -> Result<Self, ValidationError> {
        let nsf_pattern = build_keyword_pattern(&config.nsf_keywords)?;
        Ok(MetricsEngine { config, nsf_pattern })
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// NSF/overdraft marker as a whole word; empty descriptions never match
    pub fn is_nsf(&self, description: &str) -> bool {
        if description.trim().is_empty() {
            return false;
        }
        self.nsf_pattern
            .as_ref()
            .map(|re| re.is_match(description))
            .unwrap_or(false)
    }

    pub fn compute(&self, transactions: &[Transaction], opening_balance: Option<f64>) -> Result<FinancialMetrics, ValidationError> {
        self.compute_for_period(transactions, opening_balance, None)
    }

    /// Same as `compute`, with the balance curve widened to a printed period.
    pub fn compute_for_period(
        &self,
        transactions: &[Transaction],
        opening_balance: Option<f64>,
        period: Option<StatementPeriod>,
    ) -> Result<FinancialMetrics, ValidationError> {
        let opening = match opening_balance {
            Some(value) if !value.is_finite() => return Err(ValidationError::NonFiniteOpeningBalance(value)),
            Some(value) => value,
            None => 0.0,
        };

        let mut ordered: Vec<&Transaction> = transactions.iter().collect();
        ordered.sort_by_key(|tx| tx.date);

        let window = balance_window(&ordered, period);
        let daily_balances = match window {
            Some(window) => daily_curve(&ordered, opening, window),
            None => Vec::new(),
        };

        let threshold = self.config.low_balance_threshold;
        let balances: Vec<f64> = daily_balances.iter().map(|d| d.balance).collect();
        let (average, variance) = mean_and_variance(&balances).unwrap_or((opening, 0.0));
        let min_balance = balances.iter().copied().fold(f64::INFINITY, f64::min);
        let max_balance = balances.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let deposits: Vec<&Transaction> = ordered.iter().copied().filter(|tx| tx.is_credit()).collect();
        let withdrawals: Vec<&Transaction> = ordered.iter().copied().filter(|tx| tx.is_debit()).collect();
        let total_deposits = round_cents(deposits.iter().map(|tx| tx.amount.abs()).sum());
        let total_withdrawals = round_cents(withdrawals.iter().map(|tx| tx.amount.abs()).sum());

        let (interval_count, interval_mean, interval_variance) = deposit_intervals(&deposits);
        let recurring_deposits = self.recurring_deposits(&deposits);
        let recurring_deposit_total = round_cents(
            recurring_deposits
                .iter()
                .map(|r| r.amount * r.occurrences as f64)
                .sum(),
        );

        let period_days = daily_balances.len() as i64;
        let per_day = |value: f64| if period_days > 0 { value / period_days as f64 } else { 0.0 };

        let negative: Vec<&DailyBalance> = daily_balances.iter().filter(|d| d.balance < 0.0).collect();

        Ok(FinancialMetrics {
            period_start: window.map(|w| w.start),
            period_end: window.map(|w| w.end),
            period_days,
            opening_balance: opening,
            closing_balance: balances.last().copied().unwrap_or(opening),
            average_daily_balance: round_cents(average),
            min_balance: if balances.is_empty() { opening } else { min_balance },
            max_balance: if balances.is_empty() { opening } else { max_balance },
            balance_std_dev: variance.sqrt(),
            low_balance_threshold: threshold,
            days_below_threshold: balances.iter().filter(|b| **b < threshold).count(),
            negative_balance_days: negative.len(),
            first_negative_date: negative.first().map(|d| d.date),
            nsf_count: ordered.iter().filter(|tx| self.is_nsf(&tx.description)).count(),
            transaction_count: ordered.len(),
            deposit_count: deposits.len(),
            withdrawal_count: withdrawals.len(),
            total_deposits,
            total_withdrawals,
            largest_deposit: deposits.iter().map(|tx| tx.amount.abs()).fold(0.0, f64::max),
            largest_withdrawal: withdrawals.iter().map(|tx| tx.amount.abs()).fold(0.0, f64::max),
            net_cash_flow: round_cents(total_deposits - total_withdrawals),
            expense_ratio: if total_deposits > 0.0 {
                Some(total_withdrawals / total_deposits)
            } else {
                None
            },
            deposit_interval_count: interval_count,
            deposit_interval_mean: interval_mean,
            deposit_interval_variance: interval_variance,
            recurring_deposits,
            recurring_deposit_total,
            velocity_ratio: per_day(ordered.len() as f64),
            volume_per_day: per_day(total_deposits + total_withdrawals),
            weekly_net_flows: window.map(|w| weekly_flows(&ordered, w)).unwrap_or_default(),
            daily_balances,
        })
    }

    fn recurring_deposits(&self, deposits: &[&Transaction]) -> Vec<RecurringDeposit> {
        let mut groups: BTreeMap<(i64, String), RecurringDeposit> = BTreeMap::new();

        for tx in deposits {
            let hash = tx.description_hash();
            groups
                .entry((tx.amount_cents(), hash.clone()))
                .and_modify(|group| group.occurrences += 1)
                .or_insert_with(|| RecurringDeposit {
                    amount: tx.amount.abs(),
                    description: tx.description.clone(),
                    description_hash: hash,
                    occurrences: 1,
                });
        }

        groups
            .into_values()
            .filter(|group| group.occurrences >= self.config.recurring_min_occurrences.max(2))
            .collect()
    }
}

fn build_keyword_pattern(keywords: &[String]) -> Result<Option<Regex>, ValidationError> {
    let words: Vec<String> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(|k| {
            k.split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        })
        .collect();

    if words.is_empty() {
        return Ok(None);
    }

    let pattern = format!(r"(?i)\b(?:{})\b", words.join("|"));
    Regex::new(&pattern)
        .map(Some)
        .map_err(|e| ValidationError::InvalidConfig(format!("nsf keywords: {}", e)))
}

// ============================================================================
// BALANCE CURVE
// ============================================================================

/// Printed period widened to cover every transaction date
fn balance_window(ordered: &[&Transaction], period: Option<StatementPeriod>) -> Option<StatementPeriod> {
    let first = ordered.first().map(|tx| tx.date);
    let last = ordered.last().map(|tx| tx.date);

    match (period, first, last) {
        (Some(p), Some(first), Some(last)) => Some(StatementPeriod::new(p.start.min(first), p.end.max(last))),
        (Some(p), _, _) => Some(p),
        (None, Some(first), Some(last)) => Some(StatementPeriod::new(first, last)),
        _ => None,
    }
}

/// End-of-day balances, idle days carry forward
fn daily_curve(ordered: &[&Transaction], opening: f64, window: StatementPeriod) -> Vec<DailyBalance> {
    let mut net_by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for tx in ordered {
        *net_by_day.entry(tx.date).or_insert(0.0) += tx.amount;
    }

    let mut balance = opening;
    let mut curve = Vec::with_capacity(window.days() as usize);
    let mut day = window.start;
    while day <= window.end {
        if let Some(net) = net_by_day.get(&day) {
            balance = round_cents(balance + net);
        }
        curve.push(DailyBalance { date: day, balance });
        day += Duration::days(1);
    }
    curve
}

fn weekly_flows(ordered: &[&Transaction], window: StatementPeriod) -> Vec<f64> {
    let weeks = ((window.days() + 6) / 7) as usize;
    let mut flows = vec![0.0; weeks];
    for tx in ordered {
        let offset = (tx.date - window.start).num_days();
        if offset >= 0 {
            if let Some(slot) = flows.get_mut((offset / 7) as usize) {
                *slot += tx.amount;
            }
        }
    }
    flows.into_iter().map(round_cents).collect()
}

/// Population mean and variance
fn mean_and_variance(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance))
}

/// (gap count, mean gap days, population variance)
fn deposit_intervals(deposits: &[&Transaction]) -> (usize, f64, f64) {
    let days: BTreeSet<NaiveDate> = deposits.iter().map(|tx| tx.date).collect();
    let ordered: Vec<NaiveDate> = days.into_iter().collect();
    let gaps: Vec<f64> = ordered
        .windows(2)
        .map(|w| (w[1] - w[0]).num_days() as f64)
        .collect();

    match mean_and_variance(&gaps) {
        Some((mean, variance)) => (gaps.len(), mean, variance),
        None => (0, 0.0, 0.0),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionType;
    use serde_json::json;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn tx(m: u32, d: u32, amount: f64, description: &str) -> Transaction {
        let tx_type = if amount >= 0.0 { TransactionType::Credit } else { TransactionType::Debit };
        Transaction::new(date(m, d), amount.abs(), tx_type, description.to_string(), 1, String::new())
    }

    fn engine() -> MetricsEngine {
        MetricsEngine::new(MetricsConfig::default()).unwrap()
    }

    #[test]
    fn test_time_weighted_average_daily_balance() {
        // 1000 held for 9 days (3/1-3/9), 2000 held for 1 day (3/10)
        let transactions = vec![tx(3, 1, 1000.0, "DEPOSIT"), tx(3, 10, 1000.0, "DEPOSIT")];
        let metrics = engine().compute(&transactions, Some(0.0)).unwrap();

        assert_eq!(metrics.period_days, 10);
        assert_eq!(metrics.average_daily_balance, 1100.0);
        assert_eq!(metrics.min_balance, 1000.0);
        assert_eq!(metrics.max_balance, 2000.0);
        assert_eq!(metrics.closing_balance, 2000.0);
    }

    #[test]
    fn test_idle_days_carry_forward_and_period_widening() {
        let period = StatementPeriod::new(date(3, 1), date(3, 31));
        let metrics = engine()
            .compute_for_period(&[tx(3, 16, -100.0, "CARD PURCHASE")], Some(600.0), Some(period))
            .unwrap();

        assert_eq!(metrics.period_days, 31);
        assert_eq!(metrics.daily_balances[0].balance, 600.0);
        assert_eq!(metrics.daily_balances[30].balance, 500.0);
        // 15 days at 600, 16 days at 500
        assert_eq!(metrics.average_daily_balance, round_cents((15.0 * 600.0 + 16.0 * 500.0) / 31.0));
        assert_eq!(metrics.days_below_threshold, 0);
    }

    #[test]
    fn test_negative_days_and_low_balance() {
        let transactions = vec![
            tx(3, 1, 100.0, "DEPOSIT"),
            tx(3, 2, -250.0, "RENT"),
            tx(3, 4, 400.0, "DEPOSIT"),
        ];
        let metrics = engine().compute(&transactions, None).unwrap();

        // 100, -150, -150, 250
        assert_eq!(metrics.negative_balance_days, 2);
        assert_eq!(metrics.first_negative_date, Some(date(3, 2)));
        assert_eq!(metrics.days_below_threshold, 4);
        assert!(metrics.has_negative_balance());
    }

    #[test]
    fn test_empty_transactions() {
        let metrics = engine().compute(&[], Some(750.0)).unwrap();

        assert_eq!(metrics.period_days, 0);
        assert_eq!(metrics.average_daily_balance, 750.0);
        assert_eq!(metrics.transaction_count, 0);
        assert_eq!(metrics.velocity_ratio, 0.0);
        assert_eq!(metrics.expense_ratio, None);
        assert!(metrics.weekly_net_flows.is_empty());
    }

    #[test]
    fn test_nsf_whole_word_matching() {
        let engine = engine();
        assert!(engine.is_nsf("NSF FEE ITEM 1234"));
        assert!(engine.is_nsf("Overdraft Item Fee"));
        assert!(engine.is_nsf("RETURNED  ITEM CHARGEBACK"));
        assert!(engine.is_nsf("NON-SUFFICIENT FUNDS"));
        assert!(engine.is_nsf("OD FEE"));
        assert!(!engine.is_nsf("ONLINE TRANSFER TO SAVINGS"));
        assert!(!engine.is_nsf("GOOD FEED STORE"));
        assert!(!engine.is_nsf(""));

        let transactions = vec![
            tx(3, 1, -35.0, "NSF FEE"),
            tx(3, 2, -35.0, "OVERDRAFT FEE"),
            tx(3, 3, -20.0, "TRANSFER"),
        ];
        assert_eq!(engine.compute(&transactions, None).unwrap().nsf_count, 2);
    }

    #[test]
    fn test_custom_nsf_keywords() {
        let config = MetricsConfig {
            nsf_keywords: vec!["bounced".to_string()],
            ..MetricsConfig::default()
        };
        let engine = MetricsEngine::new(config).unwrap();
        assert!(engine.is_nsf("BOUNCED CHECK"));
        assert!(!engine.is_nsf("NSF FEE"));

        let none = MetricsEngine::new(MetricsConfig { nsf_keywords: vec![], ..MetricsConfig::default() }).unwrap();
        assert!(!none.is_nsf("NSF FEE"));
    }

    #[test]
    fn test_deposit_intervals_and_recurring() {
        let transactions = vec![
            tx(3, 1, 2500.0, "PAYROLL ACME 0301"),
            tx(3, 8, 2500.0, "PAYROLL ACME 0308"),
            tx(3, 15, 2500.0, "PAYROLL ACME 0315"),
            tx(3, 25, 120.0, "REFUND"),
            tx(3, 26, -500.0, "RENT"),
        ];
        let metrics = engine().compute(&transactions, None).unwrap();

        // gaps 7, 7, 10
        assert_eq!(metrics.deposit_interval_count, 3);
        assert_eq!(metrics.deposit_interval_mean, 8.0);
        assert_eq!(metrics.deposit_interval_variance, 2.0);
        assert_eq!(metrics.recurring_deposits.len(), 1);
        assert_eq!(metrics.recurring_deposits[0].occurrences, 3);
        assert_eq!(metrics.recurring_deposit_total, 7500.0);
        assert_eq!(metrics.largest_deposit, 2500.0);
        assert_eq!(metrics.total_deposits, 7620.0);
        assert_eq!(metrics.total_withdrawals, 500.0);
        assert_eq!(metrics.weekly_net_flows, vec![2500.0, 2500.0, 2500.0, -380.0]);
    }

    #[test]
    fn test_velocity_ratio() {
        let transactions = vec![tx(3, 1, 10.0, "A"), tx(3, 2, -5.0, "B"), tx(3, 4, -5.0, "C")];
        let metrics = engine().compute(&transactions, None).unwrap();
        assert_eq!(metrics.velocity_ratio, 0.75);
        assert_eq!(metrics.volume_per_day, 5.0);
    }

    #[test]
    fn test_non_finite_opening_balance_rejected() {
        let result = engine().compute(&[], Some(f64::NAN));
        assert!(matches!(result, Err(ValidationError::NonFiniteOpeningBalance(_))));
    }

    #[test]
    fn test_parse_opening_balance_contract() {
        assert_eq!(parse_opening_balance(None), Ok(None));
        assert_eq!(parse_opening_balance(Some(&json!(1500.25))), Ok(Some(1500.25)));
        assert_eq!(parse_opening_balance(Some(&json!(" 42.5 "))), Ok(Some(42.5)));
        assert_eq!(
            parse_opening_balance(Some(&json!(null))),
            Err(ValidationError::NullOpeningBalance)
        );
        assert!(matches!(
            parse_opening_balance(Some(&json!("NaN"))),
            Err(ValidationError::NonFiniteOpeningBalance(_))
        ));
        assert!(matches!(
            parse_opening_balance(Some(&json!("abc"))),
            Err(ValidationError::NonNumericOpeningBalance(_))
        ));
        assert!(matches!(
            parse_opening_balance(Some(&json!({"amount": 1}))),
            Err(ValidationError::NonNumericOpeningBalance(_))
        ));
    }
}
