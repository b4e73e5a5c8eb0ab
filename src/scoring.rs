// 🎯 Risk Scoring Engine
// FinancialMetrics → composite 300-850 score, grade and risk bucket.
//
// Five weighted sub-scores (0-100 each) plus a small risk-adjustment bucket
// that penalties eat into. Raising any sub-score never lowers the result.

use crate::error::ValidationError;
use crate::metrics::FinancialMetrics;
use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Points each sub-score contributes at 100; sums to 100 with the adjustment bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub income_stability: f64,
    pub expense_control: f64,
    pub cash_flow_consistency: f64,
    pub behavioral_risk: f64,
    pub balance_stability: f64,
    pub risk_adjustment: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        ScoringWeights {
            income_stability: 25.0,
            expense_control: 20.0,
            cash_flow_consistency: 20.0,
            behavioral_risk: 15.0,
            balance_stability: 15.0,
            risk_adjustment: 5.0,
        }
    }
}

impl ScoringWeights {
    pub fn total(&self) -> f64 {
        self.income_stability
            + self.expense_control
            + self.cash_flow_consistency
            + self.behavioral_risk
            + self.balance_stability
            + self.risk_adjustment
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradeCutoffs {
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub d: u32,
}

impl Default for GradeCutoffs {
    fn default() -> Self {
        GradeCutoffs { a: 750, b: 700, c: 650, d: 600 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoringWeights,
    pub score_floor: u32,
    pub score_ceiling: u32,
    pub cutoffs: GradeCutoffs,

    /// Expense ratio at or below which expense control is perfect
    pub expense_ratio_full: f64,
    /// Expense ratio at or above which expense control is zero
    pub expense_ratio_zero: f64,

    /// Behavioral sub-score lost per NSF/overdraft event
    pub nsf_penalty: f64,

    /// Risk-adjustment points lost per negative-balance day
    pub negative_day_penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            weights: ScoringWeights::default(),
            score_floor: 300,
            score_ceiling: 850,
            cutoffs: GradeCutoffs::default(),
            expense_ratio_full: 0.7,
            expense_ratio_zero: 1.3,
            nsf_penalty: 20.0,
            negative_day_penalty: 0.5,
        }
    }
}

// ============================================================================
// OUTPUT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    VeryHigh,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub income_stability: f64,
    pub expense_control: f64,
    pub cash_flow_consistency: f64,
    pub behavioral_risk: f64,
    pub balance_stability: f64,
    /// Points left in the adjustment bucket after penalties
    pub risk_adjustment: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub score: u32,
    /// Weighted composite in [0, 100] before mapping to the score range
    pub composite: f64,
    pub grade: Grade,
    pub risk_level: RiskLevel,
    pub components: SubScores,
}

// ============================================================================
// ENGINE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        ScoringEngine { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score one set of metrics.
    ///
    /// `income_stability` (0-1, clamped) replaces the derived income
    /// sub-score; a non-finite value is rejected.
    pub fn score(&self, metrics: &FinancialMetrics, income_stability: Option<f64>) -> Result<RiskScore, ValidationError> {
        if let Some(ratio) = income_stability {
            if !ratio.is_finite() {
                return Err(ValidationError::NonFiniteIncomeStability(ratio));
            }
        }

        if metrics.transaction_count == 0 {
            return Ok(self.grade(0.0, SubScores::default()));
        }

        let components = SubScores {
            income_stability: match income_stability {
                Some(ratio) => ratio.clamp(0.0, 1.0) * 100.0,
                None => income_sub_score(metrics),
            },
            expense_control: self.expense_sub_score(metrics),
            cash_flow_consistency: cash_flow_sub_score(metrics),
            behavioral_risk: (100.0 - self.config.nsf_penalty * metrics.nsf_count as f64).max(0.0),
            balance_stability: balance_sub_score(metrics),
            risk_adjustment: {
                let bucket = self.config.weights.risk_adjustment;
                let penalty = self.config.negative_day_penalty * metrics.negative_balance_days as f64;
                (bucket - penalty.min(bucket)).max(0.0)
            },
        };

        let w = &self.config.weights;
        let weighted = w.income_stability * components.income_stability / 100.0
            + w.expense_control * components.expense_control / 100.0
            + w.cash_flow_consistency * components.cash_flow_consistency / 100.0
            + w.behavioral_risk * components.behavioral_risk / 100.0
            + w.balance_stability * components.balance_stability / 100.0
            + components.risk_adjustment;

        let total = w.total();
        let composite = if total > 0.0 {
            (weighted / total * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        Ok(self.grade(composite, components))
    }

    fn grade(&self, composite: f64, components: SubScores) -> RiskScore {
        let floor = self.config.score_floor as f64;
        let ceiling = self.config.score_ceiling as f64;
        let mapped = (floor + composite / 100.0 * (ceiling - floor)).round();
        let score = mapped.clamp(floor, ceiling) as u32;

        let cutoffs = &self.config.cutoffs;
        let (grade, risk_level) = if score >= cutoffs.a {
            (Grade::A, RiskLevel::Low)
        } else if score >= cutoffs.b {
            (Grade::B, RiskLevel::Low)
        } else if score >= cutoffs.c {
            (Grade::C, RiskLevel::Moderate)
        } else if score >= cutoffs.d {
            (Grade::D, RiskLevel::High)
        } else {
            (Grade::F, RiskLevel::VeryHigh)
        };

        RiskScore {
            score,
            composite,
            grade,
            risk_level,
            components,
        }
    }

    fn expense_sub_score(&self, metrics: &FinancialMetrics) -> f64 {
        let ratio = match metrics.expense_ratio {
            Some(ratio) => ratio,
            // Spending with no income at all
            None if metrics.total_withdrawals > 0.0 => return 0.0,
            None => return 100.0,
        };

        let full = self.config.expense_ratio_full;
        let zero = self.config.expense_ratio_zero;
        if ratio <= full {
            100.0
        } else if ratio >= zero || zero <= full {
            0.0
        } else {
            100.0 * (zero - ratio) / (zero - full)
        }
    }
}

/// Deposit regularity (60%) and recurring share (40%)
fn income_sub_score(metrics: &FinancialMetrics) -> f64 {
    if metrics.deposit_count == 0 {
        return 0.0;
    }

    let regularity = if metrics.deposit_interval_count < 2 || metrics.deposit_interval_mean <= 0.0 {
        0.5
    } else {
        let cv = metrics.deposit_interval_variance.sqrt() / metrics.deposit_interval_mean;
        (1.0 - cv).clamp(0.0, 1.0)
    };

    100.0 * (0.6 * regularity + 0.4 * metrics.recurring_share())
}

/// Share of weeks that did not lose money
fn cash_flow_sub_score(metrics: &FinancialMetrics) -> f64 {
    if metrics.weekly_net_flows.is_empty() {
        return 0.0;
    }
    let good = metrics.weekly_net_flows.iter().filter(|flow| **flow >= 0.0).count();
    100.0 * good as f64 / metrics.weekly_net_flows.len() as f64
}

fn balance_sub_score(metrics: &FinancialMetrics) -> f64 {
    if metrics.average_daily_balance <= 0.0 || metrics.period_days <= 0 {
        return 0.0;
    }

    let above = 1.0 - metrics.days_below_threshold as f64 / metrics.period_days as f64;
    let cv = (metrics.balance_std_dev / metrics.average_daily_balance).clamp(0.0, 1.0);
    (70.0 * above + 30.0 * (1.0 - cv)).clamp(0.0, 100.0)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricsConfig, MetricsEngine};
    use crate::transaction::{Transaction, TransactionType};
    use chrono::{Duration, NaiveDate};

    fn tx(day_offset: i64, amount: f64, description: &str) -> Transaction {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(day_offset);
        let tx_type = if amount >= 0.0 { TransactionType::Credit } else { TransactionType::Debit };
        Transaction::new(date, amount.abs(), tx_type, description.to_string(), 1, String::new())
    }

    fn metrics(transactions: &[Transaction], opening: f64) -> FinancialMetrics {
        MetricsEngine::new(MetricsConfig::default())
            .unwrap()
            .compute(transactions, Some(opening))
            .unwrap()
    }

    /// Weekly payroll, modest spending, healthy balance
    fn healthy() -> Vec<Transaction> {
        let mut txs = Vec::new();
        for week in 0..8 {
            txs.push(tx(week * 7, 3000.0, "PAYROLL ACME"));
            txs.push(tx(week * 7 + 2, -900.0, "RENT SHARE"));
            txs.push(tx(week * 7 + 4, -300.0, "SUPPLIES"));
        }
        txs
    }

    #[test]
    fn test_empty_metrics_score_floor() {
        let engine = ScoringEngine::default();
        let score = engine.score(&metrics(&[], 10_000.0), None).unwrap();

        assert_eq!(score.score, 300);
        assert_eq!(score.grade, Grade::F);
        assert_eq!(score.risk_level, RiskLevel::VeryHigh);
    }

    #[test]
    fn test_healthy_account_scores_high() {
        let engine = ScoringEngine::default();
        let score = engine.score(&metrics(&healthy(), 5000.0), None).unwrap();

        assert!(score.score >= 750, "score was {}", score.score);
        assert_eq!(score.grade, Grade::A);
        assert_eq!(score.components.behavioral_risk, 100.0);
        assert_eq!(score.components.expense_control, 100.0);
        assert_eq!(score.components.risk_adjustment, 5.0);
    }

    #[test]
    fn test_score_bounded() {
        let engine = ScoringEngine::default();
        let mut txs = healthy();
        for day in 0..40 {
            txs.push(tx(day, -5000.0, "NSF FEE"));
        }
        let score = engine.score(&metrics(&txs, -10_000.0), Some(-3.0)).unwrap();

        assert!(score.score >= 300 && score.score <= 850);
        assert_eq!(score.components.behavioral_risk, 0.0);
        assert_eq!(score.components.income_stability, 0.0);
        assert_eq!(score.components.risk_adjustment, 0.0);
    }

    #[test]
    fn test_nsf_lowers_score_monotonically() {
        let engine = ScoringEngine::default();
        let base = healthy();
        let mut previous = u32::MAX;

        for nsf in 0..4 {
            let mut txs = base.clone();
            for i in 0..nsf {
                txs.push(tx(10 + i, -0.01, "NSF FEE"));
            }
            let score = engine.score(&metrics(&txs, 5000.0), None).unwrap().score;
            assert!(score <= previous);
            previous = score;
        }
    }

    #[test]
    fn test_external_income_stability_replaces_derived() {
        let engine = ScoringEngine::default();
        let m = metrics(&healthy(), 5000.0);

        let low = engine.score(&m, Some(0.1)).unwrap();
        let high = engine.score(&m, Some(1.5)).unwrap();
        assert_eq!(low.components.income_stability, 10.0);
        assert_eq!(high.components.income_stability, 100.0);
        assert!(high.score > low.score);

        assert!(matches!(
            engine.score(&m, Some(f64::NAN)),
            Err(ValidationError::NonFiniteIncomeStability(_))
        ));
    }

    #[test]
    fn test_grade_cutoffs() {
        let engine = ScoringEngine::default();
        let grade_of = |composite: f64| engine.grade(composite, SubScores::default());

        // 300 + c/100 * 550
        assert_eq!(grade_of(100.0).score, 850);
        assert_eq!(grade_of(100.0).grade, Grade::A);
        let b = grade_of((700.0 - 300.0) / 5.5);
        assert_eq!((b.score, b.grade, b.risk_level), (700, Grade::B, RiskLevel::Low));
        let c = grade_of((650.0 - 300.0) / 5.5);
        assert_eq!((c.score, c.grade, c.risk_level), (650, Grade::C, RiskLevel::Moderate));
        let d = grade_of((600.0 - 300.0) / 5.5);
        assert_eq!((d.score, d.grade, d.risk_level), (600, Grade::D, RiskLevel::High));
        let f = grade_of((599.0 - 300.0) / 5.5);
        assert_eq!((f.score, f.grade), (599, Grade::F));
    }

    #[test]
    fn test_expense_sub_score_linear() {
        let engine = ScoringEngine::default();
        let mut m = metrics(&healthy(), 5000.0);

        m.expense_ratio = Some(1.0);
        assert!((engine.expense_sub_score(&m) - 50.0).abs() < 1e-9);
        m.expense_ratio = Some(2.0);
        assert_eq!(engine.expense_sub_score(&m), 0.0);
        m.expense_ratio = None;
        assert_eq!(engine.expense_sub_score(&m), 0.0);
    }

    #[test]
    fn test_deterministic() {
        let engine = ScoringEngine::default();
        let m = metrics(&healthy(), 5000.0);
        assert_eq!(engine.score(&m, None).unwrap(), engine.score(&m, None).unwrap());
    }
}
