// 🚨 Alerts Engine
// (claims, statements' metrics + score, optional registry record) → alerts,
// most severe first. Each rule runs in isolation: a rule that errors or
// panics is logged and skipped, the rest still report.

use crate::completeness::StatementPageInfo;
use crate::metrics::FinancialMetrics;
use crate::normalize::{parse_full_date, round_cents};
use crate::scoring::RiskScore;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

// ============================================================================
// ALERT TYPES
// ============================================================================

/// Declaration order is severity order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertCode {
    HighNsfCount,
    LowAverageBalance,
    NegativeBalance,
    RevenueMismatch,
    BusinessAgeMismatch,
    InactiveRegistration,
    IncompleteStatement,
    EvaluationError,
}

impl AlertCode {
    pub fn as_str(&self) -> &str {
        match self {
            AlertCode::HighNsfCount => "HIGH_NSF_COUNT",
            AlertCode::LowAverageBalance => "LOW_AVERAGE_BALANCE",
            AlertCode::NegativeBalance => "NEGATIVE_BALANCE",
            AlertCode::RevenueMismatch => "REVENUE_MISMATCH",
            AlertCode::BusinessAgeMismatch => "BUSINESS_AGE_MISMATCH",
            AlertCode::InactiveRegistration => "INACTIVE_REGISTRATION",
            AlertCode::IncompleteStatement => "INCOMPLETE_STATEMENT",
            AlertCode::EvaluationError => "EVALUATION_ERROR",
        }
    }
}

/// Structured evidence, one shape per alert code.
///
/// `threshold` is the configured limit, `observed` the measured value and
/// `deviation` how far past the limit the observation landed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertEvidence {
    HighNsfCount {
        statement_index: usize,
        threshold: usize,
        observed: usize,
        deviation: usize,
    },
    LowAverageBalance {
        statement_index: usize,
        threshold: f64,
        observed: f64,
        deviation: f64,
    },
    NegativeBalance {
        statement_index: usize,
        threshold: f64,
        observed: f64,
        deviation: f64,
        negative_days: usize,
        first_negative_date: Option<NaiveDate>,
    },
    RevenueMismatch {
        /// Allowed relative band, e.g. 0.25
        threshold: f64,
        /// |annualized - stated| / stated
        observed: f64,
        deviation: f64,
        stated_annual_revenue: f64,
        annualized_deposits: f64,
        total_deposits: f64,
        period_days: i64,
    },
    BusinessAgeMismatch {
        /// Months of disagreement tolerated
        threshold: u32,
        observed: u32,
        deviation: u32,
        stated_start: NaiveDate,
        registration_date: NaiveDate,
    },
    InactiveRegistration {
        threshold: bool,
        observed: bool,
        deviation: bool,
    },
    IncompleteStatement {
        statement_index: usize,
        threshold: usize,
        observed: usize,
        deviation: usize,
        missing_pages: Vec<u32>,
    },
    EvaluationError {
        error: String,
    },
}

impl AlertEvidence {
    pub fn code(&self) -> AlertCode {
        match self {
            AlertEvidence::HighNsfCount { .. } => AlertCode::HighNsfCount,
            AlertEvidence::LowAverageBalance { .. } => AlertCode::LowAverageBalance,
            AlertEvidence::NegativeBalance { .. } => AlertCode::NegativeBalance,
            AlertEvidence::RevenueMismatch { .. } => AlertCode::RevenueMismatch,
            AlertEvidence::BusinessAgeMismatch { .. } => AlertCode::BusinessAgeMismatch,
            AlertEvidence::InactiveRegistration { .. } => AlertCode::InactiveRegistration,
            AlertEvidence::IncompleteStatement { .. } => AlertCode::IncompleteStatement,
            AlertEvidence::EvaluationError { .. } => AlertCode::EvaluationError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub code: AlertCode,
    pub severity: Severity,
    pub message: String,
    pub evidence: AlertEvidence,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// INPUTS
// ============================================================================

/// What the applicant told us. Untrusted; checked before any rule reads it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationClaims {
    #[serde(default)]
    pub stated_annual_revenue: Option<f64>,

    /// Any full date format the extractor understands
    #[serde(default)]
    pub stated_business_start: Option<String>,
}

/// Third-party business registry record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryVerification {
    pub registration_date: Option<NaiveDate>,
    pub active: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct StatementEvaluation<'a> {
    pub metrics: &'a FinancialMetrics,
    pub score: Option<&'a RiskScore>,
    pub page_info: Option<&'a StatementPageInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct AlertInput<'a> {
    pub claims: Option<&'a ApplicationClaims>,
    pub statements: Vec<StatementEvaluation<'a>>,
    pub registry: Option<&'a RegistryVerification>,
}

#[derive(Debug, Clone, PartialEq)]
struct CheckedClaims {
    stated_annual_revenue: Option<f64>,
    stated_business_start: Option<NaiveDate>,
}

fn check_claims(claims: Option<&ApplicationClaims>) -> Result<CheckedClaims, String> {
    let Some(claims) = claims else {
        return Ok(CheckedClaims { stated_annual_revenue: None, stated_business_start: None });
    };

    let stated_annual_revenue = match claims.stated_annual_revenue {
        Some(revenue) if !revenue.is_finite() || revenue <= 0.0 => {
            return Err(format!("stated annual revenue must be a positive number, got {}", revenue));
        }
        other => other,
    };

    let stated_business_start = match claims.stated_business_start.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(text) => Some(
            parse_full_date(text)
                .ok_or_else(|| format!("stated business start date is not a date: {:?}", text))?,
        ),
    };

    Ok(CheckedClaims { stated_annual_revenue, stated_business_start })
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub nsf_count_threshold: usize,

    /// ADB strictly below this alerts
    pub low_balance_threshold: f64,

    /// Relative band around stated revenue
    pub revenue_band: f64,

    pub age_medium_months: u32,
    pub age_high_months: u32,
    pub age_critical_months: u32,
}

impl Default for AlertConfig {
    fn default() -> Self {
        AlertConfig {
            nsf_count_threshold: 3,
            low_balance_threshold: 500.0,
            revenue_band: 0.25,
            age_medium_months: 6,
            age_high_months: 12,
            age_critical_months: 36,
        }
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Rule output before the timestamp is stamped
struct Finding {
    severity: Severity,
    message: String,
    evidence: AlertEvidence,
}

type Rule = fn(&AlertEngine, &AlertInput<'_>, &CheckedClaims) -> Result<Vec<Finding>, String>;

#[derive(Debug, Clone, Default)]
pub struct AlertEngine {
    config: AlertConfig,
}

impl AlertEngine {
    pub fn new(config: AlertConfig) -> Self {
        AlertEngine { config }
    }

    fn rules() -> [(&'static str, Rule); 7] {
        [
            ("negative_balance", AlertEngine::negative_balance),
            ("nsf_count", AlertEngine::nsf_count),
            ("low_average_balance", AlertEngine::low_average_balance),
            ("revenue_mismatch", AlertEngine::revenue_mismatch),
            ("business_age", AlertEngine::business_age),
            ("inactive_registration", AlertEngine::inactive_registration),
            ("incomplete_statement", AlertEngine::incomplete_statement),
        ]
    }

    /// Run every rule; stamp results with `evaluated_at`.
    ///
    /// Output is sorted CRITICAL → LOW; equal severities keep rule order.
    pub fn evaluate(&self, input: &AlertInput<'_>, evaluated_at: DateTime<Utc>) -> Vec<Alert> {
        self.evaluate_with(&AlertEngine::rules(), input, evaluated_at)
    }

    fn evaluate_with(
        &self,
        rules: &[(&'static str, Rule)],
        input: &AlertInput<'_>,
        evaluated_at: DateTime<Utc>,
    ) -> Vec<Alert> {
        let claims = match check_claims(input.claims) {
            Ok(claims) => claims,
            Err(error) => {
                warn!(%error, "alert evaluation aborted on invalid claims");
                return vec![Alert {
                    code: AlertCode::EvaluationError,
                    severity: Severity::High,
                    message: format!("Alert evaluation failed: {}", error),
                    evidence: AlertEvidence::EvaluationError { error },
                    created_at: evaluated_at,
                }];
            }
        };

        let mut findings = Vec::new();
        for &(name, rule) in rules {
            match catch_unwind(AssertUnwindSafe(|| rule(self, input, &claims))) {
                Ok(Ok(found)) => findings.extend(found),
                Ok(Err(error)) => warn!(rule = name, %error, "alert rule failed"),
                Err(_) => warn!(rule = name, "alert rule panicked"),
            }
        }

        let mut alerts: Vec<Alert> = findings
            .into_iter()
            .map(|f| Alert {
                code: f.evidence.code(),
                severity: f.severity,
                message: f.message,
                evidence: f.evidence,
                created_at: evaluated_at,
            })
            .collect();

        // sort_by is stable
        alerts.sort_by(|a, b| b.severity.cmp(&a.severity));
        debug!(count = alerts.len(), "alerts evaluated");
        alerts
    }

    // ------------------------------------------------------------------------
    // Per-statement rules
    // ------------------------------------------------------------------------

    fn nsf_count(&self, input: &AlertInput<'_>, _: &CheckedClaims) -> Result<Vec<Finding>, String> {
        let threshold = self.config.nsf_count_threshold;
        Ok(input
            .statements
            .iter()
            .enumerate()
            .filter(|(_, s)| s.metrics.nsf_count >= threshold)
            .map(|(index, s)| Finding {
                severity: Severity::High,
                message: format!(
                    "Statement {} has {} NSF/overdraft events (limit {})",
                    index + 1,
                    s.metrics.nsf_count,
                    threshold
                ),
                evidence: AlertEvidence::HighNsfCount {
                    statement_index: index,
                    threshold,
                    observed: s.metrics.nsf_count,
                    deviation: s.metrics.nsf_count - threshold,
                },
            })
            .collect())
    }

    fn low_average_balance(&self, input: &AlertInput<'_>, _: &CheckedClaims) -> Result<Vec<Finding>, String> {
        let threshold = self.config.low_balance_threshold;
        Ok(input
            .statements
            .iter()
            .enumerate()
            .filter(|(_, s)| s.metrics.average_daily_balance < threshold)
            .map(|(index, s)| {
                let observed = s.metrics.average_daily_balance;
                Finding {
                    severity: Severity::Medium,
                    message: format!(
                        "Statement {} average daily balance ${:.2} is below ${:.2}",
                        index + 1,
                        observed,
                        threshold
                    ),
                    evidence: AlertEvidence::LowAverageBalance {
                        statement_index: index,
                        threshold,
                        observed,
                        deviation: round_cents(threshold - observed),
                    },
                }
            })
            .collect())
    }

    fn negative_balance(&self, input: &AlertInput<'_>, _: &CheckedClaims) -> Result<Vec<Finding>, String> {
        Ok(input
            .statements
            .iter()
            .enumerate()
            .filter(|(_, s)| s.metrics.has_negative_balance())
            .map(|(index, s)| Finding {
                severity: Severity::Critical,
                message: format!(
                    "Statement {} was overdrawn on {} day(s), lowest balance ${:.2}",
                    index + 1,
                    s.metrics.negative_balance_days,
                    s.metrics.min_balance
                ),
                evidence: AlertEvidence::NegativeBalance {
                    statement_index: index,
                    threshold: 0.0,
                    observed: s.metrics.min_balance,
                    deviation: round_cents(-s.metrics.min_balance),
                    negative_days: s.metrics.negative_balance_days,
                    first_negative_date: s.metrics.first_negative_date,
                },
            })
            .collect())
    }

    fn incomplete_statement(&self, input: &AlertInput<'_>, _: &CheckedClaims) -> Result<Vec<Finding>, String> {
        Ok(input
            .statements
            .iter()
            .enumerate()
            .filter_map(|(index, s)| s.page_info.map(|info| (index, info)))
            .filter(|(_, info)| !info.missing_pages.is_empty())
            .map(|(index, info)| Finding {
                severity: Severity::Medium,
                message: format!("Statement {} is missing page(s) {:?}", index + 1, info.missing_pages),
                evidence: AlertEvidence::IncompleteStatement {
                    statement_index: index,
                    threshold: 0,
                    observed: info.missing_pages.len(),
                    deviation: info.missing_pages.len(),
                    missing_pages: info.missing_pages.clone(),
                },
            })
            .collect())
    }

    // ------------------------------------------------------------------------
    // Application-level rules
    // ------------------------------------------------------------------------

    fn revenue_mismatch(&self, input: &AlertInput<'_>, claims: &CheckedClaims) -> Result<Vec<Finding>, String> {
        let Some(stated) = claims.stated_annual_revenue else {
            return Ok(Vec::new());
        };
        let total_deposits: f64 = input.statements.iter().map(|s| s.metrics.total_deposits).sum();
        let period_days: i64 = input.statements.iter().map(|s| s.metrics.period_days).sum();
        let Some(annualized) = annualize(total_deposits, period_days) else {
            return Ok(Vec::new());
        };

        let relative = (annualized - stated).abs() / stated;
        let band = self.config.revenue_band;
        if relative <= band {
            return Ok(Vec::new());
        }

        Ok(vec![Finding {
            severity: Severity::High,
            message: format!(
                "Stated revenue ${:.2} vs annualized deposits ${:.2} ({:.1}% apart)",
                stated,
                annualized,
                relative * 100.0
            ),
            evidence: AlertEvidence::RevenueMismatch {
                threshold: band,
                observed: relative,
                deviation: relative - band,
                stated_annual_revenue: stated,
                annualized_deposits: annualized,
                total_deposits: round_cents(total_deposits),
                period_days,
            },
        }])
    }

    fn business_age(&self, input: &AlertInput<'_>, claims: &CheckedClaims) -> Result<Vec<Finding>, String> {
        let (Some(stated), Some(registered)) = (
            claims.stated_business_start,
            input.registry.and_then(|r| r.registration_date),
        ) else {
            return Ok(Vec::new());
        };

        let months = whole_months_between(stated, registered);
        let severity = if months > self.config.age_critical_months {
            Severity::Critical
        } else if months > self.config.age_high_months {
            Severity::High
        } else if months > self.config.age_medium_months {
            Severity::Medium
        } else {
            return Ok(Vec::new());
        };

        let threshold = self.config.age_medium_months;
        Ok(vec![Finding {
            severity,
            message: format!(
                "Stated start {} and registration {} are {} months apart",
                stated, registered, months
            ),
            evidence: AlertEvidence::BusinessAgeMismatch {
                threshold,
                observed: months,
                deviation: months.saturating_sub(threshold),
                stated_start: stated,
                registration_date: registered,
            },
        }])
    }

    fn inactive_registration(&self, input: &AlertInput<'_>, _: &CheckedClaims) -> Result<Vec<Finding>, String> {
        match input.registry {
            Some(registry) if !registry.active => Ok(vec![Finding {
                severity: Severity::High,
                message: "Business registration is not active".to_string(),
                evidence: AlertEvidence::InactiveRegistration {
                    threshold: true,
                    observed: false,
                    deviation: true,
                },
            }]),
            _ => Ok(Vec::new()),
        }
    }
}

/// totalDeposits × 365 / periodDays, half away from zero to cents
pub fn annualize(total_deposits: f64, period_days: i64) -> Option<f64> {
    if period_days <= 0 || !total_deposits.is_finite() {
        return None;
    }
    Some(round_cents(total_deposits * 365.0 / period_days as f64))
}

/// Completed calendar months between two dates, order-independent
pub fn whole_months_between(a: NaiveDate, b: NaiveDate) -> u32 {
    let (early, late) = if a <= b { (a, b) } else { (b, a) };
    let mut months = (late.year() - early.year()) * 12 + late.month() as i32 - early.month() as i32;
    if late.day() < early.day() {
        months -= 1;
    }
    months.max(0) as u32
}

// ============================================================================
// TESTS
// ============================================================================
