// 💧 Waterfall Decision Engine
// Cheap baseline first; pay for enrichment only when the baseline clears
// every gate. BASELINE_ONLY → ENRICHED is the only transition.

use crate::metrics::FinancialMetrics;
use crate::scoring::RiskScore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum GateMode {
    /// Every criterion must pass
    #[default]
    AllCriteria,
    /// At least `min_rate` of the criteria must pass
    PassRate { min_rate: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterfallConfig {
    pub min_score: u32,
    pub min_average_daily_balance: f64,
    pub max_nsf_count: usize,
    pub min_transaction_count: usize,
    pub gate: GateMode,

    /// Service name → cost per run
    pub cost_table: BTreeMap<String, f64>,

    pub enrichment_timeout_ms: u64,
}

impl Default for WaterfallConfig {
    fn default() -> Self {
        let mut cost_table = BTreeMap::new();
        cost_table.insert("business_registry".to_string(), 2.50);
        cost_table.insert("transaction_categorization".to_string(), 1.75);
        cost_table.insert("identity_screening".to_string(), 0.75);

        WaterfallConfig {
            min_score: 650,
            min_average_daily_balance: 1000.0,
            max_nsf_count: 2,
            min_transaction_count: 20,
            gate: GateMode::AllCriteria,
            cost_table,
            enrichment_timeout_ms: 30_000,
        }
    }
}

impl WaterfallConfig {
    pub fn enrichment_cost(&self) -> f64 {
        self.cost_table.values().sum()
    }
}

// ============================================================================
// DECISION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaterfallState {
    BaselineOnly,
    Enriched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrichmentStatus {
    /// Gate failed; enrichment never attempted
    Skipped,
    /// Gate passed; nothing invoked yet
    Pending,
    Completed,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionResult {
    pub threshold: f64,
    pub observed: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallDecision {
    pub state: WaterfallState,
    pub criteria: BTreeMap<String, CriterionResult>,
    pub passed: bool,
    pub pass_rate: f64,
    pub enrichment_executed: bool,
    pub enrichment_status: EnrichmentStatus,
    pub total_cost: f64,
    pub cost_saved: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment_error: Option<String>,
}

// ============================================================================
// ENRICHMENT COLLABORATOR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRequest {
    pub analysis_id: String,
    pub score: u32,
    pub services: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentOutcome {
    pub payload: serde_json::Value,
    /// None → the configured cost table is charged
    pub reported_cost: Option<f64>,
}

/// The expensive downstream stage (registry lookups, AI categorization, ...)
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    async fn enrich(&self, request: &EnrichmentRequest) -> anyhow::Result<EnrichmentOutcome>;
}

// ============================================================================
// ENGINE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct WaterfallEngine {
    config: WaterfallConfig,
}

impl WaterfallEngine {
    pub fn new(config: WaterfallConfig) -> Self {
        WaterfallEngine { config }
    }

    pub fn config(&self) -> &WaterfallConfig {
        &self.config
    }

    /// Baseline decision. Pure; the breakdown is always filled in.
    pub fn decide(&self, score: &RiskScore, metrics: &FinancialMetrics) -> WaterfallDecision {
        let c = &self.config;
        let mut criteria = BTreeMap::new();

        criteria.insert(
            "min_score".to_string(),
            CriterionResult {
                threshold: c.min_score as f64,
                observed: score.score as f64,
                passed: score.score >= c.min_score,
            },
        );
        criteria.insert(
            "min_average_daily_balance".to_string(),
            CriterionResult {
                threshold: c.min_average_daily_balance,
                observed: metrics.average_daily_balance,
                passed: metrics.average_daily_balance >= c.min_average_daily_balance,
            },
        );
        criteria.insert(
            "max_nsf_count".to_string(),
            CriterionResult {
                threshold: c.max_nsf_count as f64,
                observed: metrics.nsf_count as f64,
                passed: metrics.nsf_count <= c.max_nsf_count,
            },
        );
        criteria.insert(
            "min_transaction_count".to_string(),
            CriterionResult {
                threshold: c.min_transaction_count as f64,
                observed: metrics.transaction_count as f64,
                passed: metrics.transaction_count >= c.min_transaction_count,
            },
        );

        let passing = criteria.values().filter(|r| r.passed).count();
        let pass_rate = passing as f64 / criteria.len() as f64;
        let passed = match c.gate {
            GateMode::AllCriteria => passing == criteria.len(),
            GateMode::PassRate { min_rate } => pass_rate >= min_rate,
        };

        WaterfallDecision {
            state: WaterfallState::BaselineOnly,
            criteria,
            passed,
            pass_rate,
            enrichment_executed: false,
            enrichment_status: if passed { EnrichmentStatus::Pending } else { EnrichmentStatus::Skipped },
            total_cost: 0.0,
            cost_saved: if passed { 0.0 } else { c.enrichment_cost() },
            enrichment: None,
            enrichment_error: None,
        }
    }

    /// Invoke enrichment when the baseline decision allows it.
    ///
    /// Failure or timeout keeps the baseline and charges nothing.
    pub async fn run(
        &self,
        decision: WaterfallDecision,
        request: &EnrichmentRequest,
        provider: &dyn EnrichmentProvider,
    ) -> WaterfallDecision {
        if decision.enrichment_status != EnrichmentStatus::Pending {
            return decision;
        }

        let timeout = Duration::from_millis(self.config.enrichment_timeout_ms);
        match tokio::time::timeout(timeout, provider.enrich(request)).await {
            Ok(Ok(outcome)) => {
                let cost = outcome
                    .reported_cost
                    .filter(|cost| cost.is_finite() && *cost >= 0.0)
                    .unwrap_or_else(|| self.config.enrichment_cost());
                info!(analysis_id = %request.analysis_id, cost, "enrichment completed");
                WaterfallDecision {
                    state: WaterfallState::Enriched,
                    enrichment_executed: true,
                    enrichment_status: EnrichmentStatus::Completed,
                    total_cost: cost,
                    enrichment: Some(outcome.payload),
                    ..decision
                }
            }
            Ok(Err(error)) => {
                warn!(analysis_id = %request.analysis_id, error = %error, "enrichment failed");
                WaterfallDecision {
                    enrichment_status: EnrichmentStatus::Failed,
                    enrichment_error: Some(format!("{:#}", error)),
                    ..decision
                }
            }
            Err(_) => {
                warn!(analysis_id = %request.analysis_id, timeout_ms = self.config.enrichment_timeout_ms, "enrichment timed out");
                WaterfallDecision {
                    enrichment_status: EnrichmentStatus::TimedOut,
                    enrichment_error: Some(format!("timed out after {} ms", self.config.enrichment_timeout_ms)),
                    ..decision
                }
            }
        }
    }

    pub fn request_for(&self, analysis_id: &str, score: &RiskScore) -> EnrichmentRequest {
        EnrichmentRequest {
            analysis_id: analysis_id.to_string(),
            score: score.score,
            services: self.config.cost_table.keys().cloned().collect(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricsConfig, MetricsEngine};
    use crate::scoring::{Grade, RiskLevel, SubScores};
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn score(value: u32) -> RiskScore {
        RiskScore {
            score: value,
            composite: 0.0,
            grade: Grade::C,
            risk_level: RiskLevel::Moderate,
            components: SubScores::default(),
        }
    }

    fn metrics(adb: f64, nsf: usize, count: usize) -> FinancialMetrics {
        let mut m = MetricsEngine::new(MetricsConfig::default()).unwrap().compute(&[], None).unwrap();
        m.average_daily_balance = adb;
        m.nsf_count = nsf;
        m.transaction_count = count;
        m
    }

    struct FixedProvider {
        cost: Option<f64>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EnrichmentProvider for FixedProvider {
        async fn enrich(&self, request: &EnrichmentRequest) -> anyhow::Result<EnrichmentOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(EnrichmentOutcome {
                payload: serde_json::json!({ "services": request.services }),
                reported_cost: self.cost,
            })
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl EnrichmentProvider for FailingProvider {
        async fn enrich(&self, _: &EnrichmentRequest) -> anyhow::Result<EnrichmentOutcome> {
            Err(anyhow!("registry unavailable"))
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl EnrichmentProvider for SlowProvider {
        async fn enrich(&self, _: &EnrichmentRequest) -> anyhow::Result<EnrichmentOutcome> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(EnrichmentOutcome { payload: serde_json::Value::Null, reported_cost: Some(1.0) })
        }
    }

    #[test]
    fn test_all_pass_strict_gate() {
        let engine = WaterfallEngine::default();
        let decision = engine.decide(&score(700), &metrics(1500.0, 1, 40));

        assert!(decision.passed);
        assert_eq!(decision.pass_rate, 1.0);
        assert_eq!(decision.enrichment_status, EnrichmentStatus::Pending);
        assert_eq!(decision.cost_saved, 0.0);
        assert_eq!(decision.criteria.len(), 4);
    }

    #[test]
    fn test_any_fail_saves_cost() {
        let engine = WaterfallEngine::default();
        let decision = engine.decide(&score(700), &metrics(1500.0, 3, 40));

        assert!(!decision.passed);
        assert!(!decision.criteria["max_nsf_count"].passed);
        assert!(decision.criteria["min_score"].passed);
        assert_eq!(decision.state, WaterfallState::BaselineOnly);
        assert_eq!(decision.enrichment_status, EnrichmentStatus::Skipped);
        assert_eq!(decision.total_cost, 0.0);
        assert_eq!(decision.cost_saved, 5.0);
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        let engine = WaterfallEngine::default();
        let decision = engine.decide(&score(650), &metrics(1000.0, 2, 20));
        assert!(decision.passed);
    }

    #[test]
    fn test_pass_rate_gate() {
        let engine = WaterfallEngine::new(WaterfallConfig {
            gate: GateMode::PassRate { min_rate: 0.67 },
            ..WaterfallConfig::default()
        });

        // 3 of 4 pass
        let decision = engine.decide(&score(600), &metrics(1500.0, 0, 40));
        assert_eq!(decision.pass_rate, 0.75);
        assert!(decision.passed);

        // 2 of 4 pass
        let decision = engine.decide(&score(600), &metrics(500.0, 0, 40));
        assert!(!decision.passed);
    }

    #[test]
    fn test_decide_is_idempotent() {
        let engine = WaterfallEngine::default();
        let m = metrics(1500.0, 0, 40);
        assert_eq!(engine.decide(&score(700), &m), engine.decide(&score(700), &m));
    }

    #[tokio::test]
    async fn test_run_enriches_and_charges_table_sum() {
        let engine = WaterfallEngine::default();
        let decision = engine.decide(&score(700), &metrics(1500.0, 0, 40));
        let provider = FixedProvider { cost: None, calls: AtomicUsize::new(0) };
        let request = engine.request_for("abc", &score(700));

        let enriched = engine.run(decision, &request, &provider).await;

        assert_eq!(enriched.state, WaterfallState::Enriched);
        assert!(enriched.enrichment_executed);
        assert_eq!(enriched.total_cost, 5.0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(enriched.enrichment.is_some());
    }

    #[tokio::test]
    async fn test_run_uses_reported_cost() {
        let engine = WaterfallEngine::default();
        let decision = engine.decide(&score(700), &metrics(1500.0, 0, 40));
        let provider = FixedProvider { cost: Some(3.10), calls: AtomicUsize::new(0) };

        let enriched = engine.run(decision, &engine.request_for("abc", &score(700)), &provider).await;
        assert_eq!(enriched.total_cost, 3.10);
    }

    #[tokio::test]
    async fn test_run_skipped_never_calls_provider() {
        let engine = WaterfallEngine::default();
        let decision = engine.decide(&score(500), &metrics(1500.0, 0, 40));
        let provider = FixedProvider { cost: None, calls: AtomicUsize::new(0) };

        let result = engine.run(decision, &engine.request_for("abc", &score(500)), &provider).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.enrichment_status, EnrichmentStatus::Skipped);
        assert_eq!(result.cost_saved, 5.0);
    }

    #[tokio::test]
    async fn test_run_failure_keeps_baseline() {
        let engine = WaterfallEngine::default();
        let decision = engine.decide(&score(700), &metrics(1500.0, 0, 40));

        let result = engine.run(decision, &engine.request_for("abc", &score(700)), &FailingProvider).await;
        assert_eq!(result.state, WaterfallState::BaselineOnly);
        assert_eq!(result.enrichment_status, EnrichmentStatus::Failed);
        assert_eq!(result.total_cost, 0.0);
        assert!(result.enrichment_error.unwrap().contains("registry unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_timeout() {
        let engine = WaterfallEngine::new(WaterfallConfig { enrichment_timeout_ms: 100, ..WaterfallConfig::default() });
        let decision = engine.decide(&score(700), &metrics(1500.0, 0, 40));

        let result = engine.run(decision, &engine.request_for("abc", &score(700)), &SlowProvider).await;
        assert_eq!(result.enrichment_status, EnrichmentStatus::TimedOut);
        assert_eq!(result.total_cost, 0.0);
        assert!(!result.enrichment_executed);
    }
}
