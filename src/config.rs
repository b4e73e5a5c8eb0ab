// ⚙️ Analysis configuration
// Every threshold, keyword list and weight in one JSON document. Any section
// may be omitted; omitted sections take their defaults.

use crate::alerts::AlertConfig;
use crate::completeness::CompletenessConfig;
use crate::error::ValidationError;
use crate::metrics::MetricsConfig;
use crate::parser::ExtractorConfig;
use crate::quality::QualityConfig;
use crate::reconciliation::ReconciliationEngine;
use crate::rules::{default_rules, CategoryRule};
use crate::scoring::ScoringConfig;
use crate::waterfall::{GateMode, WaterfallConfig};
use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Environment variable the CLI reads a config path from
pub const CONFIG_ENV: &str = "VERITAS_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub extractor: ExtractorConfig,
    pub completeness: CompletenessConfig,
    pub metrics: MetricsConfig,
    pub scoring: ScoringConfig,
    pub alerts: AlertConfig,
    pub waterfall: WaterfallConfig,
    pub reconciliation: ReconciliationEngine,
    pub quality: QualityConfig,
    pub rules: Vec<CategoryRule>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            extractor: ExtractorConfig::default(),
            completeness: CompletenessConfig::default(),
            metrics: MetricsConfig::default(),
            scoring: ScoringConfig::default(),
            alerts: AlertConfig::default(),
            waterfall: WaterfallConfig::default(),
            reconciliation: ReconciliationEngine::default(),
            quality: QualityConfig::default(),
            rules: default_rules(),
        }
    }
}

impl AnalysisConfig {
    /// Load and validate configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: AnalysisConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |msg: String| Err(ValidationError::InvalidConfig(msg));

        if self.extractor.max_line_length == 0 {
            return invalid("extractor.max_line_length must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.extractor.max_control_ratio) {
            return invalid("extractor.max_control_ratio must be within 0..=1".to_string());
        }
        if self.completeness.page_ceiling == 0 {
            return invalid("completeness.page_ceiling must be positive".to_string());
        }
        if !self.metrics.low_balance_threshold.is_finite() {
            return invalid("metrics.low_balance_threshold must be finite".to_string());
        }

        let s = &self.scoring;
        let weights = [
            s.weights.income_stability,
            s.weights.expense_control,
            s.weights.cash_flow_consistency,
            s.weights.behavioral_risk,
            s.weights.balance_stability,
            s.weights.risk_adjustment,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || s.weights.total() <= 0.0 {
            return invalid("scoring weights must be non-negative and not all zero".to_string());
        }
        if s.score_floor >= s.score_ceiling {
            return invalid(format!(
                "scoring range {}..{} is empty",
                s.score_floor, s.score_ceiling
            ));
        }
        let c = &s.cutoffs;
        if !(c.a >= c.b && c.b >= c.c && c.c >= c.d) {
            return invalid("grade cutoffs must be descending from A to D".to_string());
        }

        if !(self.alerts.revenue_band.is_finite() && self.alerts.revenue_band >= 0.0) {
            return invalid("alerts.revenue_band must be a non-negative number".to_string());
        }
        let a = &self.alerts;
        if !(a.age_medium_months <= a.age_high_months && a.age_high_months <= a.age_critical_months) {
            return invalid("business age thresholds must be ascending".to_string());
        }

        if let GateMode::PassRate { min_rate } = self.waterfall.gate {
            if !(0.0..=1.0).contains(&min_rate) {
                return invalid(format!("waterfall pass rate {} is outside 0..=1", min_rate));
            }
        }
        if self
            .waterfall
            .cost_table
            .values()
            .any(|cost| !cost.is_finite() || *cost < 0.0)
        {
            return invalid("waterfall costs must be non-negative numbers".to_string());
        }
        if self.waterfall.enrichment_timeout_ms == 0 {
            return invalid("waterfall.enrichment_timeout_ms must be positive".to_string());
        }

        Ok(())
    }
}
