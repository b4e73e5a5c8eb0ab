// 🔗 Statement Analysis Pipeline
// extract → pages → reconcile → metrics → score, per statement (sequential);
// statements of one application in parallel; then alerts and the waterfall
// gate over the combined picture.

use crate::alerts::{Alert, AlertEngine, AlertInput, ApplicationClaims, RegistryVerification, StatementEvaluation};
use crate::completeness::{CompletenessValidator, StatementPageInfo};
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::metrics::{parse_opening_balance, FinancialMetrics, MetricsEngine};
use crate::parser::{BankFormat, ExtractionHints, ParseQuality, StatementSummary, TransactionExtractor};
use crate::quality::{ConfidenceEngine, ConfidenceReport};
use crate::reconciliation::{ReconciliationEngine, ReconciliationReport};
use crate::rules::RuleEngine;
use crate::scoring::{RiskScore, ScoringEngine};
use crate::transaction::{StatementPeriod, Transaction};
use crate::waterfall::{EnrichmentProvider, WaterfallDecision, WaterfallEngine};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

// ============================================================================
// INPUTS / OUTPUTS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementInput {
    pub pages: Vec<String>,

    /// Caller-supplied; falls back to the printed beginning balance, then 0.
    /// An explicit `null` or non-numeric value is rejected, not defaulted.
    #[serde(default, deserialize_with = "deserialize_opening_balance")]
    pub opening_balance: Option<f64>,

    #[serde(default)]
    pub hints: ExtractionHints,
}

/// Only runs when the field is present; absence is handled by `default`.
fn deserialize_opening_balance<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    parse_opening_balance(Some(&value)).map_err(serde::de::Error::custom)
}

impl StatementInput {
    pub fn from_pages(pages: Vec<String>) -> Self {
        StatementInput {
            pages,
            ..StatementInput::default()
        }
    }

    pub fn with_opening_balance(mut self, opening_balance: f64) -> Self {
        self.opening_balance = Some(opening_balance);
        self
    }

    pub fn with_hints(mut self, hints: ExtractionHints) -> Self {
        self.hints = hints;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationInput {
    pub statements: Vec<StatementInput>,
    #[serde(default)]
    pub claims: Option<ApplicationClaims>,
    #[serde(default)]
    pub registry: Option<RegistryVerification>,
    /// External 0-1 income stability ratio
    #[serde(default)]
    pub income_stability: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementAnalysis {
    pub analysis_id: String,
    pub fingerprint: String,
    pub format: BankFormat,
    pub transactions: Vec<Transaction>,
    pub parse_quality: ParseQuality,
    pub summary: StatementSummary,
    pub page_info: StatementPageInfo,
    pub reconciliation: ReconciliationReport,
    pub metrics: FinancialMetrics,
    pub score: RiskScore,
    pub confidence: ConfidenceReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationAnalysis {
    pub analysis_id: String,
    pub fingerprint: String,
    pub statements: Vec<StatementAnalysis>,
    pub combined_metrics: FinancialMetrics,
    pub combined_score: RiskScore,
    pub alerts: Vec<Alert>,
    pub decision: WaterfallDecision,
    pub evaluated_at: DateTime<Utc>,
}

impl ApplicationAnalysis {
    /// Lowest statement confidence; the application is as trustworthy as its weakest statement
    pub fn confidence(&self) -> f64 {
        self.statements
            .iter()
            .map(|s| s.confidence.confidence)
            .fold(1.0, f64::min)
    }

    pub fn needs_review(&self) -> bool {
        self.statements.iter().any(|s| s.confidence.needs_review)
    }
}

// ============================================================================
// FINGERPRINT
// ============================================================================

/// SHA-256 over page text with line endings and trailing spaces normalized.
pub fn fingerprint(pages: &[String]) -> String {
    let mut hasher = Sha256::new();
    for page in pages {
        for line in page.lines() {
            hasher.update(line.trim_end().as_bytes());
            hasher.update(b"\n");
        }
        hasher.update(b"\x0c");
    }
    format!("{:x}", hasher.finalize())
}

/// Deterministic id for a fingerprint
pub fn analysis_id(fingerprint: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, fingerprint.as_bytes()).to_string()
}

// ============================================================================
// ANALYZER
// ============================================================================

pub struct StatementAnalyzer {
    extractor: TransactionExtractor,
    completeness: CompletenessValidator,
    reconciliation: ReconciliationEngine,
    metrics: MetricsEngine,
    scoring: ScoringEngine,
    alerts: AlertEngine,
    waterfall: WaterfallEngine,
    confidence: ConfidenceEngine,
}

impl StatementAnalyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        config.validate()?;

        Ok(StatementAnalyzer {
            extractor: TransactionExtractor::new(config.extractor, RuleEngine::from_rules(config.rules)),
            completeness: CompletenessValidator::new(config.completeness),
            reconciliation: config.reconciliation,
            metrics: MetricsEngine::new(config.metrics)?,
            scoring: ScoringEngine::new(config.scoring),
            alerts: AlertEngine::new(config.alerts),
            waterfall: WaterfallEngine::new(config.waterfall),
            confidence: ConfidenceEngine::new(config.quality),
        })
    }

    pub fn waterfall(&self) -> &WaterfallEngine {
        &self.waterfall
    }

    /// Sequential chain for one statement
    pub fn analyze_statement(
        &self,
        input: &StatementInput,
        income_stability: Option<f64>,
    ) -> Result<StatementAnalysis, AnalysisError> {
        let fingerprint = fingerprint(&input.pages);
        let analysis_id = analysis_id(&fingerprint);

        let extraction = self.extractor.extract(&input.pages, &input.hints)?;
        let page_info = self.completeness.validate(&input.pages);
        let reconciliation = self.reconciliation.reconcile(&extraction.transactions, &extraction.summary);

        let opening = input.opening_balance.or(extraction.summary.opening_balance);
        let metrics = self
            .metrics
            .compute_for_period(&extraction.transactions, opening, extraction.summary.period)?;
        let score = self.scoring.score(&metrics, income_stability)?;
        let confidence = self.confidence.assess(&extraction.quality, &page_info, &reconciliation);

        debug!(
            %analysis_id,
            transactions = extraction.transactions.len(),
            score = score.score,
            confidence = confidence.confidence,
            "statement analyzed"
        );

        Ok(StatementAnalysis {
            analysis_id,
            fingerprint,
            format: extraction.format,
            transactions: extraction.transactions,
            parse_quality: extraction.quality,
            summary: extraction.summary,
            page_info,
            reconciliation,
            metrics,
            score,
            confidence,
        })
    }

    /// Whole application: statements in parallel, then combined scoring,
    /// alerts and the baseline waterfall decision.
    pub fn analyze_application(
        &self,
        input: &ApplicationInput,
        evaluated_at: DateTime<Utc>,
    ) -> Result<ApplicationAnalysis, AnalysisError> {
        let statements: Vec<StatementAnalysis> = input
            .statements
            .par_iter()
            .map(|statement| self.analyze_statement(statement, input.income_stability))
            .collect::<Result<_, _>>()?;

        let combined_metrics = self.combined_metrics(&statements)?;
        let combined_score = self.scoring.score(&combined_metrics, input.income_stability)?;

        let alert_input = AlertInput {
            claims: input.claims.as_ref(),
            statements: statements
                .iter()
                .map(|s| StatementEvaluation {
                    metrics: &s.metrics,
                    score: Some(&s.score),
                    page_info: Some(&s.page_info),
                })
                .collect(),
            registry: input.registry.as_ref(),
        };
        let alerts = self.alerts.evaluate(&alert_input, evaluated_at);
        let decision = self.waterfall.decide(&combined_score, &combined_metrics);

        let fingerprint = {
            let mut hasher = Sha256::new();
            for statement in &statements {
                hasher.update(statement.fingerprint.as_bytes());
            }
            format!("{:x}", hasher.finalize())
        };

        info!(
            statements = statements.len(),
            score = combined_score.score,
            alerts = alerts.len(),
            passed = decision.passed,
            "application analyzed"
        );

        Ok(ApplicationAnalysis {
            analysis_id: analysis_id(&fingerprint),
            fingerprint,
            statements,
            combined_metrics,
            combined_score,
            alerts,
            decision,
            evaluated_at,
        })
    }

    /// Run the enrichment stage if the baseline decision allows it
    pub async fn enrich(&self, mut analysis: ApplicationAnalysis, provider: &dyn EnrichmentProvider) -> ApplicationAnalysis {
        let request = self.waterfall.request_for(&analysis.analysis_id, &analysis.combined_score);
        analysis.decision = self.waterfall.run(analysis.decision, &request, provider).await;
        analysis
    }

    /// Metrics over every statement's transactions as one account history
    fn combined_metrics(&self, statements: &[StatementAnalysis]) -> Result<FinancialMetrics, AnalysisError> {
        let mut transactions: Vec<Transaction> = statements
            .iter()
            .flat_map(|s| s.transactions.iter().cloned())
            .collect();
        transactions.sort_by_key(|tx| tx.date);

        // Opening balance of the earliest statement
        let opening = statements
            .iter()
            .filter(|s| s.metrics.period_start.is_some())
            .min_by_key(|s| s.metrics.period_start)
            .or_else(|| statements.first())
            .map(|s| s.metrics.opening_balance);

        let period = statements
            .iter()
            .filter_map(|s| s.summary.period)
            .reduce(|a, b| StatementPeriod::new(a.start.min(b.start), a.end.max(b.end)));

        Ok(self.metrics.compute_for_period(&transactions, opening, period)?)
    }
}

// ============================================================================
// TESTS
// ============================================================================
