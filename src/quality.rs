// ✅ Confidence Report
// Parse quality + page completeness + reconciliation → one confidence figure
// and a list of issues a reviewer should look at.

use crate::completeness::{CompletenessStatus, StatementPageInfo};
use crate::parser::ParseQuality;
use crate::reconciliation::{ReconciliationReport, ReconciliationResult};
use serde::{Deserialize, Serialize};

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: IssueSeverity,
    pub source: String,
    pub issue: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceReport {
    /// 0.0 - 1.0
    pub confidence: f64,
    pub level: ConfidenceLevel,
    pub issues: Vec<QualityIssue>,
    pub needs_review: bool,
}

impl ConfidenceReport {
    pub fn summary(&self) -> String {
        format!(
            "Confidence: {:.1}% ({:?}), Issues: {} ({} critical)",
            self.confidence * 100.0,
            self.level,
            self.issues.len(),
            self.issues
                .iter()
                .filter(|i| i.severity == IssueSeverity::Critical)
                .count()
        )
    }

    pub fn has_critical_issues(&self) -> bool {
        self.issues.iter().any(|i| i.severity == IssueSeverity::Critical)
    }
}

// ============================================================================
// ENGINE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Below this match ratio the extraction is questionable
    pub warn_match_ratio: f64,
    /// Below this match ratio the extraction is unreliable
    pub critical_match_ratio: f64,
    /// Minimum confidence before a human should look
    pub review_threshold: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        QualityConfig {
            warn_match_ratio: 0.9,
            critical_match_ratio: 0.7,
            review_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfidenceEngine {
    config: QualityConfig,
}

impl ConfidenceEngine {
    pub fn new(config: QualityConfig) -> Self {
        ConfidenceEngine { config }
    }

    pub fn assess(
        &self,
        quality: &ParseQuality,
        pages: &StatementPageInfo,
        reconciliation: &ReconciliationReport,
    ) -> ConfidenceReport {
        let mut issues = Vec::new();

        // Parse quality
        let considered = quality.matched_lines + quality.unmatched_lines;
        let match_ratio = quality.match_ratio();
        let parse_factor = if considered == 0 {
            issues.push(QualityIssue {
                severity: IssueSeverity::Critical,
                source: "extraction".to_string(),
                issue: "No transaction lines recognized".to_string(),
                recommendation: "Check the statement layout or supply a bank format hint".to_string(),
            });
            0.0
        } else {
            if match_ratio < self.config.critical_match_ratio {
                issues.push(QualityIssue {
                    severity: IssueSeverity::Critical,
                    source: "extraction".to_string(),
                    issue: format!("Only {:.0}% of candidate lines parsed", match_ratio * 100.0),
                    recommendation: "Review unmatched lines; the layout may be unsupported".to_string(),
                });
            } else if match_ratio < self.config.warn_match_ratio {
                issues.push(QualityIssue {
                    severity: IssueSeverity::Warning,
                    source: "extraction".to_string(),
                    issue: format!("{} line(s) could not be parsed", quality.unmatched_lines),
                    recommendation: "Spot-check the unmatched lines".to_string(),
                });
            }
            match_ratio
        };

        if quality.discarded_records > 0 {
            issues.push(QualityIssue {
                severity: IssueSeverity::Warning,
                source: "extraction".to_string(),
                issue: format!("{} multi-line record(s) discarded", quality.discarded_records),
                recommendation: "Check for wrapped descriptions without an amount".to_string(),
            });
        }

        // Page completeness
        let page_factor = match pages.status {
            CompletenessStatus::Complete => 1.0,
            CompletenessStatus::Unverifiable => {
                issues.push(QualityIssue {
                    severity: IssueSeverity::Info,
                    source: "pages".to_string(),
                    issue: "No page markers found".to_string(),
                    recommendation: "Confirm the full statement was uploaded".to_string(),
                });
                0.9
            }
            CompletenessStatus::Incomplete => {
                let issue = if pages.missing_pages.is_empty() {
                    format!("Page sequence gaps {:?}", pages.sequence_gaps)
                } else {
                    format!("Missing page(s) {:?}", pages.missing_pages)
                };
                issues.push(QualityIssue {
                    severity: IssueSeverity::Warning,
                    source: "pages".to_string(),
                    issue,
                    recommendation: "Request the complete statement".to_string(),
                });
                pages.confidence
            }
        };

        // Reconciliation
        let reconciliation_factor = match &reconciliation.result {
            ReconciliationResult::Balanced { .. } => 1.0,
            ReconciliationResult::Unavailable => 0.95,
            ReconciliationResult::MinorDiscrepancy { difference, .. } => {
                issues.push(QualityIssue {
                    severity: IssueSeverity::Warning,
                    source: "reconciliation".to_string(),
                    issue: format!("Balances off by ${:.2}", difference),
                    recommendation: "Verify amounts on the printed statement".to_string(),
                });
                0.85
            }
            ReconciliationResult::MajorDiscrepancy { difference, .. } => {
                issues.push(QualityIssue {
                    severity: IssueSeverity::Critical,
                    source: "reconciliation".to_string(),
                    issue: format!("Balances off by ${:.2}", difference),
                    recommendation: "Transactions are likely missing or misread".to_string(),
                });
                0.5
            }
        };

        let confidence = (parse_factor * page_factor * reconciliation_factor).clamp(0.0, 1.0);
        let level = if confidence >= 0.85 {
            ConfidenceLevel::High
        } else if confidence >= 0.6 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        };

        issues.sort_by(|a, b| b.severity.cmp(&a.severity));
        let needs_review = confidence < self.config.review_threshold
            || issues.iter().any(|i| i.severity == IssueSeverity::Critical);

        ConfidenceReport {
            confidence,
            level,
            issues,
            needs_review,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
