// Veritas Statement Analysis - Core Library
// Exposes all modules for use in the CLI, services, and tests

pub mod error;
pub mod transaction;
pub mod normalize;
pub mod rules;          // Category rules as data
pub mod parser;         // Transaction extractor
pub mod completeness;   // Page-completeness validator
pub mod reconciliation; // Printed vs extracted balances
pub mod quality;        // Confidence report
pub mod metrics;        // Financial metrics engine
pub mod scoring;        // Risk scoring engine
pub mod alerts;         // Alerts engine
pub mod waterfall;      // Waterfall decision engine
pub mod config;
pub mod pipeline;

// Re-export commonly used types
pub use error::{AnalysisError, ExtractionError, ValidationError};
pub use transaction::{StatementPeriod, Transaction, TransactionType};
pub use rules::{CategoryRule, ClassificationResult, RuleEngine};
pub use parser::{
    BankFormat, ExtractionHints, ExtractionResult, ExtractorConfig,
    LineMatcher, ParseQuality, ParseWarning, StatementSummary, TransactionExtractor,
    detect_format, split_pages,
};
pub use completeness::{CompletenessStatus, CompletenessValidator, PageMarker, StatementPageInfo};
pub use reconciliation::{ReconciliationEngine, ReconciliationReport, ReconciliationResult};
pub use quality::{ConfidenceEngine, ConfidenceLevel, ConfidenceReport};
pub use metrics::{FinancialMetrics, MetricsConfig, MetricsEngine, parse_opening_balance};
pub use scoring::{Grade, RiskLevel, RiskScore, ScoringConfig, ScoringEngine};
pub use alerts::{
    Alert, AlertCode, AlertConfig, AlertEngine, AlertEvidence, AlertInput,
    ApplicationClaims, RegistryVerification, Severity, StatementEvaluation,
};
pub use waterfall::{
    EnrichmentOutcome, EnrichmentProvider, EnrichmentRequest, EnrichmentStatus,
    GateMode, WaterfallConfig, WaterfallDecision, WaterfallEngine, WaterfallState,
};
pub use config::AnalysisConfig;
pub use pipeline::{
    ApplicationAnalysis, ApplicationInput, StatementAnalysis, StatementAnalyzer, StatementInput,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
