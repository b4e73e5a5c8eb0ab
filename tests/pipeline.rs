// End-to-end runs over statement text fixtures

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use veritas_statement::waterfall::EnrichmentStatus;
use veritas_statement::{
    split_pages, AlertCode, AnalysisConfig, ApplicationClaims, ApplicationInput, BankFormat,
    CompletenessStatus, EnrichmentOutcome, EnrichmentProvider, EnrichmentRequest, GateMode,
    RegistryVerification, Severity, StatementAnalyzer, StatementInput, TransactionType,
    WaterfallState,
};

fn fixture(name: &str) -> StatementInput {
    let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
    let text = fs::read_to_string(&path).unwrap();
    StatementInput::from_pages(split_pages(&text))
}

fn read_json<T: serde::de::DeserializeOwned>(name: &str) -> T {
    let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
    serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap()
}

fn evaluated_at() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 2, 12, 0, 0).unwrap()
}

#[test]
fn test_full_statement_end_to_end() {
    let analyzer = StatementAnalyzer::new(AnalysisConfig::default()).unwrap();
    let analysis = analyzer.analyze_statement(&fixture("chase_march_2024.txt"), None).unwrap();

    assert_eq!(analysis.format, BankFormat::Chase);
    assert_eq!(analysis.transactions.len(), 5);

    // Wrapped payroll credit spanning four lines
    let payroll = analysis
        .transactions
        .iter()
        .find(|tx| tx.date == NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
        .unwrap();
    assert_eq!(payroll.amount, 1892.00);
    assert_eq!(payroll.transaction_type, TransactionType::Credit);
    assert_eq!(payroll.description, "ACH CREDIT ACME CORP PAYROLL PPD ID 12345");
    assert_eq!(payroll.page, 1);

    // Section headers decide direction even when the description says "payroll"
    let fees = analysis.transactions.iter().find(|tx| tx.description == "ADP Payroll Fees").unwrap();
    assert_eq!(fees.amount, -85.00);

    assert_eq!(analysis.page_info.status, CompletenessStatus::Complete);
    assert_eq!(analysis.page_info.expected_pages, Some(3));
    assert!(analysis.reconciliation.is_balanced());

    assert_eq!(analysis.metrics.opening_balance, 2500.0);
    assert_eq!(analysis.metrics.closing_balance, 3973.0);
    assert_eq!(analysis.metrics.period_days, 31);
    assert_eq!(analysis.metrics.nsf_count, 1);
    assert_eq!(analysis.metrics.total_deposits, 3092.0);
    assert!(!analysis.metrics.has_negative_balance());

    assert!((300..=850).contains(&analysis.score.score));
    assert!(!analysis.confidence.needs_review);
    println!("✅ {} | score {}", analysis.confidence.summary(), analysis.score.score);
}

#[test]
fn test_missing_page_lowers_confidence_and_alerts() {
    let analyzer = StatementAnalyzer::new(AnalysisConfig::default()).unwrap();
    let input = ApplicationInput {
        statements: vec![fixture("chase_march_2024_missing_page.txt")],
        ..ApplicationInput::default()
    };
    let analysis = analyzer.analyze_application(&input, evaluated_at()).unwrap();
    let statement = &analysis.statements[0];

    assert_eq!(statement.page_info.status, CompletenessStatus::Incomplete);
    assert_eq!(statement.page_info.missing_pages, vec![2]);
    assert!((statement.page_info.confidence - 2.0 / 3.0).abs() < 1e-9);

    // The withdrawals lived on page 2
    assert!(statement.reconciliation.result.has_discrepancy());
    assert!(analysis.needs_review());

    let incomplete = analysis
        .alerts
        .iter()
        .find(|a| a.code == AlertCode::IncompleteStatement)
        .unwrap();
    assert_eq!(incomplete.severity, Severity::Medium);
    assert_eq!(incomplete.created_at, evaluated_at());
}

#[test]
fn test_claims_and_registry_mismatches_sorted_by_severity() {
    let analyzer = StatementAnalyzer::new(AnalysisConfig::default()).unwrap();
    let input = ApplicationInput {
        statements: vec![fixture("chase_march_2024.txt")],
        claims: Some(read_json::<ApplicationClaims>("claims.json")),
        registry: Some(read_json::<RegistryVerification>("registry.json")),
        income_stability: Some(0.8),
    };

    let analysis = analyzer.analyze_application(&input, evaluated_at()).unwrap();
    let codes: Vec<AlertCode> = analysis.alerts.iter().map(|a| a.code).collect();

    // 2019-06 vs 2023-01 is 43 months apart
    assert_eq!(codes, vec![AlertCode::BusinessAgeMismatch, AlertCode::RevenueMismatch]);
    assert_eq!(analysis.alerts[0].severity, Severity::Critical);
    assert_eq!(analysis.alerts[1].severity, Severity::High);

    let json = serde_json::to_value(&analysis.alerts[1]).unwrap();
    assert_eq!(json["code"], "REVENUE_MISMATCH");
    assert_eq!(json["evidence"]["threshold"], 0.25);
}

#[test]
fn test_small_statement_skips_enrichment() {
    let analyzer = StatementAnalyzer::new(AnalysisConfig::default()).unwrap();
    let input = ApplicationInput {
        statements: vec![fixture("chase_march_2024.txt")],
        ..ApplicationInput::default()
    };
    let analysis = analyzer.analyze_application(&input, evaluated_at()).unwrap();

    assert!(!analysis.decision.passed);
    assert!(!analysis.decision.criteria["min_transaction_count"].passed);
    assert_eq!(analysis.decision.enrichment_status, EnrichmentStatus::Skipped);
    assert_eq!(analysis.decision.total_cost, 0.0);
    assert_eq!(analysis.decision.cost_saved, 5.0);
}

struct CountingProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl EnrichmentProvider for CountingProvider {
    async fn enrich(&self, request: &EnrichmentRequest) -> anyhow::Result<EnrichmentOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(EnrichmentOutcome {
            payload: serde_json::json!({ "services": request.services }),
            reported_cost: None,
        })
    }
}

#[tokio::test]
async fn test_pass_rate_gate_runs_enrichment_once() {
    let mut config = AnalysisConfig::default();
    config.waterfall.gate = GateMode::PassRate { min_rate: 0.5 };
    let analyzer = StatementAnalyzer::new(config).unwrap();

    let input = ApplicationInput {
        statements: vec![fixture("chase_march_2024.txt")],
        ..ApplicationInput::default()
    };
    let baseline = analyzer.analyze_application(&input, evaluated_at()).unwrap();
    assert!(baseline.decision.passed);
    assert_eq!(baseline.decision.enrichment_status, EnrichmentStatus::Pending);

    let provider = CountingProvider { calls: AtomicUsize::new(0) };
    let enriched = analyzer.enrich(baseline, &provider).await;

    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    assert_eq!(enriched.decision.state, WaterfallState::Enriched);
    assert!(enriched.decision.enrichment_executed);
    assert_eq!(enriched.decision.total_cost, 5.0);
    assert_eq!(enriched.decision.enrichment.unwrap()["services"].as_array().unwrap().len(), 3);
}

#[test]
fn test_same_documents_same_analysis_id() {
    let analyzer = StatementAnalyzer::new(AnalysisConfig::default()).unwrap();
    let a = analyzer.analyze_statement(&fixture("chase_march_2024.txt"), None).unwrap();
    let b = analyzer.analyze_statement(&fixture("chase_march_2024.txt"), None).unwrap();
    let c = analyzer
        .analyze_statement(&fixture("chase_march_2024_missing_page.txt"), None)
        .unwrap();

    assert_eq!(a.analysis_id, b.analysis_id);
    assert_ne!(a.analysis_id, c.analysis_id);
}
