// 🧾 Veritas - statement analysis CLI
// Page text files use form feed (\x0c) between pages.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use veritas_statement::config::CONFIG_ENV;
use veritas_statement::{
    parse_opening_balance, split_pages, AnalysisConfig, ApplicationClaims, ApplicationInput,
    BankFormat, CompletenessValidator, ExtractionHints, RegistryVerification, RuleEngine,
    StatementInput, Transaction, TransactionExtractor,
};

/// Bank statement analysis: extraction, metrics, risk score, alerts, waterfall gate
#[derive(Parser, Debug)]
#[command(name = "veritas", version)]
struct Cli {
    /// JSON configuration file (thresholds, keywords, weights, rules)
    #[arg(long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// JSON rules file; replaces the configured category rules
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze one application (one or more statements) and print JSON
    Analyze {
        /// Statement text files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Opening balance, one per file in order
        #[arg(long = "opening-balance")]
        opening_balances: Vec<String>,

        /// Bank format: chase, bofa, iso, generic (default: detect)
        #[arg(long)]
        bank: Option<String>,

        /// Year for dates printed without one
        #[arg(long)]
        year: Option<i32>,

        /// External income stability ratio (0-1)
        #[arg(long)]
        income_stability: Option<f64>,

        /// Applicant claims JSON
        #[arg(long)]
        claims: Option<PathBuf>,

        /// Business registry verification JSON
        #[arg(long)]
        registry: Option<PathBuf>,
    },

    /// Extract transactions from one statement
    Extract {
        file: PathBuf,

        /// Write CSV here instead of JSON to stdout
        #[arg(long)]
        csv: Option<PathBuf>,

        #[arg(long)]
        bank: Option<String>,

        #[arg(long)]
        year: Option<i32>,
    },

    /// Report page completeness for one statement
    Pages { file: PathBuf },
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries JSON
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::from_file(path)?,
        None => AnalysisConfig::default(),
    };
    if let Some(path) = &cli.rules {
        config.rules = RuleEngine::from_file(path)?.into_rules();
        info!(rules = config.rules.len(), "category rules loaded from {:?}", path);
    }

    match cli.command {
        Commands::Analyze {
            files,
            opening_balances,
            bank,
            year,
            income_stability,
            claims,
            registry,
        } => run_analyze(config, &files, &opening_balances, hints(bank, year)?, income_stability, claims, registry),
        Commands::Extract { file, csv, bank, year } => run_extract(config, &file, csv, hints(bank, year)?),
        Commands::Pages { file } => run_pages(config, &file),
    }
}

fn hints(bank: Option<String>, year: Option<i32>) -> Result<ExtractionHints> {
    let format = match bank {
        Some(code) => match BankFormat::from_code(&code) {
            Some(format) => Some(format),
            None => bail!("unknown bank format '{}' (expected chase, bofa, iso, generic)", code),
        },
        None => None,
    };
    Ok(ExtractionHints { format, statement_year: year })
}

fn read_pages(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read statement: {:?}", path))?;
    Ok(split_pages(&text))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse JSON in {:?}", path))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_analyze(
    config: AnalysisConfig,
    files: &[PathBuf],
    opening_balances: &[String],
    hints: ExtractionHints,
    income_stability: Option<f64>,
    claims: Option<PathBuf>,
    registry: Option<PathBuf>,
) -> Result<()> {
    if opening_balances.len() > files.len() {
        bail!("{} opening balances given for {} files", opening_balances.len(), files.len());
    }

    let mut statements = Vec::with_capacity(files.len());
    for (index, file) in files.iter().enumerate() {
        let opening = opening_balances
            .get(index)
            .map(|raw| parse_opening_balance(Some(&serde_json::Value::String(raw.clone()))))
            .transpose()?
            .flatten();

        statements.push(StatementInput {
            pages: read_pages(file)?,
            opening_balance: opening,
            hints: hints.clone(),
        });
    }

    let input = ApplicationInput {
        statements,
        claims: claims.as_deref().map(read_json::<ApplicationClaims>).transpose()?,
        registry: registry.as_deref().map(read_json::<RegistryVerification>).transpose()?,
        income_stability,
    };

    let analyzer = veritas_statement::StatementAnalyzer::new(config)?;
    let analysis = analyzer.analyze_application(&input, Utc::now())?;
    info!(analysis_id = %analysis.analysis_id, score = analysis.combined_score.score, "analysis complete");

    print_json(&analysis)
}

/// Flat row; every column present on every line
#[derive(Serialize)]
struct CsvRow<'a> {
    date: String,
    amount: f64,
    transaction_type: &'a str,
    description: &'a str,
    category: &'a str,
    page: usize,
}

impl<'a> From<&'a Transaction> for CsvRow<'a> {
    fn from(tx: &'a Transaction) -> Self {
        CsvRow {
            date: tx.date.to_string(),
            amount: tx.amount,
            transaction_type: tx.transaction_type.code(),
            description: &tx.description,
            category: tx.category.as_deref().unwrap_or(""),
            page: tx.page,
        }
    }
}

fn run_extract(config: AnalysisConfig, file: &Path, csv_out: Option<PathBuf>, hints: ExtractionHints) -> Result<()> {
    config.validate()?;
    let extractor = TransactionExtractor::new(config.extractor, RuleEngine::from_rules(config.rules));
    let result = extractor.extract(&read_pages(file)?, &hints)?;

    eprintln!(
        "📊 {} transactions ({} format), {:.1}% of candidate lines matched",
        result.transactions.len(),
        result.format.name(),
        result.quality.match_ratio() * 100.0
    );

    match csv_out {
        Some(path) => {
            let mut writer = csv::Writer::from_path(&path)
                .with_context(|| format!("Failed to create CSV: {:?}", path))?;
            for tx in &result.transactions {
                writer.serialize(CsvRow::from(tx))?;
            }
            writer.flush()?;
            eprintln!("✓ Wrote {:?}", path);
            Ok(())
        }
        None => print_json(&result),
    }
}

fn run_pages(config: AnalysisConfig, file: &Path) -> Result<()> {
    config.validate()?;
    let info = CompletenessValidator::new(config.completeness).validate(&read_pages(file)?);
    print_json(&info)
}
