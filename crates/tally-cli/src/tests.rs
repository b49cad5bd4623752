//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use clap::Parser;
use tally_core::extract::OcrOutcome;
use tally_core::{
    AIClient, Category, ChatRole, Credentials, CurrencyNormalizer, DocType, Error, MockBackend,
    OcrEngine, Pipeline, PipelineParts, PromptLibrary, ProviderRouter, RateSource, Settings,
    Transaction, TransactionType,
};
use tempfile::NamedTempFile;

use crate::cli::{Cli, Commands, InputKind};
use crate::commands;

struct NoOcr;

#[async_trait]
impl OcrEngine for NoOcr {
    async fn recognize_pdf(&self, _pdf: &[u8]) -> tally_core::Result<OcrOutcome> {
        Ok(OcrOutcome::Unavailable)
    }
}

/// Every pair trades at 2.0
struct FlatRates;

#[async_trait]
impl RateSource for FlatRates {
    async fn fetch_rate(&self, _from: &str, _to: &str) -> tally_core::Result<f64> {
        Ok(2.0)
    }

    fn name(&self) -> &str {
        "flat"
    }
}

fn test_pipeline(mock: &MockBackend) -> Pipeline {
    Pipeline::new(PipelineParts {
        router: ProviderRouter::new(Some(AIClient::Mock(mock.clone())), None).unwrap(),
        prompts: PromptLibrary::embedded_only().shared(),
        ocr: Arc::new(NoOcr),
        rates: Arc::new(FlatRates),
        settings: Settings::default(),
    })
}

fn temp_file(suffix: &str, content: &[u8]) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content).unwrap();
    file
}

fn sample_transactions() -> Vec<Transaction> {
    let day = |d| NaiveDate::from_ymd_opt(2024, 2, d).unwrap();
    vec![
        Transaction::new(day(1), "Salary", 30000.0, None, "SEK", Category::Salary),
        Transaction::new(day(3), "Rent", -9000.0, None, "SEK", Category::Housing),
        Transaction::new(day(5), "ICA", -850.0, None, "SEK", Category::Food),
    ]
}

// ========== Argument Parsing Tests ==========

#[test]
fn test_cli_parse_command() {
    let cli = Cli::try_parse_from(["tally", "parse", "scan.pdf", "--kind", "pdf", "--convert"])
        .unwrap();
    match cli.command {
        Commands::Parse {
            file,
            kind,
            convert,
        } => {
            assert_eq!(file, Path::new("scan.pdf"));
            assert_eq!(kind, InputKind::Pdf);
            assert!(convert);
        }
        _ => panic!("expected parse"),
    }
}

#[test]
fn test_cli_global_config_and_defaults() {
    let cli = Cli::try_parse_from(["tally", "rate", "usd", "--config", "/tmp/tally.toml"]).unwrap();
    assert_eq!(cli.config.as_deref(), Some(Path::new("/tmp/tally.toml")));
    match cli.command {
        Commands::Rate { from, to } => {
            assert_eq!(from, "usd");
            assert!(to.is_none());
        }
        _ => panic!("expected rate"),
    }

    let cli = Cli::try_parse_from(["tally", "parse", "notes.txt"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Parse {
            kind: InputKind::Auto,
            convert: false,
            ..
        }
    ));
}

#[test]
fn test_cli_rejects_unknown_kind() {
    assert!(Cli::try_parse_from(["tally", "parse", "a.bin", "--kind", "docx"]).is_err());
}

// ========== Input Detection Tests ==========

#[test]
fn test_detect_kind_by_extension() {
    assert_eq!(commands::detect_kind(Path::new("r.JPG"), b""), InputKind::Image);
    assert_eq!(commands::detect_kind(Path::new("s.pdf"), b""), InputKind::Pdf);
    assert_eq!(commands::detect_kind(Path::new("e.tsv"), b""), InputKind::Csv);
    assert_eq!(commands::detect_kind(Path::new("n.txt"), b"%PDF"), InputKind::Text);
}

#[test]
fn test_detect_kind_by_content() {
    assert_eq!(commands::detect_kind(Path::new("scan"), b"%PDF-1.7"), InputKind::Pdf);
    assert_eq!(
        commands::detect_kind(Path::new("photo"), &[0xFF, 0xD8, 0xFF, 0xE0]),
        InputKind::Image
    );
    assert_eq!(commands::detect_kind(Path::new("notes"), b"Paid 100 kr"), InputKind::Text);
}

// ========== File Input Tests ==========

#[test]
fn test_read_transactions_list_and_document() {
    let list = temp_file(
        ".json",
        serde_json::to_string(&sample_transactions()).unwrap().as_bytes(),
    );
    assert_eq!(commands::read_transactions(list.path()).unwrap().len(), 3);

    let doc = temp_file(
        ".json",
        br#"{"doc_type": "csv", "currency": "SEK", "summary": "x", "transactions": [
            {"date": "2024-01-01", "description": "A", "amount": 5.0, "currency": "SEK",
             "category": "Food", "type": "expense"}]}"#,
    );
    let transactions = commands::read_transactions(doc.path()).unwrap();
    assert_eq!(transactions[0].kind, TransactionType::Expense);
}

#[test]
fn test_read_transactions_rejects_garbage() {
    let file = temp_file(".json", b"{\"hello\": 1}");
    assert!(commands::read_transactions(file.path()).is_err());
    assert!(commands::read_transactions(Path::new("/nonexistent/tx.json")).is_err());
}

#[test]
fn test_read_history() {
    let file = temp_file(
        ".json",
        br#"[{"role": "user", "text": "hi"}, {"role": "assistant", "text": "hello"}]"#,
    );
    let history = commands::read_history(file.path()).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].role, ChatRole::Assistant);
}

// ========== Parse Command Tests ==========

#[tokio::test]
async fn test_parse_csv_file_without_ai() {
    let mock = MockBackend::text_only();
    let pipeline = test_pipeline(&mock);
    let file = temp_file(".csv", b"date,amount\n2024-01-01,-50\n2024-01-02,100\n");

    let doc = commands::parse_file(&pipeline, file.path(), InputKind::Auto, false)
        .await
        .unwrap();
    assert_eq!(doc.doc_type, DocType::Csv);
    assert_eq!(doc.transactions.len(), 2);
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_parse_text_file_and_convert() {
    let mock = MockBackend::text_only().reply(
        r#"{"doc_type": "invoice", "currency": "EUR", "summary": "Hotel",
            "transactions": [{"date": "2024-04-02", "description": "Hotel", "amount": 80, "type": "expense"}]}"#,
    );
    let pipeline = test_pipeline(&mock);
    let file = temp_file(".txt", b"Hotel Berlin 80 EUR");

    let doc = commands::parse_file(&pipeline, file.path(), InputKind::Auto, true)
        .await
        .unwrap();
    assert_eq!(doc.currency, "SEK");
    assert_eq!(doc.transactions[0].amount, 160.0);
    assert_eq!(doc.transactions[0].original_currency.as_deref(), Some("EUR"));
}

#[tokio::test]
async fn test_parse_image_without_vision_fails() {
    let mock = MockBackend::text_only();
    let pipeline = test_pipeline(&mock);
    let file = temp_file(".png", &[0x89, b'P', b'N', b'G', 0, 0]);

    let err = commands::parse_file(&pipeline, file.path(), InputKind::Auto, false)
        .await
        .unwrap_err();
    let core = err.downcast_ref::<Error>().unwrap();
    assert!(matches!(core, Error::Configuration(_)));
}

#[tokio::test]
async fn test_cmd_parse_csv() {
    let mock = MockBackend::text_only();
    let pipeline = test_pipeline(&mock);
    let file = temp_file(".csv", b"date,amount\n2024-01-01,-50\n");

    let result = commands::cmd_parse(&pipeline, file.path(), InputKind::Csv, false).await;
    assert!(result.is_ok());
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_parse_missing_file() {
    let pipeline = test_pipeline(&MockBackend::text_only());
    let result = commands::parse_file(
        &pipeline,
        Path::new("/nonexistent/receipt.jpg"),
        InputKind::Auto,
        false,
    )
    .await;
    assert!(result.is_err());
}

// ========== Currency Command Tests ==========

#[tokio::test]
async fn test_lookup_rate() {
    let normalizer = CurrencyNormalizer::new(Arc::new(FlatRates), "SEK", Default::default());

    let out = commands::lookup_rate(&normalizer, "usd", None).await;
    assert_eq!(out.from, "USD");
    assert_eq!(out.to, "SEK");
    assert_eq!(out.rate, 2.0);

    let same = commands::lookup_rate(&normalizer, "EUR", Some("eur")).await;
    assert_eq!(same.rate, 1.0);
}

// ========== Chat Command Tests ==========

#[tokio::test]
async fn test_cmd_ask() {
    let mock = MockBackend::text_only().reply("Rent is your largest cost.");
    let pipeline = test_pipeline(&mock);
    let transactions = temp_file(
        ".json",
        serde_json::to_string(&sample_transactions()).unwrap().as_bytes(),
    );
    let history = temp_file(".json", br#"[{"role": "user", "text": "hej"}]"#);

    let result = commands::cmd_ask(
        &pipeline,
        "What costs the most?",
        transactions.path(),
        Some(history.path()),
    )
    .await;
    assert!(result.is_ok());
    assert_eq!(mock.call_count(), 1);
}

#[test]
fn test_cmd_summary() {
    let transactions = temp_file(
        ".json",
        serde_json::to_string(&sample_transactions()).unwrap().as_bytes(),
    );
    let result = commands::cmd_summary(&Settings::default(), transactions.path());
    assert!(result.is_ok());
}

// ========== Prompts Command Tests ==========

#[test]
fn test_show_prompt() {
    let mut library = PromptLibrary::embedded_only();
    assert!(commands::show_prompt(&mut library, "finance_chat").is_ok());
    assert!(commands::show_prompt(&mut library, "extract_transactions").is_ok());

    let err = commands::show_prompt(&mut library, "classify_merchant").unwrap_err();
    assert!(err.to_string().contains("extract_transactions"));
}

// ========== Status Command Tests ==========

#[tokio::test]
async fn test_status_without_credentials() {
    let report = commands::build_status(&Settings::default(), &Credentials::default()).await;
    assert!(report.providers.is_empty());
    assert!(!report.credentials.groq);
    assert!(!report.credentials.gemini);
    assert_eq!(report.home_currency, "SEK");
    assert!(report.settings_file.is_none());
}

#[test]
fn test_load_settings_from_file() {
    let file = temp_file(".toml", b"[general]\nhome_currency = \"eur\"\n");
    let settings = commands::load_settings(Some(file.path())).unwrap();
    // TALLY_HOME_CURRENCY would override the file
    if std::env::var("TALLY_HOME_CURRENCY").is_err() {
        assert_eq!(settings.home_currency, "EUR");
    }
    assert_eq!(settings.source.as_deref(), Some(file.path()));
}
