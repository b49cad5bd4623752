//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `chat` - Questions and summaries over a transaction file
//! - `currency` - Exchange rates and conversion
//! - `parse` - Document extraction
//! - `prompts` - Prompt library management commands
//! - `status` - Settings and provider health

pub mod chat;
pub mod currency;
pub mod parse;
pub mod prompts;
pub mod status;

// Re-export command functions for main.rs
pub use chat::*;
pub use currency::*;
pub use parse::*;
pub use prompts::*;
pub use status::*;

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tally_core::{Credentials, ParsedDocument, Pipeline, Settings, Transaction};

/// Settings from `--config`, the data directory, or built-in defaults
pub fn load_settings(config: Option<&Path>) -> Result<Settings> {
    Settings::load_from(config).context("Failed to load settings")
}

/// Production pipeline with credentials from the environment
pub fn build_pipeline(settings: &Settings) -> Result<Pipeline> {
    let credentials = Credentials::from_env();
    Pipeline::from_settings(settings, &credentials).context("Failed to set up AI providers")
}

/// Transaction files hold either a bare list or a whole parsed document
#[derive(Deserialize)]
#[serde(untagged)]
enum TransactionsFile {
    List(Vec<Transaction>),
    Document(ParsedDocument),
}

/// Read transactions from a JSON file
pub fn read_transactions(path: &Path) -> Result<Vec<Transaction>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file: TransactionsFile = serde_json::from_str(&content).with_context(|| {
        format!(
            "{} is neither a transaction list nor a parsed document",
            path.display()
        )
    })?;
    Ok(match file {
        TransactionsFile::List(transactions) => transactions,
        TransactionsFile::Document(doc) => doc.transactions,
    })
}

/// Pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
