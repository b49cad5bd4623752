//! Chat and summary commands

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tally_core::{ChatTurn, FinancialSummary, Pipeline, Settings};

use super::{print_json, read_transactions};

#[derive(Debug, Serialize)]
pub struct AnswerOutput {
    pub question: String,
    pub answer: String,
}

/// Answer a question about the transactions in `transactions`
pub async fn cmd_ask(
    pipeline: &Pipeline,
    question: &str,
    transactions: &Path,
    history: Option<&Path>,
) -> Result<()> {
    let transactions = read_transactions(transactions)?;
    let history = match history {
        Some(path) => read_history(path)?,
        None => Vec::new(),
    };

    let context = pipeline.financial_context(&transactions);
    let answer = pipeline
        .ask(question, &context, &history)
        .await
        .context("Chat request failed")?;

    print_json(&AnswerOutput {
        question: question.to_string(),
        answer,
    })
}

/// Earlier conversation turns from a JSON file
pub fn read_history(path: &Path) -> Result<Vec<ChatTurn>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("{} is not a list of chat turns", path.display()))
}

/// Print totals, category breakdown and warnings
pub fn cmd_summary(settings: &Settings, transactions: &Path) -> Result<()> {
    let transactions = read_transactions(transactions)?;
    let summary = FinancialSummary::from_transactions(&transactions, &settings.home_currency);
    print_json(&summary)
}
