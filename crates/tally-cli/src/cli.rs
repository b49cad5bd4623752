//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Tally - Turn receipts, statements and exports into transactions
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Financial document to transaction extractor", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Settings file (defaults to the data directory, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract transactions from a document
    Parse {
        /// Image, PDF, CSV or text file
        file: PathBuf,

        /// Input kind (detected from extension and content when auto)
        #[arg(short, long, value_enum, default_value = "auto")]
        kind: InputKind,

        /// Convert amounts into the home currency
        #[arg(long)]
        convert: bool,
    },

    /// Show an exchange rate
    Rate {
        /// Source currency code
        from: String,

        /// Target currency code (defaults to the home currency)
        #[arg(long)]
        to: Option<String>,
    },

    /// Convert a transaction list into the home currency
    Convert {
        /// JSON file with a transaction list or a parsed document
        #[arg(short, long)]
        file: PathBuf,

        /// Currency the amounts are in
        #[arg(long)]
        from: String,
    },

    /// Ask a question about your transactions
    Ask {
        /// The question, in any language
        question: String,

        /// JSON file with a transaction list or a parsed document
        #[arg(short, long)]
        transactions: PathBuf,

        /// JSON file with earlier turns ([{"role": "user", "text": ...}])
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Summarize transactions (totals, categories, warnings)
    Summary {
        /// JSON file with a transaction list or a parsed document
        #[arg(short, long)]
        transactions: PathBuf,
    },

    /// Manage AI prompts (list, show)
    Prompts {
        #[command(subcommand)]
        action: Option<PromptsAction>,
    },

    /// Show configuration and provider health
    Status,
}

#[derive(Subcommand)]
pub enum PromptsAction {
    /// List all available prompts and their override status
    List,

    /// Show the content of a specific prompt
    Show {
        /// Prompt ID (extract_transactions, finance_chat)
        prompt_id: String,
    },
}

/// Input kinds accepted by `parse`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InputKind {
    Auto,
    Image,
    Pdf,
    Csv,
    Text,
}
