//! Tally CLI - Financial document to transaction extractor
//!
//! Usage:
//!   tally parse receipt.jpg --convert    Extract transactions from a document
//!   tally rate USD                       Exchange rate into the home currency
//!   tally ask "Where does my money go?" --transactions tx.json
//!   tally status                         Provider health and settings

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging (stderr; stdout carries JSON output)
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .compact()
                .with_writer(std::io::stderr),
        )
        .init();

    let settings = commands::load_settings(cli.config.as_deref())?;

    match cli.command {
        Commands::Parse {
            file,
            kind,
            convert,
        } => {
            let pipeline = commands::build_pipeline(&settings)?;
            commands::cmd_parse(&pipeline, &file, kind, convert).await
        }
        Commands::Rate { from, to } => commands::cmd_rate(&settings, &from, to.as_deref()).await,
        Commands::Convert { file, from } => commands::cmd_convert(&settings, &file, &from).await,
        Commands::Ask {
            question,
            transactions,
            history,
        } => {
            let pipeline = commands::build_pipeline(&settings)?;
            commands::cmd_ask(&pipeline, &question, &transactions, history.as_deref()).await
        }
        Commands::Summary { transactions } => commands::cmd_summary(&settings, &transactions),
        Commands::Prompts { action } => match action {
            None | Some(PromptsAction::List) => commands::cmd_prompts_list(),
            Some(PromptsAction::Show { prompt_id }) => commands::cmd_prompts_show(&prompt_id),
        },
        Commands::Status => commands::cmd_status(&settings).await,
    }
}
