//! Exchange-rate commands
//!
//! These need no AI credentials: only the rate service is contacted.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use tally_core::models::normalize_currency;
use tally_core::{CurrencyNormalizer, Settings};

use super::{print_json, read_transactions};

#[derive(Debug, Serialize)]
pub struct RateOutput {
    pub from: String,
    pub to: String,
    pub rate: f64,
}

/// Print the rate from `from` into `to` (home currency by default)
pub async fn cmd_rate(settings: &Settings, from: &str, to: Option<&str>) -> Result<()> {
    let normalizer = CurrencyNormalizer::from_settings(settings);
    print_json(&lookup_rate(&normalizer, from, to).await)
}

pub async fn lookup_rate(
    normalizer: &CurrencyNormalizer,
    from: &str,
    to: Option<&str>,
) -> RateOutput {
    let rate = normalizer.exchange_rate(from, to).await;
    RateOutput {
        from: normalize_currency(from),
        to: normalize_currency(to.unwrap_or(normalizer.home_currency())),
        rate,
    }
}

/// Convert a transaction file from `from` into the home currency
pub async fn cmd_convert(settings: &Settings, file: &Path, from: &str) -> Result<()> {
    let transactions = read_transactions(file)?;
    let normalizer = CurrencyNormalizer::from_settings(settings);
    let converted = normalizer.convert_to_home(transactions, from).await;
    print_json(&converted)
}
