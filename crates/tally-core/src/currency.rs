//! Currency normalization
//!
//! Rates come from a `RateSource` (frankfurter.app by default) and are cached
//! for the life of the normalizer. When the source fails, a static table
//! keyed by source currency is used instead; those fallback values are not
//! cached, so a later call can still pick up a live rate.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{normalize_currency, round2, ParsedDocument, Transaction};
use crate::settings::Settings;

/// Where live exchange rates come from
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Units of `to` per one unit of `from`
    async fn fetch_rate(&self, from: &str, to: &str) -> Result<f64>;

    fn name(&self) -> &str;
}

/// frankfurter.app (ECB reference rates)
#[derive(Clone)]
pub struct FrankfurterSource {
    http_client: Client,
    base_url: String,
    timeout: Duration,
}

impl FrankfurterSource {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    #[serde(default)]
    rates: HashMap<String, f64>,
}

#[async_trait]
impl RateSource for FrankfurterSource {
    async fn fetch_rate(&self, from: &str, to: &str) -> Result<f64> {
        let response = self
            .http_client
            .get(format!("{}/latest", self.base_url))
            .query(&[("from", from), ("to", to)])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::provider("frankfurter", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ProviderRequest {
                provider: "frankfurter".into(),
                status: Some(status.as_u16()),
                message: format!("no rate for {}->{}", from, to),
            });
        }

        let body: LatestResponse = response
            .json()
            .await
            .map_err(|e| Error::provider("frankfurter", e))?;

        body.rates
            .get(to)
            .copied()
            .filter(|r| r.is_finite() && *r > 0.0)
            .ok_or_else(|| Error::ProviderRequest {
                provider: "frankfurter".into(),
                status: None,
                message: format!("response has no rate for {}", to),
            })
    }

    fn name(&self) -> &str {
        "frankfurter"
    }
}

/// Fetched rates keyed by (from, to); entries never expire
#[derive(Debug, Default)]
pub struct RateCache {
    rates: Mutex<HashMap<(String, String), f64>>,
}

impl RateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, from: &str, to: &str) -> Option<f64> {
        self.lock()
            .get(&(from.to_string(), to.to_string()))
            .copied()
    }

    pub fn insert(&self, from: &str, to: &str, rate: f64) {
        self.lock().insert((from.to_string(), to.to_string()), rate);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), f64>> {
        // A poisoned map is still a valid map
        self.rates.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Converts amounts into the home currency
#[derive(Clone)]
pub struct CurrencyNormalizer {
    source: Arc<dyn RateSource>,
    cache: Arc<RateCache>,
    home_currency: String,
    fallback_rates: HashMap<String, f64>,
}

impl CurrencyNormalizer {
    pub fn new(
        source: Arc<dyn RateSource>,
        home_currency: &str,
        fallback_rates: HashMap<String, f64>,
    ) -> Self {
        Self {
            source,
            cache: Arc::new(RateCache::new()),
            home_currency: normalize_currency(home_currency),
            fallback_rates: fallback_rates
                .into_iter()
                .map(|(code, rate)| (normalize_currency(&code), rate))
                .collect(),
        }
    }

    /// Frankfurter source, home currency and fallbacks from settings
    pub fn from_settings(settings: &Settings) -> Self {
        let source = FrankfurterSource::new(&settings.fx.base_url, settings.fx.timeout);
        Self::new(
            Arc::new(source),
            &settings.home_currency,
            settings.fx.fallback_rates.clone(),
        )
    }

    pub fn home_currency(&self) -> &str {
        &self.home_currency
    }

    pub fn cache(&self) -> &RateCache {
        &self.cache
    }

    /// Rate from `from` to `to`; never fails
    ///
    /// Identical codes are 1.0 without any lookup. Otherwise cache, then the
    /// rate source, then the static fallback table. The table only quotes the
    /// home currency; other targets and unknown codes fall back to 1.0.
    pub async fn get_rate(&self, from: &str, to: &str) -> f64 {
        let from = normalize_currency(from);
        let to = normalize_currency(to);
        if from == to {
            return 1.0;
        }

        if let Some(rate) = self.cache.get(&from, &to) {
            debug!("Rate {}->{} from cache: {}", from, to, rate);
            return rate;
        }

        match self.source.fetch_rate(&from, &to).await {
            Ok(rate) => {
                debug!("Rate {}->{} from {}: {}", from, to, self.source.name(), rate);
                self.cache.insert(&from, &to, rate);
                rate
            }
            Err(e) => {
                let rate = self.fallback_rate(&from, &to);
                warn!(
                    "Rate lookup {}->{} failed ({}), using fallback {}",
                    from, to, e, rate
                );
                rate
            }
        }
    }

    /// Static table rates are quoted in the home currency
    fn fallback_rate(&self, from: &str, to: &str) -> f64 {
        if to != self.home_currency {
            return 1.0;
        }
        self.fallback_rates.get(from).copied().unwrap_or(1.0)
    }

    /// Rate into `to`, defaulting to the home currency
    pub async fn exchange_rate(&self, from: &str, to: Option<&str>) -> f64 {
        let to = to.unwrap_or(self.home_currency.as_str()).to_string();
        self.get_rate(from, &to).await
    }

    /// Convert transactions denominated in `source` into the home currency
    ///
    /// Returns the input unchanged when `source` is the home currency.
    pub async fn convert(&self, transactions: Vec<Transaction>, source: &str) -> Vec<Transaction> {
        let source = normalize_currency(source);
        if source == self.home_currency {
            return transactions;
        }

        let rate = self.get_rate(&source, &self.home_currency).await;
        transactions
            .into_iter()
            .map(|tx| self.apply_rate(tx, &source, rate))
            .collect()
    }

    /// Same as `convert`
    pub async fn convert_to_home(
        &self,
        transactions: Vec<Transaction>,
        source: &str,
    ) -> Vec<Transaction> {
        self.convert(transactions, source).await
    }

    /// Convert a whole document
    ///
    /// Each transaction converts from its own currency (the document currency
    /// unless the model reported another), one rate lookup per distinct code.
    pub async fn convert_document(&self, mut doc: ParsedDocument) -> ParsedDocument {
        let codes: BTreeSet<String> = doc
            .transactions
            .iter()
            .map(|tx| normalize_currency(&tx.currency))
            .filter(|code| *code != self.home_currency)
            .collect();

        let mut rates = HashMap::new();
        for code in codes {
            let rate = self.get_rate(&code, &self.home_currency).await;
            rates.insert(code, rate);
        }

        doc.transactions = doc
            .transactions
            .into_iter()
            .map(|tx| {
                let code = normalize_currency(&tx.currency);
                match rates.get(&code) {
                    Some(rate) => self.apply_rate(tx, &code, *rate),
                    None => tx,
                }
            })
            .collect();
        doc.currency = self.home_currency.clone();
        doc
    }

    fn apply_rate(&self, mut tx: Transaction, source: &str, rate: f64) -> Transaction {
        tx.original_amount = Some(tx.amount);
        tx.original_currency = Some(source.to_string());
        tx.amount = round2(tx.amount * rate);
        tx.currency = self.home_currency.clone();
        tx
    }
}
