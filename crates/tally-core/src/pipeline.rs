//! The public facade
//!
//! Built once per process and shared. Holds one extractor, one currency
//! normalizer and one chat bridge, all driven by the same provider router
//! and prompt library.

use std::sync::Arc;

use tracing::info;

use crate::ai::{ProviderRouter, ProviderStatus};
use crate::chat::{ChatBridge, FinancialSummary};
use crate::currency::{CurrencyNormalizer, FrankfurterSource, RateSource};
use crate::error::Result;
use crate::extract::{DocumentExtractor, OcrEngine, TesseractOcr};
use crate::models::{ChatTurn, ImageInput, ParsedDocument, Transaction};
use crate::prompts::{PromptLibrary, SharedPrompts};
use crate::settings::{Credentials, Settings};

/// Explicit collaborators for `Pipeline::new`
pub struct PipelineParts {
    pub router: ProviderRouter,
    pub prompts: SharedPrompts,
    pub ocr: Arc<dyn OcrEngine>,
    pub rates: Arc<dyn RateSource>,
    pub settings: Settings,
}

/// Extraction, conversion and chat behind one handle
#[derive(Clone)]
pub struct Pipeline {
    extractor: DocumentExtractor,
    currency: CurrencyNormalizer,
    chat: ChatBridge,
    router: ProviderRouter,
    prompts: SharedPrompts,
    settings: Settings,
}

impl Pipeline {
    pub fn new(parts: PipelineParts) -> Self {
        let PipelineParts {
            router,
            prompts,
            ocr,
            rates,
            settings,
        } = parts;

        let extractor = DocumentExtractor::new(
            router.clone(),
            prompts.clone(),
            ocr,
            &settings.home_currency,
            settings.limits,
        );
        let currency = CurrencyNormalizer::new(
            rates,
            &settings.home_currency,
            settings.fx.fallback_rates.clone(),
        );
        let chat = ChatBridge::new(
            router.clone(),
            prompts.clone(),
            settings.limits.chat_history,
            &settings.home_currency,
        );

        Self {
            extractor,
            currency,
            chat,
            router,
            prompts,
            settings,
        }
    }

    /// Production wiring: Groq/Gemini, Tesseract OCR, frankfurter rates,
    /// prompt overrides from the data directory
    ///
    /// Fails with a configuration error when neither API key is present.
    pub fn from_settings(settings: &Settings, credentials: &Credentials) -> Result<Self> {
        let router = ProviderRouter::from_settings(settings, credentials)?;
        let rates = FrankfurterSource::new(&settings.fx.base_url, settings.fx.timeout);
        info!(
            "Pipeline ready (home currency {}, settings {})",
            settings.home_currency,
            settings
                .source
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "embedded".to_string())
        );

        Ok(Self::new(PipelineParts {
            router,
            prompts: PromptLibrary::new().shared(),
            ocr: Arc::new(TesseractOcr::new(&settings.ocr)),
            rates: Arc::new(rates),
            settings: settings.clone(),
        }))
    }

    pub async fn parse_image(&self, image: &ImageInput) -> Result<ParsedDocument> {
        self.extractor.parse_image(image).await
    }

    pub async fn parse_text(&self, text: &str) -> Result<ParsedDocument> {
        self.extractor.parse_text(text).await
    }

    pub async fn parse_pdf(&self, pdf: &[u8]) -> Result<ParsedDocument> {
        self.extractor.parse_pdf(pdf).await
    }

    pub async fn parse_csv(&self, text: &str) -> Result<ParsedDocument> {
        self.extractor.parse_csv(text).await
    }

    /// Rate from `from` into `to` (home currency when None); never fails
    pub async fn exchange_rate(&self, from: &str, to: Option<&str>) -> f64 {
        self.currency.exchange_rate(from, to).await
    }

    pub async fn convert_to_home(
        &self,
        transactions: Vec<Transaction>,
        source: &str,
    ) -> Vec<Transaction> {
        self.currency.convert_to_home(transactions, source).await
    }

    pub async fn convert_document(&self, doc: ParsedDocument) -> ParsedDocument {
        self.currency.convert_document(doc).await
    }

    /// Answer a question about the given financial context
    pub async fn ask(
        &self,
        message: &str,
        context: &str,
        history: &[ChatTurn],
    ) -> Result<String> {
        self.chat.ask(message, context, history).await
    }

    /// Summarize transactions into chat context text
    pub fn financial_context(&self, transactions: &[Transaction]) -> String {
        self.summarize(transactions).render()
    }

    pub fn summarize(&self, transactions: &[Transaction]) -> FinancialSummary {
        FinancialSummary::from_transactions(transactions, &self.settings.home_currency)
    }

    pub async fn status(&self) -> Vec<ProviderStatus> {
        self.router.status().await
    }

    pub fn home_currency(&self) -> &str {
        self.currency.home_currency()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn prompts(&self) -> &SharedPrompts {
        &self.prompts
    }

    pub fn router(&self) -> &ProviderRouter {
        &self.router
    }

    pub fn currency(&self) -> &CurrencyNormalizer {
        &self.currency
    }
}
