//! Tally Core Library
//!
//! Turns financial documents into structured transactions:
//! - Receipt images, PDFs, free text and CSV exports as input
//! - Heuristic CSV extraction with a single AI fallback call
//! - OCR for PDFs with vision and placeholder fallbacks
//! - Groq (text) and Gemini (vision) providers behind one router
//! - Tolerant sanitizing and normalizing of model replies
//! - Conversion into a home currency with cached live rates
//! - Chat over a bounded summary of the user's transactions
//! - Prompt library with user-overridable prompt files

pub mod ai;
pub mod chat;
pub mod currency;
pub mod error;
pub mod extract;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod settings;

/// Test utilities including mock provider and exchange-rate servers
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{
    AIBackend, AIClient, GeminiBackend, MockBackend, OpenAICompatibleBackend, ProviderRouter,
    ProviderStatus,
};
pub use chat::{history_window, ChatBridge, FinancialSummary};
pub use currency::{CurrencyNormalizer, FrankfurterSource, RateCache, RateSource};
pub use error::{Error, Result};
pub use extract::{extract_from_csv, CsvOutcome, DocumentExtractor, OcrEngine, TesseractOcr};
pub use models::{
    Category, ChatRole, ChatTurn, ContentKind, DocType, ImageInput, ParsedDocument, Transaction,
    TransactionType,
};
pub use pipeline::{Pipeline, PipelineParts};
pub use prompts::{Prompt, PromptId, PromptInfo, PromptLibrary, SharedPrompts};
pub use settings::{Credentials, Settings};
