//! Document to transaction extraction
//!
//! Each content kind has one entry point. CSV goes through heuristics first
//! and reaches a model only when they decline; images, PDFs and free text
//! always go to a model. Every model reply is sanitized and then normalized
//! into a `ParsedDocument`.
//!
//! PDF routing:
//! - OCR text longer than the configured minimum: text path
//! - otherwise the first rendered page: vision path
//! - OCR toolchain missing: a generic placeholder prompt on the text path

pub mod csv_heuristic;
pub mod normalize;
pub mod ocr;

pub use csv_heuristic::{extract_from_csv, CsvOutcome, DeclineReason};
pub use normalize::{normalize_document, NormalizeContext, RawDocument, RawReply, RawTransaction};
pub use ocr::{OcrEngine, OcrOutcome, TesseractOcr};

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::ai::parsing::sanitize_and_parse;
use crate::ai::ProviderRouter;
use crate::error::{Error, Result};
use crate::models::{normalize_currency, today, ContentKind, ImageInput, ParsedDocument};
use crate::prompts::{render_shared, PromptId, SharedPrompts};
use crate::settings::Limits;

/// Text sent when a PDF cannot be read locally at all
pub const PDF_PLACEHOLDER: &str = "PDF document - extract financial transactions if any.";

/// Content handed to a model
#[derive(Debug, Clone, Copy)]
pub enum AiContent<'a> {
    Text(&'a str),
    Csv(&'a str),
    Image(&'a ImageInput),
}

impl AiContent<'_> {
    pub fn kind(&self) -> ContentKind {
        match self {
            AiContent::Text(_) => ContentKind::Text,
            AiContent::Csv(_) => ContentKind::Csv,
            AiContent::Image(_) => ContentKind::Image,
        }
    }
}

/// How a PDF will be sent to a model
#[derive(Debug, Clone, PartialEq)]
pub enum PdfRoute {
    OcrText(String),
    VisionFirstPage(ImageInput),
    Placeholder,
}

/// Decide the PDF path from what OCR produced
///
/// Fails only when OCR ran, found no usable text, and rendered no page.
pub fn route_pdf(outcome: OcrOutcome, min_chars: usize) -> Result<PdfRoute> {
    match outcome {
        OcrOutcome::Unavailable => Ok(PdfRoute::Placeholder),
        OcrOutcome::Recognized { text, first_page } => {
            let trimmed = text.trim();
            if trimmed.chars().count() > min_chars {
                Ok(PdfRoute::OcrText(trimmed.to_string()))
            } else if let Some(page) = first_page {
                Ok(PdfRoute::VisionFirstPage(page))
            } else {
                Err(Error::Extraction(
                    "PDF has no recognizable text and no renderable page".into(),
                ))
            }
        }
    }
}

/// First `limit` characters of `text`
pub(crate) fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Runs the extraction paths against the provider router
#[derive(Clone)]
pub struct DocumentExtractor {
    router: ProviderRouter,
    prompts: SharedPrompts,
    ocr: Arc<dyn OcrEngine>,
    home_currency: String,
    limits: Limits,
}

impl DocumentExtractor {
    pub fn new(
        router: ProviderRouter,
        prompts: SharedPrompts,
        ocr: Arc<dyn OcrEngine>,
        home_currency: &str,
        limits: Limits,
    ) -> Self {
        Self {
            router,
            prompts,
            ocr,
            home_currency: normalize_currency(home_currency),
            limits,
        }
    }

    pub fn home_currency(&self) -> &str {
        &self.home_currency
    }

    /// Extract from an image (receipt photo, screenshot)
    pub async fn parse_image(&self, image: &ImageInput) -> Result<ParsedDocument> {
        info!(
            "Extracting from image ({} bytes, {})",
            image.data.len(),
            image.mime_type
        );
        self.extract_via_ai(AiContent::Image(image)).await
    }

    /// Extract from free text
    pub async fn parse_text(&self, text: &str) -> Result<ParsedDocument> {
        info!("Extracting from text ({} chars)", text.chars().count());
        self.extract_via_ai(AiContent::Text(text)).await
    }

    /// Extract from CSV: heuristics first, one model call if they decline
    pub async fn parse_csv(&self, text: &str) -> Result<ParsedDocument> {
        match extract_from_csv(text, &self.home_currency) {
            CsvOutcome::Parsed(doc) => {
                info!(
                    "CSV parsed by heuristics: {} transactions",
                    doc.transactions.len()
                );
                Ok(doc)
            }
            CsvOutcome::Declined(reason) => {
                info!("CSV heuristics declined ({:?}), using AI", reason);
                self.extract_via_ai(AiContent::Csv(text)).await
            }
        }
    }

    /// Extract from PDF bytes via OCR, vision, or placeholder
    pub async fn parse_pdf(&self, pdf: &[u8]) -> Result<ParsedDocument> {
        let outcome = self.ocr.recognize_pdf(pdf).await?;
        match route_pdf(outcome, self.limits.ocr_min_chars)? {
            PdfRoute::OcrText(text) => {
                info!("PDF route: OCR text ({} chars)", text.chars().count());
                self.extract_as(AiContent::Text(&text), ContentKind::Pdf)
                    .await
            }
            PdfRoute::VisionFirstPage(page) => {
                info!("PDF route: vision on first page");
                self.extract_as(AiContent::Image(&page), ContentKind::Pdf)
                    .await
            }
            PdfRoute::Placeholder => {
                tracing::warn!("PDF route: OCR unavailable, sending placeholder text");
                self.extract_as(AiContent::Text(PDF_PLACEHOLDER), ContentKind::Pdf)
                    .await
            }
        }
    }

    /// One model call, sanitized and normalized
    pub async fn extract_via_ai(&self, content: AiContent<'_>) -> Result<ParsedDocument> {
        self.extract_as(content, content.kind()).await
    }

    async fn extract_as(
        &self,
        content: AiContent<'_>,
        kind: ContentKind,
    ) -> Result<ParsedDocument> {
        let today = today().format("%Y-%m-%d").to_string();
        let mut vars: HashMap<&str, &str> = HashMap::new();
        vars.insert("today", &today);

        let reply = match content {
            AiContent::Text(text) => {
                vars.insert("document", truncate_chars(text, self.limits.text_chars));
                let prompt = self.render(&vars)?;
                self.router.complete_text(&prompt).await?
            }
            AiContent::Csv(text) => {
                vars.insert("csv", truncate_chars(text, self.limits.csv_chars));
                let prompt = self.render(&vars)?;
                self.router.complete_text(&prompt).await?
            }
            AiContent::Image(image) => {
                vars.insert("image", "yes");
                let prompt = self.render(&vars)?;
                self.router.complete_vision(&prompt, image).await?
            }
        };

        let raw: RawReply = sanitize_and_parse(&reply)?;
        let doc = normalize_document(
            raw.into_document(),
            &NormalizeContext::new(kind, &self.home_currency),
        );
        info!(
            "Extracted {} transactions from {} ({})",
            doc.transactions.len(),
            kind.as_str(),
            doc.doc_type
        );
        Ok(doc)
    }

    fn render(&self, vars: &HashMap<&str, &str>) -> Result<String> {
        render_shared(&self.prompts, PromptId::ExtractTransactions, |p| {
            p.render_combined(vars)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AIClient, MockBackend, MockCall};
    use crate::models::{DocType, TransactionType};
    use crate::prompts::PromptLibrary;
    use async_trait::async_trait;

    struct FixedOcr(OcrOutcome);

    #[async_trait]
    impl OcrEngine for FixedOcr {
        async fn recognize_pdf(&self, _pdf: &[u8]) -> Result<OcrOutcome> {
            Ok(self.0.clone())
        }
    }

    fn page() -> ImageInput {
        ImageInput::with_mime(vec![0x89, b'P', b'N', b'G'], "image/png")
    }

    fn extractor(mock: &MockBackend, ocr: OcrOutcome) -> DocumentExtractor {
        let router = ProviderRouter::new(None, Some(AIClient::Mock(mock.clone()))).unwrap();
        DocumentExtractor::new(
            router,
            PromptLibrary::embedded_only().shared(),
            Arc::new(FixedOcr(ocr)),
            "SEK",
            Limits::default(),
        )
    }

    #[test]
    fn test_route_pdf_long_text() {
        let text = "Invoice 2024-001 total amount due 1 250,00 SEK by 2024-02-01 ".to_string();
        let route = route_pdf(
            OcrOutcome::Recognized {
                text: format!("  {}  ", text),
                first_page: Some(page()),
            },
            50,
        )
        .unwrap();
        assert_eq!(route, PdfRoute::OcrText(text.trim().to_string()));
    }

    #[test]
    fn test_route_pdf_short_text_uses_page() {
        let route = route_pdf(
            OcrOutcome::Recognized {
                text: "  scan \n".into(),
                first_page: Some(page()),
            },
            50,
        )
        .unwrap();
        assert_eq!(route, PdfRoute::VisionFirstPage(page()));
    }

    #[test]
    fn test_route_pdf_exactly_min_chars_uses_page() {
        let route = route_pdf(
            OcrOutcome::Recognized {
                text: "x".repeat(50),
                first_page: Some(page()),
            },
            50,
        )
        .unwrap();
        assert!(matches!(route, PdfRoute::VisionFirstPage(_)));
    }

    #[test]
    fn test_route_pdf_unavailable() {
        assert_eq!(
            route_pdf(OcrOutcome::Unavailable, 50).unwrap(),
            PdfRoute::Placeholder
        );
    }

    #[test]
    fn test_route_pdf_nothing() {
        let err = route_pdf(
            OcrOutcome::Recognized {
                text: String::new(),
                first_page: None,
            },
            50,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("åäöåäö", 3), "åäö");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[tokio::test]
    async fn test_csv_heuristics_skip_ai() {
        let mock = MockBackend::new();
        let ex = extractor(&mock, OcrOutcome::Unavailable);
        let doc = ex
            .parse_csv("date,amount\n2024-01-01,-50\n2024-01-02,100")
            .await
            .unwrap();
        assert_eq!(doc.transactions.len(), 2);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_csv_decline_makes_one_call() {
        let mock = MockBackend::new().reply(
            r#"{"doc_type":"csv","currency":"SEK","summary":"s","transactions":[{"amount":5,"type":"expense"}]}"#,
        );
        let ex = extractor(&mock, OcrOutcome::Unavailable);
        let csv = format!("when,what\n{}", "2024-01-01,coffee\n".repeat(400));
        let doc = ex.parse_csv(&csv).await.unwrap();

        assert_eq!(doc.transactions.len(), 1);
        assert_eq!(mock.call_count(), 1);
        match &mock.calls()[0] {
            MockCall::Text { prompt } => {
                let body = prompt.split("CSV file:\n").nth(1).unwrap();
                assert_eq!(body.chars().count(), 3000);
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fenced_receipt_image() {
        let mock = MockBackend::new().reply(
            "```json\n{\"doc_type\":\"receipt\",\"currency\":\"SEK\",\"summary\":\"x\",\"transactions\":[]}\n```",
        );
        let ex = extractor(&mock, OcrOutcome::Unavailable);
        let doc = ex
            .parse_image(&ImageInput::from_bytes(vec![0xFF, 0xD8, 0xFF]))
            .await
            .unwrap();
        assert_eq!(doc.doc_type, DocType::Receipt);
        assert!(doc.transactions.is_empty());
        assert!(matches!(mock.calls()[0], MockCall::Vision { .. }));
    }

    #[tokio::test]
    async fn test_text_is_truncated() {
        let mock = MockBackend::new();
        let ex = extractor(&mock, OcrOutcome::Unavailable);
        ex.parse_text(&"é".repeat(5000)).await.unwrap();
        match &mock.calls()[0] {
            MockCall::Text { prompt } => {
                let body = prompt.split("Document text:\n").nth(1).unwrap();
                assert_eq!(body.chars().count(), 4000);
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pdf_placeholder_when_ocr_missing() {
        let mock = MockBackend::new().reply(r#"{"transactions": []}"#);
        let ex = extractor(&mock, OcrOutcome::Unavailable);
        let doc = ex.parse_pdf(b"%PDF").await.unwrap();
        assert_eq!(doc.doc_type, DocType::Invoice);
        match &mock.calls()[0] {
            MockCall::Text { prompt } => assert!(prompt.ends_with(PDF_PLACEHOLDER)),
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pdf_scanned_goes_to_vision() {
        let mock = MockBackend::new().reply(
            r#"{"doc_type":"bank statement","transactions":[{"amount":"-120","description":"Fee"}]}"#,
        );
        let ex = extractor(
            &mock,
            OcrOutcome::Recognized {
                text: "   ".into(),
                first_page: Some(page()),
            },
        );
        let doc = ex.parse_pdf(b"%PDF").await.unwrap();
        assert_eq!(doc.doc_type, DocType::BankStatement);
        assert_eq!(doc.transactions[0].kind, TransactionType::Expense);
        match &mock.calls()[0] {
            MockCall::Vision { mime_type, .. } => assert_eq!(mime_type, "image/png"),
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_reply() {
        let mock = MockBackend::new().reply("Sorry, I can't read this.");
        let ex = extractor(&mock, OcrOutcome::Unavailable);
        let err = ex.parse_text("anything").await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_image_without_vision_provider() {
        let fast = MockBackend::text_only();
        let router = ProviderRouter::new(Some(AIClient::Mock(fast)), None).unwrap();
        let ex = DocumentExtractor::new(
            router,
            PromptLibrary::embedded_only().shared(),
            Arc::new(FixedOcr(OcrOutcome::Unavailable)),
            "SEK",
            Limits::default(),
        );
        let err = ex
            .parse_image(&ImageInput::from_bytes(vec![1]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
