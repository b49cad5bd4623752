//! Document extraction command

use std::path::Path;

use anyhow::{Context, Result};
use tally_core::{ImageInput, ParsedDocument, Pipeline};
use tracing::info;

use super::print_json;
use crate::cli::InputKind;

/// Extract transactions from a file and print the document as JSON
pub async fn cmd_parse(
    pipeline: &Pipeline,
    file: &Path,
    kind: InputKind,
    convert: bool,
) -> Result<()> {
    let doc = parse_file(pipeline, file, kind, convert).await?;
    print_json(&doc)
}

pub async fn parse_file(
    pipeline: &Pipeline,
    file: &Path,
    kind: InputKind,
    convert: bool,
) -> Result<ParsedDocument> {
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;

    let kind = match kind {
        InputKind::Auto => detect_kind(file, &bytes),
        explicit => explicit,
    };
    info!("Parsing {} as {:?}", file.display(), kind);

    let doc = match kind {
        InputKind::Image => pipeline.parse_image(&ImageInput::from_bytes(bytes)).await,
        InputKind::Pdf => pipeline.parse_pdf(&bytes).await,
        InputKind::Csv => pipeline.parse_csv(&decode_text(bytes)).await,
        InputKind::Text | InputKind::Auto => pipeline.parse_text(&decode_text(bytes)).await,
    }
    .with_context(|| format!("Failed to extract transactions from {}", file.display()))?;

    if convert {
        Ok(pipeline.convert_document(doc).await)
    } else {
        Ok(doc)
    }
}

/// Guess the input kind from the extension, then from magic bytes
pub fn detect_kind(file: &Path, bytes: &[u8]) -> InputKind {
    let extension = file
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("jpg" | "jpeg" | "png" | "gif" | "webp") => return InputKind::Image,
        Some("pdf") => return InputKind::Pdf,
        Some("csv" | "tsv") => return InputKind::Csv,
        Some("txt" | "text" | "md") => return InputKind::Text,
        _ => {}
    }

    if bytes.starts_with(b"%PDF") {
        InputKind::Pdf
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G'])
        || bytes.starts_with(&[0xFF, 0xD8, 0xFF])
        || bytes.starts_with(b"GIF8")
    {
        InputKind::Image
    } else {
        InputKind::Text
    }
}

/// UTF-8 text, replacing invalid sequences
fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}
