//! PDF text recognition through external tools
//!
//! `pdftoppm` renders each page to PNG, `tesseract` reads each page in
//! order. A missing executable is not an error: the caller degrades to a
//! placeholder prompt.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::ImageInput;
use crate::settings::OcrSettings;

/// What OCR produced for a PDF
#[derive(Debug, Clone, PartialEq)]
pub enum OcrOutcome {
    /// Tools ran; text may still be empty for scanned or image-only PDFs
    Recognized {
        text: String,
        first_page: Option<ImageInput>,
    },
    /// The OCR toolchain is not installed
    Unavailable,
}

/// Text recognition seam
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize_pdf(&self, pdf: &[u8]) -> Result<OcrOutcome>;
}

/// `pdftoppm` + `tesseract` implementation
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    pdftoppm: PathBuf,
    tesseract: PathBuf,
    dpi: u32,
    language: String,
}

impl TesseractOcr {
    pub fn new(settings: &OcrSettings) -> Self {
        Self {
            pdftoppm: settings.pdftoppm.clone(),
            tesseract: settings.tesseract.clone(),
            dpi: settings.dpi,
            language: settings.language.clone(),
        }
    }

    async fn render_pages(&self, pdf_path: &Path, out_dir: &Path) -> Result<Option<Vec<PathBuf>>> {
        let prefix = out_dir.join("page");
        let output = Command::new(&self.pdftoppm)
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-png")
            .arg(pdf_path)
            .arg(&prefix)
            .output()
            .await;

        let Some(output) = tool_output(output, &self.pdftoppm)? else {
            return Ok(None);
        };
        check_status(&output, "pdftoppm")?;

        Ok(Some(rendered_pages(out_dir).await?))
    }

    async fn read_page(&self, page: &Path) -> Result<Option<String>> {
        let output = Command::new(&self.tesseract)
            .arg(page)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .output()
            .await;

        let Some(output) = tool_output(output, &self.tesseract)? else {
            return Ok(None);
        };
        check_status(&output, "tesseract")?;
        Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize_pdf(&self, pdf: &[u8]) -> Result<OcrOutcome> {
        let scratch = tempfile::tempdir()?;
        let pdf_path = scratch.path().join("input.pdf");
        tokio::fs::write(&pdf_path, pdf).await?;

        let Some(pages) = self.render_pages(&pdf_path, scratch.path()).await? else {
            return Ok(OcrOutcome::Unavailable);
        };
        debug!("Rendered {} PDF pages at {} dpi", pages.len(), self.dpi);

        let mut texts = Vec::with_capacity(pages.len());
        for page in &pages {
            match self.read_page(page).await? {
                Some(text) => texts.push(text),
                None => return Ok(OcrOutcome::Unavailable),
            }
        }

        let first_page = match pages.first() {
            Some(path) => Some(ImageInput::with_mime(
                tokio::fs::read(path).await?,
                "image/png",
            )),
            None => None,
        };

        Ok(OcrOutcome::Recognized {
            text: texts.join("\n"),
            first_page,
        })
    }
}

/// Map a spawn result: missing executable becomes None
fn tool_output(result: std::io::Result<Output>, tool: &Path) -> Result<Option<Output>> {
    match result {
        Ok(output) => Ok(Some(output)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("OCR tool not found: {}", tool.display());
            Ok(None)
        }
        Err(e) => Err(Error::Io(e)),
    }
}

fn check_status(output: &Output, tool: &str) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(Error::Extraction(format!(
        "{} failed ({}): {}",
        tool,
        output.status,
        stderr.trim()
    )))
}

/// Rendered PNG pages in `dir`, in page order
async fn rendered_pages(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut pages: Vec<(u32, PathBuf)> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.extension().is_some_and(|ext| ext == "png") {
            continue;
        }
        if let Some(n) = page_number(&path) {
            pages.push((n, path));
        }
    }
    pages.sort_by_key(|(n, _)| *n);

    Ok(pages.into_iter().map(|(_, p)| p).collect())
}

/// Page index from pdftoppm's `page-1.png` / `page-01.png` naming
fn page_number(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    stem.rsplit('-').next()?.parse().ok()
}
