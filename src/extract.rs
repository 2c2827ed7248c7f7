//! Text source: native PDF text first, OCR when the text layer is too thin.
//!
//! Flow:
//! 1) `pdf_extract` pulls per-page text (on a blocking thread; it may panic on
//!    malformed input, so the call is wrapped in `catch_unwind`).
//! 2) If the text is shorter than `min_total_chars`, or averages fewer than
//!    `min_chars_per_page` characters per page, the document is treated as scanned.
//! 3) Scanned documents go through `pdftoppm` + `tesseract`.
//! 4) If OCR is unavailable or fails, any non-blank native text is still used.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::config::ExtractionConfig;
use crate::domain::ExtractionMethod;

#[derive(Debug, Error)]
pub enum ExtractError {
  #[error("PDF text extraction failed: {0}")]
  Native(String),
  #[error("OCR failed: {0}")]
  Ocr(String),
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("no text could be extracted from the document")]
  Empty,
}

/// Native text layer, one string per page.
pub trait PageExtractor: Send + Sync {
  fn pages(&self, pdf: &[u8]) -> Result<Vec<String>, ExtractError>;
}

/// Optical character recognition over the whole document.
#[async_trait]
pub trait OcrEngine: Send + Sync {
  async fn recognize(&self, pdf: &[u8]) -> Result<String, ExtractError>;
}

#[derive(Clone, Debug)]
pub struct ExtractedText {
  pub text: String,
  pub method: ExtractionMethod,
  pub pages: usize,
}

/// Thresholds below which native text is considered too thin to trust.
#[derive(Clone, Copy, Debug)]
pub struct DensityPolicy {
  pub min_total_chars: usize,
  pub min_chars_per_page: usize,
}

impl DensityPolicy {
  pub fn needs_ocr(&self, pages: &[String]) -> bool {
    let total: usize = pages.iter().map(|p| p.trim().chars().count()).sum();
    let page_count = pages.len().max(1);
    total < self.min_total_chars || total / page_count < self.min_chars_per_page
  }
}

#[derive(Clone)]
pub struct TextSource {
  native: Arc<dyn PageExtractor>,
  ocr: Option<Arc<dyn OcrEngine>>,
  policy: DensityPolicy,
}

impl TextSource {
  pub fn new(native: Arc<dyn PageExtractor>, ocr: Option<Arc<dyn OcrEngine>>, policy: DensityPolicy) -> Self {
    Self { native, ocr, policy }
  }

  pub fn from_config(cfg: &ExtractionConfig) -> Self {
    let ocr = cfg.ocr_enabled.then(|| Arc::new(TesseractOcr::from_config(cfg)) as Arc<dyn OcrEngine>);
    Self::new(
      Arc::new(PdfExtractPages),
      ocr,
      DensityPolicy {
        min_total_chars: cfg.min_total_chars,
        min_chars_per_page: cfg.min_chars_per_page,
      },
    )
  }

  #[instrument(level = "info", target = "extract", skip(self, pdf), fields(bytes = pdf.len()))]
  pub async fn extract(&self, pdf: Vec<u8>) -> Result<ExtractedText, ExtractError> {
    let native = self.native.clone();
    let (pdf, native_res) = tokio::task::spawn_blocking(move || {
      let res = native.pages(&pdf);
      (pdf, res)
    })
    .await
    .map_err(|e| ExtractError::Native(format!("extraction task failed: {e}")))?;

    let pages = match native_res {
      Ok(pages) => pages,
      Err(e) => {
        warn!(target: "extract", error = %e, "Native extraction failed; trying OCR");
        Vec::new()
      }
    };
    let native_text = pages.iter().map(|p| p.trim()).filter(|p| !p.is_empty()).collect::<Vec<_>>().join("\n\n");

    if !pages.is_empty() && !self.policy.needs_ocr(&pages) {
      info!(target: "extract", pages = pages.len(), chars = native_text.chars().count(), "Used native text layer");
      return Ok(ExtractedText { text: native_text, method: ExtractionMethod::Native, pages: pages.len() });
    }

    debug!(target: "extract", pages = pages.len(), chars = native_text.chars().count(), "Native text too thin; falling back to OCR");
    let ocr_result = match &self.ocr {
      Some(ocr) => ocr.recognize(&pdf).await,
      None => Err(ExtractError::Ocr("OCR disabled".into())),
    };

    match ocr_result {
      Ok(text) if !text.trim().is_empty() => {
        info!(target: "extract", chars = text.chars().count(), "Used OCR text");
        Ok(ExtractedText { text, method: ExtractionMethod::Ocr, pages: pages.len() })
      }
      Ok(_) | Err(_) if !native_text.trim().is_empty() => {
        warn!(target: "extract", "OCR produced nothing usable; keeping thin native text");
        Ok(ExtractedText { text: native_text, method: ExtractionMethod::Native, pages: pages.len() })
      }
      Ok(_) => Err(ExtractError::Empty),
      Err(e) => {
        warn!(target: "extract", error = %e, "OCR failed and no native text available");
        Err(ExtractError::Empty)
      }
    }
  }
}

/// `pdf_extract`-backed native text layer.
pub struct PdfExtractPages;

impl PageExtractor for PdfExtractPages {
  fn pages(&self, pdf: &[u8]) -> Result<Vec<String>, ExtractError> {
    let result = panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem_by_pages(pdf)));
    match result {
      Ok(Ok(pages)) => Ok(pages.iter().map(|p| clean_page(p)).collect()),
      Ok(Err(e)) => Err(ExtractError::Native(e.to_string())),
      Err(_) => Err(ExtractError::Native("extractor panicked (malformed document)".into())),
    }
  }
}

/// Trim trailing whitespace per line and collapse runs of blank lines.
fn clean_page(raw: &str) -> String {
  let mut out = String::with_capacity(raw.len());
  let mut blank_run = 0usize;
  for line in raw.lines().map(str::trim_end) {
    if line.is_empty() {
      blank_run += 1;
      if blank_run <= 1 {
        out.push('\n');
      }
    } else {
      blank_run = 0;
      out.push_str(line);
      out.push('\n');
    }
  }
  out.trim_matches('\n').replace('\u{0}', "")
}

/// `pdftoppm` renders pages to PNG, `tesseract` reads them back.
pub struct TesseractOcr {
  pub pdftoppm_path: String,
  pub tesseract_path: String,
  pub language: String,
  pub dpi: u32,
}

impl TesseractOcr {
  pub fn from_config(cfg: &ExtractionConfig) -> Self {
    Self {
      pdftoppm_path: cfg.pdftoppm_path.clone(),
      tesseract_path: cfg.tesseract_path.clone(),
      language: cfg.ocr_language.clone(),
      dpi: cfg.ocr_dpi,
    }
  }

  async fn render_pages(&self, pdf: &[u8], dir: &std::path::Path) -> Result<Vec<PathBuf>, ExtractError> {
    let input = dir.join("input.pdf");
    tokio::fs::write(&input, pdf).await?;

    let output = Command::new(&self.pdftoppm_path)
      .arg("-png")
      .arg("-gray")
      .arg("-r")
      .arg(self.dpi.to_string())
      .arg(&input)
      .arg(dir.join("page"))
      .output()
      .await
      .map_err(|e| ExtractError::Ocr(format!("failed to run {}: {e}", self.pdftoppm_path)))?;
    if !output.status.success() {
      return Err(ExtractError::Ocr(format!(
        "pdftoppm failed: {}",
        String::from_utf8_lossy(&output.stderr).trim()
      )));
    }

    let mut images = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
      let path = entry.path();
      if path.extension().and_then(|e| e.to_str()) == Some("png") {
        images.push(path);
      }
    }
    // pdftoppm zero-pads page numbers, so lexical order is page order.
    images.sort();
    Ok(images)
  }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
  #[instrument(level = "info", target = "extract", skip(self, pdf), fields(lang = %self.language, dpi = self.dpi))]
  async fn recognize(&self, pdf: &[u8]) -> Result<String, ExtractError> {
    let dir = tempfile::tempdir()?;
    let images = self.render_pages(pdf, dir.path()).await?;
    if images.is_empty() {
      return Err(ExtractError::Ocr("pdftoppm produced no images".into()));
    }

    let mut text = String::new();
    for (i, image) in images.iter().enumerate() {
      let output = Command::new(&self.tesseract_path)
        .arg(image)
        .arg("stdout")
        .arg("-l")
        .arg(&self.language)
        .arg("--psm")
        .arg("6")
        .output()
        .await
        .map_err(|e| ExtractError::Ocr(format!("failed to run {}: {e}", self.tesseract_path)))?;
      if !output.status.success() {
        warn!(target: "extract", page = i + 1, stderr = %String::from_utf8_lossy(&output.stderr).trim(), "tesseract reported an error");
      }
      text.push_str(&format!("--- Page {} ---\n{}\n\n", i + 1, String::from_utf8_lossy(&output.stdout).trim()));
    }
    info!(target: "extract", pages = images.len(), chars = text.len(), "OCR complete");
    Ok(text)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct FixedPages(Vec<String>);
  impl PageExtractor for FixedPages {
    fn pages(&self, _pdf: &[u8]) -> Result<Vec<String>, ExtractError> {
      Ok(self.0.clone())
    }
  }

  struct FailingPages;
  impl PageExtractor for FailingPages {
    fn pages(&self, _pdf: &[u8]) -> Result<Vec<String>, ExtractError> {
      Err(ExtractError::Native("bad xref".into()))
    }
  }

  struct FakeOcr {
    reply: Option<String>,
    calls: AtomicUsize,
  }
  #[async_trait]
  impl OcrEngine for FakeOcr {
    async fn recognize(&self, _pdf: &[u8]) -> Result<String, ExtractError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.reply.clone().ok_or_else(|| ExtractError::Ocr("tesseract missing".into()))
    }
  }

  const POLICY: DensityPolicy = DensityPolicy { min_total_chars: 100, min_chars_per_page: 25 };

  fn source(pages: Vec<&str>, ocr: Option<&str>) -> (TextSource, Arc<FakeOcr>) {
    let fake = Arc::new(FakeOcr { reply: ocr.map(str::to_string), calls: AtomicUsize::new(0) });
    let src = TextSource::new(
      Arc::new(FixedPages(pages.into_iter().map(String::from).collect())),
      Some(fake.clone() as Arc<dyn OcrEngine>),
      POLICY,
    );
    (src, fake)
  }

  #[tokio::test]
  async fn thin_five_page_pdf_falls_back_to_ocr() {
    let (src, ocr) = source(vec!["ab", "cd", "ef", "gh", "ij"], Some("Scanned chapter text"));
    let out = src.extract(b"%PDF".to_vec()).await.unwrap();
    assert_eq!(out.method, ExtractionMethod::Ocr);
    assert_eq!(out.text, "Scanned chapter text");
    assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn dense_text_stays_native() {
    let page = "x".repeat(120);
    let (src, ocr) = source(vec![&page, &page], Some("unused"));
    let out = src.extract(b"%PDF".to_vec()).await.unwrap();
    assert_eq!(out.method, ExtractionMethod::Native);
    assert_eq!(out.pages, 2);
    assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn ocr_failure_keeps_thin_native_text() {
    let (src, _) = source(vec!["only a few words"], None);
    let out = src.extract(b"%PDF".to_vec()).await.unwrap();
    assert_eq!(out.method, ExtractionMethod::Native);
    assert_eq!(out.text, "only a few words");
  }

  #[tokio::test]
  async fn image_only_pdf_without_ocr_is_empty() {
    let (src, _) = source(vec!["", "  "], Some("   "));
    assert!(matches!(src.extract(b"%PDF".to_vec()).await, Err(ExtractError::Empty)));
  }

  #[tokio::test]
  async fn native_error_goes_to_ocr() {
    let fake = Arc::new(FakeOcr { reply: Some("recovered".into()), calls: AtomicUsize::new(0) });
    let src = TextSource::new(Arc::new(FailingPages), Some(fake as Arc<dyn OcrEngine>), POLICY);
    let out = src.extract(b"junk".to_vec()).await.unwrap();
    assert_eq!(out.method, ExtractionMethod::Ocr);
  }

  #[test]
  fn density_policy_checks_total_and_per_page() {
    let long = "y".repeat(150);
    assert!(!POLICY.needs_ocr(&[long.clone()]));
    // 150 chars over 10 pages averages 15 per page
    let mut sparse = vec![long];
    sparse.extend(std::iter::repeat(String::new()).take(9));
    assert!(POLICY.needs_ocr(&sparse));
    assert!(POLICY.needs_ocr(&[]));
  }

  #[test]
  fn clean_page_collapses_blank_runs() {
    assert_eq!(clean_page("a  \n\n\n\nb\n\n"), "a\n\nb");
  }

  #[test]
  fn garbage_bytes_are_an_error_not_a_panic() {
    assert!(PdfExtractPages.pages(b"definitely not a pdf").is_err());
  }
}
