//! Loading service configuration (prompts + pipeline/extraction/store knobs) from TOML.
//!
//! Every table is optional; missing keys fall back to the defaults below.
//! See `AppConfig` for the expected schema.

use std::path::Path;

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::Provider;

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
  pub prompts: Prompts,
  pub pipeline: PipelineConfig,
  pub extraction: ExtractionConfig,
  pub store: StoreConfig,
  pub server: ServerConfig,
}

/// Prompt templates. Placeholders: `{count}`, `{difficulty}`, `{topic}`, `{text}`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub mcq_template: String,
  pub summary_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      mcq_template: DEFAULT_MCQ_TEMPLATE.into(),
      summary_template: DEFAULT_SUMMARY_TEMPLATE.into(),
    }
  }
}

const DEFAULT_MCQ_TEMPLATE: &str = r#"Create {count} multiple choice questions based on this text extracted from a PDF:

{text}

Requirements:
- difficulty: {difficulty}
- chapter/topic focus: {topic}
- each question must have:
  * a clear question stem
  * exactly 4 options
  * the correct answer as a 0-based index (0, 1, 2 or 3)
  * a concise explanation of why the answer is correct
  * a topic tag
- topic tags must be neither too generic (e.g. "Science") nor too specific (e.g. "Merkle Tree"); pick topics that group several questions so users can filter by them
- optionally a "questionType": one of single_correct, true_false, fill_in_the_blanks, match_the_following
- write questions, options and explanations in the same language as the source text (if the text is in Hindi, answer in Hindi)

Output format: a JSON array, exactly like
[
  {
    "question": "question here",
    "options": ["option1", "option2", "option3", "option4"],
    "correctAnswer": 0,
    "explanation": "why the correct answer is correct",
    "topic": "relevant topic",
    "questionType": "single_correct"
  }
]

Return ONLY the JSON array. No text before or after it, no markdown code fences, no comments."#;

const DEFAULT_SUMMARY_TEMPLATE: &str = r#"Please create a summary of the following text:

{text}

Begin directly with the summary. Make it readable for a general audience while staying formal. Keep it concise. Use markdown: a heading for the title, bullet points for key ideas. Keep the language of the text: if the text is in Hindi, write the summary in Hindi."#;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  pub openai_batch_size: usize,
  pub ollama_batch_size: usize,
  pub generation_timeout_secs: u64,
  pub max_questions: usize,
  pub max_source_chars: usize,
  pub summary_enabled: bool,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      openai_batch_size: 100,
      ollama_batch_size: 10,
      generation_timeout_secs: 120,
      max_questions: 200,
      max_source_chars: 60_000,
      summary_enabled: true,
    }
  }
}

impl PipelineConfig {
  pub fn batch_size(&self, provider: Provider) -> usize {
    match provider {
      Provider::OpenAi => self.openai_batch_size,
      Provider::Ollama => self.ollama_batch_size,
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
  pub min_total_chars: usize,
  pub min_chars_per_page: usize,
  pub ocr_enabled: bool,
  pub ocr_language: String,
  pub ocr_dpi: u32,
  pub pdftoppm_path: String,
  pub tesseract_path: String,
}

impl Default for ExtractionConfig {
  fn default() -> Self {
    Self {
      min_total_chars: 100,
      min_chars_per_page: 25,
      ocr_enabled: true,
      ocr_language: "eng".into(),
      ocr_dpi: 75,
      pdftoppm_path: "pdftoppm".into(),
      tesseract_path: "tesseract".into(),
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  pub max_results: usize,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self { max_results: 256 }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self { max_upload_bytes: 25 * 1024 * 1024 }
  }
}

/// Parse a config file. Errors are returned as display strings for logging.
pub fn load_config_file(path: &Path) -> Result<AppConfig, String> {
  let raw = std::fs::read_to_string(path).map_err(|e| format!("read failed: {e}"))?;
  toml::from_str::<AppConfig>(&raw).map_err(|e| format!("parse failed: {e}"))
}

/// Load `AppConfig` from PDFQUIZ_CONFIG_PATH. Missing variable or any IO/parse error yields defaults.
pub fn load_config_from_env() -> AppConfig {
  let Ok(path) = std::env::var("PDFQUIZ_CONFIG_PATH") else {
    info!(target: "pdfquiz_backend", "PDFQUIZ_CONFIG_PATH not set; using default config");
    return AppConfig::default();
  };
  match load_config_file(Path::new(&path)) {
    Ok(cfg) => {
      info!(target: "pdfquiz_backend", %path, "Loaded config (TOML)");
      cfg
    }
    Err(e) => {
      error!(target: "pdfquiz_backend", %path, error = %e, "Failed to load TOML config; using defaults");
      AppConfig::default()
    }
  }
}
