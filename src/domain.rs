//! Domain models: generation request, validated MCQs, batch outcomes and diagnostics.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Topic label meaning "no particular chapter/topic".
pub const ANY_TOPIC: &str = "All";

/// Which generation backend a request is routed to.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
  /// Any OpenAI-compatible chat-completions endpoint (OpenAI, Gemini compat, ...).
  #[serde(rename = "openai")]
  OpenAi,
  /// Local Ollama server (`/api/generate`).
  Ollama,
}

impl Provider {
  pub const ALL: [Provider; 2] = [Provider::OpenAi, Provider::Ollama];

  pub fn as_str(&self) -> &'static str {
    match self {
      Provider::OpenAi => "openai",
      Provider::Ollama => "ollama",
    }
  }
}

impl fmt::Display for Provider {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for Provider {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "openai" | "gemini" => Ok(Provider::OpenAi),
      "ollama" | "mistral" => Ok(Provider::Ollama),
      other => Err(format!("unknown provider '{other}'")),
    }
  }
}

/// How the source text was obtained from the uploaded document.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
  Native,
  Ocr,
}

impl fmt::Display for ExtractionMethod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ExtractionMethod::Native => f.write_str("native"),
      ExtractionMethod::Ocr => f.write_str("ocr"),
    }
  }
}

/// Immutable description of one "generate N questions" call.
#[derive(Clone, Debug)]
pub struct McqRequest {
  pub source_text: String,
  pub count: usize,
  pub difficulty: String,
  pub topic: String,
  pub provider: Provider,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
  SingleCorrect,
  TrueFalse,
  FillInTheBlanks,
  MatchTheFollowing,
}

impl QuestionType {
  /// Lenient tag parsing; unknown tags are not an error, just absent.
  pub fn parse(tag: &str) -> Option<Self> {
    let norm: String = tag
      .trim()
      .chars()
      .map(|c| if c == ' ' || c == '-' { '_' } else { c.to_ascii_lowercase() })
      .collect();
    match norm.as_str() {
      "single_correct" | "single" | "mcq" => Some(QuestionType::SingleCorrect),
      "true_false" | "truefalse" => Some(QuestionType::TrueFalse),
      "fill_in_the_blanks" | "fill_in_the_blank" => Some(QuestionType::FillInTheBlanks),
      "match_the_following" => Some(QuestionType::MatchTheFollowing),
      _ => None,
    }
  }
}

/// A question that passed validation but has not been numbered yet.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedMcq {
  pub question: String,
  pub options: Vec<String>,
  pub correct_answer: usize,
  pub explanation: String,
  pub topic: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub question_type: Option<QuestionType>,
}

/// Outward MCQ record. `id` is 1-based and contiguous over one result.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct McqRecord {
  pub id: usize,
  #[serde(flatten)]
  pub mcq: ValidatedMcq,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
  ProviderFailure,
  EmptyResponse,
  ParseFailure,
  ShapeMismatch,
  SchemaViolation,
  CoercedAnswer,
  UnderDelivery,
}

/// Human-readable note about something that degraded the result.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Diagnostic {
  pub kind: DiagnosticKind,
  /// 1-based batch number; `None` for request-level notes.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub batch: Option<usize>,
  pub message: String,
}

impl Diagnostic {
  pub fn new(kind: DiagnosticKind, batch: Option<usize>, message: impl Into<String>) -> Self {
    Self { kind, batch, message: message.into() }
  }

  pub fn with_prefix(mut self, prefix: &str) -> Self {
    self.message = format!("{prefix}: {}", self.message);
    self
  }
}

/// What one batch contributed.
#[derive(Clone, Debug, Default)]
pub struct GenerationOutcome {
  pub records: Vec<ValidatedMcq>,
  pub diagnostics: Vec<Diagnostic>,
}

impl GenerationOutcome {
  pub fn failed(diagnostic: Diagnostic) -> Self {
    Self { records: Vec::new(), diagnostics: vec![diagnostic] }
  }
}

/// Final, numbered question set for one request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct McqSet {
  pub records: Vec<McqRecord>,
  pub requested: usize,
  pub diagnostics: Vec<Diagnostic>,
}

impl McqSet {
  pub fn obtained(&self) -> usize {
    self.records.len()
  }
}
