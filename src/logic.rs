//! Core behaviors behind the HTTP handlers.
//!
//! This includes:
//!   - Validating generate parameters and picking the backend
//!   - Running extraction → summary → MCQ generation with timing
//!   - Storing the result under a fresh id
//!   - Rendering stored results for download (plain text, JSON)

use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use crate::assembler::distinct_topics;
use crate::domain::{McqRequest, Provider, ANY_TOPIC};
use crate::error::AppError;
use crate::pipeline::{generate_mcqs, summarize};
use crate::protocol::{GenerateOut, GenerateParams, Metadata, Timing};
use crate::state::{AppState, ResultStore};
use crate::util::{format_secs, option_letter, truncate_chars};

const DEFAULT_QUESTION_COUNT: usize = 5;
const DEFAULT_DIFFICULTY: &str = "Medium";

/// Validated, defaulted form parameters.
#[derive(Debug)]
struct Resolved {
  count: usize,
  difficulty: String,
  topic: String,
  provider: Provider,
}

fn non_blank(v: &Option<String>) -> Option<&str> {
  v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn resolve_params(state: &AppState, params: &GenerateParams) -> Result<Resolved, AppError> {
  let max = state.config.pipeline.max_questions;
  let count = match non_blank(&params.question_count) {
    None => DEFAULT_QUESTION_COUNT,
    Some(raw) => raw
      .parse::<usize>()
      .map_err(|_| AppError::BadRequest(format!("question_count must be a positive integer, got '{raw}'")))?,
  };
  if count == 0 || count > max {
    return Err(AppError::BadRequest(format!("question_count must be between 1 and {max}")));
  }

  let provider = match non_blank(&params.provider) {
    Some(raw) => raw.parse::<Provider>().map_err(AppError::BadRequest)?,
    None => state
      .default_provider
      .ok_or_else(|| AppError::ProviderUnavailable("no generation provider is configured".into()))?,
  };
  if state.providers.get(provider).is_none() {
    return Err(AppError::ProviderUnavailable(format!("provider '{provider}' is not configured")));
  }

  Ok(Resolved {
    count,
    difficulty: non_blank(&params.difficulty).unwrap_or(DEFAULT_DIFFICULTY).to_string(),
    topic: non_blank(&params.topic).unwrap_or(ANY_TOPIC).to_string(),
    provider,
  })
}

/// Full generate flow for one uploaded document. Only bad input, a missing
/// provider, or an unreadable document fail the call.
#[instrument(level = "info", skip(state, pdf, params), fields(bytes = pdf.len()))]
pub async fn process_document(
  state: &AppState,
  pdf: Vec<u8>,
  params: GenerateParams,
) -> Result<GenerateOut, AppError> {
  if pdf.is_empty() {
    return Err(AppError::BadRequest("pdf_file is empty".into()));
  }
  let resolved = resolve_params(state, &params)?;
  let backend = state
    .providers
    .get(resolved.provider)
    .cloned()
    .ok_or_else(|| AppError::ProviderUnavailable(format!("provider '{}' is not configured", resolved.provider)))?;
  let pipeline = &state.config.pipeline;
  let timeout = Duration::from_secs(pipeline.generation_timeout_secs);

  let started = Instant::now();
  let extracted = state.text_source.extract(pdf).await?;
  let extraction_time = started.elapsed();

  let full_chars = extracted.text.chars().count();
  let source_text = truncate_chars(&extracted.text, pipeline.max_source_chars).to_string();
  if full_chars > pipeline.max_source_chars {
    warn!(target: "pdfquiz_backend", full_chars, kept = pipeline.max_source_chars, "Source text truncated before prompting");
  }

  let mut diagnostics = Vec::new();
  let summary_started = Instant::now();
  let summary = if pipeline.summary_enabled {
    match summarize(backend.as_ref(), &state.config.prompts, &source_text, timeout).await {
      Ok(s) => Some(s),
      Err(d) => {
        diagnostics.push(d);
        None
      }
    }
  } else {
    None
  };
  let summary_time = summary_started.elapsed();

  let request = McqRequest {
    source_text,
    count: resolved.count,
    difficulty: resolved.difficulty.clone(),
    topic: resolved.topic.clone(),
    provider: resolved.provider,
  };
  let mcq_started = Instant::now();
  let set = generate_mcqs(
    backend.as_ref(),
    &state.config.prompts,
    &request,
    pipeline.batch_size(resolved.provider),
    timeout,
  )
  .await;
  let mcq_time = mcq_started.elapsed();

  let obtained = set.obtained();
  diagnostics.extend(set.diagnostics);
  let out = GenerateOut {
    id: ResultStore::new_id(),
    summary,
    topics: distinct_topics(&set.records),
    mcqs: set.records,
    metadata: Metadata {
      chapter: resolved.topic,
      difficulty: resolved.difficulty,
      question_count: resolved.count,
      obtained_count: obtained,
      extraction_method: extracted.method,
      provider: resolved.provider,
      model: backend.model().to_string(),
    },
    timing: Timing {
      extraction_time: format_secs(extraction_time),
      summary_time: format_secs(summary_time),
      mcq_time: format_secs(mcq_time),
      total_time: format_secs(started.elapsed()),
    },
    diagnostics,
  };

  let stored = state.results.insert(out).await;
  info!(
    target: "pdfquiz_backend",
    id = %stored.id,
    method = %stored.metadata.extraction_method,
    provider = %stored.metadata.provider,
    requested = stored.metadata.question_count,
    obtained,
    diagnostics = stored.diagnostics.len(),
    total = %stored.timing.total_time,
    "Generate request complete"
  );
  Ok((*stored).clone())
}

/// Plain-text export: summary, then numbered questions with lettered options.
pub fn render_txt(result: &GenerateOut) -> String {
  let mut content = String::from("📄 Summary\n");
  content.push_str(result.summary.as_deref().unwrap_or("(no summary available)"));
  content.push_str("\n\n📝 Multiple Choice Questions\n");
  for rec in &result.mcqs {
    let mcq = &rec.mcq;
    content.push_str(&format!("{}. {}\n", rec.id, mcq.question));
    for (idx, opt) in mcq.options.iter().enumerate() {
      content.push_str(&format!("   {}. {}\n", option_letter(idx), opt));
    }
    let answer = mcq.options.get(mcq.correct_answer).map(String::as_str).unwrap_or("");
    content.push_str(&format!(
      "✅ Correct Answer: {}. {}\n",
      option_letter(mcq.correct_answer),
      answer
    ));
    content.push_str(&format!("ℹ Explanation: {}\n\n", mcq.explanation));
  }
  content
}

/// JSON export: the outward MCQ array only.
pub fn render_json(result: &GenerateOut) -> Result<String, AppError> {
  serde_json::to_string_pretty(&result.mcqs).map_err(|e| AppError::Internal(format!("JSON export failed: {e}")))
}
