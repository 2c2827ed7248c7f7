//! MCQ generation flow for one request.
//!
//! plan batches → build prompt → generate (bounded) → repair → assemble.
//! Batches run strictly in order against the shared provider quota; a failed
//! batch contributes a diagnostic and zero records, never an error.

use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::assembler::assemble;
use crate::config::Prompts;
use crate::domain::{Diagnostic, DiagnosticKind, GenerationOutcome, McqRequest, McqSet};
use crate::planner::plan_batches;
use crate::prompt::{build_mcq_prompt, build_summary_prompt};
use crate::provider::{generate_with_timeout, Generate, ProviderError};
use crate::repair::repair_batch;

#[instrument(
  level = "info",
  target = "mcq",
  skip(backend, prompts, request),
  fields(provider = %request.provider, model = backend.model(), count = request.count, text_len = request.source_text.len())
)]
pub async fn generate_mcqs(
  backend: &dyn Generate,
  prompts: &Prompts,
  request: &McqRequest,
  batch_size: usize,
  timeout: Duration,
) -> McqSet {
  let plan = plan_batches(request.count, batch_size);
  let mut outcomes = Vec::with_capacity(plan.len());

  for batch in &plan {
    let prompt = build_mcq_prompt(prompts, &request.source_text, batch.size, &request.difficulty, &request.topic);
    let outcome = match generate_with_timeout(backend, &prompt, timeout).await {
      Ok(raw) => repair_batch(&raw, &request.topic, Some(batch.number)),
      Err(e) => {
        warn!(target: "mcq", batch = batch.number, error = %e, "Generation failed for batch");
        GenerationOutcome::failed(provider_diagnostic(&e, Some(batch.number)))
      }
    };
    info!(
      target: "mcq",
      batch = batch.number,
      requested = batch.size,
      obtained = outcome.records.len(),
      issues = outcome.diagnostics.len(),
      "Batch done"
    );
    outcomes.push(outcome);
  }

  let set = assemble(outcomes, request.count);
  info!(target: "mcq", obtained = set.obtained(), requested = set.requested, batches = plan.len(), "Question set assembled");
  set
}

/// Markdown summary of the source. `Err` carries a diagnostic instead of aborting.
#[instrument(level = "info", target = "mcq", skip(backend, prompts, source_text), fields(model = backend.model(), text_len = source_text.len()))]
pub async fn summarize(
  backend: &dyn Generate,
  prompts: &Prompts,
  source_text: &str,
  timeout: Duration,
) -> Result<String, Diagnostic> {
  let prompt = build_summary_prompt(prompts, source_text);
  match generate_with_timeout(backend, &prompt, timeout).await {
    Ok(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
    Ok(_) => Err(summary_diagnostic(&ProviderError::Empty)),
    Err(e) => {
      warn!(target: "mcq", error = %e, "Summary generation failed");
      Err(summary_diagnostic(&e))
    }
  }
}

/// Any summary failure, blank output included, is reported as a provider failure.
fn summary_diagnostic(e: &ProviderError) -> Diagnostic {
  let message = provider_diagnostic(e, None).message;
  Diagnostic::new(DiagnosticKind::ProviderFailure, None, message).with_prefix("summary")
}

/// Short, client-safe description; the raw provider body only goes to logs.
fn provider_diagnostic(e: &ProviderError, batch: Option<usize>) -> Diagnostic {
  let (kind, message) = match e {
    ProviderError::Empty => (DiagnosticKind::EmptyResponse, "provider returned an empty response".to_string()),
    ProviderError::Timeout(d) => (DiagnosticKind::ProviderFailure, format!("provider timed out after {}s", d.as_secs())),
    ProviderError::Http { status, .. } => (DiagnosticKind::ProviderFailure, format!("provider returned HTTP {status}")),
    ProviderError::Transport(_) => (DiagnosticKind::ProviderFailure, "provider unreachable".to_string()),
    ProviderError::Decode(_) => (DiagnosticKind::ProviderFailure, "provider response could not be decoded".to_string()),
  };
  Diagnostic::new(kind, batch, message)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Provider;
  use crate::provider::testing::Scripted;
  use serde_json::json;

  fn request(count: usize) -> McqRequest {
    McqRequest {
      source_text: "The mitochondria is the powerhouse of the cell.".into(),
      count,
      difficulty: "Medium".into(),
      topic: "All".into(),
      provider: Provider::Ollama,
    }
  }

  fn valid_array(n: usize) -> String {
    let items: Vec<_> = (0..n)
      .map(|i| json!({
        "question": format!("Question {i}?"),
        "options": ["a", "b", "c", "d"],
        "correctAnswer": "1",
        "explanation": "see text",
        "topic": "Cells"
      }))
      .collect();
    serde_json::to_string(&items).unwrap()
  }

  const T: Duration = Duration::from_secs(5);

  #[tokio::test]
  async fn fenced_response_end_to_end() {
    let backend = Scripted::ok(&[&format!("```json\n{}\n```", valid_array(3))]);
    let set = generate_mcqs(&backend, &Prompts::default(), &request(3), 10, T).await;
    assert_eq!(set.records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(set.diagnostics.is_empty());
    assert!(set.records.iter().all(|r| r.mcq.correct_answer == 1));
  }

  #[tokio::test]
  async fn prose_wrapped_single_object() {
    let backend = Scripted::ok(&[&format!("Sure! Here you go: {} Hope that helps!", valid_array(1))]);
    let set = generate_mcqs(&backend, &Prompts::default(), &request(1), 10, T).await;
    assert_eq!(set.obtained(), 1);
    assert!(set.diagnostics.is_empty());
  }

  #[tokio::test]
  async fn garbage_batch_does_not_abort_siblings() {
    let backend = Scripted::ok(&[&valid_array(2), "not json at all", &valid_array(1)]);
    let set = generate_mcqs(&backend, &Prompts::default(), &request(5), 2, T).await;
    assert_eq!(backend.prompt_count(), 3);
    assert_eq!(set.obtained(), 3);
    assert_eq!(set.records.last().unwrap().id, 3);
    let kinds: Vec<_> = set.diagnostics.iter().map(|d| (d.kind, d.batch)).collect();
    assert_eq!(
      kinds,
      vec![(DiagnosticKind::ParseFailure, Some(2)), (DiagnosticKind::UnderDelivery, None)]
    );
  }

  #[tokio::test]
  async fn provider_errors_become_diagnostics() {
    let backend = Scripted::new(vec![
      Err(ProviderError::Http { status: 429, message: "quota exhausted for key sk-...".into() }),
      Ok(valid_array(1)),
    ]);
    let set = generate_mcqs(&backend, &Prompts::default(), &request(2), 1, T).await;
    assert_eq!(set.obtained(), 1);
    assert_eq!(set.diagnostics[0].kind, DiagnosticKind::ProviderFailure);
    assert_eq!(set.diagnostics[0].message, "provider returned HTTP 429");
    assert!(!set.diagnostics[0].message.contains("sk-"));
  }

  #[tokio::test]
  async fn timed_out_batch_is_a_provider_failure() {
    let backend = Scripted::slow(Duration::from_millis(300));
    let set = generate_mcqs(&backend, &Prompts::default(), &request(1), 10, Duration::from_millis(20)).await;
    assert_eq!(set.obtained(), 0);
    assert_eq!(set.diagnostics[0].kind, DiagnosticKind::ProviderFailure);
    assert_eq!(set.diagnostics[1].kind, DiagnosticKind::UnderDelivery);
  }

  #[tokio::test]
  async fn prompts_follow_batch_plan() {
    let backend = Scripted::ok(&["[]", "[]", "[]"]);
    generate_mcqs(&backend, &Prompts::default(), &request(25), 10, T).await;
    let prompts = backend.prompts.lock().unwrap();
    assert!(prompts[0].contains("Create 10 multiple"));
    assert!(prompts[1].contains("Create 10 multiple"));
    assert!(prompts[2].contains("Create 5 multiple"));
  }

  #[tokio::test]
  async fn summary_failure_is_a_diagnostic() {
    let backend = Scripted::new(vec![Err(ProviderError::Transport("refused".into()))]);
    let err = summarize(&backend, &Prompts::default(), "text", T).await.unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::ProviderFailure);
    assert_eq!(err.message, "summary: provider unreachable");

    let empty = Scripted::new(vec![Err(ProviderError::Empty)]);
    let err = summarize(&empty, &Prompts::default(), "text", T).await.unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::ProviderFailure);
    assert_eq!(err.message, "summary: provider returned an empty response");

    let blank = Scripted::ok(&["   \n"]);
    let err = summarize(&blank, &Prompts::default(), "text", T).await.unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::ProviderFailure);

    let ok = Scripted::ok(&["  # Title\n- point  "]);
    assert_eq!(summarize(&ok, &Prompts::default(), "text", T).await.unwrap(), "# Title\n- point");
  }
}
