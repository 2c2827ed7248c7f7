//! Tolerant conversion of raw provider output into validated MCQs.
//!
//! Handles the usual LLM output issues:
//! - Markdown code fence wrapping (```json ... ```)
//! - Prose before/after the array ("Sure! Here you go: [...] Hope that helps!")
//! - Trailing commas before `]` / `}`
//! - Type-inconsistent fields (`"correctAnswer": "2"`, numeric options)
//!
//! Nothing here returns an error: every problem becomes a `Diagnostic` and the
//! batch contributes whatever records survived.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::{Diagnostic, DiagnosticKind, GenerationOutcome, QuestionType, ValidatedMcq};
use crate::util::trunc_for_log;

pub const REQUIRED_FIELDS: [&str; 4] = ["question", "options", "correctAnswer", "explanation"];
pub const OPTION_COUNT: usize = 4;

/// Run the full repair pass over one batch's raw output.
///
/// `default_topic` fills records whose `topic` is missing or blank.
/// `batch` is only used to attribute diagnostics.
pub fn repair_batch(raw: &str, default_topic: &str, batch: Option<usize>) -> GenerationOutcome {
  if raw.trim().is_empty() {
    return GenerationOutcome::failed(Diagnostic::new(
      DiagnosticKind::EmptyResponse,
      batch,
      "provider returned an empty response",
    ));
  }

  let unfenced = strip_code_fences(raw);
  let Some(candidate) = extract_array_span(unfenced) else {
    return GenerationOutcome::failed(no_array_diagnostic(raw, unfenced, batch));
  };

  let items: Vec<Value> = match parse_lenient(candidate) {
    Ok(v) => v,
    Err(e) => {
      warn!(target: "mcq", ?batch, error = %e, "Provider output is not valid JSON");
      return GenerationOutcome::failed(Diagnostic::new(
        DiagnosticKind::ParseFailure,
        batch,
        format!("provider output is not valid JSON: {e}"),
      ));
    }
  };

  let mut outcome = GenerationOutcome::default();
  let mut dropped = 0usize;
  let mut defaulted = 0usize;

  for (idx, item) in items.iter().enumerate() {
    match validate_element(item, default_topic) {
      Ok((mcq, answer_defaulted)) => {
        if answer_defaulted {
          warn!(target: "mcq", ?batch, element = idx, raw_answer = %item.get("correctAnswer").map(|v| v.to_string()).unwrap_or_default(), "correctAnswer unusable; defaulted to 0");
          defaulted += 1;
        }
        outcome.records.push(mcq);
      }
      Err(reason) => {
        debug!(target: "mcq", ?batch, element = idx, %reason, "Dropping malformed element");
        dropped += 1;
      }
    }
  }

  if dropped > 0 {
    outcome.diagnostics.push(Diagnostic::new(
      DiagnosticKind::SchemaViolation,
      batch,
      format!("dropped {dropped} of {} element(s) that did not match the question schema", items.len()),
    ));
  }
  if defaulted > 0 {
    outcome.diagnostics.push(Diagnostic::new(
      DiagnosticKind::CoercedAnswer,
      batch,
      format!("correctAnswer defaulted to 0 for {defaulted} question(s)"),
    ));
  }
  outcome
}

/// Remove a leading ```lang line and a trailing ``` if present.
pub fn strip_code_fences(raw: &str) -> &str {
  let mut s = raw.trim().trim_start_matches('\u{feff}');
  if s.starts_with("```") {
    s = match s.find('\n') {
      Some(nl) => &s[nl + 1..],
      None => s.trim_start_matches('`'),
    };
  }
  if let Some(stripped) = s.trim_end().strip_suffix("```") {
    s = stripped;
  }
  s.trim()
}

/// Greedy span from the first `[` to the last `]`.
pub fn extract_array_span(s: &str) -> Option<&str> {
  let start = s.find('[')?;
  let end = s.rfind(']')?;
  (end > start).then(|| &s[start..=end])
}

/// Parse as JSON; on failure retry once with trailing commas removed.
/// Output with no `[` at all: well-formed JSON of another shape (an error
/// object, a bare string) is a shape mismatch, anything else a parse failure.
fn no_array_diagnostic(raw: &str, unfenced: &str, batch: Option<usize>) -> Diagnostic {
  match parse_lenient::<Value>(unfenced.trim()) {
    Ok(other) => {
      let kind = json_kind(&other);
      warn!(target: "mcq", ?batch, %kind, "Provider output is JSON but not an array");
      Diagnostic::new(
        DiagnosticKind::ShapeMismatch,
        batch,
        format!("provider output is a JSON {kind}, not an array"),
      )
    }
    Err(_) => {
      debug!(target: "mcq", ?batch, preview = %trunc_for_log(raw, 120), "No JSON array in provider output");
      Diagnostic::new(DiagnosticKind::ParseFailure, batch, "no JSON array found in provider output")
    }
  }
}

fn json_kind(v: &Value) -> &'static str {
  match v {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

fn parse_lenient<T: DeserializeOwned>(candidate: &str) -> Result<T, serde_json::Error> {
  match serde_json::from_str::<T>(candidate) {
    Ok(v) => Ok(v),
    Err(first) => {
      let fixed = remove_trailing_commas(candidate);
      if fixed.len() == candidate.len() {
        return Err(first);
      }
      serde_json::from_str::<T>(&fixed)
        .map(|v| {
          debug!(target: "mcq", "JSON repaired by removing trailing commas");
          v
        })
        .map_err(|_| first)
    }
  }
}

/// Drop commas directly followed (modulo whitespace) by `]` or `}`, outside strings.
fn remove_trailing_commas(s: &str) -> String {
  let chars: Vec<char> = s.chars().collect();
  let mut out = String::with_capacity(s.len());
  let mut in_string = false;
  let mut escape = false;

  for (i, &ch) in chars.iter().enumerate() {
    if in_string {
      out.push(ch);
      if escape {
        escape = false;
      } else if ch == '\\' {
        escape = true;
      } else if ch == '"' {
        in_string = false;
      }
      continue;
    }
    match ch {
      '"' => {
        in_string = true;
        out.push(ch);
      }
      ',' => {
        let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
        if !matches!(next, Some(']') | Some('}')) {
          out.push(ch);
        }
      }
      _ => out.push(ch),
    }
  }
  out
}

/// Validate one array element. Returns the record and whether `correctAnswer` was defaulted.
fn validate_element(item: &Value, default_topic: &str) -> Result<(ValidatedMcq, bool), String> {
  let Value::Object(obj) = item else {
    return Err("element is not an object".into());
  };
  if let Some(missing) = REQUIRED_FIELDS
    .iter()
    .find(|k| obj.get(**k).map_or(true, Value::is_null))
  {
    return Err(format!("missing required field '{missing}'"));
  }

  let question = match &obj["question"] {
    Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
    _ => return Err("question must be a non-empty string".into()),
  };
  let explanation = match &obj["explanation"] {
    Value::String(s) => s.trim().to_string(),
    _ => return Err("explanation must be a string".into()),
  };
  let options = coerce_options(&obj["options"])?;

  let (correct_answer, defaulted) = match coerce_answer(&obj["correctAnswer"], options.len()) {
    Some(i) => (i, false),
    None => (0, true),
  };

  Ok((
    ValidatedMcq {
      question,
      options,
      correct_answer,
      explanation,
      topic: topic_or_default(obj, default_topic),
      question_type: obj
        .get("questionType")
        .and_then(Value::as_str)
        .and_then(QuestionType::parse),
    },
    defaulted,
  ))
}

fn coerce_options(v: &Value) -> Result<Vec<String>, String> {
  let Value::Array(items) = v else {
    return Err("options must be an array".into());
  };
  if items.len() != OPTION_COUNT {
    return Err(format!("expected {OPTION_COUNT} options, got {}", items.len()));
  }
  items
    .iter()
    .map(|o| match o {
      Value::String(s) => Ok(s.trim().to_string()),
      Value::Number(n) => Ok(n.to_string()),
      Value::Bool(b) => Ok(b.to_string()),
      _ => Err("options must be scalar values".to_string()),
    })
    .collect()
}

/// Interpret `correctAnswer` as a 0-based index below `option_count`.
///
/// Accepts integers, integral floats, numeral strings and single option letters.
/// `None` means the caller applies the documented fallback of 0.
pub fn coerce_answer(v: &Value, option_count: usize) -> Option<usize> {
  let idx = match v {
    Value::Number(n) => n
      .as_u64()
      .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
      .and_then(|u| usize::try_from(u).ok()),
    Value::String(s) => parse_answer_text(s.trim()),
    _ => None,
  }?;
  (idx < option_count).then_some(idx)
}

fn parse_answer_text(s: &str) -> Option<usize> {
  if let Ok(i) = s.parse::<usize>() {
    return Some(i);
  }
  if let Ok(f) = s.parse::<f64>() {
    if f >= 0.0 && f.fract() == 0.0 {
      return Some(f as usize);
    }
  }
  let mut chars = s.chars();
  match (chars.next(), chars.next()) {
    (Some(c), None) if c.is_ascii_alphabetic() => {
      let idx = (c.to_ascii_uppercase() as u8).checked_sub(b'A')? as usize;
      (idx < OPTION_COUNT).then_some(idx)
    }
    _ => None,
  }
}

fn topic_or_default(obj: &Map<String, Value>, default_topic: &str) -> String {
  obj
    .get("topic")
    .and_then(Value::as_str)
    .map(str::trim)
    .filter(|t| !t.is_empty())
    .unwrap_or(default_topic)
    .to_string()
}
