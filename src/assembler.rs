//! Flattens per-batch outcomes into the final numbered question set.

use std::collections::HashSet;

use tracing::info;

use crate::domain::{Diagnostic, DiagnosticKind, GenerationOutcome, McqRecord, McqSet};

/// Concatenate outcomes in batch order and number records 1..=n.
/// Under-delivery is annotated, never an error.
pub fn assemble(outcomes: Vec<GenerationOutcome>, requested: usize) -> McqSet {
  let mut records = Vec::new();
  let mut diagnostics = Vec::new();

  for outcome in outcomes {
    records.extend(outcome.records);
    diagnostics.extend(outcome.diagnostics);
  }

  let records: Vec<McqRecord> = records
    .into_iter()
    .enumerate()
    .map(|(i, mcq)| McqRecord { id: i + 1, mcq })
    .collect();

  if records.len() < requested {
    info!(target: "mcq", obtained = records.len(), requested, "Under-delivered question set");
    diagnostics.push(Diagnostic::new(
      DiagnosticKind::UnderDelivery,
      None,
      format!("obtained {}/{} questions", records.len(), requested),
    ));
  }

  McqSet { records, requested, diagnostics }
}

/// Distinct topics in first-seen order, compared case-insensitively.
pub fn distinct_topics(records: &[McqRecord]) -> Vec<String> {
  let mut seen = HashSet::new();
  records
    .iter()
    .map(|r| r.mcq.topic.trim())
    .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
    .map(str::to_string)
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::ValidatedMcq;

  fn mcq(q: &str, topic: &str) -> ValidatedMcq {
    ValidatedMcq {
      question: q.into(),
      options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
      correct_answer: 0,
      explanation: String::new(),
      topic: topic.into(),
      question_type: None,
    }
  }

  fn outcome(qs: &[&str]) -> GenerationOutcome {
    GenerationOutcome { records: qs.iter().map(|q| mcq(q, "T")).collect(), diagnostics: vec![] }
  }

  #[test]
  fn ids_are_contiguous_across_batches() {
    let set = assemble(vec![outcome(&["A", "B"]), outcome(&["C"])], 3);
    let ids: Vec<(usize, &str)> = set.records.iter().map(|r| (r.id, r.mcq.question.as_str())).collect();
    assert_eq!(ids, vec![(1, "A"), (2, "B"), (3, "C")]);
    assert!(set.diagnostics.is_empty());
  }

  #[test]
  fn under_delivery_is_annotated_after_batch_diagnostics() {
    let failed = GenerationOutcome::failed(Diagnostic::new(DiagnosticKind::ParseFailure, Some(2), "x"));
    let set = assemble(vec![outcome(&["A"]), failed], 5);
    assert_eq!(set.obtained(), 1);
    assert_eq!(set.diagnostics.len(), 2);
    assert_eq!(set.diagnostics[0].kind, DiagnosticKind::ParseFailure);
    assert_eq!(set.diagnostics[1].kind, DiagnosticKind::UnderDelivery);
    assert_eq!(set.diagnostics[1].message, "obtained 1/5 questions");
  }

  #[test]
  fn over_delivery_is_kept_and_not_flagged() {
    let set = assemble(vec![outcome(&["A", "B", "C"])], 2);
    assert_eq!(set.obtained(), 3);
    assert!(set.diagnostics.is_empty());
  }

  #[test]
  fn topics_are_deduplicated_in_order() {
    let records: Vec<McqRecord> = [("q1", "Cells"), ("q2", "Energy"), ("q3", "cells "), ("q4", "")]
      .iter()
      .enumerate()
      .map(|(i, (q, t))| McqRecord { id: i + 1, mcq: mcq(q, t) })
      .collect();
    assert_eq!(distinct_topics(&records), vec!["Cells", "Energy"]);
  }
}
