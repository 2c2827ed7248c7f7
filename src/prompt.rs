//! Prompt construction for question and summary generation. Pure string building.

use crate::config::Prompts;
use crate::util::fill_template;

/// Prompt asking for exactly `batch_count` questions as a bare JSON array.
pub fn build_mcq_prompt(
  prompts: &Prompts,
  source_text: &str,
  batch_count: usize,
  difficulty: &str,
  topic: &str,
) -> String {
  let count = batch_count.to_string();
  fill_template(
    &prompts.mcq_template,
    &[
      ("count", count.as_str()),
      ("difficulty", difficulty),
      ("topic", topic),
      ("text", source_text),
    ],
  )
}

pub fn build_summary_prompt(prompts: &Prompts, source_text: &str) -> String {
  fill_template(&prompts.summary_template, &[("text", source_text)])
}
