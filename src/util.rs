//! Small utility helpers used across modules.

use std::time::Duration;

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// Values are inserted in one pass, so a value containing `{other}` is never re-expanded.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = String::with_capacity(tpl.len());
  let mut rest = tpl;
  while let Some(start) = rest.find('{') {
    out.push_str(&rest[..start]);
    let tail = &rest[start + 1..];
    let replaced = tail.find('}').and_then(|end| {
      let key = &tail[..end];
      pairs
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| (end, *v))
    });
    match replaced {
      Some((end, value)) => {
        out.push_str(value);
        rest = &tail[end + 1..];
      }
      None => {
        out.push('{');
        rest = tail;
      }
    }
  }
  out.push_str(rest);
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

/// Keep at most `max_chars` characters, cutting on a char boundary.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
  match s.char_indices().nth(max_chars) {
    Some((idx, _)) => &s[..idx],
    None => s,
  }
}

/// "1.25s" style rendering used in timing metadata.
pub fn format_secs(d: Duration) -> String {
  format!("{:.2}s", d.as_secs_f64())
}

/// A, B, C, ... for option indices.
pub fn option_letter(idx: usize) -> char {
  u8::try_from(idx)
    .ok()
    .filter(|i| *i < 26)
    .map(|i| (b'A' + i) as char)
    .unwrap_or('?')
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fill_template_replaces_known_keys_only() {
    let out = fill_template("{a} and {b} but not {c}", &[("a", "x"), ("b", "{a}")]);
    assert_eq!(out, "x and {a} but not {c}");
  }

  #[test]
  fn fill_template_keeps_json_braces() {
    let out = fill_template("[{\"q\": 1}] n={n}", &[("n", "3")]);
    assert_eq!(out, "[{\"q\": 1}] n=3");
  }

  #[test]
  fn truncation_respects_char_boundaries() {
    assert_eq!(truncate_chars("héllo", 2), "hé");
    assert_eq!(truncate_chars("abc", 10), "abc");
    assert!(trunc_for_log("ééééé", 3).starts_with('é'));
  }

  #[test]
  fn timing_and_letters() {
    assert_eq!(format_secs(Duration::from_millis(1250)), "1.25s");
    assert_eq!(option_letter(0), 'A');
    assert_eq!(option_letter(3), 'D');
  }
}
