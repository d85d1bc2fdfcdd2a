//! Small utility helpers used across modules.

use crate::domain::DimensionScore;

/// Very small and safe string templating.
/// Replaces `{key}` placeholders in a single pass: substituted values are never
/// rescanned, and braces that are not a known key are kept verbatim.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = String::with_capacity(tpl.len());
  let mut rest = tpl;
  while let Some(open) = rest.find('{') {
    out.push_str(&rest[..open]);
    let after = &rest[open + 1..];
    let hit = after.find('}').and_then(|close| {
      let key = &after[..close];
      pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| (*v, close))
    });
    match hit {
      Some((value, close)) => {
        out.push_str(value);
        rest = &after[close + 1..];
      }
      None => {
        out.push('{');
        rest = after;
      }
    }
  }
  out.push_str(rest);
  out
}

/// Strip markdown code fences the model sometimes wraps around JSON, and any prose
/// before the first `{` or after the last `}`.
pub fn strip_code_fences(raw: &str) -> &str {
  let s = raw.trim();
  match (s.find('{'), s.rfind('}')) {
    (Some(start), Some(end)) if start < end => &s[start..=end],
    _ => s
      .trim_start_matches("```json")
      .trim_start_matches("```")
      .trim_end_matches("```")
      .trim(),
  }
}

/// "Label: 3.5/5" lines, joined by `sep`.
pub fn format_scores(scores: &[DimensionScore], sep: &str) -> String {
  scores
    .iter()
    .map(|s| format!("{}: {}/5", s.label, s.score))
    .collect::<Vec<_>>()
    .join(sep)
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge model responses.
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

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fills_every_occurrence() {
    let out = fill_template("{a} and {a} then {b}", &[("a", "x"), ("b", "y")]);
    assert_eq!(out, "x and x then y");
  }

  #[test]
  fn substituted_values_are_not_expanded_again() {
    let out = fill_template(
      "Situation: \"{situation}\"\n{score_context}",
      &[("situation", "my {score_context} talk"), ("score_context", "Profile: calm")],
    );
    assert_eq!(out, "Situation: \"my {score_context} talk\"\nProfile: calm");
  }

  #[test]
  fn json_braces_in_templates_survive() {
    let out = fill_template("Return {\n  \"date\": \"{date}\"\n}", &[("date", "2024-01-07")]);
    assert_eq!(out, "Return {\n  \"date\": \"2024-01-07\"\n}");
  }

  #[test]
  fn strips_fences_and_prose() {
    assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
    assert_eq!(strip_code_fences("Sure! {\"a\":{\"b\":2}} hope it helps"), "{\"a\":{\"b\":2}}");
    assert_eq!(strip_code_fences("  plain text "), "plain text");
  }

  #[test]
  fn formats_score_lines() {
    let scores = vec![
      DimensionScore { label: "Emotional Resilience".into(), score: 3.5 },
      DimensionScore { label: "Relational Wellness".into(), score: 2.0 },
    ];
    assert_eq!(
      format_scores(&scores, ", "),
      "Emotional Resilience: 3.5/5, Relational Wellness: 2/5"
    );
  }

  #[test]
  fn truncation_respects_char_boundaries() {
    let s = "💜💜💜";
    let out = trunc_for_log(s, 5);
    assert!(out.starts_with("💜…"));
    assert_eq!(trunc_for_log("short", 10), "short");
  }
}
