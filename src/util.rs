//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// No nesting or conditionals.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Collapse runs of whitespace into single spaces and trim the ends.
/// Transcripts come back from providers with stray spacing around punctuation.
pub fn squash_whitespace(s: &str) -> String {
  s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Log-safe truncation for large strings, on a char boundary.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    s.to_string()
  } else {
    let head: String = s.chars().take(max).collect();
    format!("{}… ({} bytes total)", head, s.len())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fill_template_replaces_every_occurrence() {
    let out = fill_template("{name}, {name}! turn {turn}", &[("name", "Maya"), ("turn", "2")]);
    assert_eq!(out, "Maya, Maya! turn 2");
  }

  #[test]
  fn squash_whitespace_trims_and_collapses() {
    assert_eq!(squash_whitespace("  one \n  fourth\t"), "one fourth");
    assert_eq!(squash_whitespace("   "), "");
  }

  #[test]
  fn trunc_for_log_respects_char_boundaries() {
    assert_eq!(trunc_for_log("short", 10), "short");
    let t = trunc_for_log("ééééé", 2);
    assert!(t.starts_with("éé…"));
  }
}
