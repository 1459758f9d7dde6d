//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Log-safe truncation for large strings (char-boundary aware).
pub fn trunc_for_log(s: &str, max_chars: usize) -> String {
  let total = s.chars().count();
  if total <= max_chars {
    s.to_string()
  } else {
    format!("{}… ({} chars total)", s.chars().take(max_chars).collect::<String>(), total)
  }
}
