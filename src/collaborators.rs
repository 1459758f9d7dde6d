//! External collaborators behind trait seams: distractor text, hints,
//! code-review feedback and progress persistence.
//!
//! Each seam has a local implementation that works offline; `openai.rs`
//! provides the model-backed ones. The engine only sees `Arc<dyn ...>`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::domain::CompletionRecord;
use crate::puzzle::tokenize;

#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
  #[error("collaborator unavailable: {0}")]
  Unavailable(String),
  #[error("collaborator returned malformed output: {0}")]
  Malformed(String),
}

#[async_trait]
pub trait DistractorGenerator: Send + Sync {
  async fn generate(&self, language: &str, correct_tokens: &[String], count: usize)
    -> Result<Vec<String>, CollaboratorError>;
}

#[async_trait]
pub trait HintGenerator: Send + Sync {
  async fn generate(&self, objective: &str, current_code: &str) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait FeedbackGenerator: Send + Sync {
  async fn generate(&self, code: &str, canonical_solution: &str, language: &str)
    -> Result<String, CollaboratorError>;
}

/// Idempotent: storing the same completion twice keeps the best result.
#[async_trait]
pub trait ProgressStore: Send + Sync {
  async fn complete_level(&self, record: &CompletionRecord) -> Result<(), CollaboratorError>;
  async fn completed_levels(&self, player_id: &str) -> Result<Vec<CompletionRecord>, CollaboratorError>;
}

// -------- Local implementations --------

const IDENT_FAMILY: &[&str] = &[
  "print", "println", "echo", "puts", "input", "len", "str", "int", "range", "return",
  "value", "result", "count", "total", "data", "item", "self", "None", "True", "False",
];
const PUNCT_FAMILY: &[&str] = &["(", ")", "[", "]", "{", "}", ":", ";", ",", ".", "=", "+", "-", "*", "<", ">"];

/// Lexical-family lookalikes; never returns one of the correct tokens.
#[derive(Clone, Debug, Default)]
pub struct LocalDistractors;

impl LocalDistractors {
  fn family(token: &str) -> Vec<String> {
    let first = token.chars().next().unwrap_or(' ');
    let quoted = token
      .strip_prefix(first)
      .and_then(|rest| rest.strip_suffix(first))
      .filter(|_| matches!(first, '"' | '\'' | '`') && token.len() >= 2);

    if let Some(inner) = quoted {
      let q = first;
      let alt = if q == '"' { '\'' } else { '"' };
      vec![
        format!("{q}{}{q}", inner.to_uppercase()),
        format!("{alt}{inner}{q}"),
        format!("{q}{inner} {q}"),
      ]
    } else if first.is_ascii_digit() {
      match (token.parse::<i64>(), token.parse::<f64>()) {
        (Ok(n), _) => vec![
          n.saturating_add(1).to_string(),
          n.saturating_sub(1).to_string(),
          n.saturating_mul(10).to_string(),
        ],
        (_, Ok(n)) => vec![format!("{}", n * 10.0), format!("{}", n + 1.0)],
        _ => Vec::new(),
      }
    } else if first.is_alphabetic() || first == '_' || first == '$' {
      let mut v = vec![format!("{token}s"), token.to_uppercase()];
      v.extend(IDENT_FAMILY.iter().map(|s| s.to_string()));
      v
    } else {
      PUNCT_FAMILY.iter().map(|s| s.to_string()).collect()
    }
  }
}

#[async_trait]
impl DistractorGenerator for LocalDistractors {
  async fn generate(&self, _language: &str, correct_tokens: &[String], count: usize)
    -> Result<Vec<String>, CollaboratorError> {
    let families: Vec<Vec<String>> = correct_tokens.iter().map(|t| Self::family(t)).collect();
    let widest = families.iter().map(Vec::len).max().unwrap_or(0);
    let mut out: Vec<String> = Vec::with_capacity(count);

    // round-robin across tokens so decoys cover the whole snippet
    'rounds: for round in 0..widest {
      for fam in &families {
        if let Some(c) = fam.get(round) {
          if !correct_tokens.contains(c) && !out.contains(c) {
            out.push(c.clone());
            if out.len() == count { break 'rounds; }
          }
        }
      }
    }
    Ok(out)
  }
}

/// Nudges toward the objective without revealing code.
#[derive(Clone, Debug, Default)]
pub struct LocalHints;

#[async_trait]
impl HintGenerator for LocalHints {
  async fn generate(&self, objective: &str, current_code: &str) -> Result<String, CollaboratorError> {
    let placed = tokenize(current_code).len();
    let text = if placed == 0 {
      format!("Start with the action the objective names, then add what it acts on. Objective: {}", objective.trim())
    } else {
      format!(
        "You have {placed} piece(s) in place. Re-read the objective and check each piece's order: {}",
        objective.trim()
      )
    };
    Ok(text)
  }
}

/// Points at the first diverging token without printing the answer.
#[derive(Clone, Debug, Default)]
pub struct LocalFeedback;

#[async_trait]
impl FeedbackGenerator for LocalFeedback {
  async fn generate(&self, code: &str, canonical_solution: &str, _language: &str)
    -> Result<String, CollaboratorError> {
    let got = tokenize(code);
    let want = tokenize(canonical_solution);
    let diverge = got.iter().zip(want.iter()).position(|(a, b)| a != b);
    let text = match diverge {
      Some(i) => format!("Close, but piece {} (`{}`) is not what this spot needs.", i + 1, got[i]),
      None if got.len() < want.len() => format!("Good start; {} more piece(s) are missing.", want.len() - got.len()),
      None if got.len() > want.len() => "Everything needed is there, but there is extra code at the end.".to_string(),
      None => "Looks equivalent, check spacing inside string literals.".to_string(),
    };
    Ok(text)
  }
}

/// In-memory progress keyed by (player, level).
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
  records: RwLock<HashMap<(String, String), CompletionRecord>>,
}

impl MemoryProgressStore {
  pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
  #[instrument(level = "debug", skip(self, record), fields(player = %record.player_id, level = %record.level_id))]
  async fn complete_level(&self, record: &CompletionRecord) -> Result<(), CollaboratorError> {
    let key = (record.player_id.clone(), record.level_id.clone());
    let mut records = self.records.write().await;
    let merged = match records.get(&key) {
      Some(prev) => CompletionRecord {
        xp_awarded: prev.xp_awarded.max(record.xp_awarded),
        perfect: prev.perfect || record.perfect,
        ..record.clone()
      },
      None => record.clone(),
    };
    debug!(target: "playground", xp = merged.xp_awarded, perfect = merged.perfect, "Progress stored");
    records.insert(key, merged);
    Ok(())
  }

  async fn completed_levels(&self, player_id: &str) -> Result<Vec<CompletionRecord>, CollaboratorError> {
    let records = self.records.read().await;
    let mut out: Vec<CompletionRecord> =
      records.iter().filter(|((p, _), _)| p == player_id).map(|(_, r)| r.clone()).collect();
    out.sort_by(|a, b| a.level_id.cmp(&b.level_id));
    Ok(out)
  }
}

/// Fixed decoy list, for tests.
#[cfg(test)]
pub struct StaticDistractors(pub Vec<String>);

#[cfg(test)]
impl StaticDistractors {
  pub fn new<const N: usize>(tokens: [&str; N]) -> Self {
    Self(tokens.iter().map(|s| s.to_string()).collect())
  }
}

#[cfg(test)]
#[async_trait]
impl DistractorGenerator for StaticDistractors {
  async fn generate(&self, _: &str, _: &[String], _: usize) -> Result<Vec<String>, CollaboratorError> {
    Ok(self.0.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn toks(s: &str) -> Vec<String> { tokenize(s) }

  #[tokio::test]
  async fn local_distractors_avoid_correct_tokens() {
    let tokens = toks(r#"print("hi")"#);
    let out = LocalDistractors.generate("python", &tokens, 3).await.unwrap();
    assert_eq!(out.len(), 3);
    assert!(out.iter().all(|d| !tokens.contains(d)));
    assert_eq!(out[0], "prints");
    assert_eq!(out[1], "\"HI\"");
  }

  #[tokio::test]
  async fn local_distractors_cover_numbers() {
    let tokens = toks("n = 41");
    let out = LocalDistractors.generate("python", &tokens, 6).await.unwrap();
    assert!(out.contains(&"42".to_string()));
    assert_eq!(out.len(), 6);
  }

  #[tokio::test]
  async fn local_feedback_names_first_divergence() {
    let msg = LocalFeedback.generate(r#"print "hi" ( )"#, r#"print("hi")"#, "python").await.unwrap();
    assert!(msg.contains("piece 2"), "{msg}");
    let short = LocalFeedback.generate("print (", r#"print("hi")"#, "python").await.unwrap();
    assert!(short.contains("2 more"), "{short}");
  }

  #[tokio::test]
  async fn memory_store_is_idempotent_and_keeps_best() {
    let store = MemoryProgressStore::new();
    let rec = CompletionRecord {
      player_id: "p".into(),
      level_id: "l".into(),
      chapter_id: "c".into(),
      xp_awarded: 120,
      perfect: true,
    };
    store.complete_level(&rec).await.unwrap();
    store.complete_level(&rec).await.unwrap();
    store.complete_level(&CompletionRecord { xp_awarded: 100, perfect: false, ..rec.clone() }).await.unwrap();
    let done = store.completed_levels("p").await.unwrap();
    assert_eq!(done, vec![rec]);
    assert!(store.completed_levels("other").await.unwrap().is_empty());
  }
}
