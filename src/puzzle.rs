//! Puzzle assembly: canonical solution -> shuffled pool of snippet pieces.
//!
//! Flow:
//! 1) Tokenize the canonical solution (identifiers, quoted strings, numbers,
//!    single punctuation chars; whitespace only separates).
//! 2) Ask the distractor collaborator for `max(3, n/2)` decoys.
//! 3) Tag correct pieces with their original index, shuffle the whole pool
//!    (Fisher–Yates), then number the pieces in shuffled order.
//! 4) Check that the correct pieces, put back in original order, validate
//!    against the canonical solution; a level that fails this is malformed.

use std::sync::OnceLock;

use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::collaborators::DistractorGenerator;
use crate::domain::{Piece, PieceId, PieceRole};
use crate::error::GameError;
use crate::validator::validate;

const MIN_DISTRACTORS: usize = 3;

const TOKEN_PATTERN: &str =
  r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|`(?:[^`\\]|\\.)*`|\d+(?:\.\d+)?|[A-Za-z_$][A-Za-z0-9_$]*|\S"#;

fn token_re() -> &'static Regex {
  static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
  TOKEN_RE.get_or_init(|| Regex::new(TOKEN_PATTERN).expect("token pattern is valid"))
}

/// Split source text into snippet tokens.
pub fn tokenize(source: &str) -> Vec<String> {
  token_re().find_iter(source).map(|m| m.as_str().to_string()).collect()
}

pub fn distractor_count(token_count: usize) -> usize {
  MIN_DISTRACTORS.max(token_count / 2)
}

/// Ask the collaborator for decoys. Never fails: a broken or empty
/// collaborator just means an easier puzzle.
#[instrument(level = "debug", skip(source, tokens), fields(%language, tokens = tokens.len()))]
pub async fn fetch_distractors(
  source: &dyn DistractorGenerator,
  language: &str,
  tokens: &[String],
) -> Vec<String> {
  let count = distractor_count(tokens.len());
  match source.generate(language, tokens, count).await {
    Ok(raw) => {
      let picked: Vec<String> = raw
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .take(count)
        .collect();
      if picked.is_empty() {
        warn!(target: "playground", %language, "Distractor source returned nothing; continuing without decoys");
      }
      picked
    }
    Err(e) => {
      warn!(target: "playground", %language, error = %e, "Distractor source failed; continuing without decoys");
      Vec::new()
    }
  }
}

/// Combine correct tokens and decoys into a shuffled pool with fresh ids.
pub fn build_pool<R: Rng + ?Sized>(tokens: &[String], distractors: Vec<String>, rng: &mut R) -> Vec<Piece> {
  let mut pool: Vec<(String, PieceRole, Option<usize>)> = tokens
    .iter()
    .enumerate()
    .map(|(i, t)| (t.clone(), PieceRole::Correct, Some(i)))
    .chain(distractors.into_iter().map(|t| (t, PieceRole::Distractor, None)))
    .collect();

  pool.shuffle(rng);

  pool
    .into_iter()
    .enumerate()
    .map(|(i, (text, role, origin))| Piece { id: i as PieceId, text, role, origin })
    .collect()
}

/// Correct pieces in their original order, joined by single spaces.
pub fn reference_text(pool: &[Piece]) -> String {
  let mut correct: Vec<(usize, &str)> = pool.iter().filter_map(|p| p.origin.map(|o| (o, p.text.as_str()))).collect();
  correct.sort_unstable_by_key(|(o, _)| *o);
  correct.into_iter().map(|(_, t)| t).collect::<Vec<_>>().join(" ")
}

/// Full assembly for one puzzle instance.
#[instrument(level = "info", skip(canonical, source, rng), fields(%language, solution_len = canonical.len()))]
pub async fn assemble<R: Rng + ?Sized>(
  canonical: &str,
  language: &str,
  source: &dyn DistractorGenerator,
  rng: &mut R,
) -> Result<Vec<Piece>, GameError> {
  let tokens = tokenize(canonical);
  if tokens.is_empty() {
    return Err(GameError::MalformedSolution(canonical.chars().take(40).collect()));
  }
  let distractors = fetch_distractors(source, language, &tokens).await;
  let pool = build_pool(&tokens, distractors, rng);
  if !validate(&reference_text(&pool), canonical).is_correct() {
    warn!(target: "playground", %language, "Correct pieces do not reassemble into the solution");
    return Err(GameError::MalformedSolution(canonical.chars().take(40).collect()));
  }
  let decoys = pool.iter().filter(|p| p.role == PieceRole::Distractor).count();
  debug!(target: "playground", pieces = pool.len(), decoys, "Puzzle pool assembled");
  Ok(pool)
}
