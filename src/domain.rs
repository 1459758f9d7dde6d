//! Domain models: the level graph (chapters + levels), puzzle pieces and the
//! completion record handed to the progress store.

use serde::{Deserialize, Serialize};

fn default_language() -> String { "python".into() }

/// One playable coding challenge.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Level {
  pub id: String,
  pub title: String,
  pub objective: String,
  #[serde(default)] pub starter_code: String,
  pub canonical_solution: String,
  #[serde(default)] pub reward_xp: u32,
  pub order: u32,
  #[serde(default)] pub intro_text: String,
  #[serde(default)] pub correct_feedback: Option<String>,
  #[serde(default)] pub incorrect_feedback: Option<String>,
  /// Language id handed to the distractor/feedback collaborators.
  #[serde(default = "default_language")] pub language: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Chapter {
  pub id: String,
  pub title: String,
  pub order: u32,
  #[serde(default)] pub levels: Vec<Level>,
}

/// Ordered chapters. Lookups walk chapters and levels by `order`, not by
/// position in the vectors.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LevelGraph {
  pub chapters: Vec<Chapter>,
}

impl LevelGraph {
  pub fn new(chapters: Vec<Chapter>) -> Self { Self { chapters } }

  /// Chapters sorted by `order`, each with its levels sorted by `order`.
  pub fn ordered(&self) -> Vec<(&Chapter, Vec<&Level>)> {
    let mut chapters: Vec<&Chapter> = self.chapters.iter().collect();
    chapters.sort_by_key(|c| c.order);
    chapters
      .into_iter()
      .map(|c| {
        let mut levels: Vec<&Level> = c.levels.iter().collect();
        levels.sort_by_key(|l| l.order);
        (c, levels)
      })
      .collect()
  }

  pub fn find_level(&self, level_id: &str) -> Option<(&Chapter, &Level)> {
    self.chapters
      .iter()
      .find_map(|c| c.levels.iter().find(|l| l.id == level_id).map(|l| (c, l)))
  }

  /// Level that follows `level_id` in traversal order, crossing chapter gates.
  pub fn next_level_id(&self, level_id: &str) -> Option<String> {
    let flat: Vec<&Level> = self.ordered().into_iter().flat_map(|(_, ls)| ls).collect();
    let pos = flat.iter().position(|l| l.id == level_id)?;
    flat.get(pos + 1).map(|l| l.id.clone())
  }

  pub fn is_last_in_chapter(&self, level_id: &str) -> bool {
    self.ordered()
      .into_iter()
      .find(|(_, ls)| ls.iter().any(|l| l.id == level_id))
      .and_then(|(_, ls)| ls.last().map(|l| l.id == level_id))
      .unwrap_or(false)
  }

  pub fn level_count(&self) -> usize {
    self.chapters.iter().map(|c| c.levels.len()).sum()
  }
}

/// Whether a piece belongs to the canonical solution or was injected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PieceRole {
  Correct,
  Distractor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Container {
  Bucket,
  Solution,
}

pub type PieceId = u32;

/// A snippet in the puzzle pool. `role` and `origin` never leave the backend;
/// the player-facing DTO carries only id + text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Piece {
  pub id: PieceId,
  pub text: String,
  pub role: PieceRole,
  /// Position in the canonical token sequence (correct pieces only).
  pub origin: Option<usize>,
}

/// Emitted once per successful level completion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
  pub player_id: String,
  pub level_id: String,
  pub chapter_id: String,
  pub xp_awarded: u32,
  pub perfect: bool,
}
