//! Completion scoring and hand-off to the progress store.
//!
//! Reaching `complete` is local and immediate; persistence is best effort and
//! tracked separately through `PersistStatus`. A failed save never undoes the
//! in-memory success.

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::collaborators::ProgressStore;
use crate::domain::{CompletionRecord, Level};
use crate::session::SessionState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistStatus {
  Pending,
  Saved,
  /// The store rejected or never answered; progress may not have saved.
  NotSaved,
}

/// What the player sees after a successful run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReceipt {
  pub record: CompletionRecord,
  pub persisted: PersistStatus,
  pub chapter_complete: bool,
  pub next_level_id: Option<String>,
}

#[derive(Clone, Copy, Debug)]
pub struct CompletionReporter {
  pub perfect_bonus_percent: u32,
}

impl CompletionReporter {
  pub fn new(perfect_bonus_percent: u32) -> Self {
    Self { perfect_bonus_percent }
  }

  /// Score a successful session.
  pub fn report(&self, level: &Level, chapter_id: &str, player_id: &str, session: &SessionState) -> CompletionRecord {
    let perfect = session.is_perfect();
    let bonus = if perfect { level.reward_xp.saturating_mul(self.perfect_bonus_percent) / 100 } else { 0 };
    CompletionRecord {
      player_id: player_id.to_string(),
      level_id: level.id.clone(),
      chapter_id: chapter_id.to_string(),
      xp_awarded: level.reward_xp.saturating_add(bonus),
      perfect,
    }
  }

  #[instrument(level = "info", skip(self, store, record), fields(level = %record.level_id, xp = record.xp_awarded, perfect = record.perfect))]
  pub async fn deliver(&self, store: &dyn ProgressStore, record: &CompletionRecord) -> PersistStatus {
    match store.complete_level(record).await {
      Ok(()) => {
        info!(target: "playground", player = %record.player_id, "Completion persisted");
        PersistStatus::Saved
      }
      Err(e) => {
        error!(target: "playground", player = %record.player_id, error = %e, "Completion not persisted; session stays complete");
        PersistStatus::NotSaved
      }
    }
  }
}
