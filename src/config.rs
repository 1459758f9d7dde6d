//! Loading playground configuration (prompts, game tuning, map geometry and
//! the level bank) from TOML.
//!
//! Every section is optional; missing pieces fall back to defaults and the
//! built-in seed chapters.

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::domain::Chapter;
use crate::layout::LayoutParams;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PlaygroundConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub game: GameSettings,
  #[serde(default)]
  pub map: LayoutParams,
  #[serde(default)]
  pub chapters: Vec<Chapter>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct GameSettings {
  pub max_lives: u8,
  /// Extra XP on a perfect run, as a percentage of the level reward.
  pub perfect_bonus_percent: u32,
}

impl Default for GameSettings {
  fn default() -> Self {
    Self { max_lives: 3, perfect_bonus_percent: 20 }
  }
}

/// Prompts used by the OpenAI collaborators.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub distractor_system: String,
  pub distractor_user_template: String,
  pub hint_system: String,
  pub hint_user_template: String,
  pub feedback_system: String,
  pub feedback_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      distractor_system: "You generate decoy code tokens for a drag-and-drop coding puzzle. Respond ONLY with strict JSON.".into(),
      distractor_user_template: "Language: {language}\nCorrect tokens (JSON): {tokens}\nReturn JSON {\"tokens\": [string]} with exactly {count} plausible but WRONG single tokens of the same lexical kinds (identifiers, literals, punctuation). Never repeat a correct token.".into(),
      hint_system: "You are a friendly programming coach. Keep hints short and never reveal the full solution.".into(),
      hint_user_template: "Objective: {objective}\nPlayer's current code:\n{code}\nGive ONE concise hint (< 25 words) about the next step.".into(),
      feedback_system: "You review beginner code. Be encouraging and concrete. Do not paste the reference solution.".into(),
      feedback_user_template: "Language: {language}\nPlayer code:\n{code}\nReference solution:\n{solution}\nExplain in 1-2 sentences what is wrong and how to fix it.".into(),
    }
  }
}

pub fn parse_config(raw: &str) -> Result<PlaygroundConfig, toml::de::Error> {
  let mut cfg = toml::from_str::<PlaygroundConfig>(raw)?;
  if cfg.game.max_lives == 0 {
    warn!(target: "playground_backend", "game.max_lives = 0 would start sessions already out of lives; using 1");
    cfg.game.max_lives = 1;
  }
  Ok(cfg)
}

/// Attempt to load from PLAYGROUND_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_from_env() -> Option<PlaygroundConfig> {
  let path = std::env::var("PLAYGROUND_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_config(&s) {
      Ok(cfg) => {
        info!(target: "playground_backend", %path, chapters = cfg.chapters.len(), "Loaded playground config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "playground_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "playground_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
