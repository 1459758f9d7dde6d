//! Session state machine for one level attempt.
//!
//! `SessionState` is a plain value; `apply` never mutates, it returns the next
//! state plus at most one effect for the orchestrator to act on. Lives stay in
//! `[0, max_lives]`, and running out of lives is the only way to fail.

use serde::{Deserialize, Serialize};

use crate::validator::Verdict;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
  Briefing,
  Active,
  Complete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
  Puzzle,
  Manual,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
  Success,
  Failure,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionAction {
  Start,
  Validated(Verdict),
  /// A hint reached the player (failed hint requests cost nothing).
  HintDelivered,
  SwitchMode(Mode),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
  Completed(Outcome),
  LifeLost { remaining: u8 },
  ModeChanged(Mode),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
  pub state: SessionState,
  pub effect: Option<Effect>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
  #[error("cannot apply {action:?} while {status:?}")]
  InvalidTransition { action: SessionAction, status: SessionStatus },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
  pub lives: u8,
  pub max_lives: u8,
  pub streak: u32,
  pub mode: Mode,
  pub hints_used: u32,
  pub status: SessionStatus,
  pub outcome: Option<Outcome>,
}

impl SessionState {
  /// Fresh attempt in briefing; `streak` carries over from the player's run.
  pub fn new(max_lives: u8, streak: u32) -> Self {
    Self {
      lives: max_lives,
      max_lives,
      streak,
      mode: Mode::Puzzle,
      hints_used: 0,
      status: SessionStatus::Briefing,
      outcome: None,
    }
  }

  /// No life lost and no hint taken.
  pub fn is_perfect(&self) -> bool {
    self.lives == self.max_lives && self.hints_used == 0
  }

  pub fn apply(&self, action: SessionAction) -> Result<Transition, SessionError> {
    let invalid = || SessionError::InvalidTransition { action, status: self.status };
    let mut next = *self;

    let effect = match (self.status, action) {
      (SessionStatus::Briefing, SessionAction::Start) => {
        next.status = SessionStatus::Active;
        None
      }
      (SessionStatus::Active, SessionAction::Validated(Verdict::Pending)) => None,
      (SessionStatus::Active, SessionAction::Validated(Verdict::Correct)) => {
        next.streak = next.streak.saturating_add(1);
        next.status = SessionStatus::Complete;
        next.outcome = Some(Outcome::Success);
        Some(Effect::Completed(Outcome::Success))
      }
      (SessionStatus::Active, SessionAction::Validated(Verdict::Incorrect)) => {
        next.lives = next.lives.saturating_sub(1);
        next.streak = 0;
        if next.lives == 0 {
          next.status = SessionStatus::Complete;
          next.outcome = Some(Outcome::Failure);
          Some(Effect::Completed(Outcome::Failure))
        } else {
          Some(Effect::LifeLost { remaining: next.lives })
        }
      }
      (SessionStatus::Active, SessionAction::HintDelivered) => {
        next.hints_used = next.hints_used.saturating_add(1);
        next.streak = 0;
        None
      }
      (SessionStatus::Active, SessionAction::SwitchMode(mode)) => {
        if mode == self.mode {
          None
        } else {
          next.mode = mode;
          Some(Effect::ModeChanged(mode))
        }
      }
      _ => return Err(invalid()),
    };

    Ok(Transition { state: next, effect })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn active() -> SessionState {
    SessionState::new(3, 0).apply(SessionAction::Start).unwrap().state
  }

  fn wrong(s: SessionState) -> Transition {
    s.apply(SessionAction::Validated(Verdict::Incorrect)).unwrap()
  }

  #[test]
  fn starts_in_briefing_and_activates_on_start() {
    let s = SessionState::new(3, 0);
    assert_eq!(s.status, SessionStatus::Briefing);
    assert_eq!(s.mode, Mode::Puzzle);
    assert_eq!(active().status, SessionStatus::Active);
  }

  #[test]
  fn actions_before_start_are_rejected() {
    let s = SessionState::new(3, 0);
    let err = s.apply(SessionAction::HintDelivered).unwrap_err();
    assert_eq!(err, SessionError::InvalidTransition { action: SessionAction::HintDelivered, status: SessionStatus::Briefing });
    assert!(s.apply(SessionAction::Validated(Verdict::Correct)).is_err());
    assert!(active().apply(SessionAction::Start).is_err());
  }

  #[test]
  fn correct_completes_with_success_and_bumps_streak() {
    let s = SessionState { streak: 4, ..active() };
    let t = s.apply(SessionAction::Validated(Verdict::Correct)).unwrap();
    assert_eq!(t.state.streak, 5);
    assert_eq!(t.state.status, SessionStatus::Complete);
    assert_eq!(t.state.outcome, Some(Outcome::Success));
    assert_eq!(t.effect, Some(Effect::Completed(Outcome::Success)));
    assert!(t.state.is_perfect());
  }

  #[test]
  fn incorrect_costs_a_life_and_resets_streak() {
    let s = SessionState { streak: 7, ..active() };
    let t = wrong(s);
    assert_eq!(t.state.lives, 2);
    assert_eq!(t.state.streak, 0);
    assert_eq!(t.effect, Some(Effect::LifeLost { remaining: 2 }));
    assert_eq!(t.state.status, SessionStatus::Active);
    assert!(!t.state.is_perfect());
  }

  #[test]
  fn lives_bottom_out_at_zero_and_complete_with_failure() {
    let mut s = active();
    for _ in 0..3 {
      s = wrong(s).state;
    }
    assert_eq!(s.lives, 0);
    assert_eq!(s.status, SessionStatus::Complete);
    assert_eq!(s.outcome, Some(Outcome::Failure));
    // terminal: nothing else applies
    assert!(s.apply(SessionAction::Validated(Verdict::Incorrect)).is_err());
    assert!(s.apply(SessionAction::HintDelivered).is_err());
    assert_eq!(s.lives, 0);
  }

  #[test]
  fn hint_resets_streak_but_keeps_lives() {
    let s = SessionState { streak: 3, ..active() };
    let t = s.apply(SessionAction::HintDelivered).unwrap();
    assert_eq!(t.state.streak, 0);
    assert_eq!(t.state.hints_used, 1);
    assert_eq!(t.state.lives, 3);
    let done = t.state.apply(SessionAction::Validated(Verdict::Correct)).unwrap().state;
    assert!(!done.is_perfect());
  }

  #[test]
  fn mode_switch_keeps_lives_and_streak() {
    let s = SessionState { streak: 2, ..wrong(active()).state };
    let t = s.apply(SessionAction::SwitchMode(Mode::Manual)).unwrap();
    assert_eq!(t.effect, Some(Effect::ModeChanged(Mode::Manual)));
    assert_eq!((t.state.lives, t.state.streak), (2, 2));
    let same = t.state.apply(SessionAction::SwitchMode(Mode::Manual)).unwrap();
    assert_eq!(same.effect, None);
  }

  #[test]
  fn pending_verdict_changes_nothing() {
    let s = active();
    let t = s.apply(SessionAction::Validated(Verdict::Pending)).unwrap();
    assert_eq!(t.state, s);
    assert_eq!(t.effect, None);
  }

  #[test]
  fn bounds_hold_under_mixed_sequences() {
    let actions = [
      SessionAction::HintDelivered,
      SessionAction::Validated(Verdict::Incorrect),
      SessionAction::SwitchMode(Mode::Manual),
      SessionAction::Validated(Verdict::Pending),
      SessionAction::HintDelivered,
      SessionAction::Validated(Verdict::Incorrect),
      SessionAction::SwitchMode(Mode::Puzzle),
      SessionAction::Validated(Verdict::Incorrect),
      SessionAction::Validated(Verdict::Incorrect),
    ];
    let mut s = active();
    for a in actions {
      if let Ok(t) = s.apply(a) {
        s = t.state;
      }
      assert!(s.lives <= s.max_lives);
      if s.lives == 0 {
        assert_eq!(s.status, SessionStatus::Complete);
      }
      if matches!(a, SessionAction::HintDelivered | SessionAction::Validated(Verdict::Incorrect)) {
        assert_eq!(s.streak, 0);
      }
    }
    assert_eq!(s.outcome, Some(Outcome::Failure));
  }
}
