//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! Each operation takes the session lock only for its synchronous part; every
//! collaborator call (distractors, hints, feedback, persistence) runs unlocked
//! with a `RequestTag`, and its result is applied through `with_current` so a
//! restart in the meantime makes the late answer a no-op.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::completion::{CompletionReceipt, PersistStatus};
use crate::domain::{Container, Level, PieceId};
use crate::error::GameError;
use crate::layout::Curve;
use crate::placement::PieceBoard;
use crate::protocol::{to_view, CheckOut, MapOut, SessionView};
use crate::puzzle::{assemble, build_pool, fetch_distractors, tokenize};
use crate::session::{Effect, Mode, Outcome, SessionAction, SessionState, SessionStatus};
use crate::state::{AppState, PlaySession, RequestTag};
use crate::validator::{validate, Verdict};

const GENERIC_CORRECT: &str = "Mission accomplished.";
const GENERIC_INCORRECT: &str = "Not quite. Check the order of your pieces and try again.";

fn phase(s: &PlaySession) -> String {
  format!("{:?}/{:?}", s.state.status, s.state.mode).to_lowercase()
}

fn require_active(s: &PlaySession, action: &'static str) -> Result<(), GameError> {
  if s.state.status == SessionStatus::Active {
    Ok(())
  } else {
    Err(GameError::WrongPhase { action, phase: phase(s) })
  }
}

/// Code the player currently has on screen, whichever mode they are in.
fn current_code(s: &PlaySession) -> String {
  match s.state.mode {
    Mode::Puzzle => s.board.as_ref().map(PieceBoard::assembled_text).unwrap_or_default(),
    Mode::Manual => s.manual_code.clone(),
  }
}

#[instrument(level = "info", skip(state))]
pub async fn map_for_player(state: &AppState, player_id: &str) -> MapOut {
  let layout = state.map().await;
  let (completed, progress_available) = match state.collaborators.progress.completed_levels(player_id).await {
    Ok(done) => (done, true),
    Err(e) => {
      warn!(target: "playground", %player_id, error = %e, "Progress store unavailable; map served without progress");
      (Vec::new(), false)
    }
  };
  let paths = layout.connectors.iter().map(Curve::to_svg_path).collect();
  MapOut { layout: (*layout).clone(), paths, completed, progress_available }
}

/// Enter a level: fresh session in briefing with a freshly assembled puzzle.
#[instrument(level = "info", skip(state))]
pub async fn enter_level(
  state: &AppState,
  player_id: &str,
  level_id: &str,
  seed: Option<u64>,
) -> Result<SessionView, GameError> {
  let (level, chapter_id) = state.level(level_id).await?;
  let mut rng = match seed {
    Some(s) => StdRng::seed_from_u64(s),
    None => StdRng::from_entropy(),
  };

  let pool = assemble(&level.canonical_solution, &level.language, state.collaborators.distractors.as_ref(), &mut rng)
    .await
    .inspect_err(|e| warn!(target: "playground", %level_id, error = %e, "Level cannot be played"))?;

  let streak = state.player_streak(player_id).await;
  let mut board = PieceBoard::new(pool);
  board.audit_and_heal();

  let session = PlaySession {
    id: Uuid::new_v4().to_string(),
    player_id: player_id.to_string(),
    manual_code: level.starter_code.clone(),
    level,
    chapter_id,
    ticket: 0,
    state: SessionState::new(state.settings.max_lives, streak),
    board: Some(board),
    preview: String::new(),
    last_verdict: Verdict::Pending,
    hint: None,
    feedback: None,
    completion: None,
    rng,
  };
  let view = to_view(&session);
  info!(target: "playground", session = %session.id, pieces = session.board.as_ref().map_or(0, PieceBoard::len), streak, "Level entered");
  state.insert_session(session).await;
  Ok(view)
}

#[instrument(level = "info", skip(state))]
pub async fn session_view(state: &AppState, session_id: &str) -> Result<SessionView, GameError> {
  state.with_session(session_id, |s| Ok(to_view(s))).await
}

#[instrument(level = "info", skip(state))]
pub async fn start_session(state: &AppState, session_id: &str) -> Result<SessionView, GameError> {
  state
    .with_session(session_id, |s| {
      s.state = s.state.apply(SessionAction::Start)?.state;
      info!(target: "playground", session = %s.id, level = %s.level.id, "Session started");
      Ok(to_view(s))
    })
    .await
}

#[instrument(level = "debug", skip(state))]
pub async fn move_piece(
  state: &AppState,
  session_id: &str,
  piece_id: PieceId,
  target: Container,
) -> Result<SessionView, GameError> {
  state
    .with_session(session_id, |s| {
      require_active(s, "moving pieces")?;
      if s.state.mode != Mode::Puzzle {
        return Err(GameError::WrongPhase { action: "moving pieces", phase: phase(s) });
      }
      let board = s.board.as_mut().ok_or_else(|| GameError::PuzzleNotReady(session_id.to_string()))?;
      if let Some(changed) = board.move_piece(piece_id, target)? {
        debug!(target: "playground", session = %session_id, revision = changed.revision, "Assembled text changed");
        s.preview = changed.text;
      }
      if !board.audit_and_heal() {
        s.preview = board.assembled_text();
      }
      Ok(to_view(s))
    })
    .await
}

#[instrument(level = "debug", skip(state, code), fields(code_len = code.len()))]
pub async fn update_code(state: &AppState, session_id: &str, code: String) -> Result<SessionView, GameError> {
  state
    .with_session(session_id, |s| {
      require_active(s, "editing code")?;
      if s.state.mode != Mode::Manual {
        return Err(GameError::WrongPhase { action: "editing code", phase: phase(s) });
      }
      s.manual_code = code;
      Ok(to_view(s))
    })
    .await
}

/// What a check decided under the lock, plus the follow-up calls it needs.
struct Checked {
  tag: RequestTag,
  verdict: Verdict,
  player_id: String,
  streak: u32,
  feedback_request: Option<(String, String, String)>,
  record: Option<crate::domain::CompletionRecord>,
}

/// Validate the current arrangement (puzzle) or code (manual).
#[instrument(level = "info", skip(state, code), fields(has_code = code.is_some()))]
pub async fn check_solution(state: &AppState, session_id: &str, code: Option<String>) -> Result<CheckOut, GameError> {
  // Graph facts for the completion receipt are read up front; the graph lock
  // is never held together with the session lock.
  let level_id = state.with_session(session_id, |s| Ok(s.level.id.clone())).await?;
  let (chapter_complete, next_level_id) = {
    let graph = state.graph.read().await;
    (graph.is_last_in_chapter(&level_id), graph.next_level_id(&level_id))
  };
  let reporter = state.reporter;

  let checked = state
    .with_session(session_id, |s| {
      require_active(s, "checking")?;
      if let (Mode::Manual, Some(c)) = (s.state.mode, code) {
        s.manual_code = c;
      }
      if s.state.mode == Mode::Puzzle && s.board.is_none() {
        return Err(GameError::PuzzleNotReady(session_id.to_string()));
      }

      let candidate = current_code(s);
      let verdict = validate(&candidate, &s.level.canonical_solution);
      let t = s.state.apply(SessionAction::Validated(verdict))?;
      s.state = t.state;
      s.last_verdict = verdict;
      s.feedback = Some(if verdict.is_correct() {
        s.level.correct_feedback.clone().unwrap_or_else(|| GENERIC_CORRECT.into())
      } else {
        s.level.incorrect_feedback.clone().unwrap_or_else(|| GENERIC_INCORRECT.into())
      });

      let mut record = None;
      match t.effect {
        Some(Effect::Completed(Outcome::Success)) => {
          let rec = reporter.report(&s.level, &s.chapter_id, &s.player_id, &s.state);
          info!(target: "playground", session = %s.id, xp = rec.xp_awarded, perfect = rec.perfect, "Level complete");
          s.completion = Some(CompletionReceipt {
            record: rec.clone(),
            persisted: PersistStatus::Pending,
            chapter_complete,
            next_level_id,
          });
          record = Some(rec);
        }
        Some(Effect::Completed(Outcome::Failure)) => {
          info!(target: "playground", session = %s.id, level = %s.level.id, "Mission failed: out of lives");
        }
        Some(Effect::LifeLost { remaining }) => {
          info!(target: "playground", session = %s.id, remaining, "Incorrect; life lost");
        }
        _ => {}
      }

      let feedback_request = (verdict == Verdict::Incorrect && s.state.mode == Mode::Manual)
        .then(|| (candidate, s.level.canonical_solution.clone(), s.level.language.clone()));

      Ok(Checked { tag: s.tag(), verdict, player_id: s.player_id.clone(), streak: s.state.streak, feedback_request, record })
    })
    .await?;

  // The player's carried streak always mirrors the latest verdict.
  state.set_player_streak(&checked.player_id, checked.streak).await;

  if let Some((code, solution, language)) = checked.feedback_request {
    match state.collaborators.feedback.generate(&code, &solution, &language).await {
      Ok(text) => {
        let applied = state.with_current(&checked.tag, |s| {
          s.feedback = Some(text);
          Ok(())
        }).await;
        if let Err(e) = applied {
          debug!(target: "playground", error = %e, "Feedback dropped");
        }
      }
      Err(e) => warn!(target: "playground", session = %session_id, error = %e, "Feedback collaborator failed; keeping generic message"),
    }
  }

  if let Some(record) = checked.record {
    let persisted = reporter.deliver(state.collaborators.progress.as_ref(), &record).await;
    let applied = state.with_current(&checked.tag, |s| {
      if let Some(receipt) = s.completion.as_mut() {
        receipt.persisted = persisted;
      }
      Ok(())
    }).await;
    if let Err(e) = applied {
      debug!(target: "playground", error = %e, "Persistence status dropped");
    }
  }

  let session = session_view(state, session_id).await?;
  Ok(CheckOut { verdict: checked.verdict, session })
}

/// Ask for a hint. Only a delivered hint is charged (hint count + streak).
#[instrument(level = "info", skip(state))]
pub async fn request_hint(state: &AppState, session_id: &str) -> Result<SessionView, GameError> {
  let (tag, objective, code) = state
    .with_session(session_id, |s| {
      // dry run: reject early if a hint is not allowed right now
      s.state.apply(SessionAction::HintDelivered)?;
      Ok((s.tag(), s.level.objective.clone(), current_code(s)))
    })
    .await?;

  let text = state
    .collaborators
    .hints
    .generate(&objective, &code)
    .await
    .map_err(|e| GameError::CollaboratorUnavailable { what: "hint", reason: e.to_string() })?;

  let (view, player_id) = state
    .with_current(&tag, |s| {
      s.state = s.state.apply(SessionAction::HintDelivered)?.state;
      s.hint = Some(text);
      info!(target: "playground", session = %s.id, hints_used = s.state.hints_used, "Hint delivered");
      Ok((to_view(s), s.player_id.clone()))
    })
    .await?;
  state.set_player_streak(&player_id, view.state.streak).await;
  Ok(view)
}

/// Assemble a new pool for `tag`'s session and install it if still current.
async fn rebuild_puzzle(state: &AppState, tag: &RequestTag, level: &Level) -> Result<(), GameError> {
  let tokens = tokenize(&level.canonical_solution);
  if tokens.is_empty() {
    return Err(GameError::MalformedSolution(level.id.clone()));
  }
  let distractors = fetch_distractors(state.collaborators.distractors.as_ref(), &level.language, &tokens).await;
  state
    .with_current(tag, |s| {
      let pool = build_pool(&tokens, distractors, &mut s.rng);
      s.board = Some(PieceBoard::new(pool));
      s.preview.clear();
      Ok(())
    })
    .await
}

/// Install the rebuilt puzzle; a stale rebuild is superseded, not an error.
async fn rebuild_or_yield(state: &AppState, tag: &RequestTag, level: &Level) -> Result<(), GameError> {
  match rebuild_puzzle(state, tag, level).await {
    Err(GameError::Stale(_)) => {
      debug!(target: "playground", session = %tag.session_id, "Puzzle rebuild superseded by a newer reset");
      Ok(())
    }
    other => other,
  }
}

#[instrument(level = "info", skip(state))]
pub async fn switch_mode(state: &AppState, session_id: &str, mode: Mode) -> Result<SessionView, GameError> {
  let rekey = state
    .with_session(session_id, |s| {
      let t = s.state.apply(SessionAction::SwitchMode(mode))?;
      s.state = t.state;
      match t.effect {
        Some(Effect::ModeChanged(Mode::Puzzle)) => {
          s.ticket += 1;
          s.board = None;
          s.preview.clear();
          Ok(Some((s.tag(), s.level.clone())))
        }
        Some(Effect::ModeChanged(Mode::Manual)) => {
          if s.manual_code.trim().is_empty() {
            s.manual_code = s.level.starter_code.clone();
          }
          Ok(None)
        }
        _ => Ok(None),
      }
    })
    .await?;

  if let Some((tag, level)) = rekey {
    rebuild_or_yield(state, &tag, &level).await?;
  }
  info!(target: "playground", session = %session_id, ?mode, "Mode switched");
  session_view(state, session_id).await
}

/// Fresh attempt at the same level: new state, new shuffle, same session id.
#[instrument(level = "info", skip(state))]
pub async fn restart_level(state: &AppState, session_id: &str) -> Result<SessionView, GameError> {
  let player_id = state.with_session(session_id, |s| Ok(s.player_id.clone())).await?;
  let streak = state.player_streak(&player_id).await;
  let max_lives = state.settings.max_lives;

  let (tag, level) = state
    .with_session(session_id, |s| {
      s.reset(SessionState::new(max_lives, streak));
      Ok((s.tag(), s.level.clone()))
    })
    .await?;

  rebuild_or_yield(state, &tag, &level).await?;
  info!(target: "playground", session = %session_id, ticket = tag.ticket, "Level restarted");
  session_view(state, session_id).await
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicBool, Ordering};
  use std::sync::Arc;

  use async_trait::async_trait;
  use tokio::sync::Notify;

  use super::*;
  use crate::collaborators::{
    CollaboratorError, DistractorGenerator, FeedbackGenerator, HintGenerator, MemoryProgressStore, ProgressStore,
    StaticDistractors,
  };
  use crate::config::GameSettings;
  use crate::domain::{CompletionRecord, LevelGraph};
  use crate::layout::LayoutParams;
  use crate::protocol::PieceOut;
  use crate::seeds::seed_chapters;
  use crate::state::Collaborators;

  const HELLO: &str = "lvl-hello";

  fn app_with(collab: Collaborators) -> AppState {
    AppState::with_parts(LevelGraph::new(seed_chapters()), GameSettings::default(), LayoutParams::default(), collab)
  }

  fn hello_collab() -> Collaborators {
    Collaborators { distractors: Arc::new(StaticDistractors::new(["println", "echo", "puts"])), ..Collaborators::local() }
  }

  fn id_of(pieces: &[PieceOut], text: &str) -> PieceId {
    pieces.iter().find(|p| p.text == text).map(|p| p.id).expect("piece present")
  }

  async fn place(app: &AppState, view: &SessionView, texts: &[&str]) -> SessionView {
    let mut last = view.clone();
    for t in texts {
      let id = id_of(&view.bucket, t);
      last = move_piece(app, &view.session_id, id, Container::Solution).await.unwrap();
    }
    last
  }

  async fn started(app: &AppState) -> SessionView {
    let view = enter_level(app, "p1", HELLO, Some(11)).await.unwrap();
    start_session(app, &view.session_id).await.unwrap()
  }

  #[tokio::test]
  async fn hello_scenario_wrong_then_right() {
    let app = app_with(hello_collab());
    let view = started(&app).await;
    assert_eq!(view.bucket.len(), 7);
    assert_eq!(view.state.lives, 3);

    place(&app, &view, &["print", "\"hi\"", "(", ")"]).await;
    let out = check_solution(&app, &view.session_id, None).await.unwrap();
    assert_eq!(out.verdict, Verdict::Incorrect);
    assert_eq!(out.session.state.lives, 2);
    assert_eq!(out.session.state.streak, 0);
    assert_eq!(out.session.state.status, SessionStatus::Active);

    for p in out.session.solution.clone() {
      move_piece(&app, &view.session_id, p.id, Container::Bucket).await.unwrap();
    }
    let placed = place(&app, &view, &["print", "(", "\"hi\"", ")"]).await;
    assert_eq!(placed.assembled_text, "print ( \"hi\" )");
    let out = check_solution(&app, &view.session_id, None).await.unwrap();
    assert_eq!(out.verdict, Verdict::Correct);
    assert_eq!(out.session.state.status, SessionStatus::Complete);
    let receipt = out.session.completion.expect("receipt");
    assert!(!receipt.record.perfect);
    assert_eq!(receipt.record.xp_awarded, 50);
    assert_eq!(receipt.persisted, PersistStatus::Saved);
    assert_eq!(receipt.next_level_id.as_deref(), Some("lvl-assign"));
    assert!(!receipt.chapter_complete);
  }

  #[tokio::test]
  async fn perfect_run_earns_bonus_and_carries_streak() {
    let app = app_with(hello_collab());
    let view = started(&app).await;
    place(&app, &view, &["print", "(", "\"hi\"", ")"]).await;
    let out = check_solution(&app, &view.session_id, None).await.unwrap();
    let receipt = out.session.completion.expect("receipt");
    assert!(receipt.record.perfect);
    assert_eq!(receipt.record.xp_awarded, 60);
    assert_eq!(out.session.state.streak, 1);

    let next = enter_level(&app, "p1", "lvl-assign", Some(1)).await.unwrap();
    assert_eq!(next.state.streak, 1);
    let map = map_for_player(&app, "p1").await;
    assert_eq!(map.completed.len(), 1);
    assert!(map.progress_available);
  }

  #[tokio::test]
  async fn running_out_of_lives_fails_without_record() {
    let app = app_with(hello_collab());
    let view = started(&app).await;
    for _ in 0..3 {
      check_solution(&app, &view.session_id, None).await.unwrap();
    }
    let v = session_view(&app, &view.session_id).await.unwrap();
    assert_eq!(v.state.lives, 0);
    assert_eq!(v.state.status, SessionStatus::Complete);
    assert_eq!(v.state.outcome, Some(Outcome::Failure));
    assert!(v.completion.is_none());
    assert!(matches!(check_solution(&app, &view.session_id, None).await, Err(GameError::WrongPhase { .. })));
    assert!(map_for_player(&app, "p1").await.completed.is_empty());

    let again = restart_level(&app, &view.session_id).await.unwrap();
    assert_eq!(again.state.status, SessionStatus::Briefing);
    assert_eq!(again.state.lives, 3);
    assert!(again.puzzle_ready);
  }

  #[tokio::test]
  async fn manual_mode_checks_typed_code_and_asks_for_feedback() {
    let app = app_with(hello_collab());
    let view = started(&app).await;
    let manual = switch_mode(&app, &view.session_id, Mode::Manual).await.unwrap();
    assert_eq!(manual.manual_code, "# print something\n");

    let out = check_solution(&app, &view.session_id, Some("print(\"hi\"".into())).await.unwrap();
    assert_eq!(out.verdict, Verdict::Incorrect);
    assert!(out.session.feedback.unwrap().contains("more piece"));

    update_code(&app, &view.session_id, "print( \"hi\" )".into()).await.unwrap();
    let out = check_solution(&app, &view.session_id, None).await.unwrap();
    assert_eq!(out.verdict, Verdict::Correct);
  }

  #[tokio::test]
  async fn switching_back_to_puzzle_reshuffles_and_keeps_lives() {
    let app = app_with(hello_collab());
    let view = started(&app).await;
    check_solution(&app, &view.session_id, None).await.unwrap();
    switch_mode(&app, &view.session_id, Mode::Manual).await.unwrap();
    assert!(matches!(
      move_piece(&app, &view.session_id, 0, Container::Solution).await,
      Err(GameError::WrongPhase { .. })
    ));
    let back = switch_mode(&app, &view.session_id, Mode::Puzzle).await.unwrap();
    assert!(back.puzzle_ready);
    assert_eq!(back.bucket.len(), 7);
    assert!(back.solution.is_empty());
    assert_eq!(back.state.lives, 2);
  }

  #[tokio::test]
  async fn moves_before_start_are_rejected() {
    let app = app_with(hello_collab());
    let view = enter_level(&app, "p1", HELLO, Some(2)).await.unwrap();
    assert_eq!(view.state.status, SessionStatus::Briefing);
    let res = move_piece(&app, &view.session_id, 0, Container::Solution).await;
    assert!(matches!(res, Err(GameError::WrongPhase { .. })));
    assert!(matches!(enter_level(&app, "p1", "missing", None).await, Err(GameError::UnknownLevel(_))));
  }

  #[tokio::test]
  async fn hint_costs_streak_not_life() {
    let app = app_with(hello_collab());
    let view = started(&app).await;
    let v = request_hint(&app, &view.session_id).await.unwrap();
    assert_eq!(v.state.hints_used, 1);
    assert_eq!(v.state.lives, 3);
    assert!(v.hint.is_some());
    place(&app, &view, &["print", "(", "\"hi\"", ")"]).await;
    let out = check_solution(&app, &view.session_id, None).await.unwrap();
    assert!(!out.session.completion.unwrap().record.perfect);
  }

  /// Holds each hint until released, so a reset can land mid-flight.
  struct GatedHints {
    gate: Notify,
    entered: Notify,
  }

  #[async_trait]
  impl HintGenerator for GatedHints {
    async fn generate(&self, _: &str, _: &str) -> Result<String, CollaboratorError> {
      self.entered.notify_one();
      self.gate.notified().await;
      Ok("late hint".into())
    }
  }

  #[tokio::test]
  async fn hint_arriving_after_restart_is_discarded() {
    let gated = Arc::new(GatedHints { gate: Notify::new(), entered: Notify::new() });
    let app = app_with(Collaborators { hints: gated.clone(), ..hello_collab() });
    let view = started(&app).await;
    let sid = view.session_id.clone();

    let (hint, _) = tokio::join!(request_hint(&app, &sid), async {
      gated.entered.notified().await;
      restart_level(&app, &sid).await.unwrap();
      gated.gate.notify_one();
    });

    assert!(matches!(hint, Err(GameError::Stale(_))));
    let v = session_view(&app, &sid).await.unwrap();
    assert_eq!(v.state.hints_used, 0);
    assert!(v.hint.is_none());
    assert_eq!(v.state.status, SessionStatus::Briefing);
  }

  struct DownHints;

  #[async_trait]
  impl HintGenerator for DownHints {
    async fn generate(&self, _: &str, _: &str) -> Result<String, CollaboratorError> {
      Err(CollaboratorError::Unavailable("timeout".into()))
    }
  }

  #[tokio::test]
  async fn failed_hint_is_retryable_and_free() {
    let app = app_with(Collaborators { hints: Arc::new(DownHints), ..hello_collab() });
    let view = started(&app).await;
    let err = request_hint(&app, &view.session_id).await.unwrap_err();
    assert!(err.retryable());
    let v = session_view(&app, &view.session_id).await.unwrap();
    assert_eq!(v.state.hints_used, 0);
  }

  struct DownStore;

  #[async_trait]
  impl ProgressStore for DownStore {
    async fn complete_level(&self, _: &CompletionRecord) -> Result<(), CollaboratorError> {
      Err(CollaboratorError::Unavailable("db".into()))
    }
    async fn completed_levels(&self, _: &str) -> Result<Vec<CompletionRecord>, CollaboratorError> {
      Err(CollaboratorError::Unavailable("db".into()))
    }
  }

  #[tokio::test]
  async fn persistence_failure_keeps_success() {
    let app = app_with(Collaborators { progress: Arc::new(DownStore), ..hello_collab() });
    let view = started(&app).await;
    place(&app, &view, &["print", "(", "\"hi\"", ")"]).await;
    let out = check_solution(&app, &view.session_id, None).await.unwrap();
    assert_eq!(out.verdict, Verdict::Correct);
    assert_eq!(out.session.state.outcome, Some(Outcome::Success));
    assert_eq!(out.session.completion.unwrap().persisted, PersistStatus::NotSaved);
    assert!(!map_for_player(&app, "p1").await.progress_available);
  }

  #[tokio::test]
  async fn malformed_level_blocks_only_itself() {
    let app = app_with(hello_collab());
    let mut chapters = seed_chapters();
    chapters[0].levels[1].canonical_solution = "   ".into();
    app.replace_graph(LevelGraph::new(chapters), &LayoutParams::default()).await;
    let err = enter_level(&app, "p1", "lvl-assign", None).await.unwrap_err();
    assert!(matches!(err, GameError::MalformedSolution(_)));
    assert!(enter_level(&app, "p1", HELLO, None).await.is_ok());
  }

  #[tokio::test]
  async fn store_receives_exactly_one_record_per_success() {
    let store = Arc::new(MemoryProgressStore::new());
    let app = app_with(Collaborators { progress: store.clone(), ..hello_collab() });
    let view = started(&app).await;
    place(&app, &view, &["print", "(", "\"hi\"", ")"]).await;
    check_solution(&app, &view.session_id, None).await.unwrap();
    assert!(check_solution(&app, &view.session_id, None).await.is_err());
    assert_eq!(store.completed_levels("p1").await.unwrap().len(), 1);
  }

  async fn win_hello(app: &AppState) {
    let view = started(app).await;
    place(app, &view, &["print", "(", "\"hi\"", ")"]).await;
    let out = check_solution(app, &view.session_id, None).await.unwrap();
    assert_eq!(out.session.state.streak, 1);
  }

  #[tokio::test]
  async fn hint_reset_streak_is_not_restored_by_restart() {
    let app = app_with(hello_collab());
    win_hello(&app).await;
    let next = enter_level(&app, "p1", "lvl-assign", Some(1)).await.unwrap();
    assert_eq!(next.state.streak, 1);
    start_session(&app, &next.session_id).await.unwrap();

    let hinted = request_hint(&app, &next.session_id).await.unwrap();
    assert_eq!(hinted.state.streak, 0);
    let again = restart_level(&app, &next.session_id).await.unwrap();
    assert_eq!(again.state.streak, 0);

    let other = enter_level(&app, "p1", "lvl-compare", None).await.unwrap();
    assert_eq!(other.state.streak, 0);
  }

  #[tokio::test]
  async fn wrong_answer_reset_streak_is_not_restored_by_restart() {
    let app = app_with(hello_collab());
    win_hello(&app).await;
    let next = enter_level(&app, "p1", "lvl-assign", Some(1)).await.unwrap();
    start_session(&app, &next.session_id).await.unwrap();

    let out = check_solution(&app, &next.session_id, None).await.unwrap();
    assert_eq!(out.verdict, Verdict::Incorrect);
    assert_eq!(out.session.state.streak, 0);
    let again = restart_level(&app, &next.session_id).await.unwrap();
    assert_eq!(again.state.streak, 0);
  }

  #[tokio::test]
  async fn entering_a_level_closes_the_players_previous_session() {
    let app = app_with(hello_collab());
    let first = enter_level(&app, "p1", HELLO, Some(1)).await.unwrap();
    let bystander = enter_level(&app, "p2", HELLO, Some(1)).await.unwrap();
    let second = enter_level(&app, "p1", "lvl-assign", Some(1)).await.unwrap();

    assert!(matches!(start_session(&app, &first.session_id).await, Err(GameError::UnknownSession(_))));
    assert!(start_session(&app, &second.session_id).await.is_ok());
    assert!(start_session(&app, &bystander.session_id).await.is_ok());
    assert_eq!(app.sessions.read().await.len(), 2);
  }

  /// Holds each feedback call until released.
  struct GatedFeedback {
    gate: Notify,
    entered: Notify,
  }

  #[async_trait]
  impl FeedbackGenerator for GatedFeedback {
    async fn generate(&self, _: &str, _: &str, _: &str) -> Result<String, CollaboratorError> {
      self.entered.notify_one();
      self.gate.notified().await;
      Ok("late feedback".into())
    }
  }

  #[tokio::test]
  async fn feedback_arriving_after_restart_is_discarded() {
    let gated = Arc::new(GatedFeedback { gate: Notify::new(), entered: Notify::new() });
    let app = app_with(Collaborators { feedback: gated.clone(), ..hello_collab() });
    let view = started(&app).await;
    let sid = view.session_id.clone();
    switch_mode(&app, &sid, Mode::Manual).await.unwrap();

    let (checked, _) = tokio::join!(check_solution(&app, &sid, Some("print(".into())), async {
      gated.entered.notified().await;
      restart_level(&app, &sid).await.unwrap();
      gated.gate.notify_one();
    });

    let out = checked.unwrap();
    assert_eq!(out.verdict, Verdict::Incorrect);
    assert_eq!(out.session.feedback, None);
    assert_eq!(out.session.state.lives, 3);
    assert_eq!(out.session.state.status, SessionStatus::Briefing);
  }

  /// Blocks the first call made while armed; other calls answer at once.
  struct GatedDistractors {
    armed: AtomicBool,
    gate: Notify,
    entered: Notify,
  }

  #[async_trait]
  impl DistractorGenerator for GatedDistractors {
    async fn generate(&self, _: &str, _: &[String], _: usize) -> Result<Vec<String>, CollaboratorError> {
      if self.armed.swap(false, Ordering::SeqCst) {
        self.entered.notify_one();
        self.gate.notified().await;
        return Ok(vec!["stale_a".into(), "stale_b".into(), "stale_c".into()]);
      }
      Ok(vec!["fresh_a".into(), "fresh_b".into(), "fresh_c".into()])
    }
  }

  #[tokio::test]
  async fn puzzle_rebuild_overtaken_by_newer_switch_is_dropped() {
    let gated = Arc::new(GatedDistractors { armed: AtomicBool::new(false), gate: Notify::new(), entered: Notify::new() });
    let app = app_with(Collaborators { distractors: gated.clone(), ..Collaborators::local() });
    let view = started(&app).await;
    let sid = view.session_id.clone();
    switch_mode(&app, &sid, Mode::Manual).await.unwrap();

    gated.armed.store(true, Ordering::SeqCst);
    let (slow, fast) = tokio::join!(switch_mode(&app, &sid, Mode::Puzzle), async {
      gated.entered.notified().await;
      switch_mode(&app, &sid, Mode::Manual).await.unwrap();
      let v = switch_mode(&app, &sid, Mode::Puzzle).await.unwrap();
      gated.gate.notify_one();
      v
    });

    assert!(slow.is_ok());
    assert!(fast.puzzle_ready);
    let v = session_view(&app, &sid).await.unwrap();
    assert_eq!(v.state.mode, Mode::Puzzle);
    assert_eq!(v.bucket.len(), 7);
    assert!(v.bucket.iter().any(|p| p.text == "fresh_a"));
    assert!(v.bucket.iter().all(|p| !p.text.starts_with("stale")));
  }
}
