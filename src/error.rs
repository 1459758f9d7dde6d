//! Game errors with HTTP status mapping.
//!
//! Handlers return `Result<Json<_>, GameError>`; the response body is
//! `{ "code", "message", "retryable" }` so the client can decide between a
//! retry affordance and sending the player back to the map.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::placement::PlacementError;
use crate::session::SessionError;

#[derive(Debug, thiserror::Error)]
pub enum GameError {
  #[error("unknown level: {0}")]
  UnknownLevel(String),

  #[error("unknown session: {0}")]
  UnknownSession(String),

  /// Content defect: the solution produced no tokens. Blocks this level only.
  #[error("level solution cannot be turned into a puzzle: {0:?}")]
  MalformedSolution(String),

  #[error(transparent)]
  Session(#[from] SessionError),

  #[error(transparent)]
  Placement(#[from] PlacementError),

  /// Board/code action outside the status or mode that accepts it.
  #[error("{action} not allowed while {phase}")]
  WrongPhase { action: &'static str, phase: String },

  /// The puzzle for this session is still being (re)assembled.
  #[error("puzzle not ready for session {0}")]
  PuzzleNotReady(String),

  /// A collaborator answered for a session that has since been reset.
  #[error("response discarded: session {0} was reset")]
  Stale(String),

  #[error("{what} unavailable: {reason}")]
  CollaboratorUnavailable { what: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
  pub code: &'static str,
  pub message: String,
  pub retryable: bool,
}

impl GameError {
  pub fn code(&self) -> &'static str {
    match self {
      GameError::UnknownLevel(_) => "UNKNOWN_LEVEL",
      GameError::UnknownSession(_) => "UNKNOWN_SESSION",
      GameError::MalformedSolution(_) => "LEVEL_UNAVAILABLE",
      GameError::Session(_) => "INVALID_TRANSITION",
      GameError::Placement(_) => "BAD_PLACEMENT",
      GameError::WrongPhase { .. } => "WRONG_PHASE",
      GameError::PuzzleNotReady(_) => "PUZZLE_NOT_READY",
      GameError::Stale(_) => "STALE_RESPONSE",
      GameError::CollaboratorUnavailable { .. } => "COLLABORATOR_UNAVAILABLE",
    }
  }

  pub fn retryable(&self) -> bool {
    matches!(
      self,
      GameError::PuzzleNotReady(_) | GameError::Stale(_) | GameError::CollaboratorUnavailable { .. }
    )
  }

  pub fn status(&self) -> StatusCode {
    match self {
      GameError::UnknownLevel(_) | GameError::UnknownSession(_) => StatusCode::NOT_FOUND,
      GameError::MalformedSolution(_) => StatusCode::UNPROCESSABLE_ENTITY,
      GameError::Session(_)
      | GameError::WrongPhase { .. }
      | GameError::Stale(_)
      | GameError::PuzzleNotReady(_) => StatusCode::CONFLICT,
      GameError::Placement(_) => StatusCode::BAD_REQUEST,
      GameError::CollaboratorUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
  }

  pub fn body(&self) -> ErrorBody {
    ErrorBody { code: self.code(), message: self.to_string(), retryable: self.retryable() }
  }
}

impl IntoResponse for GameError {
  fn into_response(self) -> Response {
    (self.status(), Json(self.body())).into_response()
  }
}
