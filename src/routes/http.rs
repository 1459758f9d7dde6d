//! HTTP endpoint handlers. These are thin wrappers that forward to core logic;
//! errors turn into `{ code, message, retryable }` bodies via `GameError`.

use std::sync::Arc;
use axum::{extract::{Path, Query, State}, Json, response::IntoResponse};
use tracing::{info, instrument};

use crate::error::GameError;
use crate::protocol::*;
use crate::state::AppState;
use crate::logic;

type ApiResult<T> = Result<Json<T>, GameError>;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state), fields(player = %q.player_id))]
pub async fn http_get_map(
  State(state): State<Arc<AppState>>,
  Query(q): Query<MapQuery>,
) -> Json<MapOut> {
  let map = logic::map_for_player(&state, &q.player_id).await;
  info!(target: "playground", nodes = map.layout.nodes.len(), completed = map.completed.len(), "HTTP map served");
  Json(map)
}

#[instrument(level = "info", skip(state, body), fields(level = %body.level_id, player = %body.player_id))]
pub async fn http_enter_level(
  State(state): State<Arc<AppState>>,
  Json(body): Json<EnterLevelIn>,
) -> ApiResult<SessionView> {
  let view = logic::enter_level(&state, &body.player_id, &body.level_id, body.seed).await?;
  info!(target: "playground", session = %view.session_id, "HTTP level entered");
  Ok(Json(view))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<SessionView> {
  Ok(Json(logic::session_view(&state, &id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_start(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<SessionView> {
  Ok(Json(logic::start_session(&state, &id).await?))
}

#[instrument(level = "debug", skip(state, body), fields(piece = body.piece_id, target = ?body.target))]
pub async fn http_move_piece(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<MoveIn>,
) -> ApiResult<SessionView> {
  Ok(Json(logic::move_piece(&state, &id, body.piece_id, body.target).await?))
}

#[instrument(level = "debug", skip(state, body), fields(code_len = body.code.len()))]
pub async fn http_edit_code(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<CodeIn>,
) -> ApiResult<SessionView> {
  Ok(Json(logic::update_code(&state, &id, body.code).await?))
}

/// Body is optional: puzzle mode checks the arranged pieces as they are.
#[instrument(level = "info", skip(state, body))]
pub async fn http_check(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  body: Option<Json<CheckIn>>,
) -> ApiResult<CheckOut> {
  let code = body.and_then(|Json(b)| b.code);
  let out = logic::check_solution(&state, &id, code).await?;
  info!(target: "playground", session = %id, verdict = ?out.verdict, lives = out.session.state.lives, "HTTP check evaluated");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state))]
pub async fn http_hint(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<SessionView> {
  Ok(Json(logic::request_hint(&state, &id).await?))
}

#[instrument(level = "info", skip(state, body), fields(mode = ?body.mode))]
pub async fn http_switch_mode(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<ModeIn>,
) -> ApiResult<SessionView> {
  Ok(Json(logic::switch_mode(&state, &id, body.mode).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_restart(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<SessionView> {
  Ok(Json(logic::restart_level(&state, &id).await?))
}
