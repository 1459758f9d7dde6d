//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug};

use crate::error::{ErrorBody, GameError};
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::logic;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "playground_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "playground_backend", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "playground_backend", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state).await
          }
          Err(e) => ServerWsMessage::Error {
            error: ErrorBody { code: "BAD_MESSAGE", message: format!("Invalid JSON: {}", e), retryable: false },
          },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "code": "INTERNAL", "message": format!("Serialization error: {}", e), "retryable": false }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "playground_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "playground_backend", "WebSocket disconnected");
}

fn session_reply(res: Result<crate::protocol::SessionView, GameError>) -> ServerWsMessage {
  match res {
    Ok(session) => ServerWsMessage::Session { session },
    Err(e) => ServerWsMessage::Error { error: e.body() },
  }
}

#[instrument(level = "info", skip(state))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::GetMap { player_id } => {
      let map = logic::map_for_player(state, &player_id).await;
      info!(target: "playground", %player_id, "WS map served");
      ServerWsMessage::Map { map }
    }

    ClientWsMessage::EnterLevel(e) =>
      session_reply(logic::enter_level(state, &e.player_id, &e.level_id, e.seed).await),

    ClientWsMessage::Start { session_id } => session_reply(logic::start_session(state, &session_id).await),

    ClientWsMessage::MovePiece { session_id, piece_id, target } =>
      session_reply(logic::move_piece(state, &session_id, piece_id, target).await),

    ClientWsMessage::EditCode { session_id, code } =>
      session_reply(logic::update_code(state, &session_id, code).await),

    ClientWsMessage::Check { session_id, code } => match logic::check_solution(state, &session_id, code).await {
      Ok(out) => {
        info!(target: "playground", session = %session_id, verdict = ?out.verdict, "WS check evaluated");
        ServerWsMessage::CheckResult { verdict: out.verdict, session: out.session }
      }
      Err(e) => ServerWsMessage::Error { error: e.body() },
    },

    ClientWsMessage::Hint { session_id } => session_reply(logic::request_hint(state, &session_id).await),

    ClientWsMessage::SwitchMode { session_id, mode } =>
      session_reply(logic::switch_mode(state, &session_id, mode).await),

    ClientWsMessage::Restart { session_id } => session_reply(logic::restart_level(state, &session_id).await),
  }
}
