//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Pieces leave the backend as `{ id, text }` only; roles stay internal.

use serde::{Deserialize, Serialize};

use crate::completion::CompletionReceipt;
use crate::domain::{CompletionRecord, Container, Piece, PieceId};
use crate::error::ErrorBody;
use crate::layout::MapLayout;
use crate::session::{Mode, SessionState};
use crate::state::PlaySession;
use crate::validator::Verdict;

pub const DEFAULT_PLAYER: &str = "anonymous";

fn default_player() -> String {
    DEFAULT_PLAYER.to_string()
}

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    GetMap {
        #[serde(rename = "playerId", default = "default_player")]
        player_id: String,
    },
    EnterLevel(EnterLevelIn),
    Start {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    MovePiece {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "pieceId")]
        piece_id: PieceId,
        target: Container,
    },
    EditCode {
        #[serde(rename = "sessionId")]
        session_id: String,
        code: String,
    },
    Check {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(default)]
        code: Option<String>,
    },
    Hint {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    SwitchMode {
        #[serde(rename = "sessionId")]
        session_id: String,
        mode: Mode,
    },
    Restart {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Map {
        map: MapOut,
    },
    Session {
        session: SessionView,
    },
    CheckResult {
        verdict: Verdict,
        session: SessionView,
    },
    Error {
        #[serde(flatten)]
        error: ErrorBody,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PieceOut {
    pub id: PieceId,
    pub text: String,
}

impl From<&Piece> for PieceOut {
    fn from(p: &Piece) -> Self {
        Self { id: p.id, text: p.text.clone() }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelBrief {
    pub id: String,
    pub chapter_id: String,
    pub title: String,
    pub objective: String,
    pub intro_text: String,
    pub starter_code: String,
    pub reward_xp: u32,
    pub language: String,
}

/// Everything the puzzle view needs, as read-only data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: String,
    pub player_id: String,
    pub level: LevelBrief,
    pub state: SessionState,
    pub puzzle_ready: bool,
    /// Bumped on every board change; lets a client drop out-of-order views.
    pub revision: u64,
    pub bucket: Vec<PieceOut>,
    pub solution: Vec<PieceOut>,
    pub assembled_text: String,
    pub manual_code: String,
    pub last_verdict: Verdict,
    pub hint: Option<String>,
    pub feedback: Option<String>,
    pub completion: Option<CompletionReceipt>,
}

/// Convert a live session to the public view.
pub fn to_view(s: &PlaySession) -> SessionView {
    let (bucket, solution) = match &s.board {
        Some(b) => (b.bucket().map(PieceOut::from).collect(), b.solution().map(PieceOut::from).collect()),
        None => (Vec::new(), Vec::new()),
    };
    SessionView {
        session_id: s.id.clone(),
        player_id: s.player_id.clone(),
        level: LevelBrief {
            id: s.level.id.clone(),
            chapter_id: s.chapter_id.clone(),
            title: s.level.title.clone(),
            objective: s.level.objective.clone(),
            intro_text: s.level.intro_text.clone(),
            starter_code: s.level.starter_code.clone(),
            reward_xp: s.level.reward_xp,
            language: s.level.language.clone(),
        },
        state: s.state,
        puzzle_ready: s.board.is_some(),
        revision: s.board.as_ref().map_or(0, |b| b.revision()),
        bucket,
        solution,
        assembled_text: s.preview.clone(),
        manual_code: s.manual_code.clone(),
        last_verdict: s.last_verdict,
        hint: s.hint.clone(),
        feedback: s.feedback.clone(),
        completion: s.completion.clone(),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapOut {
    pub layout: MapLayout,
    /// SVG path data for each connector, in `layout.connectors` order.
    pub paths: Vec<String>,
    pub completed: Vec<CompletionRecord>,
    /// False when the progress store could not be read.
    pub progress_available: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOut {
    pub verdict: Verdict,
    pub session: SessionView,
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapQuery {
    #[serde(default = "default_player")]
    pub player_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnterLevelIn {
    pub level_id: String,
    #[serde(default = "default_player")]
    pub player_id: String,
    /// Fixes the shuffle; omitted means fresh entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveIn {
    pub piece_id: PieceId,
    pub target: Container,
}

#[derive(Debug, Deserialize)]
pub struct CodeIn {
    pub code: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckIn {
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModeIn {
    pub mode: Mode,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ws_messages() {
        let m: ClientWsMessage =
            serde_json::from_str(r#"{"type":"move_piece","sessionId":"s","pieceId":3,"target":"solution"}"#).unwrap();
        assert!(matches!(m, ClientWsMessage::MovePiece { piece_id: 3, target: Container::Solution, .. }));

        let m: ClientWsMessage = serde_json::from_str(r#"{"type":"enter_level","levelId":"l1","seed":9}"#).unwrap();
        match m {
            ClientWsMessage::EnterLevel(e) => {
                assert_eq!(e.player_id, DEFAULT_PLAYER);
                assert_eq!(e.seed, Some(9));
            }
            other => panic!("unexpected {other:?}"),
        }

        let m: ClientWsMessage = serde_json::from_str(r#"{"type":"switch_mode","sessionId":"s","mode":"manual"}"#).unwrap();
        assert!(matches!(m, ClientWsMessage::SwitchMode { mode: Mode::Manual, .. }));
    }

    #[test]
    fn error_message_flattens_body() {
        let msg = ServerWsMessage::Error {
            error: ErrorBody { code: "STALE_RESPONSE", message: "x".into(), retryable: true },
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "error");
        assert_eq!(v["code"], "STALE_RESPONSE");
        assert_eq!(v["retryable"], true);
    }
}
