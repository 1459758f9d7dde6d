//! Application state: level graph + cached map, collaborators, and the live
//! play-session registry.
//!
//! Staleness: every play session carries a `ticket` that is bumped whenever
//! the session is reset or its puzzle is re-keyed. Collaborator calls are
//! issued with a `RequestTag` and their results only land through
//! `with_current`, which refuses tags whose ticket no longer matches.

use std::{collections::HashMap, sync::Arc};

use rand::rngs::StdRng;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::collaborators::{
    DistractorGenerator, FeedbackGenerator, HintGenerator, LocalDistractors, LocalFeedback, LocalHints,
    MemoryProgressStore, ProgressStore,
};
use crate::completion::{CompletionReceipt, CompletionReporter};
use crate::config::{load_config_from_env, GameSettings};
use crate::domain::{Level, LevelGraph};
use crate::error::GameError;
use crate::layout::{layout, LayoutParams, MapLayout};
use crate::openai::{OpenAI, OpenAiCollaborators};
use crate::placement::PieceBoard;
use crate::seeds::seed_chapters;
use crate::session::SessionState;
use crate::validator::Verdict;

#[derive(Clone)]
pub struct Collaborators {
    pub distractors: Arc<dyn DistractorGenerator>,
    pub hints: Arc<dyn HintGenerator>,
    pub feedback: Arc<dyn FeedbackGenerator>,
    pub progress: Arc<dyn ProgressStore>,
}

impl Collaborators {
    /// Offline collaborators with in-memory progress.
    pub fn local() -> Self {
        Self {
            distractors: Arc::new(LocalDistractors),
            hints: Arc::new(LocalHints),
            feedback: Arc::new(LocalFeedback),
            progress: Arc::new(MemoryProgressStore::new()),
        }
    }

    /// Model-backed text collaborators; progress stays in memory.
    pub fn openai(oa: OpenAiCollaborators) -> Self {
        let oa = Arc::new(oa);
        Self {
            distractors: oa.clone(),
            hints: oa.clone(),
            feedback: oa,
            progress: Arc::new(MemoryProgressStore::new()),
        }
    }
}

/// Identity of an outstanding collaborator request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestTag {
    pub session_id: String,
    pub ticket: u64,
}

/// One player's attempt at one level.
pub struct PlaySession {
    pub id: String,
    pub player_id: String,
    pub level: Level,
    pub chapter_id: String,
    pub ticket: u64,
    pub state: SessionState,
    /// `None` while a fresh puzzle is being assembled.
    pub board: Option<PieceBoard>,
    /// Live preview, refreshed from the board's change notifications.
    pub preview: String,
    pub manual_code: String,
    pub last_verdict: Verdict,
    pub hint: Option<String>,
    pub feedback: Option<String>,
    pub completion: Option<CompletionReceipt>,
    pub rng: StdRng,
}

impl PlaySession {
    pub fn tag(&self) -> RequestTag {
        RequestTag { session_id: self.id.clone(), ticket: self.ticket }
    }

    /// Clears everything tied to the current attempt and bumps the ticket.
    pub fn reset(&mut self, state: SessionState) {
        self.ticket += 1;
        self.state = state;
        self.board = None;
        self.preview.clear();
        self.manual_code = self.level.starter_code.clone();
        self.last_verdict = Verdict::Pending;
        self.hint = None;
        self.feedback = None;
        self.completion = None;
    }
}

#[derive(Clone)]
pub struct AppState {
    pub graph: Arc<RwLock<LevelGraph>>,
    pub map: Arc<RwLock<Arc<MapLayout>>>,
    pub settings: GameSettings,
    pub reporter: CompletionReporter,
    pub collaborators: Collaborators,
    pub sessions: Arc<RwLock<HashMap<String, PlaySession>>>,
    /// player id -> that player's live session id
    pub live: Arc<RwLock<HashMap<String, String>>>,
    pub streaks: Arc<RwLock<HashMap<String, u32>>>,
}

impl AppState {
    /// Build state from env: load config, pick content, init collaborators.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_config_from_env().unwrap_or_default();

        let chapters = if cfg.chapters.is_empty() {
            info!(target: "playground_backend", "No chapters configured; using built-in seeds");
            seed_chapters()
        } else {
            cfg.chapters
        };

        let collaborators = match OpenAI::from_env() {
            Some(oa) => {
                info!(target: "playground_backend", base_url = %oa.base_url, fast_model = %oa.fast_model, strong_model = %oa.strong_model, "OpenAI enabled.");
                Collaborators::openai(OpenAiCollaborators::new(oa, cfg.prompts))
            }
            None => {
                info!(target: "playground_backend", "OpenAI disabled (no OPENAI_API_KEY). Using local collaborators.");
                Collaborators::local()
            }
        };

        Self::with_parts(LevelGraph::new(chapters), cfg.game, cfg.map, collaborators)
    }

    pub fn with_parts(
        graph: LevelGraph,
        settings: GameSettings,
        layout_params: LayoutParams,
        collaborators: Collaborators,
    ) -> Self {
        let map = layout(&graph, &layout_params);
        info!(target: "playground", chapters = graph.chapters.len(), levels = graph.level_count(), nodes = map.nodes.len(), "Level graph installed");
        Self {
            graph: Arc::new(RwLock::new(graph)),
            map: Arc::new(RwLock::new(Arc::new(map))),
            settings,
            reporter: CompletionReporter::new(settings.perfect_bonus_percent),
            collaborators,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            live: Arc::new(RwLock::new(HashMap::new())),
            streaks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Swap the level graph; the map is recomputed, never patched.
    #[cfg(test)]
    pub async fn replace_graph(&self, graph: LevelGraph, params: &LayoutParams) {
        let map = layout(&graph, params);
        *self.graph.write().await = graph;
        *self.map.write().await = Arc::new(map);
    }

    pub async fn map(&self) -> Arc<MapLayout> {
        self.map.read().await.clone()
    }

    /// Level plus owning chapter id.
    pub async fn level(&self, level_id: &str) -> Result<(Level, String), GameError> {
        let graph = self.graph.read().await;
        graph
            .find_level(level_id)
            .map(|(c, l)| (l.clone(), c.id.clone()))
            .ok_or_else(|| GameError::UnknownLevel(level_id.to_string()))
    }

    pub async fn player_streak(&self, player_id: &str) -> u32 {
        self.streaks.read().await.get(player_id).copied().unwrap_or(0)
    }

    pub async fn set_player_streak(&self, player_id: &str, streak: u32) {
        self.streaks.write().await.insert(player_id.to_string(), streak);
    }

    /// Register `session` as its player's only live session. The previous
    /// one is dropped, so its late collaborator results turn stale.
    pub async fn insert_session(&self, session: PlaySession) {
        let mut sessions = self.sessions.write().await;
        let mut live = self.live.write().await;
        if let Some(prior) = live.insert(session.player_id.clone(), session.id.clone()) {
            if sessions.remove(&prior).is_some() {
                debug!(target: "playground", player = %session.player_id, session = %prior, "Previous session closed");
            }
        }
        sessions.insert(session.id.clone(), session);
    }

    /// Run `f` against a session by id.
    pub async fn with_session<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut PlaySession) -> Result<R, GameError>,
    ) -> Result<R, GameError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| GameError::UnknownSession(session_id.to_string()))?;
        f(session)
    }

    /// Like `with_session`, but only if the session has not been reset since
    /// `tag` was issued.
    pub async fn with_current<R>(
        &self,
        tag: &RequestTag,
        f: impl FnOnce(&mut PlaySession) -> Result<R, GameError>,
    ) -> Result<R, GameError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&tag.session_id) {
            Some(session) if session.ticket == tag.ticket => f(session),
            Some(session) => {
                debug!(target: "playground", session = %tag.session_id, issued = tag.ticket, current = session.ticket, "Discarding stale collaborator response");
                Err(GameError::Stale(tag.session_id.clone()))
            }
            None => {
                debug!(target: "playground", session = %tag.session_id, "Discarding response for closed session");
                Err(GameError::Stale(tag.session_id.clone()))
            }
        }
    }
}
