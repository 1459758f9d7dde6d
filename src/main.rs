//! Playground · coding-challenge backend
//!
//! - Chapter map layout, token puzzles, lives/streak sessions
//! - Axum HTTP + WebSocket API
//! - Optional OpenAI collaborators for decoys, hints and feedback
//! - Static front-end fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                    : u16 (default 3000)
//!   PLAYGROUND_CONFIG_PATH  : path to TOML config (prompts, game settings, map, chapters)
//!   OPENAI_API_KEY          : enables OpenAI collaborators if present
//!   OPENAI_BASE_URL         : default "https://api.openai.com/v1"
//!   OPENAI_FAST_MODEL       : default "gpt-4o-mini"
//!   OPENAI_STRONG_MODEL     : default "gpt-4o"
//!   LOG_LEVEL               : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT              : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod seeds;
mod error;
mod layout;
mod puzzle;
mod placement;
mod validator;
mod session;
mod completion;
mod collaborators;
mod openai;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let state = Arc::new(AppState::new());
  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "playground_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  info!(target: "playground_backend", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(target: "playground_backend", error = %e, "Could not listen for ctrl-c; running until killed");
    std::future::pending::<()>().await;
  }
  info!(target: "playground_backend", "Shutdown signal received");
}
