//! Math Mate · Voice Fractions Tutor Backend
//!
//! - Axum HTTP + WebSocket API (one tutoring session per socket)
//! - Optional chat-completions and Deepgram integration (via environment variables)
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT               : u16 (default 3000)
//!   LLM_API_KEY        : enables generated replies and greetings if present
//!   LLM_BASE_URL       : default "https://openrouter.ai/api/v1"
//!   LLM_MODEL          : default "openai/gpt-4.1-nano"
//!   DEEPGRAM_API_KEY   : enables transcription and synthesized speech if present
//!   DEEPGRAM_BASE_URL  : default "https://api.deepgram.com/v1"
//!   DEEPGRAM_STT_MODEL : default "nova-2"
//!   DEEPGRAM_VOICE     : default "aura-asteria-en"
//!   TUTOR_CONFIG_PATH  : path to TOML config (prompts, timing, optional challenge catalog)
//!   LOG_LEVEL          : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT         : "pretty" (default) or "json"

mod capture;
mod catalog;
mod config;
mod controller;
mod dialogue;
mod domain;
mod error;
mod handoff;
mod link;
mod logic;
mod protocol;
mod providers;
mod routes;
mod session;
mod state;
mod telemetry;
mod tutor;
mod util;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Catalog, timing and optional providers; sessions are created per connection.
  let state = Arc::new(AppState::new());

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "mathmate_backend", %addr, challenges = state.challenges.len(), "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
