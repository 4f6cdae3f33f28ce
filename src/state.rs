//! Application state: the challenge catalog, prompts, timing and the optional providers.
//!
//! This module owns:
//!   - the ordered challenge list (TOML catalog when valid, otherwise the built-in module)
//!   - the timing bounds every session uses
//!   - optional chat client (reply/greeting generation)
//!   - optional Deepgram client (transcription + synthesis)
//!
//! Sessions themselves are not stored here; each WebSocket connection owns its own.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::catalog::builtin_challenges;
use crate::config::{load_tutor_config_from_env, validated_challenges, Timing};
use crate::domain::Challenge;
use crate::providers::deepgram::Deepgram;
use crate::providers::llm::ChatClient;

#[derive(Clone)]
pub struct AppState {
  pub challenges: Arc<Vec<Challenge>>,
  pub timing: Timing,
  pub llm: Option<ChatClient>,
  pub deepgram: Option<Deepgram>,
}

impl AppState {
  /// Build state from env: load config, pick the catalog, init providers.
  #[instrument(level = "info", skip_all)]
  pub fn new() -> Self {
    let cfg = load_tutor_config_from_env().unwrap_or_default();

    let configured = validated_challenges(cfg.challenges);
    let challenges = if configured.is_empty() {
      builtin_challenges()
    } else {
      configured
    };
    info!(target: "mathmate_backend", count = challenges.len(), first = ?challenges.first().map(|c| c.id.as_str()), "Challenge catalog ready");

    let llm = ChatClient::from_env(cfg.prompts);
    if let Some(c) = &llm {
      info!(target: "mathmate_backend", base_url = %c.base_url, model = %c.model, "Chat generation enabled.");
    } else {
      warn!(target: "mathmate_backend", "Chat generation disabled (no LLM_API_KEY). Using scaffold replies.");
    }

    let deepgram = Deepgram::from_env();
    if let Some(d) = &deepgram {
      info!(target: "mathmate_backend", stt_model = %d.stt_model, voice = %d.voice, "Deepgram enabled.");
    } else {
      warn!(target: "mathmate_backend", "Deepgram disabled (no DEEPGRAM_API_KEY). Transcripts will be empty; clients speak on-device.");
    }

    Self { challenges: Arc::new(challenges), timing: cfg.timing, llm, deepgram }
  }

  /// Providers off, given catalog. Used by tests and as a known-good baseline.
  #[cfg(test)]
  pub fn offline(challenges: Vec<Challenge>) -> Self {
    Self { challenges: Arc::new(challenges), timing: Timing::default(), llm: None, deepgram: None }
  }

  pub fn challenge(&self, id: &str) -> Option<&Challenge> {
    self.challenges.iter().find(|c| c.id == id)
  }
}
