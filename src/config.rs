//! Loading tutor configuration (prompts, timing, optional challenge catalog) from TOML.
//!
//! See `TutorConfig`, `Prompts` and `Timing` for the expected schema.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::domain::Challenge;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct TutorConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub timing: Timing,
  /// Replaces the built-in catalog when non-empty.
  #[serde(default)]
  pub challenges: Vec<Challenge>,
}

/// Prompts used by the chat client. Defaults target Grade 4 fractions in very simple English.
/// Override them in TOML to tune tone or structure.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub evaluate_system: String,
  pub evaluate_user_template: String,
  pub greeting_system: String,
  pub greeting_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      evaluate_system: r#"You are Math Mate, an encouraging AI tutor for Grade 4 students learning fractions.

CRITICAL RULES:
1. Reply with ONE or TWO short sentences (max 25 words total).
2. Use VERY simple English (English is a second language for many students).
3. Always be positive and encouraging. Reference the student's answer when possible.
4. Never give the answer before the final turn. Follow the GUIDANCE for this turn.
5. If the student is correct, praise them and do not ask another question.

Respond ONLY with strict JSON: {"response": string, "isCorrect": boolean, "shouldEnd": boolean}"#.into(),
      evaluate_user_template: r#"Student name: {student_name}
Challenge number: {challenge_number}
Question asked: "{question}"
Educational context: {context}
Accepted answers (any of): {accepted}
Turn: {turn_number} of {max_turns}
Guidance stage: {stage}
GUIDANCE for this turn: {stage_text}

Student said: "{transcript}""#.into(),
      greeting_system: r#"You are Math Mate, an encouraging AI tutor for Grade 4 students learning fractions.

RULES FOR THIS GREETING:
1. Generate EXACTLY ONE sentence (max 15 words).
2. Use VERY simple English.
3. Welcome the student by name.
4. Tell them we have {total} fun challenges today.
5. Be excited and warm. Do NOT say any challenge is done.

EXAMPLE: "Hi Maya! We have 7 fun challenges today. Let's go!""#.into(),
      greeting_user_template: "The student's name is \"{student_name}\".".into(),
    }
  }
}

/// Bounds for every wait in a session. Stored in milliseconds in TOML.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Timing {
  pub provider_timeout_ms: u64,
  pub transcription_timeout_ms: u64,
  pub max_recording_ms: u64,
  pub listen_timeout_ms: u64,
  pub playback_floor_ms: u64,
  pub playback_ms_per_char: u64,
}

impl Default for Timing {
  fn default() -> Self {
    Self {
      provider_timeout_ms: 5_000,
      transcription_timeout_ms: 8_000,
      max_recording_ms: 15_000,
      listen_timeout_ms: 45_000,
      playback_floor_ms: 8_000,
      playback_ms_per_char: 90,
    }
  }
}

impl Timing {
  pub fn provider_timeout(&self) -> Duration { Duration::from_millis(self.provider_timeout_ms) }
  pub fn transcription_timeout(&self) -> Duration { Duration::from_millis(self.transcription_timeout_ms) }
  pub fn max_recording(&self) -> Duration { Duration::from_millis(self.max_recording_ms) }
  pub fn listen_timeout(&self) -> Duration { Duration::from_millis(self.listen_timeout_ms) }

  /// Upper bound on how long a spoken line may take before we stop waiting for the client.
  pub fn playback_bound(&self, text: &str) -> Duration {
    let chars = text.chars().count() as u64;
    // Both knobs come from TOML; saturate instead of overflowing.
    Duration::from_millis(self.playback_floor_ms.saturating_add(chars.saturating_mul(self.playback_ms_per_char)))
  }
}

/// Drop catalog entries that would break the session invariants.
pub fn validated_challenges(raw: Vec<Challenge>) -> Vec<Challenge> {
  let mut out: Vec<Challenge> = Vec::with_capacity(raw.len());
  for c in raw {
    if c.id.trim().is_empty() {
      error!(target: "mathmate_backend", number = c.number, "Skipping catalog entry: empty id.");
      continue;
    }
    if c.correctness_filter.split('|').all(|p| p.trim().is_empty()) {
      error!(target: "mathmate_backend", id = %c.id, "Skipping catalog entry: empty correctness_filter.");
      continue;
    }
    if c.max_turns == 0 {
      error!(target: "mathmate_backend", id = %c.id, "Skipping catalog entry: max_turns must be >= 1.");
      continue;
    }
    if out.iter().any(|o| o.id == c.id) {
      warn!(target: "mathmate_backend", id = %c.id, "Skipping duplicate catalog id.");
      continue;
    }
    out.push(c);
  }
  out
}

/// Attempt to load `TutorConfig` from TUTOR_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_tutor_config_from_env() -> Option<TutorConfig> {
  let path = std::env::var("TUTOR_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<TutorConfig>(&s) {
      Ok(cfg) => {
        info!(target: "mathmate_backend", %path, challenges = cfg.challenges.len(), "Loaded tutor config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "mathmate_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "mathmate_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::catalog::builtin_challenges;

  #[test]
  fn partial_toml_keeps_defaults() {
    let cfg: TutorConfig = toml::from_str(
      r#"
        [timing]
        provider_timeout_ms = 1200

        [prompts]
        greeting_user_template = "Name: {student_name}"
      "#,
    )
    .expect("valid toml");
    assert_eq!(cfg.timing.provider_timeout(), Duration::from_millis(1200));
    assert_eq!(cfg.timing.max_recording_ms, 15_000);
    assert_eq!(cfg.prompts.greeting_user_template, "Name: {student_name}");
    assert!(cfg.prompts.evaluate_system.contains("isCorrect"));
    assert!(cfg.challenges.is_empty());
  }

  #[test]
  fn challenges_parse_from_toml() {
    let cfg: TutorConfig = toml::from_str(
      r#"
        [[challenges]]
        id = "halves"
        number = 1
        kind = "video"
        path = "/videos/halves.mp4"
        title = "Halves"
        pre_script = "Watch this!"
        post_question = "What is one of two equal parts called?"
        correctness_filter = "half|1/2"

        [challenges.scaffolding]
        probe1 = "p1"
        probe2 = "p2"
        hint = "h"
        scaffold = "s"
        reveal = "r"
      "#,
    )
    .expect("valid toml");
    assert_eq!(cfg.challenges.len(), 1);
    assert_eq!(cfg.challenges[0].max_turns, 5);
    assert_eq!(cfg.challenges[0].scaffolding.reveal, "r");
  }

  #[test]
  fn validation_drops_broken_entries() {
    let mut all = builtin_challenges();
    all[1].correctness_filter = " | ".into();
    all[2].max_turns = 0;
    let dup = all[0].clone();
    all.push(dup);
    let kept = validated_challenges(all);
    assert_eq!(kept.len(), 5);
    assert!(kept.iter().all(|c| c.id != "applet-a1" && c.id != "applet-a2"));
  }

  #[test]
  fn playback_bound_grows_with_text() {
    let t = Timing::default();
    assert!(t.playback_bound("a much longer sentence to say") > t.playback_bound("hi"));
    assert_eq!(t.playback_bound(""), Duration::from_millis(t.playback_floor_ms));
  }

  #[test]
  fn playback_bound_saturates_on_huge_settings() {
    let t = Timing { playback_ms_per_char: u64::MAX, ..Timing::default() };
    assert_eq!(t.playback_bound("hello"), Duration::from_millis(u64::MAX));
    let t = Timing { playback_floor_ms: u64::MAX, ..Timing::default() };
    assert_eq!(t.playback_bound("hi"), Duration::from_millis(u64::MAX));
  }
}
