//! Core tutoring behaviors shared by the WebSocket session and the HTTP API.
//!
//! This includes:
//!   - the answer matcher (pipe-separated phrases, case-insensitive containment)
//!   - the scaffold selector (turn index -> escalation stage)
//!   - single-turn evaluation (generator + local override + fallbacks)
//!   - greeting helpers (name extraction, templated greeting)

use std::time::Duration;

use rand::seq::SliceRandom;
use tracing::{debug, instrument, warn};

use crate::domain::{Challenge, Evaluation, ScaffoldStage, Scaffolding};
use crate::error::TutorError;
use crate::providers::{ResponseGenerator, TurnRequest};
use crate::util::squash_whitespace;

pub const DEFAULT_STUDENT_NAME: &str = "Friend";
pub const GREETING_INTRO: &str = "Hi! I'm Math Mate, your friend! What's your name?";

const NOT_HEARD_PREFIX: &str = "I didn't catch that. ";

const ENCOURAGEMENTS: &[&str] = &[
  "Good job! Let's continue!",
  "Great! Let's keep going!",
  "Good try! Let's continue!",
  "Nice try! Let's see the next one!",
];

const PRAISE: &[&str] = &[
  "Yes! That's right! Great job!",
  "You got it! Well done!",
  "Correct! Amazing thinking!",
];

/// True iff the transcript contains any accepted phrase (case-insensitive substring).
/// Whitespace runs compare as a single space on both sides.
/// Blank alternatives are ignored so "a||b" never matches everything.
pub fn matches_answer(pattern: &str, transcript: &str) -> bool {
  let heard = squash_whitespace(&transcript.to_lowercase());
  pattern
    .split('|')
    .map(|p| squash_whitespace(&p.to_lowercase()))
    .filter(|p| !p.is_empty())
    .any(|p| heard.contains(&p))
}

pub fn stage_for_turn(turn: usize) -> ScaffoldStage {
  match turn {
    0 => ScaffoldStage::Probe1,
    1 => ScaffoldStage::Probe2,
    2 => ScaffoldStage::Hint,
    3 => ScaffoldStage::Scaffold,
    _ => ScaffoldStage::Reveal,
  }
}

pub fn scaffold_for_turn(scaffolding: &Scaffolding, turn: usize) -> &str {
  match stage_for_turn(turn) {
    ScaffoldStage::Probe1 => &scaffolding.probe1,
    ScaffoldStage::Probe2 => &scaffolding.probe2,
    ScaffoldStage::Hint => &scaffolding.hint,
    ScaffoldStage::Scaffold => &scaffolding.scaffold,
    ScaffoldStage::Reveal => &scaffolding.reveal,
  }
}

pub fn is_last_turn(challenge: &Challenge, turn: usize) -> bool {
  turn + 1 >= challenge.max_turns
}

/// Evaluate one student turn.
///
/// Final correctness is the OR of the local matcher and the generator's verdict;
/// the turn ends on correctness, on the generator's request, or on the last allowed turn.
/// Generator errors and timeouts fall back to the turn's scaffold text.
#[instrument(level = "debug", target = "dialogue", skip(generator, req), fields(challenge = %req.challenge.id, turn = req.turn, transcript_len = req.transcript.len()))]
pub async fn evaluate_turn(
  generator: Option<&dyn ResponseGenerator>,
  req: TurnRequest<'_>,
  timeout: Duration,
) -> Evaluation {
  let challenge = req.challenge;
  let turn = req.turn;
  let last = is_last_turn(challenge, turn);
  let scaffold = scaffold_for_turn(&challenge.scaffolding, turn);

  if req.transcript.trim().is_empty() {
    debug!(target: "dialogue", turn, "Empty transcript; replying with scaffold.");
    return Evaluation {
      reply: format!("{NOT_HEARD_PREFIX}{scaffold}"),
      is_correct: false,
      should_end: last,
    };
  }

  let local = matches_answer(&challenge.correctness_filter, req.transcript);

  let generated = match generator {
    Some(g) => match tokio::time::timeout(timeout, g.evaluate(req)).await {
      Ok(r) => r,
      Err(_) => Err(TutorError::ProviderTimeout),
    },
    None => Err(TutorError::ProviderFailure("no response generator configured".into())),
  };

  match generated {
    Ok(g) => {
      let is_correct = g.is_correct || local;
      if local && !g.is_correct {
        debug!(target: "dialogue", turn, "Local matcher overrides generator verdict.");
      }
      let reply = if g.reply.trim().is_empty() { scaffold.to_string() } else { g.reply };
      Evaluation { reply, is_correct, should_end: g.should_end || is_correct || last }
    }
    Err(e) => {
      warn!(target: "dialogue", turn, error = %e, "Generator unavailable; using scaffold fallback.");
      let reply = if local { praise_line() } else { scaffold.to_string() };
      Evaluation { reply, is_correct: local, should_end: local || last }
    }
  }
}

/// Generic line spoken when a dialogue step blew up; the session still moves on.
pub fn encouragement_line() -> String {
  ENCOURAGEMENTS
    .choose(&mut rand::thread_rng())
    .copied()
    .unwrap_or(ENCOURAGEMENTS[0])
    .to_string()
}

fn praise_line() -> String {
  PRAISE.choose(&mut rand::thread_rng()).copied().unwrap_or(PRAISE[0]).to_string()
}

pub fn fallback_greeting(name: &str, total_challenges: usize) -> String {
  let name = if name.trim().is_empty() { DEFAULT_STUDENT_NAME } else { name.trim() };
  format!("Hi {name}! We have {total_challenges} fun challenges. Let's go!")
}

/// Pull a first name out of an introduction like "I'm Krishna Gautam" -> "Krishna".
pub fn extract_name(transcript: &str) -> String {
  const PREFIXES: &[&str] = &["my name is", "i am", "i'm", "im", "this is", "it's", "its", "hello", "hey", "hi"];

  let mut rest = transcript
    .trim()
    .trim_start_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
    .to_string();

  // Greetings stack up ("Hi, I'm Maya"), so strip until nothing matches.
  loop {
    let lower = rest.to_lowercase();
    let hit = PREFIXES.iter().find(|p| {
      lower.starts_with(**p)
        && lower[p.len()..].chars().next().map_or(true, |c| !c.is_alphanumeric())
    });
    match hit {
      Some(p) => {
        rest = rest
          .get(p.len()..)
          .unwrap_or("")
          .trim_start_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
          .to_string();
      }
      None => break,
    }
  }

  let word: String = rest
    .split_whitespace()
    .next()
    .unwrap_or("")
    .chars()
    .filter(|c| !matches!(c, '.' | ',' | '!' | '?'))
    .collect();

  let mut chars = word.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
    None => DEFAULT_STUDENT_NAME.to_string(),
  }
}
