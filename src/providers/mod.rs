//! Collaborator contracts consumed by the session core, plus the HTTP-backed
//! implementations (chat completions for replies/greetings, Deepgram for
//! speech-to-text and text-to-speech).
//!
//! The core never sees a provider error it has to act on beyond "use the
//! fallback": transcription and playback cannot fail at all from the core's
//! point of view, and generation failures are replaced by scaffold text.

use async_trait::async_trait;

use crate::domain::{Challenge, Message};
use crate::error::TutorError;

pub mod deepgram;
pub mod llm;

/// Everything the generator needs to judge one student turn.
#[derive(Clone, Debug)]
pub struct TurnRequest<'a> {
  pub challenge: &'a Challenge,
  pub transcript: &'a str,
  pub student_name: &'a str,
  pub turn: usize,
  pub history: &'a [Message],
}

/// Raw generator output, before the local correctness override is applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedReply {
  pub reply: String,
  pub is_correct: bool,
  pub should_end: bool,
}

#[async_trait]
pub trait ResponseGenerator: Send + Sync {
  async fn evaluate(&self, req: TurnRequest<'_>) -> Result<GeneratedReply, TutorError>;
  async fn greet(&self, student_name: &str, total_challenges: usize) -> Result<String, TutorError>;
}

/// Speech-to-text. Returns an empty string on any failure.
#[async_trait]
pub trait Transcriber: Send + Sync {
  async fn transcribe(&self, audio: &[u8], mime: &str) -> String;
}

/// Resolves once the line has audibly finished (or after an on-device fallback).
#[async_trait]
pub trait Speaker: Send + Sync {
  async fn speak(&self, text: &str);
}

/// Microphone permission. Asks the device if access was not granted yet.
#[async_trait]
pub trait PermissionGate: Send + Sync {
  async fn request(&self) -> bool;
}

/// Used when no transcription provider is configured.
pub struct NoTranscriber;

#[async_trait]
impl Transcriber for NoTranscriber {
  async fn transcribe(&self, _audio: &[u8], _mime: &str) -> String {
    String::new()
  }
}
