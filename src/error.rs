//! Error taxonomy shared by the session core and the providers.
//!
//! None of these is allowed to stop a session from moving forward: callers
//! always have a fallback utterance and a next phase.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TutorError {
  /// Microphone access refused. Blocks recording only.
  #[error("microphone access denied")]
  PermissionDenied,
  /// Zero bytes were captured; treated as a silent answer.
  #[error("no audio captured")]
  CaptureEmpty,
  /// A capture is already running, or a consumer is already waiting.
  #[error("capture already in progress")]
  CaptureBusy,
  #[error("provider timed out")]
  ProviderTimeout,
  /// Non-2xx response or malformed payload.
  #[error("provider failure: {0}")]
  ProviderFailure(String),
  #[error("unexpected: {0}")]
  Unexpected(String),
}

impl From<reqwest::Error> for TutorError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_timeout() {
      TutorError::ProviderTimeout
    } else {
      TutorError::ProviderFailure(e.to_string())
    }
  }
}
