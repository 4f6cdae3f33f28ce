//! Deepgram speech client: prerecorded transcription and Aura text-to-speech.
//!
//! Transcription never fails from the caller's point of view; every error is
//! logged and becomes an empty transcript.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::error::TutorError;
use crate::providers::Transcriber;

#[derive(Clone)]
pub struct Deepgram {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub stt_model: String,
  pub voice: String,
}

impl Deepgram {
  /// Construct the client if we find DEEPGRAM_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("DEEPGRAM_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url = std::env::var("DEEPGRAM_BASE_URL").unwrap_or_else(|_| "https://api.deepgram.com/v1".into());
    let stt_model = std::env::var("DEEPGRAM_STT_MODEL").unwrap_or_else(|_| "nova-2".into());
    let voice = std::env::var("DEEPGRAM_VOICE").unwrap_or_else(|_| "aura-asteria-en".into());

    let client = reqwest::Client::builder().timeout(Duration::from_secs(15)).build().ok()?;

    Some(Self { client, api_key, base_url, stt_model, voice })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/{}", self.base_url.trim_end_matches('/'), path)
  }

  async fn try_transcribe(&self, audio: &[u8], mime: &str) -> Result<String, TutorError> {
    let res = self
      .client
      .post(self.url("listen"))
      .query(&[("model", self.stt_model.as_str()), ("smart_format", "true"), ("language", "en")])
      .header(USER_AGENT, "mathmate-backend/0.1")
      .header(AUTHORIZATION, format!("Token {}", self.api_key))
      .header(CONTENT_TYPE, mime)
      .body(audio.to_vec())
      .send()
      .await?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      return Err(TutorError::ProviderFailure(format!("listen HTTP {}: {}", status, body)));
    }
    let body = res.text().await?;
    parse_transcript(&body)
  }

  /// Synthesize `text` to audio bytes (MP3) with the configured Aura voice.
  #[instrument(level = "info", target = "mathmate_backend", skip(self, text), fields(voice = %self.voice, text_len = text.len()))]
  pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>, TutorError> {
    let start = Instant::now();
    let res = self
      .client
      .post(self.url("speak"))
      .query(&[("model", self.voice.as_str())])
      .header(USER_AGENT, "mathmate-backend/0.1")
      .header(AUTHORIZATION, format!("Token {}", self.api_key))
      .json(&json!({ "text": text }))
      .send()
      .await?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      error!(target: "mathmate_backend", %status, "Deepgram speak failed");
      return Err(TutorError::ProviderFailure(format!("speak HTTP {}: {}", status, body)));
    }
    let bytes = res.bytes().await?;
    info!(target: "mathmate_backend", elapsed = ?start.elapsed(), audio_len = bytes.len(), "Speech synthesized");
    Ok(bytes.to_vec())
  }
}

#[async_trait]
impl Transcriber for Deepgram {
  #[instrument(level = "info", target = "mathmate_backend", skip(self, audio), fields(model = %self.stt_model, audio_len = audio.len()))]
  async fn transcribe(&self, audio: &[u8], mime: &str) -> String {
    let start = Instant::now();
    match self.try_transcribe(audio, mime).await {
      Ok(t) => {
        info!(target: "mathmate_backend", elapsed = ?start.elapsed(), transcript_len = t.len(), "Transcription received");
        t
      }
      Err(e) => {
        warn!(target: "mathmate_backend", elapsed = ?start.elapsed(), error = %e, "Transcription failed; treating as silence");
        String::new()
      }
    }
  }
}

#[derive(Deserialize)]
struct ListenResponse { results: ListenResults }
#[derive(Deserialize)]
struct ListenResults { #[serde(default)] channels: Vec<ListenChannel> }
#[derive(Deserialize)]
struct ListenChannel { #[serde(default)] alternatives: Vec<ListenAlternative> }
#[derive(Deserialize)]
struct ListenAlternative { #[serde(default)] transcript: String }

/// First alternative of the first channel; no alternatives means nothing was said.
fn parse_transcript(body: &str) -> Result<String, TutorError> {
  let r: ListenResponse = serde_json::from_str(body)
    .map_err(|e| TutorError::ProviderFailure(format!("malformed listen response: {e}")))?;
  Ok(r
    .results
    .channels
    .into_iter()
    .next()
    .and_then(|c| c.alternatives.into_iter().next())
    .map(|a| a.transcript.trim().to_string())
    .unwrap_or_default())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn transcript_comes_from_first_alternative() {
    let body = r#"{"metadata":{},"results":{"channels":[{"alternatives":[
      {"transcript":" one fourth ","confidence":0.93},{"transcript":"won forth"}]}]}}"#;
    assert_eq!(parse_transcript(body).expect("parse"), "one fourth");
  }

  #[test]
  fn empty_results_mean_silence() {
    assert_eq!(parse_transcript(r#"{"results":{"channels":[]}}"#).expect("parse"), "");
    assert_eq!(parse_transcript(r#"{"results":{"channels":[{"alternatives":[]}]}}"#).expect("parse"), "");
    assert!(parse_transcript("oops").is_err());
  }
}
