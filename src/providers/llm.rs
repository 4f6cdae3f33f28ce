//! Minimal OpenAI-compatible chat client (OpenRouter by default).
//!
//! We only call chat.completions and request either plain text (greetings) or a
//! strict JSON object (turn evaluation). Calls are instrumented and log model
//! names, latencies and response sizes (not contents).
//!
//! NOTE: We never log the API key, and transcripts only appear as lengths.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::Prompts;
use crate::domain::{Message, Role};
use crate::error::TutorError;
use crate::logic::{scaffold_for_turn, stage_for_turn};
use crate::providers::{GeneratedReply, ResponseGenerator, TurnRequest};
use crate::util::fill_template;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct ChatClient {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
  pub prompts: Prompts,
}

impl ChatClient {
  /// Construct the client if we find LLM_API_KEY; otherwise return None.
  pub fn from_env(prompts: Prompts) -> Option<Self> {
    let api_key = std::env::var("LLM_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url = std::env::var("LLM_BASE_URL").unwrap_or_else(|_| "https://openrouter.ai/api/v1".into());
    let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "openai/gpt-4.1-nano".into());

    // The session wraps every call in its own, shorter bound; this only stops leaked connections.
    let client = reqwest::Client::builder().timeout(CLIENT_TIMEOUT).build().ok()?;

    Some(Self { client, api_key, base_url, model, prompts })
  }

  async fn post_chat(&self, req: &ChatCompletionRequest) -> Result<String, TutorError> {
    let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "mathmate-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .header("X-Title", "Math Mate Learning App")
      .json(req)
      .send()
      .await?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_api_error(&body).unwrap_or(body);
      return Err(TutorError::ProviderFailure(format!("chat HTTP {}: {}", status, msg)));
    }

    let body: ChatCompletionResponse = res
      .json()
      .await
      .map_err(|e| TutorError::ProviderFailure(format!("malformed chat response: {e}")))?;
    if let Some(usage) = &body.usage {
      info!(target: "mathmate_backend", prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "LLM usage");
    }
    Ok(body
      .choices
      .first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default()
      .trim()
      .to_string())
  }

  /// Plain-text chat completion.
  #[instrument(level = "info", target = "mathmate_backend", skip(self, messages), fields(model = %self.model, n_messages = messages.len()))]
  async fn chat_plain(&self, messages: Vec<ChatMessageReq>, max_tokens: u32) -> Result<String, TutorError> {
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages,
      temperature: 0.7,
      response_format: None,
      max_tokens: Some(max_tokens),
    };
    let start = Instant::now();
    let out = self.post_chat(&req).await;
    match &out {
      Ok(t) => info!(target: "mathmate_backend", elapsed = ?start.elapsed(), reply_len = t.len(), "Chat reply received"),
      Err(e) => error!(target: "mathmate_backend", elapsed = ?start.elapsed(), error = %e, "Chat call failed"),
    }
    out
  }

  /// JSON-object chat completion. Generic over the target type T.
  #[instrument(level = "info", target = "mathmate_backend", skip(self, messages), fields(model = %self.model, n_messages = messages.len()))]
  async fn chat_json<T: for<'a> Deserialize<'a>>(&self, messages: Vec<ChatMessageReq>, max_tokens: u32) -> Result<T, TutorError> {
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages,
      temperature: 0.4,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
      max_tokens: Some(max_tokens),
    };
    let start = Instant::now();
    let text = self.post_chat(&req).await?;
    info!(target: "mathmate_backend", elapsed = ?start.elapsed(), body_len = text.len(), "Chat JSON received");
    parse_json_reply(&text)
  }

  fn evaluation_messages(&self, req: &TurnRequest<'_>) -> Vec<ChatMessageReq> {
    let c = req.challenge;
    let stage = stage_for_turn(req.turn);
    let accepted = c
      .correctness_filter
      .split('|')
      .map(str::trim)
      .filter(|p| !p.is_empty())
      .collect::<Vec<_>>()
      .join(", ");
    let number = c.number.to_string();
    let turn_number = (req.turn + 1).to_string();
    let max_turns = c.max_turns.to_string();
    let user = fill_template(
      &self.prompts.evaluate_user_template,
      &[
        ("student_name", req.student_name),
        ("challenge_number", &number),
        ("question", &c.post_question),
        ("context", &c.context_info),
        ("accepted", &accepted),
        ("turn_number", &turn_number),
        ("max_turns", &max_turns),
        ("stage", stage.as_str()),
        ("stage_text", scaffold_for_turn(&c.scaffolding, req.turn)),
        ("transcript", req.transcript),
      ],
    );

    let mut messages = Vec::with_capacity(req.history.len() + 2);
    messages.push(ChatMessageReq::new(SYSTEM_ROLE, &self.prompts.evaluate_system));
    messages.extend(req.history.iter().map(history_message));
    messages.push(ChatMessageReq::new(Role::User.as_str(), &user));
    messages
  }
}

const SYSTEM_ROLE: &str = "system";

fn history_message(m: &Message) -> ChatMessageReq {
  match m.role {
    Role::User if m.content.trim().is_empty() => ChatMessageReq::new("user", "Student said: (nothing)"),
    Role::User => ChatMessageReq::new("user", &format!("Student said: \"{}\"", m.content)),
    Role::Assistant => ChatMessageReq::new("assistant", &m.content),
  }
}

#[derive(Deserialize)]
struct EvalJson {
  #[serde(default)]
  response: String,
  #[serde(default, rename = "isCorrect")]
  is_correct: bool,
  #[serde(default, rename = "shouldEnd")]
  should_end: bool,
}

/// Models sometimes wrap JSON in a ```json fence even in JSON mode.
fn parse_json_reply<T: for<'a> Deserialize<'a>>(text: &str) -> Result<T, TutorError> {
  let t = text.trim();
  let t = t
    .strip_prefix("```json")
    .or_else(|| t.strip_prefix("```"))
    .map(|s| s.trim_end().trim_end_matches("```").trim())
    .unwrap_or(t);
  serde_json::from_str::<T>(t).map_err(|e| TutorError::ProviderFailure(format!("JSON parse error: {}", e)))
}

#[async_trait]
impl ResponseGenerator for ChatClient {
  #[instrument(level = "info", target = "mathmate_backend", skip(self, req), fields(challenge = %req.challenge.id, turn = req.turn, transcript_len = req.transcript.len()))]
  async fn evaluate(&self, req: TurnRequest<'_>) -> Result<GeneratedReply, TutorError> {
    let messages = self.evaluation_messages(&req);
    let e: EvalJson = self.chat_json(messages, 120).await?;
    Ok(GeneratedReply { reply: e.response.trim().to_string(), is_correct: e.is_correct, should_end: e.should_end })
  }

  #[instrument(level = "info", target = "mathmate_backend", skip(self, student_name), fields(name_len = student_name.len()))]
  async fn greet(&self, student_name: &str, total_challenges: usize) -> Result<String, TutorError> {
    let total = total_challenges.to_string();
    let system = fill_template(&self.prompts.greeting_system, &[("total", &total)]);
    let user = fill_template(&self.prompts.greeting_user_template, &[("student_name", student_name)]);
    let messages = vec![ChatMessageReq::new(SYSTEM_ROLE, &system), ChatMessageReq::new("user", &user)];
    self.chat_plain(messages, 40).await
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize, Debug, PartialEq)]
struct ChatMessageReq { role: String, content: String }
impl ChatMessageReq {
  fn new(role: &str, content: &str) -> Self { Self { role: role.into(), content: content.into() } }
}
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an OpenAI-style error body.
fn extract_api_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
