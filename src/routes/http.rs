//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::{info, instrument, warn};

use crate::logic::{evaluate_turn, stage_for_turn, DEFAULT_STUDENT_NAME};
use crate::protocol::*;
use crate::providers::{ResponseGenerator, TurnRequest};
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state))]
pub async fn http_get_challenges(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let out: Vec<ChallengeOut> = state.challenges.iter().map(to_out).collect();
  info!(target: "mathmate_backend", count = out.len(), "HTTP challenges served");
  Json(out)
}

/// One stateless turn evaluation: same rules as a live dialogue turn, no session.
#[instrument(level = "info", skip(state, body), fields(%body.challenge_id, turn = body.turn, transcript_len = body.transcript.len()))]
pub async fn http_post_turn(
  State(state): State<Arc<AppState>>,
  Json(body): Json<TurnIn>,
) -> impl IntoResponse {
  let Some(challenge) = state.challenge(&body.challenge_id) else {
    warn!(target: "mathmate_backend", id = %body.challenge_id, "HTTP turn for unknown challenge");
    let message = format!("Unknown challenge: {}", body.challenge_id);
    return (StatusCode::NOT_FOUND, Json(ErrorOut { message })).into_response();
  };

  // Keep the turn inside the challenge's budget.
  let turn = body.turn.min(challenge.max_turns.saturating_sub(1));
  let student_name = body
    .student_name
    .as_deref()
    .map(str::trim)
    .filter(|n| !n.is_empty())
    .unwrap_or(DEFAULT_STUDENT_NAME);
  let req = TurnRequest { challenge, transcript: body.transcript.trim(), student_name, turn, history: &[] };
  let generator = state.llm.as_ref().map(|c| c as &dyn ResponseGenerator);
  let eval = evaluate_turn(generator, req, state.timing.provider_timeout()).await;

  info!(target: "mathmate_backend", id = %challenge.id, turn, is_correct = eval.is_correct, should_end = eval.should_end, "HTTP turn evaluated");
  Json(TurnOut { reply: eval.reply, is_correct: eval.is_correct, should_end: eval.should_end, stage: stage_for_turn(turn) })
    .into_response()
}
