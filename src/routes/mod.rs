//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
  routing::{get, post},
  Router,
};
use tower_http::{
  cors::{Any, CorsLayer},
  services::{ServeDir, ServeFile},
  trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket session at `/ws`
/// - JSON API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
  let static_service = ServeDir::new("./static")
    .append_index_html_on_directories(true)
    .not_found_service(ServeFile::new("./static/index.html"));

  Router::new()
    .route("/ws", get(ws::ws_upgrade))
    .route("/api/v1/health", get(http::http_health))
    .route("/api/v1/challenges", get(http::http_get_challenges))
    .route("/api/v1/turn", post(http::http_post_turn))
    .with_state(state)
    .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
    .layer(
      TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
    .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
  use axum::body::{to_bytes, Body};
  use axum::http::{Request, StatusCode};
  use serde_json::{json, Value};
  use tower::ServiceExt;

  use super::*;
  use crate::catalog::builtin_challenges;

  fn app() -> Router {
    build_router(Arc::new(AppState::offline(builtin_challenges())))
  }

  async fn json_body(res: axum::response::Response) -> Value {
    let bytes = to_bytes(res.into_body(), 1 << 20).await.expect("body");
    serde_json::from_slice(&bytes).expect("json")
  }

  fn post_turn(body: Value) -> Request<Body> {
    Request::post("/api/v1/turn")
      .header("content-type", "application/json")
      .body(Body::from(body.to_string()))
      .expect("request")
  }

  #[tokio::test]
  async fn health_is_ok() {
    let res = app().oneshot(Request::get("/api/v1/health").body(Body::empty()).expect("request")).await.expect("response");
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await, json!({"ok": true}));
  }

  #[tokio::test]
  async fn challenges_hide_answers() {
    let res = app().oneshot(Request::get("/api/v1/challenges").body(Body::empty()).expect("request")).await.expect("response");
    assert_eq!(res.status(), StatusCode::OK);
    let v = json_body(res).await;
    let list = v.as_array().expect("array");
    assert_eq!(list.len(), 7);
    assert_eq!(list[0]["id"], "video-1");
    assert!(list[0].get("correctness_filter").is_none());
    assert!(list[0].get("scaffolding").is_none());
  }

  #[tokio::test]
  async fn offline_turn_uses_local_matcher_and_ladder() {
    let res = app()
      .oneshot(post_turn(json!({"challengeId": "applet-a3", "transcript": "It's the NUMERATOR", "turn": 0})))
      .await
      .expect("response");
    assert_eq!(res.status(), StatusCode::OK);
    let v = json_body(res).await;
    assert_eq!(v["isCorrect"], true);
    assert_eq!(v["shouldEnd"], true);

    let res = app()
      .oneshot(post_turn(json!({"challengeId": "applet-a3", "transcript": "no idea", "turn": 9})))
      .await
      .expect("response");
    let v = json_body(res).await;
    let reveal = builtin_challenges().into_iter().find(|c| c.id == "applet-a3").expect("catalog").scaffolding.reveal;
    assert_eq!(v["isCorrect"], false);
    assert_eq!(v["shouldEnd"], true);
    assert_eq!(v["stage"], "reveal");
    assert_eq!(v["reply"], reveal);
  }

  #[tokio::test]
  async fn unknown_challenge_is_404() {
    let res = app()
      .oneshot(post_turn(json!({"challengeId": "nope", "transcript": "half"})))
      .await
      .expect("response");
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(json_body(res).await["message"].as_str().expect("message").contains("nope"));
  }
}
