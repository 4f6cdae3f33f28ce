//! WebSocket upgrade + per-connection session.
//!
//! Each connection gets its own session driver (the phase controller, spawned
//! as a task). This task only routes: control events go to the driver, audio
//! goes to the capture coordinator, playback acks go to the client link, and
//! everything the driver emits is written back to the socket.

use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::capture::CaptureCoordinator;
use crate::controller::{ControlEvent, PhaseController};
use crate::domain::VoiceState;
use crate::error::TutorError;
use crate::link::ClientLink;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::providers::{NoTranscriber, ResponseGenerator, Transcriber};
use crate::state::AppState;
use crate::tutor::Tutor;

const CONTROL_BUFFER: usize = 32;
const MIC_NOTICE: &str = "Microphone access needed";

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "mathmate_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// What one connection needs to route client messages.
struct Connection {
  link: Arc<ClientLink>,
  capture: CaptureCoordinator,
  control: mpsc::Sender<ControlEvent>,
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "mathmate_backend", "WebSocket connected");

  let (out_tx, mut out_rx) = mpsc::unbounded_channel();
  let link = Arc::new(ClientLink::new(out_tx, state.challenges.clone(), state.deepgram.clone(), state.timing.clone()));
  let capture = CaptureCoordinator::new(link.clone(), state.timing.max_recording());
  let transcriber: Arc<dyn Transcriber> = match &state.deepgram {
    Some(dg) => Arc::new(dg.clone()),
    None => Arc::new(NoTranscriber),
  };
  let tutor = Tutor {
    speaker: link.clone(),
    transcriber,
    generator: state.llm.clone().map(|c| Arc::new(c) as Arc<dyn ResponseGenerator>),
    capture: capture.clone(),
    observer: link.clone(),
    timing: state.timing.clone(),
  };

  let (control, control_rx) = mpsc::channel(CONTROL_BUFFER);
  let driver = tokio::spawn(PhaseController::new(state.challenges.clone(), tutor).run(control_rx));
  let conn = Connection { link, capture, control };

  loop {
    tokio::select! {
      incoming = socket.recv() => match incoming {
        Some(Ok(Message::Text(txt))) => match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(msg) => {
            debug!(target: "mathmate_backend", "WS received: {:?}", short(&msg));
            conn.dispatch(msg).await;
          }
          Err(e) => conn.link.send(ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) }),
        },
        // Raw binary frames are audio, same as audio_chunk.
        Some(Ok(Message::Binary(bytes))) => { conn.capture.push_chunk(&bytes); }
        Some(Ok(Message::Ping(payload))) => { let _ = socket.send(Message::Pong(payload)).await; }
        Some(Ok(Message::Close(_))) | None => break,
        Some(Err(e)) => {
          warn!(target: "mathmate_backend", error = %e, "WS receive error");
          break;
        }
        Some(Ok(_)) => {}
      },
      Some(out) = out_rx.recv() => {
        let txt = serde_json::to_string(&out).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });
        if let Err(e) = socket.send(Message::Text(txt)).await {
          error!(target: "mathmate_backend", error = %e, "WS send error");
          break;
        }
      }
    }
  }

  driver.abort();
  conn.capture.cancel();
  info!(target: "mathmate_backend", "WebSocket disconnected");
}

impl Connection {
  async fn dispatch(&self, msg: ClientWsMessage) {
    match msg {
      ClientWsMessage::Ping => self.link.send(ServerWsMessage::Pong),
      ClientWsMessage::Begin => self.forward(ControlEvent::Begin),
      ClientWsMessage::ActivityComplete { challenge_id } => self.forward(ControlEvent::ActivityComplete { challenge_id }),
      ClientWsMessage::SkipTo { index } => self.forward(ControlEvent::SkipTo { index }),
      ClientWsMessage::Reset => self.forward(ControlEvent::Reset),

      ClientWsMessage::MicPermission { granted } => {
        info!(target: "capture", granted, "Microphone permission reported by client");
        self.link.set_mic_permission(granted);
        if !granted {
          self.mic_denied();
        }
      }

      ClientWsMessage::PttStart { mime } => match self.capture.start(mime.as_deref()).await {
        Ok(()) => {
          if !self.capture.has_consumer() {
            debug!(target: "capture", "Recording while the tutor is not listening; it will be dropped.");
          }
          self.link.send(ServerWsMessage::VoiceState { state: VoiceState::StudentRecording });
        }
        Err(TutorError::PermissionDenied) => self.mic_denied(),
        Err(e) => debug!(target: "capture", error = %e, "ptt_start ignored"),
      },

      ClientWsMessage::AudioChunk { audio_base64 } => match STANDARD.decode(audio_base64.as_bytes()) {
        Ok(bytes) => {
          if !self.capture.push_chunk(&bytes) {
            debug!(target: "capture", len = bytes.len(), "Chunk arrived while idle; dropped.");
          }
        }
        Err(e) => self.link.send(ServerWsMessage::Error { message: format!("Invalid audio chunk: {}", e) }),
      },

      ClientWsMessage::PttEnd => {
        if !self.capture.stop() {
          debug!(target: "capture", "ptt_end without an active recording");
        }
      }

      ClientWsMessage::PlaybackFinished { speech_id } => self.link.playback_finished(speech_id),
    }
  }

  fn mic_denied(&self) {
    self.link.send(ServerWsMessage::VoiceState { state: VoiceState::Error });
    self.link.send(ServerWsMessage::Notice { message: MIC_NOTICE.into() });
  }

  /// Never blocks: the driver may be mid-dialogue and still needs this task for acks.
  fn forward(&self, ev: ControlEvent) {
    if let Err(e) = self.control.try_send(ev) {
      warn!(target: "session", error = %e, "Control event dropped.");
    }
  }
}

/// Audio payloads are large; log their size instead.
fn short(msg: &ClientWsMessage) -> String {
  match msg {
    ClientWsMessage::AudioChunk { audio_base64 } => format!("AudioChunk {{ len: {} }}", audio_base64.len()),
    other => format!("{:?}", other),
  }
}
