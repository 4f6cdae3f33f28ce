//! The connected client, seen from the session core.
//!
//! One `ClientLink` per WebSocket. It is the session's speaker (lines go out as
//! `speak` messages and we wait for `playback_finished`), its microphone gate
//! (the browser owns the permission, we only mirror it), and its observer
//! (session events become outbound protocol messages).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::Timing;
use crate::domain::{Challenge, SessionPhase};
use crate::handoff::Rendezvous;
use crate::protocol::{to_out, ServerWsMessage};
use crate::providers::deepgram::Deepgram;
use crate::providers::{PermissionGate, Speaker};
use crate::tutor::{SessionEvent, SessionObserver};

const SYNTH_MIME: &str = "audio/mpeg";

pub struct ClientLink {
  out: mpsc::UnboundedSender<ServerWsMessage>,
  challenges: Arc<Vec<Challenge>>,
  deepgram: Option<Deepgram>,
  timing: Timing,
  playback: Rendezvous<()>,
  speech_seq: AtomicU64,
  /// Id of the line currently playing; 0 when nothing is.
  current_speech: AtomicU64,
  mic_granted: AtomicBool,
}

impl ClientLink {
  pub fn new(
    out: mpsc::UnboundedSender<ServerWsMessage>,
    challenges: Arc<Vec<Challenge>>,
    deepgram: Option<Deepgram>,
    timing: Timing,
  ) -> Self {
    Self {
      out,
      challenges,
      deepgram,
      timing,
      playback: Rendezvous::new(),
      speech_seq: AtomicU64::new(0),
      current_speech: AtomicU64::new(0),
      mic_granted: AtomicBool::new(false),
    }
  }

  pub fn send(&self, msg: ServerWsMessage) {
    if self.out.send(msg).is_err() {
      debug!(target: "session", "Outbound channel closed; message dropped.");
    }
  }

  /// Client finished playing a line. Acks for anything but the current line are stale.
  pub fn playback_finished(&self, speech_id: u64) {
    if speech_id != 0 && self.current_speech.load(Ordering::SeqCst) == speech_id {
      let _ = self.playback.deliver(());
    } else {
      debug!(target: "session", speech_id, "Ignoring stale playback ack.");
    }
  }

  pub fn set_mic_permission(&self, granted: bool) {
    self.mic_granted.store(granted, Ordering::SeqCst);
  }

  async fn synthesize(&self, text: &str) -> Option<String> {
    let dg = self.deepgram.as_ref()?;
    match dg.synthesize(text).await {
      Ok(bytes) if !bytes.is_empty() => Some(STANDARD.encode(bytes)),
      Ok(_) => None,
      Err(e) => {
        warn!(target: "session", error = %e, "Synthesis failed; client will speak on-device.");
        None
      }
    }
  }
}

#[async_trait]
impl Speaker for ClientLink {
  async fn speak(&self, text: &str) {
    let speech_id = self.speech_seq.fetch_add(1, Ordering::SeqCst) + 1;
    let audio = self.synthesize(text).await;
    let mime = audio.as_ref().map(|_| SYNTH_MIME.to_string());

    let rx = match self.playback.wait() {
      Ok(rx) => rx,
      Err(e) => {
        warn!(target: "session", error = %e, "Playback slot busy; not waiting for this line.");
        self.send(ServerWsMessage::Speak { speech_id, text: text.to_string(), audio_base64: audio, mime });
        return;
      }
    };
    // Arm before sending so a fast ack can't be missed.
    self.current_speech.store(speech_id, Ordering::SeqCst);
    self.send(ServerWsMessage::Speak { speech_id, text: text.to_string(), audio_base64: audio, mime });

    let bound = self.timing.playback_bound(text);
    if tokio::time::timeout(bound, rx).await.is_err() {
      warn!(target: "session", speech_id, ?bound, "No playback ack; continuing.");
    }
    self.current_speech.store(0, Ordering::SeqCst);
  }
}

#[async_trait]
impl PermissionGate for ClientLink {
  /// The browser prompt is asynchronous to us: ask for it and refuse this attempt.
  async fn request(&self) -> bool {
    if self.mic_granted.load(Ordering::SeqCst) {
      return true;
    }
    self.send(ServerWsMessage::RequestMicPermission);
    false
  }
}

impl SessionObserver for ClientLink {
  fn notify(&self, event: SessionEvent) {
    let msg = match event {
      SessionEvent::PhaseChanged { phase, challenge_index, total_challenges, student_name } => {
        let challenge = match phase {
          SessionPhase::Greeting | SessionPhase::Complete => None,
          _ => self.challenges.get(challenge_index).map(to_out),
        };
        ServerWsMessage::SessionState { phase, challenge_index, total_challenges, student_name, challenge }
      }
      SessionEvent::VoiceState(state) => ServerWsMessage::VoiceState { state },
      SessionEvent::Transcript(text) => ServerWsMessage::Transcript { text },
      SessionEvent::TurnEvaluated { turn, is_correct, should_end, .. } => {
        ServerWsMessage::TurnResult { turn, is_correct, should_end }
      }
      SessionEvent::Notice(message) => ServerWsMessage::Notice { message },
    };
    self.send(msg);
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;
  use crate::catalog::builtin_challenges;
  use crate::domain::VoiceState;

  fn link() -> (Arc<ClientLink>, mpsc::UnboundedReceiver<ServerWsMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ClientLink::new(tx, Arc::new(builtin_challenges()), None, Timing::default())), rx)
  }

  #[tokio::test]
  async fn speak_waits_for_matching_ack() {
    let (link, mut rx) = link();
    let speaking = tokio::spawn({
      let link = link.clone();
      async move { link.speak("Hello Maya!").await }
    });

    let Some(ServerWsMessage::Speak { speech_id, text, audio_base64, .. }) = rx.recv().await else {
      panic!("expected a speak message");
    };
    assert_eq!(text, "Hello Maya!");
    assert!(audio_base64.is_none(), "no synthesis configured");

    link.playback_finished(speech_id + 1);
    tokio::task::yield_now().await;
    assert!(!speaking.is_finished(), "stale ack must not release playback");

    link.playback_finished(speech_id);
    tokio::time::timeout(Duration::from_secs(1), speaking).await.expect("released").expect("task");
  }

  #[tokio::test(start_paused = true)]
  async fn speak_gives_up_without_ack() {
    let (link, mut rx) = link();
    link.speak("Nobody is listening.").await;
    assert!(matches!(rx.recv().await, Some(ServerWsMessage::Speak { .. })));
    // A late ack for the finished line is harmless.
    link.playback_finished(1);
  }

  #[tokio::test]
  async fn mic_permission_is_requested_until_granted() {
    let (link, mut rx) = link();
    assert!(!link.request().await);
    assert_eq!(rx.recv().await, Some(ServerWsMessage::RequestMicPermission));

    link.set_mic_permission(true);
    assert!(link.request().await);
    assert!(rx.try_recv().is_err());
  }

  #[tokio::test]
  async fn events_become_protocol_messages() {
    let (link, mut rx) = link();
    link.notify(SessionEvent::PhaseChanged {
      phase: SessionPhase::PreChallenge,
      challenge_index: 1,
      total_challenges: 7,
      student_name: "Maya".into(),
    });
    link.notify(SessionEvent::VoiceState(VoiceState::WaitingForStudent));
    link.notify(SessionEvent::TurnEvaluated { challenge_id: "applet-a1".into(), turn: 2, is_correct: true, should_end: true });

    match rx.recv().await {
      Some(ServerWsMessage::SessionState { challenge: Some(c), student_name, .. }) => {
        assert_eq!(c.id, "applet-a1");
        assert_eq!(student_name, "Maya");
      }
      other => panic!("unexpected {other:?}"),
    }
    assert_eq!(rx.recv().await, Some(ServerWsMessage::VoiceState { state: VoiceState::WaitingForStudent }));
    assert_eq!(rx.recv().await, Some(ServerWsMessage::TurnResult { turn: 2, is_correct: true, should_end: true }));
  }
}
