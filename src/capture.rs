//! Push-to-talk capture coordinator.
//!
//! The client holds the talk button: `start()` opens a capture, audio chunks
//! stream in through `push_chunk()`, and releasing the button calls `stop()`,
//! which hands the finished buffer to the one consumer parked in
//! `next_utterance()`. A safety timer stops the capture on its own if the
//! release never arrives.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::TutorError;
use crate::handoff::Rendezvous;
use crate::providers::PermissionGate;

pub const DEFAULT_MIME: &str = "audio/webm";

/// A finished recording. Empty `bytes` means nothing was heard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedAudio {
  pub bytes: Vec<u8>,
  pub mime: String,
}

impl CapturedAudio {
  pub fn is_empty(&self) -> bool {
    self.bytes.is_empty()
  }
}

struct Recording {
  generation: u64,
  mime: String,
  buffer: Vec<u8>,
  timer: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
  generation: u64,
  recording: Option<Recording>,
}

#[derive(Clone)]
pub struct CaptureCoordinator {
  inner: Arc<Mutex<Inner>>,
  consumer: Rendezvous<CapturedAudio>,
  gate: Arc<dyn PermissionGate>,
  max_duration: Duration,
}

impl CaptureCoordinator {
  pub fn new(gate: Arc<dyn PermissionGate>, max_duration: Duration) -> Self {
    Self {
      inner: Arc::new(Mutex::new(Inner::default())),
      consumer: Rendezvous::new(),
      gate,
      max_duration,
    }
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(|p| p.into_inner())
  }

  pub fn is_recording(&self) -> bool {
    self.lock().recording.is_some()
  }

  /// True while the tutor is parked waiting for an answer.
  pub fn has_consumer(&self) -> bool {
    self.consumer.is_waiting()
  }

  /// Park as the single consumer of the next finished capture.
  pub fn next_utterance(&self) -> Result<oneshot::Receiver<CapturedAudio>, TutorError> {
    self.consumer.wait()
  }

  /// Begin capturing. Rejected while a capture is already running.
  #[instrument(level = "debug", target = "capture", skip(self))]
  pub async fn start(&self, mime: Option<&str>) -> Result<(), TutorError> {
    if self.is_recording() {
      debug!(target: "capture", "start ignored: already recording");
      return Err(TutorError::CaptureBusy);
    }
    if !self.gate.request().await {
      warn!(target: "capture", "Microphone permission denied.");
      return Err(TutorError::PermissionDenied);
    }

    let mut inner = self.lock();
    // The permission prompt may have raced with another start.
    if inner.recording.is_some() {
      return Err(TutorError::CaptureBusy);
    }
    inner.generation += 1;
    let generation = inner.generation;

    let this = self.clone();
    let max = self.max_duration;
    let timer = tokio::spawn(async move {
      tokio::time::sleep(max).await;
      if this.finish(Some(generation)) {
        warn!(target: "capture", ?max, "Recording auto-stopped by safety timer.");
      }
    });

    inner.recording = Some(Recording {
      generation,
      mime: mime.filter(|m| !m.trim().is_empty()).unwrap_or(DEFAULT_MIME).to_string(),
      buffer: Vec::new(),
      timer,
    });
    info!(target: "capture", generation, "Recording started.");
    Ok(())
  }

  /// Append streamed audio to the running capture. Dropped when idle.
  pub fn push_chunk(&self, bytes: &[u8]) -> bool {
    match self.lock().recording.as_mut() {
      Some(r) => {
        r.buffer.extend_from_slice(bytes);
        true
      }
      None => false,
    }
  }

  /// Finish the running capture and deliver it. No-op when idle.
  pub fn stop(&self) -> bool {
    self.finish(None)
  }

  /// Throw away any running capture without delivering it, and release the waiter.
  pub fn cancel(&self) {
    if let Some(r) = self.lock().recording.take() {
      r.timer.abort();
      debug!(target: "capture", generation = r.generation, "Recording cancelled.");
    }
    self.consumer.cancel();
  }

  /// `generation` is set when the safety timer fires; it only stops the capture it was armed for.
  fn finish(&self, generation: Option<u64>) -> bool {
    let recording = {
      let mut inner = self.lock();
      let owned = match (&inner.recording, generation) {
        (None, _) => false,
        (Some(r), Some(g)) => r.generation == g,
        (Some(_), None) => true,
      };
      if !owned {
        return false;
      }
      inner.recording.take()
    };
    let Some(r) = recording else { return false };
    if generation.is_none() {
      r.timer.abort();
    }

    let audio = CapturedAudio { bytes: r.buffer, mime: r.mime };
    if audio.is_empty() {
      debug!(target: "capture", generation = r.generation, "Empty capture; delivering silence.");
    } else {
      info!(target: "capture", generation = r.generation, bytes = audio.bytes.len(), "Recording stopped.");
    }
    if self.consumer.deliver(audio).is_err() {
      debug!(target: "capture", "No consumer waiting; capture dropped.");
    }
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct Gate {
    allow: bool,
    asked: AtomicUsize,
  }

  #[async_trait]
  impl PermissionGate for Gate {
    async fn request(&self) -> bool {
      self.asked.fetch_add(1, Ordering::SeqCst);
      self.allow
    }
  }

  fn coordinator(allow: bool) -> (CaptureCoordinator, Arc<Gate>) {
    let gate = Arc::new(Gate { allow, asked: AtomicUsize::new(0) });
    (CaptureCoordinator::new(gate.clone(), Duration::from_secs(15)), gate)
  }

  #[tokio::test]
  async fn stop_delivers_buffer_to_waiter() {
    let (cap, _) = coordinator(true);
    let rx = cap.next_utterance().expect("consumer");
    cap.start(Some("audio/ogg")).await.expect("start");
    assert!(cap.push_chunk(b"abc"));
    assert!(cap.push_chunk(b"def"));
    assert!(cap.stop());
    let audio = rx.await.expect("delivered");
    assert_eq!(audio.bytes, b"abcdef");
    assert_eq!(audio.mime, "audio/ogg");
    assert!(!cap.is_recording());
  }

  #[tokio::test]
  async fn stop_when_idle_is_noop() {
    let (cap, _) = coordinator(true);
    let _rx = cap.next_utterance().expect("consumer");
    assert!(!cap.stop());
    assert!(!cap.push_chunk(b"ignored"));
  }

  #[tokio::test]
  async fn double_start_is_rejected() {
    let (cap, gate) = coordinator(true);
    cap.start(None).await.expect("first start");
    assert_eq!(cap.start(None).await.unwrap_err(), TutorError::CaptureBusy);
    assert_eq!(gate.asked.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn denied_permission_blocks_recording() {
    let (cap, _) = coordinator(false);
    assert_eq!(cap.start(None).await.unwrap_err(), TutorError::PermissionDenied);
    assert!(!cap.is_recording());
  }

  #[tokio::test]
  async fn zero_bytes_yield_empty_capture() {
    let (cap, _) = coordinator(true);
    let rx = cap.next_utterance().expect("consumer");
    cap.start(None).await.expect("start");
    cap.stop();
    let audio = rx.await.expect("delivered");
    assert!(audio.is_empty());
    assert_eq!(audio.mime, DEFAULT_MIME);
  }

  #[tokio::test]
  async fn only_one_consumer_at_a_time() {
    let (cap, _) = coordinator(true);
    let _rx = cap.next_utterance().expect("consumer");
    assert_eq!(cap.next_utterance().unwrap_err(), TutorError::CaptureBusy);
  }

  #[tokio::test(start_paused = true)]
  async fn safety_timer_stops_a_stuck_recording() {
    let (cap, _) = coordinator(true);
    let rx = cap.next_utterance().expect("consumer");
    cap.start(None).await.expect("start");
    cap.push_chunk(b"hold");
    // The release signal never comes.
    let audio = tokio::time::timeout(Duration::from_secs(20), rx)
      .await
      .expect("auto-stop fired")
      .expect("delivered");
    assert_eq!(audio.bytes, b"hold");
    assert!(!cap.is_recording());
  }

  #[tokio::test(start_paused = true)]
  async fn stale_timer_does_not_stop_next_recording() {
    let (cap, _) = coordinator(true);
    cap.start(None).await.expect("first");
    tokio::time::sleep(Duration::from_secs(10)).await;
    cap.stop();
    cap.start(None).await.expect("second");
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(cap.is_recording(), "first timer must not end the second capture");
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(!cap.is_recording());
  }

  #[tokio::test]
  async fn cancel_discards_and_releases_waiter() {
    let (cap, _) = coordinator(true);
    let rx = cap.next_utterance().expect("consumer");
    cap.start(None).await.expect("start");
    cap.push_chunk(b"xyz");
    cap.cancel();
    assert!(rx.await.is_err());
    assert!(!cap.is_recording());
  }
}
