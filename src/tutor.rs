//! The tutor's collaborators bundled together, plus the three primitive
//! actions every phase is built from: speak, listen, greet.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::capture::CaptureCoordinator;
use crate::config::Timing;
use crate::domain::{SessionPhase, VoiceState};
use crate::error::TutorError;
use crate::logic::fallback_greeting;
use crate::providers::{ResponseGenerator, Speaker, Transcriber};
use crate::session::Session;
use crate::util::{squash_whitespace, trunc_for_log};

/// Outbound notifications about a session, in the order they happen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
  PhaseChanged {
    phase: SessionPhase,
    challenge_index: usize,
    total_challenges: usize,
    student_name: String,
  },
  VoiceState(VoiceState),
  Transcript(String),
  TurnEvaluated {
    challenge_id: String,
    turn: usize,
    is_correct: bool,
    should_end: bool,
  },
  /// User-visible message (e.g. microphone problems).
  Notice(String),
}

pub trait SessionObserver: Send + Sync {
  fn notify(&self, event: SessionEvent);
}

pub struct Tutor {
  pub speaker: Arc<dyn Speaker>,
  pub transcriber: Arc<dyn Transcriber>,
  pub generator: Option<Arc<dyn ResponseGenerator>>,
  pub capture: CaptureCoordinator,
  pub observer: Arc<dyn SessionObserver>,
  pub timing: Timing,
}

impl Tutor {
  pub fn set_voice(&self, session: &mut Session, state: VoiceState) {
    if session.voice_state() != state {
      session.set_voice_state(state);
      self.observer.notify(SessionEvent::VoiceState(state));
    }
  }

  pub fn report_error(&self, session: &mut Session, message: &str) {
    session.set_error(message);
    self.observer.notify(SessionEvent::VoiceState(VoiceState::Error));
    self.observer.notify(SessionEvent::Notice(message.to_string()));
  }

  /// Blocks until the speaker reports the line finished.
  #[instrument(level = "debug", target = "dialogue", skip(self, session, text), fields(text_len = text.len()))]
  pub async fn speak(&self, session: &mut Session, text: &str) {
    debug!(target: "dialogue", text = %trunc_for_log(text, 60), "Math Mate speaking");
    self.set_voice(session, VoiceState::MathMateSpeaking);
    self.speaker.speak(text).await;
    self.set_voice(session, VoiceState::Idle);
  }

  /// Wait for one push-to-talk utterance and transcribe it.
  /// Silence, an empty recording, and transcription failure all come back as "".
  #[instrument(level = "debug", target = "dialogue", skip_all, fields(session = %session.id()))]
  pub async fn listen(&self, session: &mut Session) -> Result<String, TutorError> {
    let mut rx = self.capture.next_utterance()?;
    self.set_voice(session, VoiceState::WaitingForStudent);

    let received = match tokio::time::timeout(self.timing.listen_timeout(), &mut rx).await {
      Ok(Ok(audio)) => Some(audio),
      Ok(Err(_)) => return Err(TutorError::Unexpected("capture released without audio".into())),
      // Button held right at the deadline: the safety timer bounds the rest.
      Err(_) if self.capture.is_recording() => {
        let grace = self.timing.max_recording() + std::time::Duration::from_secs(1);
        tokio::time::timeout(grace, &mut rx).await.ok().and_then(Result::ok)
      }
      Err(_) => None,
    };

    let Some(audio) = received else {
      info!(target: "dialogue", "No answer within the listening window.");
      return Ok(String::new());
    };
    if audio.is_empty() {
      debug!(target: "dialogue", error = %TutorError::CaptureEmpty, "Treating as a silent answer.");
      return Ok(String::new());
    }

    self.set_voice(session, VoiceState::Processing);
    let transcript = match tokio::time::timeout(
      self.timing.transcription_timeout(),
      self.transcriber.transcribe(&audio.bytes, &audio.mime),
    )
    .await
    {
      Ok(t) => squash_whitespace(&t),
      Err(_) => {
        warn!(target: "dialogue", error = %TutorError::ProviderTimeout, "Transcription abandoned.");
        String::new()
      }
    };
    debug!(target: "dialogue", transcript_len = transcript.len(), "Transcribed student answer.");
    self.observer.notify(SessionEvent::Transcript(transcript.clone()));
    Ok(transcript)
  }

  /// Personalized greeting, or the templated one when the generator can't help in time.
  pub async fn greet(&self, student_name: &str, total_challenges: usize) -> String {
    if let Some(g) = &self.generator {
      match tokio::time::timeout(self.timing.provider_timeout(), g.greet(student_name, total_challenges)).await {
        Ok(Ok(text)) if !text.trim().is_empty() => return text.trim().to_string(),
        Ok(Ok(_)) => warn!(target: "dialogue", "Generator returned an empty greeting."),
        Ok(Err(e)) => warn!(target: "dialogue", error = %e, "Greeting generation failed."),
        Err(_) => warn!(target: "dialogue", error = %TutorError::ProviderTimeout, "Greeting generation abandoned."),
      }
    }
    fallback_greeting(student_name, total_challenges)
  }
}


#[cfg(test)]
mod tests {
  use std::time::Duration;

  use async_trait::async_trait;

  use super::testkit::*;
  use super::*;
  use crate::providers::{GeneratedReply, NoTranscriber, TurnRequest};

  /// Answers only after a minute.
  struct SlowTranscriber;

  #[async_trait]
  impl Transcriber for SlowTranscriber {
    async fn transcribe(&self, _audio: &[u8], _mime: &str) -> String {
      tokio::time::sleep(Duration::from_secs(60)).await;
      "one fourth".into()
    }
  }

  /// Greets after `delay`, or fails when there is none.
  struct FlakyGenerator {
    delay: Option<Duration>,
  }

  #[async_trait]
  impl ResponseGenerator for FlakyGenerator {
    async fn evaluate(&self, _req: TurnRequest<'_>) -> Result<GeneratedReply, TutorError> {
      Err(TutorError::ProviderFailure("unused".into()))
    }
    async fn greet(&self, student_name: &str, _total: usize) -> Result<String, TutorError> {
      match self.delay {
        Some(d) => {
          tokio::time::sleep(d).await;
          Ok(format!("Welcome {student_name}!"))
        }
        None => Err(TutorError::ProviderFailure("HTTP 500".into())),
      }
    }
  }

  #[tokio::test(start_paused = true)]
  async fn listen_times_out_to_empty_transcript() {
    let speaker = Arc::new(RecordingSpeaker::default());
    let t = tutor(speaker, Arc::new(NoTranscriber), None, Arc::new(NullObserver));
    let mut s = Session::new(1);
    let heard = t.listen(&mut s).await.expect("listen");
    assert_eq!(heard, "");
    assert!(!t.capture.has_consumer(), "timed-out waiter must free the slot");
  }

  #[tokio::test(start_paused = true)]
  async fn listen_transcribes_captured_audio() {
    let speaker = Arc::new(RecordingSpeaker::default());
    let t = tutor(speaker, Arc::new(ScriptedTranscriber::new(&["  one   fourth "])), None, Arc::new(NullObserver));
    let student = spawn_student(t.capture.clone());
    let mut s = Session::new(1);
    assert_eq!(t.listen(&mut s).await.expect("listen"), "one fourth");
    assert_eq!(s.voice_state(), VoiceState::Processing);
    student.abort();
  }

  #[tokio::test]
  async fn cancelled_capture_fails_the_listen() {
    let speaker = Arc::new(RecordingSpeaker::default());
    let t = tutor(speaker, Arc::new(NoTranscriber), None, Arc::new(NullObserver));
    let capture = t.capture.clone();
    let canceller = tokio::spawn(async move {
      while !capture.has_consumer() {
        tokio::task::yield_now().await;
      }
      capture.cancel();
    });
    let mut s = Session::new(1);
    assert!(matches!(t.listen(&mut s).await, Err(TutorError::Unexpected(_))));
    canceller.await.expect("canceller");
  }

  #[tokio::test]
  async fn greet_falls_back_without_generator() {
    let speaker = Arc::new(RecordingSpeaker::default());
    let t = tutor(speaker, Arc::new(NoTranscriber), None, Arc::new(NullObserver));
    assert_eq!(t.greet("Maya", 7).await, "Hi Maya! We have 7 fun challenges. Let's go!");
  }

  #[tokio::test(start_paused = true)]
  async fn slow_transcription_becomes_empty_transcript() {
    let speaker = Arc::new(RecordingSpeaker::default());
    let t = tutor(speaker, Arc::new(SlowTranscriber), None, Arc::new(NullObserver));
    let student = spawn_student(t.capture.clone());
    let mut s = Session::new(1);
    let started = tokio::time::Instant::now();
    assert_eq!(t.listen(&mut s).await.expect("listen"), "");
    assert!(started.elapsed() < Duration::from_secs(60), "transcription timeout applies");
    student.abort();
  }

  #[tokio::test(start_paused = true)]
  async fn greet_falls_back_when_generator_fails_or_stalls() {
    let fallback = "Hi Maya! We have 7 fun challenges. Let's go!";
    for delay in [None, Some(Duration::from_secs(60))] {
      let speaker = Arc::new(RecordingSpeaker::default());
      let generator: Arc<dyn ResponseGenerator> = Arc::new(FlakyGenerator { delay });
      let t = tutor(speaker, Arc::new(NoTranscriber), Some(generator), Arc::new(NullObserver));
      assert_eq!(t.greet("Maya", 7).await, fallback, "delay {delay:?}");
    }

    let speaker = Arc::new(RecordingSpeaker::default());
    let quick: Arc<dyn ResponseGenerator> = Arc::new(FlakyGenerator { delay: Some(Duration::from_secs(1)) });
    let t = tutor(speaker, Arc::new(NoTranscriber), Some(quick), Arc::new(NullObserver));
    assert_eq!(t.greet("Maya", 7).await, "Welcome Maya!");
  }

  #[tokio::test]
  async fn speak_toggles_voice_state() {
    let speaker = Arc::new(RecordingSpeaker::default());
    let t = tutor(speaker.clone(), Arc::new(NoTranscriber), None, Arc::new(NullObserver));
    let mut s = Session::new(1);
    t.speak(&mut s, "Hello!").await;
    assert_eq!(speaker.lines(), vec!["Hello!".to_string()]);
    assert_eq!(s.voice_state(), VoiceState::Idle);
  }
}
