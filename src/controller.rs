//! Session phase controller.
//!
//! GREETING -> PRE_CHALLENGE -> IN_CHALLENGE -> POST_CHALLENGE -> (PRE_CHALLENGE | COMPLETE)
//!
//! The controller runs as the session's single driver task and owns the
//! `Session`. Control events from the client (begin, activity complete,
//! skip, reset) arrive over a channel and are only applied between phases.
//! Each one-shot phase (greeting, pre-challenge narration, post-challenge
//! dialogue) is claimed once per `(phase, challenge_index)`.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::domain::{Challenge, SessionPhase, VoiceState};
use crate::dialogue::run_dialogue;
use crate::error::TutorError;
use crate::logic::{extract_name, DEFAULT_STUDENT_NAME, GREETING_INTRO};
use crate::session::Session;
use crate::tutor::{SessionEvent, Tutor};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlEvent {
  /// Welcome screen dismissed; the greeting may start.
  Begin,
  /// The activity host finished the given challenge.
  ActivityComplete { challenge_id: String },
  /// Jump forward to a challenge (never backwards).
  SkipTo { index: usize },
  /// Start over from the welcome screen.
  Reset,
}

pub struct PhaseController {
  session: Session,
  challenges: Arc<Vec<Challenge>>,
  tutor: Tutor,
  claimed: HashSet<(SessionPhase, usize)>,
}

impl PhaseController {
  pub fn new(challenges: Arc<Vec<Challenge>>, tutor: Tutor) -> Self {
    let session = Session::new(challenges.len());
    Self { session, challenges, tutor, claimed: HashSet::new() }
  }

  /// Drive the session until the control channel closes. Returns the final session.
  #[instrument(level = "info", target = "session", skip_all, fields(session = %self.session.id()))]
  pub async fn run(mut self, mut events: mpsc::Receiver<ControlEvent>) -> Session {
    info!(target: "session", total = self.challenges.len(), "Session driver started.");
    self.publish_phase();
    loop {
      while let Ok(ev) = events.try_recv() {
        self.handle(ev);
      }
      if self.step().await {
        continue;
      }
      match events.recv().await {
        Some(ev) => self.handle(ev),
        None => break,
      }
    }
    info!(target: "session", phase = ?self.session.phase(), index = self.session.challenge_index(), last_error = ?self.session.last_error(), "Session driver stopped.");
    self.session
  }

  /// Run the current phase's one-shot work. Returns false when the session
  /// has to wait for something from outside (welcome, activity, reset).
  async fn step(&mut self) -> bool {
    let phase = self.session.phase();
    let index = self.session.challenge_index();
    match phase {
      SessionPhase::Greeting if !self.session.is_started() => return false,
      SessionPhase::InChallenge | SessionPhase::Complete => return false,
      _ => {}
    }
    if !self.claimed.insert((phase, index)) {
      debug!(target: "session", ?phase, index, "Phase already ran for this challenge; waiting.");
      return false;
    }
    match phase {
      SessionPhase::Greeting => self.run_greeting().await,
      SessionPhase::PreChallenge => self.run_pre_challenge(index).await,
      SessionPhase::PostChallenge => self.run_post_challenge(index).await,
      SessionPhase::InChallenge | SessionPhase::Complete => {}
    }
    true
  }

  pub fn handle(&mut self, ev: ControlEvent) {
    let phase = self.session.phase();
    match ev {
      ControlEvent::Begin => {
        if phase == SessionPhase::Greeting && !self.session.is_started() {
          info!(target: "session", "Welcome dismissed; starting greeting.");
          self.session.mark_started();
        }
      }
      ControlEvent::ActivityComplete { challenge_id } => {
        let current = self.challenges.get(self.session.challenge_index()).map(|c| c.id.as_str());
        if phase == SessionPhase::InChallenge && current == Some(challenge_id.as_str()) {
          info!(target: "session", %challenge_id, "Activity complete.");
          self.enter(SessionPhase::PostChallenge);
        } else {
          debug!(target: "session", %challenge_id, ?phase, "Ignoring activity-complete signal.");
        }
      }
      ControlEvent::SkipTo { index } => {
        if phase == SessionPhase::Complete {
          debug!(target: "session", index, "Skip ignored after completion.");
        } else if self.session.skip_to(index) {
          self.session.mark_started();
          info!(target: "session", index = self.session.challenge_index(), "Skipped forward.");
          self.publish_phase();
        } else {
          debug!(target: "session", index, "Skip ignored: not a forward move.");
        }
      }
      ControlEvent::Reset => {
        info!(target: "session", "Session reset.");
        self.tutor.capture.cancel();
        self.session.reset();
        self.claimed.clear();
        self.publish_phase();
      }
    }
  }

  fn enter(&mut self, phase: SessionPhase) {
    debug!(target: "session", from = ?self.session.phase(), to = ?phase, index = self.session.challenge_index(), "Phase transition.");
    self.session.set_phase(phase);
    self.publish_phase();
  }

  fn publish_phase(&self) {
    self.tutor.observer.notify(SessionEvent::PhaseChanged {
      phase: self.session.phase(),
      challenge_index: self.session.challenge_index(),
      total_challenges: self.session.total_challenges(),
      student_name: self.session.student_name().to_string(),
    });
  }

  async fn run_greeting(&mut self) {
    if let Err(e) = self.greeting_dialogue().await {
      warn!(target: "session", error = %e, "Greeting failed; continuing as Friend.");
      self.session.set_student_name(DEFAULT_STUDENT_NAME);
      self.tutor.report_error(&mut self.session, "Something went wrong. Let's continue!");
    }
    if self.challenges.is_empty() {
      self.enter(SessionPhase::Complete);
    } else {
      self.enter(SessionPhase::PreChallenge);
    }
  }

  async fn greeting_dialogue(&mut self) -> Result<(), TutorError> {
    self.tutor.speak(&mut self.session, GREETING_INTRO).await;
    let transcript = self.tutor.listen(&mut self.session).await?;
    let name = extract_name(&transcript);
    info!(target: "session", %name, "Student name set.");
    self.session.set_student_name(&name);

    self.tutor.set_voice(&mut self.session, VoiceState::Processing);
    let greeting = self.tutor.greet(self.session.student_name(), self.challenges.len()).await;
    self.tutor.speak(&mut self.session, &greeting).await;
    Ok(())
  }

  async fn run_pre_challenge(&mut self, index: usize) {
    let challenges = self.challenges.clone();
    let Some(challenge) = challenges.get(index) else {
      warn!(target: "session", index, "No challenge at index; completing.");
      self.enter(SessionPhase::Complete);
      return;
    };
    info!(target: "session", number = challenge.number, title = %challenge.title, "Introducing challenge.");
    self.tutor.speak(&mut self.session, &challenge.pre_script).await;
    self.enter(SessionPhase::InChallenge);
  }

  async fn run_post_challenge(&mut self, index: usize) {
    let challenges = self.challenges.clone();
    let Some(challenge) = challenges.get(index) else {
      warn!(target: "session", index, "No challenge at index; completing.");
      self.enter(SessionPhase::Complete);
      return;
    };
    run_dialogue(&self.tutor, &mut self.session, challenge).await;
    if self.session.advance_challenge() {
      info!(target: "session", messages = self.session.total_messages(), "All challenges complete.");
      self.enter(SessionPhase::Complete);
    } else {
      self.enter(SessionPhase::PreChallenge);
    }
  }
}
