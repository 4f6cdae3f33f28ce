//! Per-connection session state.
//!
//! The session driver task owns the only `Session`; everything else reads it
//! through the observer events. All mutation goes through the methods below.

use std::collections::HashMap;

use uuid::Uuid;

use crate::domain::{Message, SessionPhase, VoiceState};
use crate::logic::DEFAULT_STUDENT_NAME;

#[derive(Debug)]
pub struct Session {
  id: Uuid,
  total_challenges: usize,
  student_name: String,
  challenge_index: usize,
  phase: SessionPhase,
  voice_state: VoiceState,
  history: HashMap<String, Vec<Message>>,
  current_turn: usize,
  last_error: Option<String>,
  started: bool,
}

impl Session {
  pub fn new(total_challenges: usize) -> Self {
    Self {
      id: Uuid::new_v4(),
      total_challenges,
      student_name: DEFAULT_STUDENT_NAME.to_string(),
      challenge_index: 0,
      phase: SessionPhase::Greeting,
      voice_state: VoiceState::Idle,
      history: HashMap::new(),
      current_turn: 0,
      last_error: None,
      started: false,
    }
  }

  pub fn id(&self) -> Uuid { self.id }
  pub fn total_challenges(&self) -> usize { self.total_challenges }
  pub fn student_name(&self) -> &str { &self.student_name }
  pub fn challenge_index(&self) -> usize { self.challenge_index }
  pub fn phase(&self) -> SessionPhase { self.phase }
  pub fn voice_state(&self) -> VoiceState { self.voice_state }
  pub fn current_turn(&self) -> usize { self.current_turn }
  pub fn last_error(&self) -> Option<&str> { self.last_error.as_deref() }
  pub fn is_started(&self) -> bool { self.started }

  pub fn set_student_name(&mut self, name: &str) {
    let name = name.trim();
    self.student_name = if name.is_empty() { DEFAULT_STUDENT_NAME.to_string() } else { name.to_string() };
  }

  pub fn set_phase(&mut self, phase: SessionPhase) { self.phase = phase; }

  /// Entering `Error` records the message; any other state clears it.
  pub fn set_voice_state(&mut self, state: VoiceState) {
    self.voice_state = state;
    if state != VoiceState::Error {
      self.last_error = None;
    }
  }

  pub fn set_error(&mut self, message: impl Into<String>) {
    self.voice_state = VoiceState::Error;
    self.last_error = Some(message.into());
  }

  pub fn mark_started(&mut self) { self.started = true; }

  /// Move to the next challenge. Returns true when the module is finished;
  /// the index then stays on the last challenge.
  pub fn advance_challenge(&mut self) -> bool {
    let next = self.challenge_index + 1;
    if next >= self.total_challenges {
      return true;
    }
    self.challenge_index = next;
    false
  }

  /// Jump forward to `index` (clamped to the last challenge). Never moves backwards,
  /// and re-targeting the current challenge only counts from the greeting.
  pub fn skip_to(&mut self, index: usize) -> bool {
    if self.total_challenges == 0 {
      return false;
    }
    let target = index.min(self.total_challenges - 1);
    if target < self.challenge_index || (target == self.challenge_index && self.phase != SessionPhase::Greeting) {
      return false;
    }
    self.challenge_index = target;
    self.phase = SessionPhase::PreChallenge;
    true
  }

  pub fn history(&self, challenge_id: &str) -> &[Message] {
    self.history.get(challenge_id).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn add_message(&mut self, challenge_id: &str, message: Message) {
    self.history.entry(challenge_id.to_string()).or_default().push(message);
  }

  pub fn total_messages(&self) -> usize {
    self.history.values().map(Vec::len).sum()
  }

  pub fn reset_turn(&mut self) { self.current_turn = 0; }

  /// Keeps the counter inside `[0, max_turns)`.
  pub fn increment_turn(&mut self, max_turns: usize) {
    self.current_turn = (self.current_turn + 1).min(max_turns.saturating_sub(1));
  }

  /// Back to a fresh session: welcome gate, greeting, first challenge, no history.
  pub fn reset(&mut self) {
    let total = self.total_challenges;
    *self = Session::new(total);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn starts_at_greeting_with_defaults() {
    let s = Session::new(7);
    assert_eq!(s.phase(), SessionPhase::Greeting);
    assert_eq!(s.challenge_index(), 0);
    assert_eq!(s.student_name(), "Friend");
    assert_eq!(s.voice_state(), VoiceState::Idle);
    assert!(!s.is_started());
  }

  #[test]
  fn advance_stops_at_last_challenge() {
    let mut s = Session::new(2);
    assert!(!s.advance_challenge());
    assert_eq!(s.challenge_index(), 1);
    assert!(s.advance_challenge());
    assert_eq!(s.challenge_index(), 1);
  }

  #[test]
  fn skip_never_moves_backwards() {
    let mut s = Session::new(7);
    assert!(s.skip_to(3));
    assert_eq!(s.challenge_index(), 3);
    assert_eq!(s.phase(), SessionPhase::PreChallenge);
    assert!(!s.skip_to(1));
    assert_eq!(s.challenge_index(), 3);
    assert!(s.skip_to(99));
    assert_eq!(s.challenge_index(), 6);
    assert!(!s.skip_to(99), "already on the last challenge");
    assert!(!s.skip_to(6));
  }

  #[test]
  fn skip_to_current_index_only_leaves_the_greeting() {
    let mut s = Session::new(7);
    assert!(s.skip_to(0));
    assert_eq!(s.phase(), SessionPhase::PreChallenge);
    s.set_phase(SessionPhase::InChallenge);
    assert!(!s.skip_to(0));
    assert_eq!(s.phase(), SessionPhase::InChallenge);
  }

  #[test]
  fn history_is_scoped_per_challenge() {
    let mut s = Session::new(7);
    s.add_message("video-1", Message::user("quarter"));
    s.add_message("video-1", Message::assistant("Yes!"));
    s.add_message("applet-a1", Message::user("same"));
    assert_eq!(s.history("video-1").len(), 2);
    assert_eq!(s.history("applet-a1"), &[Message::user("same")]);
    assert!(s.history("nope").is_empty());
    assert_eq!(s.total_messages(), 3);
  }

  #[test]
  fn turn_counter_is_clamped() {
    let mut s = Session::new(1);
    for _ in 0..10 {
      s.increment_turn(5);
    }
    assert_eq!(s.current_turn(), 4);
    s.reset_turn();
    assert_eq!(s.current_turn(), 0);
  }

  #[test]
  fn error_state_is_transient() {
    let mut s = Session::new(1);
    s.set_error("Microphone access needed");
    assert_eq!(s.voice_state(), VoiceState::Error);
    assert_eq!(s.last_error(), Some("Microphone access needed"));
    s.set_voice_state(VoiceState::Processing);
    assert_eq!(s.last_error(), None);
  }

  #[test]
  fn reset_restores_defaults() {
    let mut s = Session::new(7);
    s.mark_started();
    s.set_student_name("Maya");
    s.skip_to(4);
    s.add_message("video-2", Message::user("two"));
    s.reset();
    assert_eq!(s.challenge_index(), 0);
    assert_eq!(s.phase(), SessionPhase::Greeting);
    assert_eq!(s.student_name(), "Friend");
    assert_eq!(s.total_messages(), 0);
    assert!(!s.is_started());
    assert_eq!(s.total_challenges(), 7);
  }
}
