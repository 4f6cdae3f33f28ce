//! Domain models: challenges, scaffolding, conversation messages, phases and voice states.

use serde::{Deserialize, Serialize};

/// What the student does during the activity part of a challenge.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
  Video,
  Applet,
}

/// Socratic hint ladder, one entry per turn of the post-activity dialogue.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Scaffolding {
  /// Turn 0: probing question.
  pub probe1: String,
  /// Turn 1: a different probe angle.
  pub probe2: String,
  /// Turn 2: directional hint.
  pub hint: String,
  /// Turn 3: strong scaffold (fill-in-the-blank).
  pub scaffold: String,
  /// Turn 4 and later: warm answer reveal.
  pub reveal: String,
}

/// Names of the escalation stages, in order.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScaffoldStage {
  Probe1,
  Probe2,
  Hint,
  Scaffold,
  Reveal,
}

impl ScaffoldStage {
  pub fn as_str(&self) -> &'static str {
    match self {
      ScaffoldStage::Probe1 => "probe1",
      ScaffoldStage::Probe2 => "probe2",
      ScaffoldStage::Hint => "hint",
      ScaffoldStage::Scaffold => "scaffold",
      ScaffoldStage::Reveal => "reveal",
    }
  }
}

/// One challenge of the module. Loaded once at startup, never mutated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Challenge {
  pub id: String,
  pub number: u32,
  pub kind: ActivityKind,
  pub path: String,
  pub title: String,
  #[serde(default)]
  pub duration: String,
  pub pre_script: String,
  pub post_question: String,
  #[serde(default)]
  pub context_info: String,
  /// Pipe-separated accepted phrases, e.g. "one fourth|quarter|1/4".
  pub correctness_filter: String,
  pub scaffolding: Scaffolding,
  #[serde(default = "default_max_turns")]
  pub max_turns: usize,
}

fn default_max_turns() -> usize { 5 }

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  User,
  Assistant,
}

impl Role {
  pub fn as_str(&self) -> &'static str {
    match self {
      Role::User => "user",
      Role::Assistant => "assistant",
    }
  }
}

/// One entry of a challenge's conversation history.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
  pub role: Role,
  pub content: String,
}

impl Message {
  pub fn user(content: impl Into<String>) -> Self {
    Self { role: Role::User, content: content.into() }
  }
  pub fn assistant(content: impl Into<String>) -> Self {
    Self { role: Role::Assistant, content: content.into() }
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionPhase {
  Greeting,
  PreChallenge,
  InChallenge,
  PostChallenge,
  Complete,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoiceState {
  Idle,
  MathMateSpeaking,
  WaitingForStudent,
  StudentRecording,
  Processing,
  Error,
}

/// Outcome of one evaluated turn. `is_correct` implies `should_end`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Evaluation {
  pub reply: String,
  pub is_correct: bool,
  pub should_end: bool,
}
