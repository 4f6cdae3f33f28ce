//! Post-activity Socratic dialogue for one challenge.
//!
//! Ask the post-question, then loop listen -> evaluate -> speak until the
//! student is right, the generator closes the conversation, or the turn
//! budget runs out. Any error inside the loop is absorbed once at the top:
//! the tutor says something encouraging and the session moves on anyway.

use tracing::{error, info, instrument, warn};

use crate::domain::{Challenge, Message, VoiceState};
use crate::error::TutorError;
use crate::logic::{encouragement_line, evaluate_turn, stage_for_turn};
use crate::providers::TurnRequest;
use crate::session::Session;
use crate::tutor::{SessionEvent, Tutor};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DialogueOutcome {
  /// Correct answer on this turn (0-based).
  Answered { turn: usize },
  /// Generator closed the conversation without a correct answer.
  Closed { turn: usize },
  /// Turn budget used up; the reveal has been spoken.
  Exhausted,
  /// Something failed mid-dialogue; an encouragement line was spoken instead.
  Recovered,
}

#[instrument(level = "info", target = "dialogue", skip_all, fields(session = %session.id(), challenge = %challenge.id))]
pub async fn run_dialogue(tutor: &Tutor, session: &mut Session, challenge: &Challenge) -> DialogueOutcome {
  match converse(tutor, session, challenge).await {
    Ok(outcome) => {
      info!(target: "dialogue", ?outcome, "Dialogue finished.");
      outcome
    }
    Err(e) => {
      error!(target: "dialogue", error = %e, "Dialogue failed; encouraging and moving on.");
      tutor.report_error(session, "Something went wrong. Let's continue!");
      tutor.speak(session, &encouragement_line()).await;
      DialogueOutcome::Recovered
    }
  }
}

async fn converse(tutor: &Tutor, session: &mut Session, challenge: &Challenge) -> Result<DialogueOutcome, TutorError> {
  session.reset_turn();
  tutor.speak(session, &challenge.post_question).await;

  // One iteration past max_turns so the loop exits even if the last-turn cap were missed.
  for _ in 0..=challenge.max_turns {
    let turn = session.current_turn();
    let transcript = tutor.listen(session).await?;

    tutor.set_voice(session, VoiceState::Processing);
    let req = TurnRequest {
      challenge,
      transcript: &transcript,
      student_name: session.student_name(),
      turn,
      history: session.history(&challenge.id),
    };
    let eval = evaluate_turn(tutor.generator.as_deref(), req, tutor.timing.provider_timeout()).await;
    info!(
      target: "dialogue",
      turn,
      stage = stage_for_turn(turn).as_str(),
      is_correct = eval.is_correct,
      should_end = eval.should_end,
      "Turn evaluated."
    );

    session.add_message(&challenge.id, Message::user(transcript));
    session.add_message(&challenge.id, Message::assistant(eval.reply.clone()));
    tutor.observer.notify(SessionEvent::TurnEvaluated {
      challenge_id: challenge.id.clone(),
      turn,
      is_correct: eval.is_correct,
      should_end: eval.should_end,
    });

    tutor.speak(session, &eval.reply).await;

    if eval.should_end {
      return Ok(if eval.is_correct {
        DialogueOutcome::Answered { turn }
      } else if turn + 1 >= challenge.max_turns {
        DialogueOutcome::Exhausted
      } else {
        DialogueOutcome::Closed { turn }
      });
    }
    session.increment_turn(challenge.max_turns);
  }

  warn!(target: "dialogue", "Turn loop hit its safety bound.");
  Ok(DialogueOutcome::Exhausted)
}
