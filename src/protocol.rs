//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{ActivityKind, Challenge, ScaffoldStage, SessionPhase, VoiceState};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    /// Leaves the welcome screen and starts the greeting.
    Begin,
    MicPermission {
        granted: bool,
    },
    PttStart {
        #[serde(default)]
        mime: Option<String>,
    },
    AudioChunk {
        #[serde(rename = "audioBase64")]
        audio_base64: String,
    },
    PttEnd,
    PlaybackFinished {
        #[serde(rename = "speechId")]
        speech_id: u64,
    },
    ActivityComplete {
        #[serde(rename = "challengeId")]
        challenge_id: String,
    },
    SkipTo {
        index: usize,
    },
    Reset,
}

/// Messages the server sends over WebSocket.
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    SessionState {
        phase: SessionPhase,
        #[serde(rename = "challengeIndex")]
        challenge_index: usize,
        #[serde(rename = "totalChallenges")]
        total_challenges: usize,
        #[serde(rename = "studentName")]
        student_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        challenge: Option<ChallengeOut>,
    },
    VoiceState {
        state: VoiceState,
    },
    /// Play this line, then answer with `playback_finished`. Without audio, use on-device speech.
    Speak {
        #[serde(rename = "speechId")]
        speech_id: u64,
        text: String,
        #[serde(rename = "audioBase64", skip_serializing_if = "Option::is_none")]
        audio_base64: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        mime: Option<String>,
    },
    Transcript {
        text: String,
    },
    TurnResult {
        turn: usize,
        #[serde(rename = "isCorrect")]
        is_correct: bool,
        #[serde(rename = "shouldEnd")]
        should_end: bool,
    },
    RequestMicPermission,
    Notice {
        message: String,
    },
    Error {
        message: String,
    },
}

/// DTO used by both WS and HTTP for challenge delivery. Answers and scaffolds stay server-side.
#[derive(Debug, Serialize, PartialEq)]
pub struct ChallengeOut {
    pub id: String,
    pub number: u32,
    pub kind: ActivityKind,
    pub path: String,
    pub title: String,
    pub duration: String,
    #[serde(rename = "preScript")]
    pub pre_script: String,
    #[serde(rename = "postQuestion")]
    pub post_question: String,
}

/// Convert full `Challenge` (internal) to the public DTO.
pub fn to_out(c: &Challenge) -> ChallengeOut {
    ChallengeOut {
        id: c.id.clone(),
        number: c.number,
        kind: c.kind,
        path: c.path.clone(),
        title: c.title.clone(),
        duration: c.duration.clone(),
        pre_script: c.pre_script.clone(),
        post_question: c.post_question.clone(),
    }
}

//
// HTTP request/response DTOs
//

#[derive(Deserialize)]
pub struct TurnIn {
    #[serde(rename = "challengeId")]
    pub challenge_id: String,
    pub transcript: String,
    #[serde(default)]
    pub turn: usize,
    #[serde(default, rename = "studentName")]
    pub student_name: Option<String>,
}
#[derive(Serialize)]
pub struct TurnOut {
    pub reply: String,
    #[serde(rename = "isCorrect")]
    pub is_correct: bool,
    #[serde(rename = "shouldEnd")]
    pub should_end: bool,
    pub stage: ScaffoldStage,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_messages_use_camel_case_fields() {
        let m: ClientWsMessage =
            serde_json::from_value(json!({"type": "activity_complete", "challengeId": "video-1"})).expect("parse");
        assert_eq!(m, ClientWsMessage::ActivityComplete { challenge_id: "video-1".into() });

        let m: ClientWsMessage = serde_json::from_value(json!({"type": "ptt_start"})).expect("parse");
        assert_eq!(m, ClientWsMessage::PttStart { mime: None });

        assert!(serde_json::from_value::<ClientWsMessage>(json!({"type": "submit_answer"})).is_err());
    }

    #[test]
    fn speak_omits_missing_audio() {
        let v = serde_json::to_value(ServerWsMessage::Speak {
            speech_id: 3,
            text: "Hi!".into(),
            audio_base64: None,
            mime: None,
        })
        .expect("serialize");
        assert_eq!(v, json!({"type": "speak", "speechId": 3, "text": "Hi!"}));
    }

    #[test]
    fn session_state_serializes_phase_names() {
        let v = serde_json::to_value(ServerWsMessage::SessionState {
            phase: SessionPhase::PostChallenge,
            challenge_index: 2,
            total_challenges: 7,
            student_name: "Maya".into(),
            challenge: None,
        })
        .expect("serialize");
        assert_eq!(v["phase"], "POST_CHALLENGE");
        assert_eq!(v["challengeIndex"], 2);
        assert!(v.get("challenge").is_none());

        let v = serde_json::to_value(ServerWsMessage::VoiceState { state: VoiceState::MathMateSpeaking }).expect("serialize");
        assert_eq!(v, json!({"type": "voice_state", "state": "MATH_MATE_SPEAKING"}));
    }
}
