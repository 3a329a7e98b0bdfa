//! Session transcripts: the ordered conversation turns under evaluation.
//!
//! The engine reads transcripts, it never writes them. Recording and
//! transcribing the audio happen upstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Agent,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => write!(f, "user"),
            Speaker::Agent => write!(f, "agent"),
        }
    }
}

/// One conversational turn. Turns are ordered and append-only; the engine
/// treats them as read-only input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub speaker: Speaker,
    pub text: String,
    pub occurred_at: DateTime<Utc>,
}

/// A recorded session with its transcript, as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub scenario_id: String,
    /// Free-form scenario context recorded at session creation (persona,
    /// product, objective). Forwarded verbatim to the evaluator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contexte: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub turns: Vec<TranscriptTurn>,
}

impl SessionRecord {
    /// A session counts as completed once it has an end timestamp.
    pub fn is_completed(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Render the transcript block sent to the evaluator: one line per turn,
    /// speaker-prefixed, wall-clock timestamps.
    pub fn render_transcript(&self) -> String {
        let mut out = String::new();
        for turn in &self.turns {
            out.push_str(&format!(
                "[{}] {}: {}\n",
                turn.occurred_at.format("%H:%M:%S"),
                turn.speaker,
                turn.text
            ));
        }
        out
    }
}

/// How the caller designates the conversation to evaluate.
///
/// Resolution is the transcript provider's job; the engine only ever sees
/// the resolved session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationRef {
    /// A session by direct identity.
    Session(String),
    /// The most recently completed session of a scenario.
    LatestForScenario(String),
}

impl fmt::Display for ConversationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationRef::Session(id) => write!(f, "session {}", id),
            ConversationRef::LatestForScenario(id) => {
                write!(f, "latest completed session of scenario {}", id)
            }
        }
    }
}
