//! Events module for the voice pipeline
//!
//! `PipelineEvent`s flow into the controller on a single channel;
//! `StateEvent`s flow out of it to the display layer.

mod pipeline;

pub use pipeline::{ControlCommand, PipelineEvent};

use serde::{Deserialize, Serialize};

use crate::recognizer::{RecognitionErrorCode, SessionId};
use crate::state::InteractionMode;

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// Interpreter answered and the reply was spoken
    Answered,
    /// A reminder was stored and confirmed
    ReminderAdded { text: String },
    /// Interpreter had nothing to say
    Silent,
    /// Interpretation failed and an apology was spoken
    Apologized { reason: String },
    /// Command session ended without hearing anything
    NoSpeech,
    /// Command session reported an error
    RecognitionFailed { code: RecognitionErrorCode },
    /// Turn aborted by the display layer or a suspend
    Cancelled,
}

/// Events emitted by the controller during transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// Interaction mode changed
    ModeChanged {
        from: InteractionMode,
        to: InteractionMode,
        /// Time spent in the previous mode
        duration_ms: u64,
    },

    /// Trigger phrase heard
    WakeDetected { phrase: String },

    /// Command utterance captured and sent for interpretation
    CommandCaptured { text: String },

    /// Turn finished, listening for the wake phrase again
    TurnComplete {
        outcome: TurnOutcome,
        /// Time from wake detection to completion
        duration_ms: u64,
    },

    /// A recognizer session acquired the microphone
    SessionStarted { session: SessionId, continuous: bool },

    /// A recognizer session released the microphone
    SessionEnded { session: SessionId },

    /// Host has no speech recognition; the pipeline stays idle
    RecognitionUnavailable,
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateEvent::ModeChanged { from, to, .. } => write!(f, "MODE_CHANGED ({from} -> {to})"),
            StateEvent::WakeDetected { phrase } => write!(f, "WAKE_DETECTED ({phrase})"),
            StateEvent::CommandCaptured { .. } => write!(f, "COMMAND_CAPTURED"),
            StateEvent::TurnComplete { duration_ms, .. } => {
                write!(f, "TURN_COMPLETE ({}ms)", duration_ms)
            }
            StateEvent::SessionStarted { session, .. } => write!(f, "SESSION_STARTED ({session})"),
            StateEvent::SessionEnded { session } => write!(f, "SESSION_ENDED ({session})"),
            StateEvent::RecognitionUnavailable => write!(f, "RECOGNITION_UNAVAILABLE"),
        }
    }
}
