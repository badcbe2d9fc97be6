//! Recognizer session lifecycle and host contract

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identifies one listening session for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Knobs passed to the host when a session starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizerConfig {
    /// Keep listening after the first final result
    pub continuous: bool,
    /// Emit partial transcripts before finalization
    pub interim_results: bool,
    /// Deployment locale, e.g. `pt-BR`
    pub language: String,
}

/// One transcript delivered by the host
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub confidence: f32,
    pub is_final: bool,
}

impl Transcript {
    /// A finalized transcript with full confidence
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: 1.0,
            is_final: true,
        }
    }

    /// A partial transcript that may still change
    pub fn interim(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            is_final: false,
        }
    }
}

/// Per-session recognition failure reported by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionErrorCode {
    NoSpeech,
    Aborted,
    AudioCapture,
    Network,
    NotAllowed,
    Other(String),
}

impl std::fmt::Display for RecognitionErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSpeech => write!(f, "no-speech"),
            Self::Aborted => write!(f, "aborted"),
            Self::AudioCapture => write!(f, "audio-capture"),
            Self::Network => write!(f, "network"),
            Self::NotAllowed => write!(f, "not-allowed"),
            Self::Other(code) => write!(f, "{code}"),
        }
    }
}

/// Event emitted by the host for a specific session
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizerEvent {
    pub session: SessionId,
    pub kind: RecognizerEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEventKind {
    Result(Transcript),
    Error(RecognitionErrorCode),
    /// The session has terminated and released the microphone
    End,
}

/// Errors returned synchronously by `start()`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognizerError {
    #[error("speech recognition is not supported on this host")]
    UnsupportedEnvironment,

    #[error("recognizer is busy with session {active}")]
    Busy { active: SessionId },

    #[error("session {0} was already started")]
    AlreadyStarted(SessionId),

    #[error("recognizer backend error: {0}")]
    Backend(String),
}

/// Host speech-to-text engine
///
/// `start` must not block; results arrive later as `RecognizerEvent`s.
/// Every successful `start` is eventually followed by exactly one `End`.
pub trait SpeechRecognizer: Send + Sync {
    fn start(&self, session: SessionId, config: &RecognizerConfig) -> Result<(), RecognizerError>;

    /// Request termination. Completion is signalled by `End`.
    fn stop(&self, session: SessionId);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Running,
    Stopping,
    Ended,
}

/// One listening session, exclusively owned by the component that created it
#[derive(Debug)]
pub struct RecognizerSession {
    id: SessionId,
    config: RecognizerConfig,
    phase: Phase,
}

impl RecognizerSession {
    pub fn new(id: SessionId, config: RecognizerConfig) -> Self {
        Self {
            id,
            config,
            phase: Phase::Created,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Begin audio capture on the host
    pub fn start(&mut self, host: &dyn SpeechRecognizer) -> Result<(), RecognizerError> {
        if self.phase != Phase::Created {
            return Err(RecognizerError::AlreadyStarted(self.id));
        }
        host.start(self.id, &self.config)?;
        self.phase = Phase::Running;
        debug!(session = %self.id, continuous = self.config.continuous, "recognizer session started");
        Ok(())
    }

    /// Request termination; a no-op unless the session is running.
    ///
    /// Returns whether a stop request was actually sent to the host.
    pub fn stop(&mut self, host: &dyn SpeechRecognizer) -> bool {
        if self.phase != Phase::Running {
            return false;
        }
        host.stop(self.id);
        self.phase = Phase::Stopping;
        debug!(session = %self.id, "recognizer session stop requested");
        true
    }

    /// Record the host's `End` notification
    pub fn mark_ended(&mut self) {
        self.phase = Phase::Ended;
    }

    /// Holds the microphone: started and no `End` seen yet
    pub fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Running | Phase::Stopping)
    }

    /// Running and not asked to stop, so its results still matter
    pub fn is_live(&self) -> bool {
        self.phase == Phase::Running
    }
}
