//! Wake-word detection over a continuous recognizer session
//!
//! Matching is done on transcripts: case-folded, then checked for any of the
//! configured trigger phrases as a substring. Restarting after the host ends
//! the session is decided by the controller, not here.

use tracing::{debug, info};

use crate::recognizer::{
    RecognizerConfig, RecognizerError, RecognizerSession, SessionId, SpeechRecognizer, Transcript,
};

/// Owns the wake-listening session and the trigger phrase set
pub struct WakeWordDetector {
    phrases: Vec<String>,
    language: String,
    session: Option<RecognizerSession>,
}

impl WakeWordDetector {
    /// Create a detector for the given trigger phrases
    pub fn new(phrases: &[String], language: impl Into<String>) -> Self {
        let phrases: Vec<String> = phrases
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        debug!(wake_phrases = ?phrases, "wake word detector initialized");

        Self {
            phrases,
            language: language.into(),
            session: None,
        }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    fn session_config(&self) -> RecognizerConfig {
        RecognizerConfig {
            continuous: true,
            interim_results: true,
            language: self.language.clone(),
        }
    }

    /// First trigger phrase contained in the transcript, if any
    pub fn matches(&self, transcript: &str) -> Option<&str> {
        let normalized = transcript.to_lowercase();
        self.phrases
            .iter()
            .find(|phrase| normalized.contains(phrase.as_str()))
            .map(String::as_str)
    }

    /// Start a fresh continuous session with the given id
    pub fn start(&mut self, id: SessionId, host: &dyn SpeechRecognizer) -> Result<(), RecognizerError> {
        let mut session = RecognizerSession::new(id, self.session_config());
        session.start(host)?;
        self.session = Some(session);
        Ok(())
    }

    pub fn owns(&self, id: SessionId) -> bool {
        self.session.as_ref().is_some_and(|s| s.id() == id)
    }

    /// Session currently holding the microphone
    pub fn running_session(&self) -> Option<SessionId> {
        self.session.as_ref().filter(|s| s.is_running()).map(RecognizerSession::id)
    }

    /// Session running and not yet asked to stop
    pub fn is_listening(&self) -> bool {
        self.session.as_ref().is_some_and(RecognizerSession::is_live)
    }

    /// Scan a transcript from our session
    ///
    /// On a match the session is stopped right away to free the microphone
    /// and the matched phrase is returned. Results that arrive after the
    /// stop request are ignored so one utterance triggers at most once.
    pub fn on_result(
        &mut self,
        id: SessionId,
        transcript: &Transcript,
        host: &dyn SpeechRecognizer,
    ) -> Option<String> {
        if !self.session.as_ref().is_some_and(|s| s.id() == id && s.is_live()) {
            return None;
        }

        debug!(session = %id, text = %transcript.text, is_final = transcript.is_final, "wake word check");

        let phrase = self.matches(&transcript.text)?.to_string();
        if let Some(session) = self.session.as_mut() {
            session.stop(host);
        }
        info!(%phrase, transcript = %transcript.text, "wake phrase detected");
        Some(phrase)
    }

    /// Record the end of our session; returns false for foreign sessions
    pub fn on_end(&mut self, id: SessionId) -> bool {
        if !self.owns(id) {
            return false;
        }
        if let Some(mut session) = self.session.take() {
            session.mark_ended();
        }
        true
    }

    /// Ask the host to stop our session, if it is running
    pub fn stop(&mut self, host: &dyn SpeechRecognizer) {
        if let Some(session) = self.session.as_mut() {
            session.stop(host);
        }
    }
}
