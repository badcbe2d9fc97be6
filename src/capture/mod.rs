//! Command capture over a single-shot recognizer session
//!
//! A capture belongs to one turn. It acknowledges the wake phrase, waits for
//! the acknowledgment to finish playing, then listens for one utterance.
//! Each turn yields exactly one exit: a transcript, an error or silence.

use std::time::Duration;

use tracing::{debug, info};

use crate::recognizer::{
    RecognitionErrorCode, RecognizerConfig, RecognizerError, RecognizerSession, SessionId,
    SpeechRecognizer, Transcript,
};
use crate::speech::SpeechSynthesizer;

/// Why a capture ended without a transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureFailure {
    /// Host reported an error before any result
    Error(RecognitionErrorCode),
    /// Session ended before any result
    Silence,
}

/// Owns the command-listening session for the active turn
pub struct CommandCapturer {
    language: String,
    acknowledgment: String,
    delay: Duration,
    session: Option<RecognizerSession>,
    turn: Option<u64>,
    heard: bool,
}

impl CommandCapturer {
    pub fn new(language: impl Into<String>, acknowledgment: impl Into<String>, delay: Duration) -> Self {
        Self {
            language: language.into(),
            acknowledgment: acknowledgment.into(),
            delay,
            session: None,
            turn: None,
            heard: false,
        }
    }

    fn session_config(&self) -> RecognizerConfig {
        RecognizerConfig {
            continuous: false,
            interim_results: false,
            language: self.language.clone(),
        }
    }

    /// Open a turn: speak the acknowledgment and return how long to wait
    /// before listening, so our own voice is not captured as the command.
    pub fn begin(&mut self, turn: u64, voice: &dyn SpeechSynthesizer) -> Duration {
        self.turn = Some(turn);
        self.heard = false;
        voice.speak(&self.acknowledgment);
        debug!(turn, delay_ms = self.delay.as_millis() as u64, "command capture armed");
        self.delay
    }

    pub fn active_turn(&self) -> Option<u64> {
        self.turn
    }

    /// Start the single-shot session for the active turn
    pub fn start(&mut self, id: SessionId, host: &dyn SpeechRecognizer) -> Result<(), RecognizerError> {
        let mut session = RecognizerSession::new(id, self.session_config());
        session.start(host)?;
        info!(session = %id, turn = ?self.turn, "listening for command");
        self.session = Some(session);
        Ok(())
    }

    pub fn owns(&self, id: SessionId) -> bool {
        self.session.as_ref().is_some_and(|s| s.id() == id)
    }

    pub fn running_session(&self) -> Option<SessionId> {
        self.session.as_ref().filter(|s| s.is_running()).map(RecognizerSession::id)
    }

    fn accepting(&self, id: SessionId) -> bool {
        self.turn.is_some() && !self.heard && self.owns(id)
    }

    /// First final transcript of the turn; later ones are dropped
    pub fn on_result(&mut self, id: SessionId, transcript: Transcript) -> Option<Transcript> {
        if !self.accepting(id) || !transcript.is_final || transcript.text.trim().is_empty() {
            return None;
        }
        self.heard = true;
        info!(session = %id, text = %transcript.text, "command captured");
        Some(transcript)
    }

    /// Host error before a result ends the turn
    pub fn on_error(&mut self, id: SessionId, code: RecognitionErrorCode) -> Option<CaptureFailure> {
        if !self.accepting(id) {
            return None;
        }
        self.heard = true;
        Some(CaptureFailure::Error(code))
    }

    /// Record the end of our session
    ///
    /// Returns `None` for foreign sessions, `Some(None)` when the turn has
    /// already exited, and `Some(Some(Silence))` when nothing was heard.
    pub fn on_end(&mut self, id: SessionId) -> Option<Option<CaptureFailure>> {
        if !self.owns(id) {
            return None;
        }
        let silent = self.turn.is_some() && !self.heard;
        if let Some(mut session) = self.session.take() {
            session.mark_ended();
        }
        if silent {
            self.heard = true;
            Some(Some(CaptureFailure::Silence))
        } else {
            Some(None)
        }
    }

    /// Close the turn; the session, if any, keeps the microphone until `End`
    pub fn end_turn(&mut self) {
        self.turn = None;
        self.heard = false;
    }

    pub fn stop(&mut self, host: &dyn SpeechRecognizer) {
        if let Some(session) = self.session.as_mut() {
            session.stop(host);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Host;

    impl SpeechRecognizer for Host {
        fn start(&self, _: SessionId, config: &RecognizerConfig) -> Result<(), RecognizerError> {
            assert!(!config.continuous);
            assert!(!config.interim_results);
            Ok(())
        }

        fn stop(&self, _: SessionId) {}
    }

    #[derive(Default)]
    struct Voice {
        spoken: Mutex<Vec<String>>,
    }

    impl SpeechSynthesizer for Voice {
        fn speak(&self, text: &str) {
            self.spoken.lock().push(text.to_string());
        }

        fn cancel(&self) {}
    }

    fn capturer() -> CommandCapturer {
        CommandCapturer::new("pt-BR", "Sim?", Duration::from_millis(1000))
    }

    #[test]
    fn test_begin_acknowledges_and_delays() {
        let voice = Voice::default();
        let mut capture = capturer();

        assert_eq!(capture.begin(1, &voice), Duration::from_millis(1000));
        assert_eq!(capture.active_turn(), Some(1));
        assert_eq!(voice.spoken.lock().as_slice(), ["Sim?"]);
    }

    #[test]
    fn test_single_result_per_turn() {
        let mut capture = capturer();
        capture.begin(1, &Voice::default());
        capture.start(SessionId(2), &Host).unwrap();

        assert!(capture.on_result(SessionId(2), Transcript::final_text("apagar a luz")).is_some());
        assert!(capture.on_result(SessionId(2), Transcript::final_text("de novo")).is_none());
        assert_eq!(capture.on_end(SessionId(2)), Some(None));
        assert_eq!(capture.running_session(), None);
    }

    #[test]
    fn test_silent_end() {
        let mut capture = capturer();
        capture.begin(1, &Voice::default());
        capture.start(SessionId(2), &Host).unwrap();

        assert_eq!(capture.on_end(SessionId(2)), Some(Some(CaptureFailure::Silence)));
    }

    #[test]
    fn test_error_then_end_exits_once() {
        let mut capture = capturer();
        capture.begin(1, &Voice::default());
        capture.start(SessionId(2), &Host).unwrap();

        assert_eq!(
            capture.on_error(SessionId(2), RecognitionErrorCode::NoSpeech),
            Some(CaptureFailure::Error(RecognitionErrorCode::NoSpeech))
        );
        assert_eq!(capture.on_end(SessionId(2)), Some(None));
    }

    #[test]
    fn test_interim_and_empty_results_ignored() {
        let mut capture = capturer();
        capture.begin(1, &Voice::default());
        capture.start(SessionId(2), &Host).unwrap();

        assert!(capture.on_result(SessionId(2), Transcript::interim("apag", 0.3)).is_none());
        assert!(capture.on_result(SessionId(2), Transcript::final_text("   ")).is_none());
        assert!(capture.on_result(SessionId(3), Transcript::final_text("luz")).is_none());
    }

    #[test]
    fn test_end_after_turn_closed_is_not_silence() {
        let mut capture = capturer();
        capture.begin(1, &Voice::default());
        capture.start(SessionId(2), &Host).unwrap();
        capture.end_turn();

        assert_eq!(capture.on_end(SessionId(2)), Some(None));
        assert_eq!(capture.on_end(SessionId(2)), None);
    }
}
