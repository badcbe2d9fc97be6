//! Console speech-to-text host
//!
//! Treats every non-empty line on stdin as a finalized transcript. Used on
//! headless displays and for driving the pipeline by hand. Sessions behave
//! like a browser recognizer: continuous sessions stop on their own after
//! `max_session`, single-shot sessions give up after `no_speech_timeout`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::session::{
    RecognitionErrorCode, RecognizerConfig, RecognizerError, RecognizerEvent, RecognizerEventKind,
    SessionId, SpeechRecognizer, Transcript,
};
use crate::events::PipelineEvent;

/// Session timing for the console host
#[derive(Debug, Clone, Copy)]
pub struct ConsoleTiming {
    pub max_session: Duration,
    pub no_speech_timeout: Duration,
}

impl Default for ConsoleTiming {
    fn default() -> Self {
        Self {
            max_session: Duration::from_secs(60),
            no_speech_timeout: Duration::from_secs(8),
        }
    }
}

struct ActiveSession {
    id: SessionId,
    stop_tx: Option<oneshot::Sender<()>>,
}

/// Line-oriented recognizer host
pub struct ConsoleRecognizer {
    events: mpsc::Sender<PipelineEvent>,
    lines: Arc<tokio::sync::Mutex<mpsc::Receiver<String>>>,
    active: Arc<Mutex<Option<ActiveSession>>>,
    input_closed: Arc<AtomicBool>,
    timing: ConsoleTiming,
}

impl ConsoleRecognizer {
    /// Create a host reading transcripts from stdin
    pub fn stdin(events: mpsc::Sender<PipelineEvent>, timing: ConsoleTiming) -> Self {
        let (line_tx, line_rx) = mpsc::channel(16);

        tokio::spawn(async move {
            let mut reader = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match reader.next_line().await {
                    Ok(Some(line)) => {
                        if line_tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("stdin closed, no more transcripts");
                        break;
                    }
                    Err(e) => {
                        warn!(?e, "failed to read transcript line");
                        break;
                    }
                }
            }
        });

        Self::from_lines(line_rx, events, timing)
    }

    /// Create a host reading transcripts from an arbitrary line channel
    pub fn from_lines(
        lines: mpsc::Receiver<String>,
        events: mpsc::Sender<PipelineEvent>,
        timing: ConsoleTiming,
    ) -> Self {
        Self {
            events,
            lines: Arc::new(tokio::sync::Mutex::new(lines)),
            active: Arc::new(Mutex::new(None)),
            input_closed: Arc::new(AtomicBool::new(false)),
            timing,
        }
    }
}

impl SpeechRecognizer for ConsoleRecognizer {
    fn start(&self, session: SessionId, config: &RecognizerConfig) -> Result<(), RecognizerError> {
        if self.input_closed.load(Ordering::SeqCst) {
            return Err(RecognizerError::UnsupportedEnvironment);
        }

        let mut active = self.active.lock();
        if let Some(current) = active.as_ref() {
            return Err(RecognizerError::Busy { active: current.id });
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        *active = Some(ActiveSession {
            id: session,
            stop_tx: Some(stop_tx),
        });

        let run = SessionRun {
            id: session,
            continuous: config.continuous,
            lines: Arc::clone(&self.lines),
            events: self.events.clone(),
            active: Arc::clone(&self.active),
            input_closed: Arc::clone(&self.input_closed),
            timing: self.timing,
        };
        tokio::spawn(run.run(stop_rx));

        Ok(())
    }

    fn stop(&self, session: SessionId) {
        let mut active = self.active.lock();
        match active.as_mut() {
            Some(current) if current.id == session => {
                if let Some(stop_tx) = current.stop_tx.take() {
                    let _ = stop_tx.send(());
                }
            }
            _ => debug!(%session, "stop for inactive console session ignored"),
        }
    }
}

struct SessionRun {
    id: SessionId,
    continuous: bool,
    lines: Arc<tokio::sync::Mutex<mpsc::Receiver<String>>>,
    events: mpsc::Sender<PipelineEvent>,
    active: Arc<Mutex<Option<ActiveSession>>>,
    input_closed: Arc<AtomicBool>,
    timing: ConsoleTiming,
}

impl SessionRun {
    async fn run(self, mut stop_rx: oneshot::Receiver<()>) {
        let limit = if self.continuous {
            self.timing.max_session
        } else {
            self.timing.no_speech_timeout
        };
        let deadline = Instant::now() + limit;
        let mut heard = false;

        {
            let mut lines = self.lines.lock().await;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        debug!(session = %self.id, "console session stopped");
                        break;
                    }
                    _ = sleep_until(deadline) => {
                        if !self.continuous && !heard {
                            self.emit(RecognizerEventKind::Error(RecognitionErrorCode::NoSpeech)).await;
                        }
                        debug!(session = %self.id, "console session timed out");
                        break;
                    }
                    line = lines.recv() => match line {
                        Some(line) => {
                            let text = line.trim();
                            if text.is_empty() {
                                continue;
                            }
                            self.emit(RecognizerEventKind::Result(Transcript::final_text(text))).await;
                            heard = true;
                            if !self.continuous {
                                break;
                            }
                        }
                        None => {
                            self.input_closed.store(true, Ordering::SeqCst);
                            self.emit(RecognizerEventKind::Error(RecognitionErrorCode::AudioCapture)).await;
                            break;
                        }
                    }
                }
            }
        }

        // Release before announcing the end so a restart triggered by it
        // does not find the host busy.
        {
            let mut active = self.active.lock();
            if active.as_ref().is_some_and(|a| a.id == self.id) {
                *active = None;
            }
        }
        self.emit(RecognizerEventKind::End).await;
    }

    async fn emit(&self, kind: RecognizerEventKind) {
        let event = PipelineEvent::Recognizer(RecognizerEvent {
            session: self.id,
            kind,
        });
        if self.events.send(event).await.is_err() {
            debug!(session = %self.id, "pipeline closed, dropping recognizer event");
        }
    }
}

/// Host without any speech-to-text capability
#[derive(Debug, Default)]
pub struct UnavailableRecognizer;

impl SpeechRecognizer for UnavailableRecognizer {
    fn start(&self, _: SessionId, _: &RecognizerConfig) -> Result<(), RecognizerError> {
        Err(RecognizerError::UnsupportedEnvironment)
    }

    fn stop(&self, _: SessionId) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(continuous: bool) -> RecognizerConfig {
        RecognizerConfig {
            continuous,
            interim_results: continuous,
            language: "pt-BR".to_string(),
        }
    }

    fn timing() -> ConsoleTiming {
        ConsoleTiming {
            max_session: Duration::from_secs(5),
            no_speech_timeout: Duration::from_millis(50),
        }
    }

    async fn next_kind(rx: &mut mpsc::Receiver<PipelineEvent>) -> (SessionId, RecognizerEventKind) {
        match rx.recv().await {
            Some(PipelineEvent::Recognizer(event)) => (event.session, event.kind),
            other => panic!("unexpected pipeline event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_single_shot_delivers_one_result_then_ends() {
        let (line_tx, line_rx) = mpsc::channel(4);
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let host = ConsoleRecognizer::from_lines(line_rx, event_tx, timing());

        host.start(SessionId(1), &config(false)).unwrap();
        line_tx.send("  comprar pão ".to_string()).await.unwrap();

        let (id, kind) = next_kind(&mut event_rx).await;
        assert_eq!(id, SessionId(1));
        assert_eq!(kind, RecognizerEventKind::Result(Transcript::final_text("comprar pão")));
        assert_eq!(next_kind(&mut event_rx).await.1, RecognizerEventKind::End);
    }

    #[tokio::test]
    async fn test_single_shot_silence_reports_no_speech() {
        let (_line_tx, line_rx) = mpsc::channel(4);
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let host = ConsoleRecognizer::from_lines(line_rx, event_tx, timing());

        host.start(SessionId(2), &config(false)).unwrap();

        assert_eq!(
            next_kind(&mut event_rx).await.1,
            RecognizerEventKind::Error(RecognitionErrorCode::NoSpeech)
        );
        assert_eq!(next_kind(&mut event_rx).await.1, RecognizerEventKind::End);
    }

    #[tokio::test]
    async fn test_busy_until_end() {
        let (_line_tx, line_rx) = mpsc::channel(4);
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let host = ConsoleRecognizer::from_lines(line_rx, event_tx, timing());

        host.start(SessionId(1), &config(true)).unwrap();
        assert_eq!(
            host.start(SessionId(2), &config(true)),
            Err(RecognizerError::Busy { active: SessionId(1) })
        );

        host.stop(SessionId(1));
        assert_eq!(next_kind(&mut event_rx).await, (SessionId(1), RecognizerEventKind::End));

        assert!(host.start(SessionId(2), &config(true)).is_ok());
    }

    #[tokio::test]
    async fn test_closed_input_makes_host_unsupported() {
        let (line_tx, line_rx) = mpsc::channel::<String>(4);
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let host = ConsoleRecognizer::from_lines(line_rx, event_tx, timing());
        drop(line_tx);

        host.start(SessionId(1), &config(true)).unwrap();
        assert_eq!(
            next_kind(&mut event_rx).await.1,
            RecognizerEventKind::Error(RecognitionErrorCode::AudioCapture)
        );
        assert_eq!(next_kind(&mut event_rx).await.1, RecognizerEventKind::End);

        assert_eq!(
            host.start(SessionId(2), &config(true)),
            Err(RecognizerError::UnsupportedEnvironment)
        );
    }

    #[test]
    fn test_unavailable_host() {
        assert_eq!(
            UnavailableRecognizer.start(SessionId(1), &config(true)),
            Err(RecognizerError::UnsupportedEnvironment)
        );
    }
}
