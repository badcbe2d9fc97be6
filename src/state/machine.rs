//! Core controller implementation
//!
//! Every recognizer notification, timer and interpreter completion arrives
//! on one channel and is handled to completion before the next. The
//! microphone is held by at most one session; a start requested while it is
//! still held is parked in `pending` and issued when that session's `End`
//! arrives.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::mode::{InteractionMode, TransitionError};
use crate::capture::{CaptureFailure, CommandCapturer};
use crate::events::{ControlCommand, PipelineEvent, StateEvent, TurnOutcome};
use crate::interpreter::{CommandInterpreter, InterpretedCommand};
use crate::recognizer::{
    RecognitionErrorCode, RecognizerError, RecognizerEvent, RecognizerEventKind, SessionId,
    SpeechRecognizer, Transcript,
};
use crate::speech::SpeechSynthesizer;
use crate::wake::WakeWordDetector;

/// Spoken when interpretation fails
pub const DEFAULT_APOLOGY: &str = "Desculpe, tive um problema ao processar.";

/// Tunables for the voice pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub language: String,
    pub wake_phrases: Vec<String>,
    pub acknowledgment: String,
    pub apology: String,
    /// Pause between the acknowledgment and command listening
    pub capture_delay: Duration,
    /// Backoff before retrying a failed wake session start
    pub wake_retry_delay: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            language: "pt-BR".to_string(),
            wake_phrases: vec!["smart home".to_string(), "ok smart".to_string()],
            acknowledgment: "Sim?".to_string(),
            apology: DEFAULT_APOLOGY.to_string(),
            capture_delay: Duration::from_millis(1000),
            wake_retry_delay: Duration::from_millis(500),
        }
    }
}

/// External engines the controller drives
#[derive(Clone)]
pub struct Collaborators {
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub interpreter: Arc<dyn CommandInterpreter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionRole {
    Wake,
    Command,
}

/// The interaction mode controller
pub struct Controller {
    mode: InteractionMode,
    mode_entered_at: Instant,
    turn: u64,
    turn_started_at: Option<Instant>,
    next_session: u64,
    pending: Option<SessionRole>,
    suspended: Option<String>,
    unsupported: bool,
    retry_scheduled: bool,
    interpretation: Option<JoinHandle<()>>,
    settings: PipelineSettings,
    wake: WakeWordDetector,
    capture: CommandCapturer,
    collaborators: Collaborators,
    loopback: mpsc::Sender<PipelineEvent>,
    event_tx: broadcast::Sender<StateEvent>,
}

impl Controller {
    /// Create a controller in `Idle`
    ///
    /// `loopback` must feed the same channel later passed to `run`; timers
    /// and interpreter results are delivered through it.
    pub fn new(
        settings: PipelineSettings,
        collaborators: Collaborators,
        loopback: mpsc::Sender<PipelineEvent>,
        event_tx: broadcast::Sender<StateEvent>,
    ) -> Self {
        let wake = WakeWordDetector::new(&settings.wake_phrases, settings.language.clone());
        let capture = CommandCapturer::new(
            settings.language.clone(),
            settings.acknowledgment.clone(),
            settings.capture_delay,
        );

        Self {
            mode: InteractionMode::Idle,
            mode_entered_at: Instant::now(),
            turn: 0,
            turn_started_at: None,
            next_session: 0,
            pending: None,
            suspended: None,
            unsupported: false,
            retry_scheduled: false,
            interpretation: None,
            settings,
            wake,
            capture,
            collaborators,
            loopback,
            event_tx,
        }
    }

    /// Current mode, for display only
    pub fn current_mode(&self) -> InteractionMode {
        self.mode
    }

    /// Run the controller until shutdown or until the channel closes
    pub async fn run(&mut self, mut events: mpsc::Receiver<PipelineEvent>) {
        info!("voice pipeline starting");
        self.start();

        while let Some(event) = events.recv().await {
            if !self.handle(event) {
                break;
            }
        }

        self.shutdown();
        info!("voice pipeline stopped");
    }

    /// Leave `Idle` and begin listening for the wake phrase
    pub fn start(&mut self) {
        if self.unsupported || self.suspended.is_some() || self.mode != InteractionMode::Idle {
            return;
        }
        if self.transition_to(InteractionMode::WakeListening).is_ok() {
            info!(phrases = ?self.wake.phrases(), "listening for wake phrase");
            self.activate_wake();
        }
    }

    /// Handle one event; returns false once the loop should stop
    pub fn handle(&mut self, event: PipelineEvent) -> bool {
        match event {
            PipelineEvent::Recognizer(event) => self.on_recognizer_event(event),
            PipelineEvent::CaptureDelayElapsed { turn } => self.on_capture_delay_elapsed(turn),
            PipelineEvent::WakeRetry => {
                self.retry_scheduled = false;
                if self.mode == InteractionMode::WakeListening {
                    self.activate_wake();
                }
            }
            PipelineEvent::Interpreted { turn, command } => self.on_interpreted(turn, command),
            PipelineEvent::Control(command) => return self.on_control(command),
        }
        true
    }

    /// Wake phrase heard: `WakeListening -> CommandListening`
    pub fn on_wake_detected(&mut self, phrase: String) {
        if let Err(e) = self.transition_to(InteractionMode::CommandListening) {
            warn!(error = %e, "wake detection ignored");
            return;
        }

        self.turn += 1;
        self.turn_started_at = Some(Instant::now());
        self.emit(StateEvent::WakeDetected { phrase });

        let delay = self
            .capture
            .begin(self.turn, self.collaborators.synthesizer.as_ref());
        self.schedule(PipelineEvent::CaptureDelayElapsed { turn: self.turn }, delay);
    }

    /// Turn finished on any path: back to `WakeListening`, wake detector
    /// reactivated exactly once.
    pub fn on_turn_complete(&mut self, outcome: TurnOutcome) {
        if !self.mode.in_turn() {
            debug!(mode = %self.mode, ?outcome, "no turn in progress");
            return;
        }

        self.capture.end_turn();
        if let Err(e) = self.transition_to(InteractionMode::WakeListening) {
            warn!(error = %e, "failed to leave turn");
            return;
        }

        let duration_ms = self
            .turn_started_at
            .take()
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        info!(turn = self.turn, ?outcome, duration_ms, "turn complete");
        self.emit(StateEvent::TurnComplete {
            outcome,
            duration_ms,
        });

        self.activate_wake();
    }

    /// Release the microphone, silence output and drop any interpretation
    /// still in flight
    pub fn shutdown(&mut self) {
        if let Some(task) = self.interpretation.take() {
            task.abort();
        }
        let recognizer = Arc::clone(&self.collaborators.recognizer);
        self.wake.stop(recognizer.as_ref());
        self.capture.stop(recognizer.as_ref());
        self.capture.end_turn();
        self.pending = None;
        self.collaborators.synthesizer.cancel();
        let _ = self.transition_to(InteractionMode::Idle);
    }

    fn on_recognizer_event(&mut self, event: RecognizerEvent) {
        let RecognizerEvent { session, kind } = event;
        let recognizer = Arc::clone(&self.collaborators.recognizer);

        match kind {
            RecognizerEventKind::Result(transcript) => {
                if self.wake.owns(session) {
                    if let Some(phrase) = self.wake.on_result(session, &transcript, recognizer.as_ref()) {
                        self.on_wake_detected(phrase);
                    }
                } else if self.capture.owns(session) {
                    if let Some(transcript) = self.capture.on_result(session, transcript) {
                        self.on_command_heard(transcript);
                    }
                } else {
                    debug!(%session, "result from untracked session ignored");
                }
            }
            RecognizerEventKind::Error(code) => {
                if self.wake.owns(session) {
                    warn!(%session, %code, "wake session error");
                } else if let Some(CaptureFailure::Error(code)) = self.capture.on_error(session, code) {
                    warn!(%session, %code, "command session error");
                    self.on_turn_complete(TurnOutcome::RecognitionFailed { code });
                }
            }
            RecognizerEventKind::End => self.on_session_end(session),
        }
    }

    fn on_session_end(&mut self, session: SessionId) {
        if self.wake.on_end(session) {
            self.emit(StateEvent::SessionEnded { session });
            // Continuous sessions time out on their own; keep listening.
            if self.mode == InteractionMode::WakeListening && self.suspended.is_none() && self.pending.is_none() {
                debug!(%session, "wake session ended, restarting");
                self.pending = Some(SessionRole::Wake);
            }
        } else if let Some(exit) = self.capture.on_end(session) {
            self.emit(StateEvent::SessionEnded { session });
            if let Some(CaptureFailure::Silence) = exit {
                info!(%session, "no command heard");
                self.on_turn_complete(TurnOutcome::NoSpeech);
            }
        } else {
            debug!(%session, "end from untracked session ignored");
            return;
        }

        self.start_pending();
    }

    fn on_capture_delay_elapsed(&mut self, turn: u64) {
        if self.capture.active_turn() != Some(turn) || self.mode != InteractionMode::CommandListening {
            debug!(turn, current = self.turn, "stale capture timer");
            return;
        }
        self.request_session(SessionRole::Command);
    }

    /// `CommandListening -> Processing`, interpretation runs off-loop
    fn on_command_heard(&mut self, transcript: Transcript) {
        if let Err(e) = self.transition_to(InteractionMode::Processing) {
            warn!(error = %e, "captured command dropped");
            return;
        }

        self.emit(StateEvent::CommandCaptured {
            text: transcript.text.clone(),
        });

        let interpreter = Arc::clone(&self.collaborators.interpreter);
        let loopback = self.loopback.clone();
        let turn = self.turn;
        self.interpretation = Some(tokio::spawn(async move {
            let command = interpreter.interpret(&transcript.text).await;
            if loopback
                .send(PipelineEvent::Interpreted { turn, command })
                .await
                .is_err()
            {
                debug!(turn, "pipeline closed before interpretation finished");
            }
        }));
    }

    fn on_interpreted(&mut self, turn: u64, command: InterpretedCommand) {
        if turn != self.turn || self.mode != InteractionMode::Processing {
            debug!(turn, current = self.turn, mode = %self.mode, "stale interpretation discarded");
            return;
        }
        self.interpretation = None;

        let voice = Arc::clone(&self.collaborators.synthesizer);
        match command.spoken_reply() {
            Some(reply) => voice.speak(reply),
            None if matches!(command, InterpretedCommand::Error { .. }) => {
                voice.speak(&self.settings.apology)
            }
            None => {}
        }

        let outcome = match command {
            InterpretedCommand::Error { reason } => TurnOutcome::Apologized { reason },
            InterpretedCommand::AddReminder { text, .. } => TurnOutcome::ReminderAdded { text },
            InterpretedCommand::Chat { reply: Some(_) } => TurnOutcome::Answered,
            InterpretedCommand::Chat { reply: None } => TurnOutcome::Silent,
        };

        self.on_turn_complete(outcome);
    }

    fn on_control(&mut self, command: ControlCommand) -> bool {
        match command {
            ControlCommand::Cancel => {
                if self.mode.in_turn() {
                    info!(mode = %self.mode, "turn cancelled");
                    self.capture.stop(self.collaborators.recognizer.as_ref());
                    self.on_turn_complete(TurnOutcome::Cancelled);
                }
            }
            ControlCommand::Suspend { reason } => self.suspend(reason),
            ControlCommand::Resume => {
                if self.suspended.take().is_some() {
                    info!("voice pipeline resumed");
                    self.start();
                }
            }
            ControlCommand::Shutdown => {
                self.shutdown();
                return false;
            }
        }
        true
    }

    fn suspend(&mut self, reason: String) {
        info!(%reason, mode = %self.mode, "voice pipeline suspended");
        let recognizer = Arc::clone(&self.collaborators.recognizer);

        if self.mode.in_turn() {
            self.capture.stop(recognizer.as_ref());
            self.capture.end_turn();
            self.turn_started_at = None;
            self.emit(StateEvent::TurnComplete {
                outcome: TurnOutcome::Cancelled,
                duration_ms: 0,
            });
        }
        self.wake.stop(recognizer.as_ref());
        self.pending = None;
        self.suspended = Some(reason);
        let _ = self.transition_to(InteractionMode::Idle);
    }

    fn activate_wake(&mut self) {
        if self.unsupported || self.suspended.is_some() {
            return;
        }
        if self.wake.is_listening() {
            return;
        }
        self.request_session(SessionRole::Wake);
    }

    /// Session currently holding the microphone
    fn microphone_holder(&self) -> Option<SessionId> {
        self.wake
            .running_session()
            .or_else(|| self.capture.running_session())
    }

    fn request_session(&mut self, role: SessionRole) {
        if let Some(holder) = self.microphone_holder() {
            debug!(%holder, ?role, "microphone busy, start deferred");
            let recognizer = Arc::clone(&self.collaborators.recognizer);
            match role {
                SessionRole::Wake => self.capture.stop(recognizer.as_ref()),
                SessionRole::Command => self.wake.stop(recognizer.as_ref()),
            }
            self.pending = Some(role);
            return;
        }
        self.start_session(role);
    }

    fn start_pending(&mut self) {
        if self.microphone_holder().is_some() {
            return;
        }
        let Some(role) = self.pending.take() else {
            return;
        };

        let still_wanted = match role {
            SessionRole::Wake => self.mode == InteractionMode::WakeListening && self.suspended.is_none(),
            SessionRole::Command => self.mode == InteractionMode::CommandListening,
        };
        if still_wanted {
            self.start_session(role);
        } else {
            debug!(?role, mode = %self.mode, "pending session no longer wanted");
        }
    }

    fn start_session(&mut self, role: SessionRole) {
        self.next_session += 1;
        let id = SessionId(self.next_session);
        let recognizer = Arc::clone(&self.collaborators.recognizer);

        let result = match role {
            SessionRole::Wake => self.wake.start(id, recognizer.as_ref()),
            SessionRole::Command => self.capture.start(id, recognizer.as_ref()),
        };

        match result {
            Ok(()) => self.emit(StateEvent::SessionStarted {
                session: id,
                continuous: role == SessionRole::Wake,
            }),
            Err(RecognizerError::UnsupportedEnvironment) => {
                error!("speech recognition unavailable, voice pipeline disabled");
                self.unsupported = true;
                self.pending = None;
                self.capture.end_turn();
                self.turn_started_at = None;
                let _ = self.transition_to(InteractionMode::Idle);
                self.emit(StateEvent::RecognitionUnavailable);
            }
            Err(e) => match role {
                SessionRole::Wake => {
                    warn!(error = %e, "failed to start wake session, will retry");
                    self.schedule_wake_retry();
                }
                SessionRole::Command => {
                    warn!(error = %e, "failed to start command session");
                    self.on_turn_complete(TurnOutcome::RecognitionFailed {
                        code: RecognitionErrorCode::AudioCapture,
                    });
                }
            },
        }
    }

    fn schedule_wake_retry(&mut self) {
        if self.retry_scheduled {
            return;
        }
        self.retry_scheduled = true;
        self.schedule(PipelineEvent::WakeRetry, self.settings.wake_retry_delay);
    }

    fn schedule(&self, event: PipelineEvent, delay: Duration) {
        let loopback = self.loopback.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = loopback.send(event).await;
        });
    }

    fn transition_to(&mut self, next: InteractionMode) -> Result<(), TransitionError> {
        let previous = self.mode;
        if previous == next {
            return Ok(());
        }
        previous.validate(next)?;

        let duration_ms = self.mode_entered_at.elapsed().as_millis() as u64;
        info!(from = %previous, to = %next, duration_ms, "mode transition");

        self.mode = next;
        self.mode_entered_at = Instant::now();
        self.emit(StateEvent::ModeChanged {
            from: previous,
            to: next,
            duration_ms,
        });
        Ok(())
    }

    fn emit(&self, event: StateEvent) {
        debug!(%event, "emitting state event");
        let _ = self.event_tx.send(event);
    }
}
