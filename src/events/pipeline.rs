//! Messages consumed by the controller's event loop

use crate::interpreter::InterpretedCommand;
use crate::recognizer::RecognizerEvent;

/// Everything the controller reacts to arrives as one of these
#[derive(Debug)]
pub enum PipelineEvent {
    /// Host recognizer notification
    Recognizer(RecognizerEvent),

    /// Acknowledgment had time to play; command capture may start
    CaptureDelayElapsed { turn: u64 },

    /// Backoff after a failed wake session start has passed
    WakeRetry,

    /// Interpreter finished for the given turn
    Interpreted { turn: u64, command: InterpretedCommand },

    /// Request from the display layer or the process
    Control(ControlCommand),
}

/// External requests that steer the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Abort the current turn and go back to wake listening
    Cancel,
    /// A higher-priority UI state opened; stop listening until resumed
    Suspend { reason: String },
    /// Leave the suspended state
    Resume,
    /// Release the microphone and stop the event loop
    Shutdown,
}
