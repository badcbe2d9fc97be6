//! Interaction mode controller
//!
//! Owns the single `InteractionMode` of the process and the two recognizer
//! owners (wake-word detector and command capturer):
//! - Idle: nothing listening
//! - WakeListening: continuous session scanning for the wake phrase
//! - CommandListening: single-shot session capturing a command
//! - Processing: waiting for the interpreter's answer

mod machine;
mod mode;

pub use machine::{Collaborators, Controller, PipelineSettings};
pub use mode::InteractionMode;
