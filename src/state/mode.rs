//! Interaction modes and the transitions allowed between them

use serde::{Deserialize, Serialize};

/// The four modes of the voice pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMode {
    /// Not listening: starting up, suspended, shut down or unsupported host
    Idle,
    /// Continuous session scanning for the wake phrase
    WakeListening,
    /// Single-shot session capturing one command
    CommandListening,
    /// Waiting for the interpreter
    Processing,
}

impl Default for InteractionMode {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InteractionMode::Idle => write!(f, "Idle"),
            InteractionMode::WakeListening => write!(f, "WakeListening"),
            InteractionMode::CommandListening => write!(f, "CommandListening"),
            InteractionMode::Processing => write!(f, "Processing"),
        }
    }
}

/// Rejected mode transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid mode transition {from} -> {to}")]
pub struct TransitionError {
    pub from: InteractionMode,
    pub to: InteractionMode,
}

impl InteractionMode {
    /// Whether the pipeline may move from `self` to `next`
    ///
    /// Any mode may fall back to `Idle`; otherwise the only path is
    /// `WakeListening -> CommandListening -> Processing -> WakeListening`,
    /// with `CommandListening` allowed to return to `WakeListening` early.
    pub fn can_transition_to(self, next: InteractionMode) -> bool {
        use InteractionMode::*;

        matches!(
            (self, next),
            (_, Idle)
                | (Idle, WakeListening)
                | (WakeListening, CommandListening)
                | (CommandListening, Processing)
                | (CommandListening, WakeListening)
                | (Processing, WakeListening)
        )
    }

    pub fn validate(self, next: InteractionMode) -> Result<(), TransitionError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }

    /// Part of a turn: wake phrase heard, reply not yet delivered
    pub fn in_turn(self) -> bool {
        matches!(self, InteractionMode::CommandListening | InteractionMode::Processing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use InteractionMode::*;

    #[test]
    fn test_turn_cycle_allowed() {
        assert!(Idle.can_transition_to(WakeListening));
        assert!(WakeListening.can_transition_to(CommandListening));
        assert!(CommandListening.can_transition_to(Processing));
        assert!(Processing.can_transition_to(WakeListening));
        assert!(CommandListening.can_transition_to(WakeListening));
    }

    #[test]
    fn test_shortcuts_rejected() {
        assert!(!Idle.can_transition_to(CommandListening));
        assert!(!Idle.can_transition_to(Processing));
        assert!(!WakeListening.can_transition_to(Processing));
        assert!(!Processing.can_transition_to(CommandListening));
        assert_eq!(
            WakeListening.validate(Processing),
            Err(TransitionError {
                from: WakeListening,
                to: Processing
            })
        );
    }

    #[test]
    fn test_everything_falls_back_to_idle() {
        for mode in [Idle, WakeListening, CommandListening, Processing] {
            assert!(mode.can_transition_to(Idle));
        }
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&CommandListening).unwrap();
        assert_eq!(json, "\"command_listening\"");
    }
}
