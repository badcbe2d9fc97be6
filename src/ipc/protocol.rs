//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::{StateEvent, TurnOutcome};
use crate::reminders::{ReminderCategory, ReminderRecord};
use crate::state::InteractionMode;

/// Requests from the display to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Subscribe to pipeline notifications
    Subscribe,

    /// Pause voice interaction while another screen owns the user
    Suspend { reason: String },

    Resume,

    /// Abandon the turn in progress
    Cancel,

    /// Manually selected speaker; `null` clears it
    SetSpeaker { label: Option<String> },

    AddReminder {
        text: String,
        #[serde(default)]
        category: ReminderCategory,
    },

    ListReminders,

    AskChef { ingredients: String },
}

/// Responses from daemon to display
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Request accepted, nothing to return
    Ok,

    Reminder { reminder: ReminderRecord },

    Reminders { reminders: Vec<ReminderRecord> },

    ChefAnswer { answer: String },

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl std::fmt::Display) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// Push notification to subscribed clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    ModeChanged {
        mode: InteractionMode,
        previous: InteractionMode,
    },
    Pipeline { event: StateEvent },
}

impl From<StateEvent> for Notification {
    fn from(event: StateEvent) -> Self {
        match event {
            StateEvent::ModeChanged { from, to, .. } => Notification::ModeChanged {
                mode: to,
                previous: from,
            },
            event => Notification::Pipeline { event },
        }
    }
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    pub mode: InteractionMode,

    /// Time-of-day greeting for the display header
    pub greeting: String,

    pub speaker: Option<String>,

    pub suspended: bool,

    /// False once the recognizer host reported it cannot do speech
    pub recognition_available: bool,

    pub last_outcome: Option<TurnOutcome>,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            mode: InteractionMode::default(),
            greeting: crate::greeting::current_greeting(None),
            speaker: None,
            suspended: false,
            recognition_available: true,
            last_outcome: None,
            uptime_secs: 0,
        }
    }
}
