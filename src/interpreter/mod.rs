//! Command interpretation
//!
//! Classifies a captured utterance through the external generative service
//! and turns the reply into an `InterpretedCommand`. Failures never cross
//! this boundary as errors: they come back as `InterpretedCommand::Error`.

mod chef;
mod gemini;
mod schema;

pub use chef::ChefAdvisor;
pub use gemini::{GeminiClient, ServiceSettings, DEFAULT_API_BASE, DEFAULT_MODEL};
pub use schema::{ReplyAction, ServiceReply};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::reminders::{ReminderCategory, ReminderStore};

/// Result of interpreting one utterance
#[derive(Debug, Clone, PartialEq)]
pub enum InterpretedCommand {
    /// A reminder was stored (or at least attempted)
    AddReminder {
        text: String,
        category: ReminderCategory,
        confirmation: String,
    },
    /// General conversation; `None` when the service had nothing to say
    Chat { reply: Option<String> },
    /// Transport, parse or service failure
    Error { reason: String },
}

impl InterpretedCommand {
    /// What to say back to the user, if anything. Errors are answered by
    /// the controller's apology instead.
    pub fn spoken_reply(&self) -> Option<&str> {
        match self {
            InterpretedCommand::AddReminder { confirmation, .. } => Some(confirmation),
            InterpretedCommand::Chat { reply } => reply.as_deref(),
            InterpretedCommand::Error { .. } => None,
        }
    }
}

/// Errors talking to the command-interpretation service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterpretError {
    #[error("no API key configured for the interpretation service")]
    MissingApiKey,

    #[error("request failed: {0}")]
    Transport(String),

    #[error("service error ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("empty response from model")]
    EmptyResponse,

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Interprets one utterance; never fails
#[async_trait]
pub trait CommandInterpreter: Send + Sync {
    async fn interpret(&self, utterance: &str) -> InterpretedCommand;
}

/// Remote classifier returning the raw structured reply text
#[async_trait]
pub trait IntentService: Send + Sync {
    async fn classify(&self, utterance: &str) -> Result<String, InterpretError>;
}

/// Remote free-text generation
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, InterpretError>;
}

/// Interpreter backed by an `IntentService`, storing reminders as a side effect
pub struct ServiceInterpreter<S> {
    service: S,
    store: Arc<dyn ReminderStore>,
}

impl<S: IntentService> ServiceInterpreter<S> {
    pub fn new(service: S, store: Arc<dyn ReminderStore>) -> Self {
        Self { service, store }
    }

    async fn store_reminder(&self, text: String, category: ReminderCategory) -> InterpretedCommand {
        // The spoken confirmation does not wait on a successful write.
        match self.store.add(&text, category).await {
            Ok(record) => info!(id = %record.id, %category, "reminder stored"),
            Err(e) => warn!(error = %e, "failed to store reminder"),
        }

        InterpretedCommand::AddReminder {
            confirmation: format!("Adicionado: {text}"),
            text,
            category,
        }
    }
}

#[async_trait]
impl<S: IntentService> CommandInterpreter for ServiceInterpreter<S> {
    async fn interpret(&self, utterance: &str) -> InterpretedCommand {
        let raw = match self.service.classify(utterance).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "interpretation request failed");
                return InterpretedCommand::Error {
                    reason: e.to_string(),
                };
            }
        };

        let reply = match ServiceReply::parse(&raw) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "unusable interpretation reply");
                return InterpretedCommand::Error {
                    reason: e.to_string(),
                };
            }
        };

        match reply.action {
            ReplyAction::AddReminder => match reply.reminder_text() {
                Some(text) => {
                    let category = reply.category.unwrap_or_default();
                    self.store_reminder(text.to_string(), category).await
                }
                None => InterpretedCommand::Error {
                    reason: "reminder without text".to_string(),
                },
            },
            ReplyAction::Chat => InterpretedCommand::Chat {
                reply: reply.spoken_response().map(str::to_string),
            },
            ReplyAction::Error => InterpretedCommand::Error {
                reason: reply
                    .spoken_response()
                    .unwrap_or("service reported an error")
                    .to_string(),
            },
        }
    }
}
