//! Reminder store
//!
//! Reminders are written by the voice pipeline and by manual entry from the
//! display. Two backends: a JSON file and an in-memory list for offline/demo
//! deployments.

mod cyclical;
mod file;
mod memory;

pub use cyclical::cyclical_reminders;
pub use file::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// How prominently a reminder is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderCategory {
    /// Plain note (default)
    Info,
    /// Urgent
    Alert,
    /// Task to do
    Action,
}

impl Default for ReminderCategory {
    fn default() -> Self {
        Self::Info
    }
}

impl std::fmt::Display for ReminderCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReminderCategory::Info => write!(f, "info"),
            ReminderCategory::Alert => write!(f, "alert"),
            ReminderCategory::Action => write!(f, "action"),
        }
    }
}

/// One stored reminder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderRecord {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub category: ReminderCategory,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    /// Local wall-clock time shown next to the reminder (`HH:MM`)
    #[serde(rename = "time")]
    pub display_time: String,
}

impl ReminderRecord {
    pub fn new(text: impl Into<String>, category: ReminderCategory) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            category,
            created_at: Utc::now(),
            display_time: Local::now().format("%H:%M").to_string(),
        }
    }
}

/// Errors from reminder persistence
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("reminder text is empty")]
    EmptyText,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistence for reminders, newest first
#[async_trait]
pub trait ReminderStore: Send + Sync {
    async fn add(&self, text: &str, category: ReminderCategory) -> Result<ReminderRecord, StoreError>;

    async fn list(&self) -> Result<Vec<ReminderRecord>, StoreError>;
}

/// Trimmed, non-empty reminder text
fn normalize_text(text: &str) -> Result<&str, StoreError> {
    let text = text.trim();
    if text.is_empty() {
        Err(StoreError::EmptyText)
    } else {
        Ok(text)
    }
}
