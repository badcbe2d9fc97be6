//! Reminder store backed by a JSON file
//!
//! The file holds a JSON array, newest first. Writes go to a temporary file
//! that is renamed over the old one.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{normalize_text, ReminderCategory, ReminderRecord, ReminderStore, StoreError};

pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<ReminderRecord>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, records: &[ReminderRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(records)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ReminderStore for JsonFileStore {
    async fn add(&self, text: &str, category: ReminderCategory) -> Result<ReminderRecord, StoreError> {
        let text = normalize_text(text)?;
        let _guard = self.write_lock.lock().await;

        let mut records = self.read_all().await?;
        let record = ReminderRecord::new(text, category);
        records.insert(0, record.clone());
        self.write_all(&records).await?;

        debug!(path = ?self.path, count = records.len(), "reminders saved");
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<ReminderRecord>, StoreError> {
        self.read_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("reminders.json"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_persists_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("reminders.json");
        let store = JsonFileStore::new(&path);

        store.add("comprar leite", ReminderCategory::Info).await.unwrap();
        store.add("pagar aluguel", ReminderCategory::Alert).await.unwrap();

        let reopened = JsonFileStore::new(&path);
        let records = reopened.list().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text, "pagar aluguel");
        assert_eq!(records[0].category, ReminderCategory::Alert);
        assert_eq!(records[1].text, "comprar leite");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reminders.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.list().await, Err(StoreError::Serialization(_))));
        assert!(store.add("x", ReminderCategory::Info).await.is_err());
    }
}
