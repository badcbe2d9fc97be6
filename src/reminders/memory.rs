//! In-memory reminder store

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{normalize_text, ReminderCategory, ReminderRecord, ReminderStore, StoreError};

/// Reminders kept for the lifetime of the process only
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<ReminderRecord>>,
}

#[async_trait]
impl ReminderStore for MemoryStore {
    async fn add(&self, text: &str, category: ReminderCategory) -> Result<ReminderRecord, StoreError> {
        let record = ReminderRecord::new(normalize_text(text)?, category);
        self.records.write().await.insert(0, record.clone());
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<ReminderRecord>, StoreError> {
        Ok(self.records.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_newest_first() {
        let store = MemoryStore::default();
        store.add("primeiro", ReminderCategory::Info).await.unwrap();
        store.add("segundo", ReminderCategory::Alert).await.unwrap();

        let texts: Vec<_> = store.list().await.unwrap().into_iter().map(|r| r.text).collect();
        assert_eq!(texts, ["segundo", "primeiro"]);
    }

    #[tokio::test]
    async fn test_rejects_empty_text() {
        let store = MemoryStore::default();
        assert!(matches!(
            store.add(" ", ReminderCategory::Info).await,
            Err(StoreError::EmptyText)
        ));
        assert!(store.list().await.unwrap().is_empty());
    }
}
