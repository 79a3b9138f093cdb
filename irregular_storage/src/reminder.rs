use std::collections::HashMap;

use async_trait::async_trait;
use irregular_models::reminder::{Reminder, ReminderId};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("reminder {0} does not exist")]
    NotFound(ReminderId),

    #[error("reminder {0} already exists")]
    AlreadyExists(ReminderId),

    #[error("stored reminder {id} cannot be decoded: {reason}")]
    Corrupt { id: String, reason: String },
}

#[async_trait]
pub trait ReminderStorage: Send + Sync {
    async fn get(&self, id: ReminderId) -> Result<Option<Reminder>, StorageError>;
    async fn get_all(&self) -> Result<Vec<Reminder>, StorageError>;
    async fn get_all_device_reminders(&self, device_id: &str)
    -> Result<Vec<Reminder>, StorageError>;
    /// Alive reminder with the smallest `next_trigger_time`.
    async fn earliest_alive(&self) -> Result<Option<Reminder>, StorageError>;
    async fn insert(&self, reminder: Reminder) -> Result<Reminder, StorageError>;
    async fn update(&self, reminder: Reminder) -> Result<Reminder, StorageError>;
    /// Returns `false` when there was nothing to delete.
    async fn delete(&self, id: ReminderId) -> Result<bool, StorageError>;
}

#[derive(Default)]
pub struct InMemoryReminderStorage {
    store: RwLock<HashMap<ReminderId, Reminder>>,
}

impl InMemoryReminderStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReminderStorage for InMemoryReminderStorage {
    async fn get(&self, id: ReminderId) -> Result<Option<Reminder>, StorageError> {
        let store = self.store.read().await;
        Ok(store.get(&id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Reminder>, StorageError> {
        let store = self.store.read().await;
        let mut reminders: Vec<Reminder> = store.values().cloned().collect();
        reminders.sort_by_key(|reminder| reminder.next_trigger_time);
        Ok(reminders)
    }

    async fn get_all_device_reminders(
        &self,
        device_id: &str,
    ) -> Result<Vec<Reminder>, StorageError> {
        let store = self.store.read().await;
        let mut reminders: Vec<Reminder> = store
            .values()
            .filter(|reminder| reminder.device_id == device_id)
            .cloned()
            .collect();
        reminders.sort_by_key(|reminder| reminder.next_trigger_time);
        Ok(reminders)
    }

    async fn earliest_alive(&self) -> Result<Option<Reminder>, StorageError> {
        let store = self.store.read().await;
        Ok(store
            .values()
            .filter(|reminder| reminder.alive)
            .min_by_key(|reminder| reminder.next_trigger_time)
            .cloned())
    }

    async fn insert(&self, reminder: Reminder) -> Result<Reminder, StorageError> {
        let mut store = self.store.write().await;
        if store.contains_key(&reminder.id) {
            return Err(StorageError::AlreadyExists(reminder.id));
        }

        store.insert(reminder.id, reminder.clone());
        log::debug!("Inserted reminder {}", reminder.id);
        Ok(reminder)
    }

    async fn update(&self, reminder: Reminder) -> Result<Reminder, StorageError> {
        let mut store = self.store.write().await;
        match store.get_mut(&reminder.id) {
            Some(existing) => {
                *existing = reminder.clone();
                Ok(reminder)
            }
            None => Err(StorageError::NotFound(reminder.id)),
        }
    }

    async fn delete(&self, id: ReminderId) -> Result<bool, StorageError> {
        let mut store = self.store.write().await;
        Ok(store.remove(&id).is_some())
    }
}
