use std::sync::Arc;

use chrono::NaiveDateTime;
use irregular_models::reminder::ReminderId;
use irregular_storage::{ReminderStorage, StorageError};
use serde::Serialize;
use tokio::sync::{Mutex, watch};

/// The soonest alive reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CursorEntry {
    pub id: ReminderId,
    pub next_trigger_time: NaiveDateTime,
}

/// Tracks the soonest alive reminder and publishes every change to
/// subscribers. Recomputation is serialized so that a slow read cannot
/// overwrite a newer result.
pub struct SchedulerCursor {
    storage: Arc<dyn ReminderStorage>,
    recompute_lock: Mutex<()>,
    sender: watch::Sender<Option<CursorEntry>>,
}

impl SchedulerCursor {
    pub fn new(storage: Arc<dyn ReminderStorage>) -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            storage,
            recompute_lock: Mutex::new(()),
            sender,
        }
    }

    pub async fn recompute(&self) -> Result<Option<CursorEntry>, StorageError> {
        let _guard = self.recompute_lock.lock().await;

        let entry = self
            .storage
            .earliest_alive()
            .await?
            .map(|reminder| CursorEntry {
                id: reminder.id,
                next_trigger_time: reminder.next_trigger_time,
            });

        let previous = self.sender.send_replace(entry);
        if previous != entry {
            log::debug!("[CURSOR] Moved from {:?} to {:?}", previous, entry);
        }
        Ok(entry)
    }

    pub fn current(&self) -> Option<CursorEntry> {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<CursorEntry>> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeDelta};
    use irregular_models::{
        distribution::DistributionKind,
        reminder::{Reminder, ReminderDraft},
    };
    use irregular_storage::InMemoryReminderStorage;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn reminder(next_in_minutes: i64, alive: bool) -> Reminder {
        let now = NaiveDate::from_ymd_opt(2025, 2, 3)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let draft = ReminderDraft {
            title: "Breathe".to_owned(),
            dist: DistributionKind::Exponential,
            dist_params: [("mean".to_owned(), "1h".to_owned())].into(),
            ..Default::default()
        };
        let mut reminder =
            Reminder::new("phone".to_owned(), draft, now, &mut StdRng::seed_from_u64(3)).unwrap();
        reminder.next_trigger_time = now + TimeDelta::minutes(next_in_minutes);
        reminder.alive = alive;
        reminder
    }

    #[tokio::test]
    async fn recompute_publishes_the_soonest_alive_reminder() {
        let storage = Arc::new(InMemoryReminderStorage::new());
        let cursor = SchedulerCursor::new(storage.clone());
        let mut receiver = cursor.subscribe();

        assert_eq!(cursor.recompute().await.unwrap(), None);

        let dead = reminder(1, false);
        let soon = reminder(10, true);
        let later = reminder(60, true);
        for r in [&dead, &soon, &later] {
            storage.insert(r.clone()).await.unwrap();
        }

        let entry = cursor.recompute().await.unwrap();
        assert_eq!(entry.map(|e| e.id), Some(soon.id));
        assert!(receiver.has_changed().unwrap());
        assert_eq!(receiver.borrow_and_update().map(|e| e.id), Some(soon.id));

        storage.delete(soon.id).await.unwrap();
        cursor.recompute().await.unwrap();
        assert_eq!(cursor.current().map(|e| e.id), Some(later.id));
    }
}
