use irregular_models::{error::ReminderError, reminder::ReminderId};
use irregular_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Reminder(#[from] ReminderError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("reminder {0} not found")]
    NotFound(ReminderId),

    #[error("no reminder owns job {0}")]
    UnknownJob(String),

    #[error("the reminder watcher is already running")]
    WatcherAlreadyRunning,
}
