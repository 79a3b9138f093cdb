mod reminder;
pub mod sqlite;

pub use reminder::{InMemoryReminderStorage, ReminderStorage, StorageError};
pub use sqlite::SqliteReminderStorage;
