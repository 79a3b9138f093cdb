mod model;

use async_trait::async_trait;
use irregular_models::reminder::{Reminder, ReminderId};
use model::ReminderStorageModel;

use crate::reminder::{ReminderStorage, StorageError};

pub struct SqliteReminderStorage {
    pool: sqlx::SqlitePool,
}

impl SqliteReminderStorage {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

fn decode_all(rows: Vec<ReminderStorageModel>) -> Result<Vec<Reminder>, StorageError> {
    rows.into_iter().map(Reminder::try_from).collect()
}

#[async_trait]
impl ReminderStorage for SqliteReminderStorage {
    async fn get(&self, id: ReminderId) -> Result<Option<Reminder>, StorageError> {
        let reminder = sqlx::query_as::<_, ReminderStorageModel>("SELECT * FROM reminders WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        reminder.map(Reminder::try_from).transpose()
    }

    async fn get_all(&self) -> Result<Vec<Reminder>, StorageError> {
        let reminders = sqlx::query_as::<_, ReminderStorageModel>(
            "SELECT * FROM reminders ORDER BY next_trigger_time",
        )
        .fetch_all(&self.pool)
        .await?;

        decode_all(reminders)
    }

    async fn get_all_device_reminders(
        &self,
        device_id: &str,
    ) -> Result<Vec<Reminder>, StorageError> {
        let reminders = sqlx::query_as::<_, ReminderStorageModel>(
            "SELECT * FROM reminders WHERE device_id = ? ORDER BY next_trigger_time",
        )
        .bind(device_id)
        .fetch_all(&self.pool)
        .await?;

        decode_all(reminders)
    }

    async fn earliest_alive(&self) -> Result<Option<Reminder>, StorageError> {
        let reminder = sqlx::query_as::<_, ReminderStorageModel>(
            "SELECT * FROM reminders WHERE alive = 1 ORDER BY next_trigger_time LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        reminder.map(Reminder::try_from).transpose()
    }

    async fn insert(&self, reminder: Reminder) -> Result<Reminder, StorageError> {
        let row = ReminderStorageModel::from(&reminder);
        let created = sqlx::query_as::<_, ReminderStorageModel>(
            "
INSERT INTO reminders (
    id, version, title, message, work_hours_start, work_hours_end, work_days,
    min_time, max_time, dist, dist_params, repeat, spacing_min, spacing_max,
    alive, last_trigger_time, next_trigger_time, device_id, job_id
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT (id) DO NOTHING
RETURNING *
",
        )
        .bind(row.id)
        .bind(row.version)
        .bind(row.title)
        .bind(row.message)
        .bind(row.work_hours_start)
        .bind(row.work_hours_end)
        .bind(row.work_days)
        .bind(row.min_time)
        .bind(row.max_time)
        .bind(row.dist)
        .bind(row.dist_params)
        .bind(row.repeat)
        .bind(row.spacing_min)
        .bind(row.spacing_max)
        .bind(row.alive)
        .bind(row.last_trigger_time)
        .bind(row.next_trigger_time)
        .bind(row.device_id)
        .bind(row.job_id)
        .fetch_optional(&self.pool)
        .await?;

        match created {
            Some(created) => created.try_into(),
            None => Err(StorageError::AlreadyExists(reminder.id)),
        }
    }

    async fn update(&self, reminder: Reminder) -> Result<Reminder, StorageError> {
        let ReminderStorageModel {
            id,
            version,
            title,
            message,
            work_hours_start,
            work_hours_end,
            work_days,
            min_time,
            max_time,
            dist,
            dist_params,
            repeat,
            spacing_min,
            spacing_max,
            alive,
            last_trigger_time,
            next_trigger_time,
            device_id,
            job_id,
        } = ReminderStorageModel::from(&reminder);

        let updated = sqlx::query_as::<_, ReminderStorageModel>(
            "
UPDATE reminders
SET version = ?,
    title = ?,
    message = ?,
    work_hours_start = ?,
    work_hours_end = ?,
    work_days = ?,
    min_time = ?,
    max_time = ?,
    dist = ?,
    dist_params = ?,
    repeat = ?,
    spacing_min = ?,
    spacing_max = ?,
    alive = ?,
    last_trigger_time = ?,
    next_trigger_time = ?,
    device_id = ?,
    job_id = ?
WHERE id = ?
RETURNING *
",
        )
        .bind(version)
        .bind(title)
        .bind(message)
        .bind(work_hours_start)
        .bind(work_hours_end)
        .bind(work_days)
        .bind(min_time)
        .bind(max_time)
        .bind(dist)
        .bind(dist_params)
        .bind(repeat)
        .bind(spacing_min)
        .bind(spacing_max)
        .bind(alive)
        .bind(last_trigger_time)
        .bind(next_trigger_time)
        .bind(device_id)
        .bind(job_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(updated) => updated.try_into(),
            None => Err(StorageError::NotFound(reminder.id)),
        }
    }

    async fn delete(&self, id: ReminderId) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM reminders WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
