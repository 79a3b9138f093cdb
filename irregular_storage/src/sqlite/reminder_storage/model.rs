use irregular_models::{
    chrono::{NaiveDateTime, NaiveTime},
    distribution::{Distribution, DistributionKind, DistributionParams},
    duration::ReminderDuration,
    reminder::{Reminder, WorkDays},
};

use crate::StorageError;

/// One row of the `reminders` table. Columns are decoded by name.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ReminderStorageModel {
    pub id: String,
    pub version: i64,
    pub title: String,
    pub message: String,
    pub work_hours_start: Option<NaiveTime>,
    pub work_hours_end: Option<NaiveTime>,
    pub work_days: String,
    pub min_time: Option<NaiveDateTime>,
    pub max_time: Option<NaiveDateTime>,
    pub dist: String,
    pub dist_params: String,
    pub repeat: bool,
    pub spacing_min: Option<String>,
    pub spacing_max: Option<String>,
    pub alive: bool,
    pub last_trigger_time: Option<NaiveDateTime>,
    pub next_trigger_time: NaiveDateTime,
    pub device_id: String,
    pub job_id: Option<String>,
}

impl From<&Reminder> for ReminderStorageModel {
    fn from(value: &Reminder) -> Self {
        let dist_params = serde_json::to_string(&value.distribution.params())
            .unwrap_or_else(|_| "{}".to_owned());

        Self {
            id: value.id.to_string(),
            version: i64::from(value.version),
            title: value.title.clone(),
            message: value.message.clone(),
            work_hours_start: value.work_hours_start,
            work_hours_end: value.work_hours_end,
            work_days: value.work_days.pack(),
            min_time: value.min_time,
            max_time: value.max_time,
            dist: value.distribution.kind().as_str().to_owned(),
            dist_params,
            repeat: value.repeat,
            spacing_min: value.spacing_min.map(|d| d.to_string()),
            spacing_max: value.spacing_max.map(|d| d.to_string()),
            alive: value.alive,
            last_trigger_time: value.last_trigger_time,
            next_trigger_time: value.next_trigger_time,
            device_id: value.device_id.clone(),
            job_id: value.job_id.clone(),
        }
    }
}

impl TryFrom<ReminderStorageModel> for Reminder {
    type Error = StorageError;

    fn try_from(value: ReminderStorageModel) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StorageError::Corrupt {
            id: value.id.clone(),
            reason,
        };

        let id = value.id.parse().map_err(|err| corrupt(format!("id: {err}")))?;
        let version = u32::try_from(value.version).map_err(|err| corrupt(format!("version: {err}")))?;
        let work_days = WorkDays::unpack(&value.work_days).map_err(|err| corrupt(err.to_string()))?;

        let kind = DistributionKind::parse(&value.dist)
            .ok_or_else(|| corrupt(format!("unknown distribution '{}'", value.dist)))?;
        let params: DistributionParams = serde_json::from_str(&value.dist_params)
            .map_err(|err| corrupt(format!("dist_params: {err}")))?;
        let distribution =
            Distribution::from_params(kind, &params).map_err(|err| corrupt(err.to_string()))?;

        let spacing = |raw: &Option<String>| -> Result<Option<ReminderDuration>, StorageError> {
            raw.as_deref()
                .map(str::parse)
                .transpose()
                .map_err(|err| corrupt(format!("spacing: {err}")))
        };
        let spacing_min = spacing(&value.spacing_min)?;
        let spacing_max = spacing(&value.spacing_max)?;

        Ok(Self {
            id,
            version,
            device_id: value.device_id,
            title: value.title,
            message: value.message,
            work_hours_start: value.work_hours_start,
            work_hours_end: value.work_hours_end,
            work_days,
            min_time: value.min_time,
            max_time: value.max_time,
            distribution,
            repeat: value.repeat,
            spacing_min,
            spacing_max,
            alive: value.alive,
            last_trigger_time: value.last_trigger_time,
            next_trigger_time: value.next_trigger_time,
            job_id: value.job_id,
        })
    }
}
