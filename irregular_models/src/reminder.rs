mod sampling;
mod validation;
mod window;

use chrono::{NaiveDateTime, NaiveTime, TimeDelta, Weekday};
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::{
    distribution::{Distribution, DistributionKind, DistributionParams},
    duration::ReminderDuration,
    error::{ReminderError, ValidationError},
    job::{JobArgs, JobId},
};

pub use sampling::{MAX_SAMPLING_ATTEMPTS, SamplingPolicy};

pub type ReminderId = Uuid;
pub type DeviceId = String;

/// Schema version written with every reminder.
pub const REMINDER_VERSION: u32 = 1;

/// A due reminder may fire this many seconds early or late.
pub const FIRE_TOLERANCE_SECS: i64 = 5;

/// Spacing floor for repeating reminders that do not set `spacing_min`.
pub const DEFAULT_SPACING_MIN_SECS: i64 = 1;

pub fn fire_tolerance() -> TimeDelta {
    TimeDelta::seconds(FIRE_TOLERANCE_SECS)
}

/// Days of the week a reminder may fire on, Monday first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkDays([bool; 7]);

impl WorkDays {
    pub const ALL: WorkDays = WorkDays([true; 7]);

    pub fn from_slice(days: &[bool]) -> Result<Self, ValidationError> {
        if days.is_empty() {
            return Err(ValidationError::new("work_days", "must not be empty"));
        }

        let days: [bool; 7] = days
            .try_into()
            .map_err(|_| ValidationError::new("work_days", "must have exactly 7 entries"))?;

        if !days.iter().any(|day| *day) {
            return Err(ValidationError::new("work_days", "must not be all false"));
        }

        Ok(Self(days))
    }

    pub fn allows(&self, weekday: Weekday) -> bool {
        self.0[weekday.num_days_from_monday() as usize]
    }

    pub fn as_array(&self) -> [bool; 7] {
        self.0
    }

    /// Storage form, e.g. `1,1,1,1,1,0,0`.
    pub fn pack(&self) -> String {
        self.0
            .iter()
            .map(|day| if *day { "1" } else { "0" })
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn unpack(packed: &str) -> Result<Self, ValidationError> {
        let days = packed
            .split(',')
            .map(|day| match day.trim() {
                "1" => Ok(true),
                "0" => Ok(false),
                other => Err(ValidationError::new(
                    "work_days",
                    format!("unexpected packed value '{other}'"),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_slice(&days)
    }
}

impl Default for WorkDays {
    fn default() -> Self {
        Self::ALL
    }
}

impl Serialize for WorkDays {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

/// Client-supplied reminder fields, validated by [`Reminder::new`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReminderDraft {
    pub id: Option<ReminderId>,
    pub title: String,
    pub message: String,
    pub work_hours_start: Option<NaiveTime>,
    pub work_hours_end: Option<NaiveTime>,
    pub work_days: Option<Vec<bool>>,
    pub min_time: Option<NaiveDateTime>,
    pub max_time: Option<NaiveDateTime>,
    pub dist: DistributionKind,
    pub dist_params: DistributionParams,
    pub repeat: bool,
    pub spacing_min: Option<String>,
    pub spacing_max: Option<String>,
    pub alive: Option<bool>,
}

/// Partial update. Nullable fields use a nested `Option` so that an explicit
/// `null` clears the field while an absent key leaves it untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReminderPatch {
    pub title: Option<String>,
    pub message: Option<String>,
    #[serde(deserialize_with = "present")]
    pub work_hours_start: Option<Option<NaiveTime>>,
    #[serde(deserialize_with = "present")]
    pub work_hours_end: Option<Option<NaiveTime>>,
    pub work_days: Option<Vec<bool>>,
    #[serde(deserialize_with = "present")]
    pub min_time: Option<Option<NaiveDateTime>>,
    #[serde(deserialize_with = "present")]
    pub max_time: Option<Option<NaiveDateTime>>,
    pub dist: Option<DistributionKind>,
    pub dist_params: Option<DistributionParams>,
    pub repeat: Option<bool>,
    #[serde(deserialize_with = "present")]
    pub spacing_min: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub spacing_max: Option<Option<String>>,
    pub alive: Option<bool>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl ReminderPatch {
    pub fn is_empty(&self) -> bool {
        !self.changes_payload() && !self.changes_trigger() && self.alive.is_none()
    }

    pub fn changes_payload(&self) -> bool {
        self.title.is_some() || self.message.is_some()
    }

    /// Whether any field feeding the sampler is touched.
    pub fn changes_trigger(&self) -> bool {
        self.work_hours_start.is_some()
            || self.work_hours_end.is_some()
            || self.work_days.is_some()
            || self.min_time.is_some()
            || self.max_time.is_some()
            || self.dist.is_some()
            || self.dist_params.is_some()
            || self.repeat.is_some()
            || self.spacing_min.is_some()
            || self.spacing_max.is_some()
    }

    fn apply(self, mut draft: ReminderDraft) -> ReminderDraft {
        if let Some(title) = self.title {
            draft.title = title;
        }
        if let Some(message) = self.message {
            draft.message = message;
        }
        if let Some(start) = self.work_hours_start {
            draft.work_hours_start = start;
        }
        if let Some(end) = self.work_hours_end {
            draft.work_hours_end = end;
        }
        if let Some(days) = self.work_days {
            draft.work_days = Some(days);
        }
        if let Some(min_time) = self.min_time {
            draft.min_time = min_time;
        }
        if let Some(max_time) = self.max_time {
            draft.max_time = max_time;
        }
        if let Some(dist) = self.dist {
            draft.dist = dist;
            // Switching distributions without new params drops the old ones.
            if self.dist_params.is_none() {
                draft.dist_params.clear();
            }
        }
        if let Some(params) = self.dist_params {
            draft.dist_params = params;
        }
        if let Some(repeat) = self.repeat {
            draft.repeat = repeat;
        }
        if let Some(spacing_min) = self.spacing_min {
            draft.spacing_min = spacing_min;
        }
        if let Some(spacing_max) = self.spacing_max {
            draft.spacing_max = spacing_max;
        }
        if let Some(alive) = self.alive {
            draft.alive = Some(alive);
        }
        draft
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Scheduled,
    Due,
    /// Non-repeating reminder that already went off.
    Finished,
    Dead,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reminder {
    pub id: ReminderId,
    pub version: u32,
    pub device_id: DeviceId,
    pub title: String,
    pub message: String,
    pub work_hours_start: Option<NaiveTime>,
    pub work_hours_end: Option<NaiveTime>,
    pub work_days: WorkDays,
    pub min_time: Option<NaiveDateTime>,
    pub max_time: Option<NaiveDateTime>,
    pub distribution: Distribution,
    pub repeat: bool,
    pub spacing_min: Option<ReminderDuration>,
    pub spacing_max: Option<ReminderDuration>,
    pub alive: bool,
    pub last_trigger_time: Option<NaiveDateTime>,
    pub next_trigger_time: NaiveDateTime,
    pub job_id: Option<JobId>,
}

impl Reminder {
    /// Validates `draft` and samples the first trigger time.
    pub fn new<R: Rng + ?Sized>(
        device_id: DeviceId,
        draft: ReminderDraft,
        now: NaiveDateTime,
        rng: &mut R,
    ) -> Result<Self, ReminderError> {
        let fields = validation::validate(&draft, now)?;
        let alive = draft
            .alive
            .unwrap_or_else(|| fields.max_time.is_none_or(|max_time| max_time > now));

        let mut reminder = Reminder {
            id: draft.id.unwrap_or_else(Uuid::new_v4),
            version: REMINDER_VERSION,
            device_id,
            title: fields.title,
            message: fields.message,
            work_hours_start: fields.work_hours_start,
            work_hours_end: fields.work_hours_end,
            work_days: fields.work_days,
            min_time: fields.min_time,
            max_time: fields.max_time,
            distribution: fields.distribution,
            repeat: fields.repeat,
            spacing_min: fields.spacing_min,
            spacing_max: fields.spacing_max,
            alive,
            last_trigger_time: None,
            next_trigger_time: now,
            job_id: None,
        };

        reminder.next_trigger_time = reminder.initial_trigger_time(now, rng)?;
        Ok(reminder)
    }

    /// Returns a re-validated copy with `patch` applied. The trigger time is
    /// resampled when trigger parameters change or the reminder is reactivated.
    pub fn with_changes<R: Rng + ?Sized>(
        &self,
        patch: ReminderPatch,
        now: NaiveDateTime,
        rng: &mut R,
    ) -> Result<Self, ReminderError> {
        let resample = patch.changes_trigger() || (patch.alive == Some(true) && !self.alive);
        let draft = patch.apply(self.to_draft());
        let fields = validation::validate(&draft, now)?;

        let mut updated = Reminder {
            id: self.id,
            version: self.version,
            device_id: self.device_id.clone(),
            title: fields.title,
            message: fields.message,
            work_hours_start: fields.work_hours_start,
            work_hours_end: fields.work_hours_end,
            work_days: fields.work_days,
            min_time: fields.min_time,
            max_time: fields.max_time,
            distribution: fields.distribution,
            repeat: fields.repeat,
            spacing_min: fields.spacing_min,
            spacing_max: fields.spacing_max,
            alive: draft.alive.unwrap_or(self.alive),
            last_trigger_time: self.last_trigger_time,
            next_trigger_time: self.next_trigger_time,
            job_id: self.job_id.clone(),
        };

        if resample {
            updated.next_trigger_time = updated.initial_trigger_time(now, rng)?;
        }

        Ok(updated)
    }

    pub fn to_draft(&self) -> ReminderDraft {
        ReminderDraft {
            id: Some(self.id),
            title: self.title.clone(),
            message: self.message.clone(),
            work_hours_start: self.work_hours_start,
            work_hours_end: self.work_hours_end,
            work_days: Some(self.work_days.as_array().to_vec()),
            min_time: self.min_time,
            max_time: self.max_time,
            dist: self.distribution.kind(),
            dist_params: self.distribution.params(),
            repeat: self.repeat,
            spacing_min: self.spacing_min.map(|d| d.to_string()),
            spacing_max: self.spacing_max.map(|d| d.to_string()),
            alive: Some(self.alive),
        }
    }

    /// Callback payload handed to the runner.
    pub fn job_args(&self) -> JobArgs {
        JobArgs {
            device_id: self.device_id.clone(),
            title: self.title.clone(),
            message: self.message.clone(),
        }
    }

    pub fn can_trigger(&self, now: NaiveDateTime) -> bool {
        self.alive && self.window_allows(now)
    }

    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        self.next_trigger_time - now <= fire_tolerance()
    }

    pub fn status(&self, now: NaiveDateTime) -> ReminderStatus {
        if !self.alive {
            if !self.repeat && self.last_trigger_time.is_some() {
                ReminderStatus::Finished
            } else {
                ReminderStatus::Dead
            }
        } else if self.is_due(now) {
            ReminderStatus::Due
        } else {
            ReminderStatus::Scheduled
        }
    }

    /// Fires the reminder when it is alive and due.
    ///
    /// Returns `Ok(false)` when there is nothing to do. A due reminder whose
    /// window rejects the fire is a [`ReminderError::Consistency`] fault.
    pub fn trigger_if_ready<R: Rng + ?Sized>(
        &mut self,
        now: NaiveDateTime,
        rng: &mut R,
    ) -> Result<bool, ReminderError> {
        if !self.alive || !self.is_due(now) {
            return Ok(false);
        }

        let checked_at = if (now - self.next_trigger_time).abs() <= fire_tolerance() {
            self.next_trigger_time
        } else {
            now
        };

        if !self.window_allows(checked_at) {
            return Err(ReminderError::Consistency {
                id: self.id,
                due: self.next_trigger_time,
                checked_at,
            });
        }

        self.fire(now, rng);
        Ok(true)
    }

    /// Re-derives the trigger time after a fault. A reminder whose window has
    /// lapsed is marked dead instead.
    pub fn reschedule<R: Rng + ?Sized>(&mut self, now: NaiveDateTime, rng: &mut R) {
        if !self.alive {
            return;
        }

        match self.sample_trigger_time(now, SamplingPolicy::Next, rng) {
            Ok(next) => self.next_trigger_time = next,
            Err(err) => self.fall_back_or_lapse(now, err),
        }
    }

    fn fire<R: Rng + ?Sized>(&mut self, now: NaiveDateTime, rng: &mut R) {
        self.last_trigger_time = Some(now);

        if !self.repeat {
            self.alive = false;
            return;
        }

        match self.sample_trigger_time(now, SamplingPolicy::Next, rng) {
            Ok(next) => self.next_trigger_time = next,
            Err(err) => self.fall_back_or_lapse(now, err),
        }
    }

    fn fall_back_or_lapse(&mut self, now: NaiveDateTime, err: ReminderError) {
        match self.next_allowed_time(now) {
            Some(next) => {
                log::warn!(
                    "Sampling failed, using earliest allowed time instead. [reminder_id = {}, error = {}]",
                    self.id,
                    err
                );
                self.next_trigger_time = next;
            }
            None => {
                log::info!("Trigger window lapsed, marking reminder dead. [reminder_id = {}]", self.id);
                self.alive = false;
            }
        }
    }

    fn initial_trigger_time<R: Rng + ?Sized>(
        &self,
        now: NaiveDateTime,
        rng: &mut R,
    ) -> Result<NaiveDateTime, ReminderError> {
        if self.alive {
            self.sample_trigger_time(now, SamplingPolicy::Next, rng)
        } else {
            Ok(self.next_allowed_time(now).unwrap_or(now))
        }
    }
}
