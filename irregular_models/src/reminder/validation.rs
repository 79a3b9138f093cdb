use chrono::{NaiveDateTime, NaiveTime};

use crate::{
    distribution::{Distribution, DistributionKind},
    duration::ReminderDuration,
    error::ValidationError,
};

use super::{ReminderDraft, WorkDays};

/// Draft fields that passed validation, in their typed form.
pub(super) struct ValidFields {
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
}

/// Checks run in a fixed order and the first failure is reported.
pub(super) fn validate(draft: &ReminderDraft, now: NaiveDateTime) -> Result<ValidFields, ValidationError> {
    if draft.title.trim().is_empty() && draft.message.trim().is_empty() {
        return Err(ValidationError::new("title", "title or message must be provided"));
    }

    let work_days = match &draft.work_days {
        Some(days) => WorkDays::from_slice(days)?,
        None => WorkDays::ALL,
    };

    if let (Some(start), Some(end)) = (draft.work_hours_start, draft.work_hours_end) {
        if start > end {
            return Err(ValidationError::new(
                "work_hours",
                "work_hours_start must not be after work_hours_end",
            ));
        }
    }

    match (draft.min_time, draft.max_time) {
        (Some(min_time), Some(max_time)) if min_time > max_time => {
            return Err(ValidationError::new("min_time", "min_time must not be after max_time"));
        }
        (None, Some(max_time)) if max_time < now => {
            return Err(ValidationError::new(
                "max_time",
                "max_time must be in the future when min_time is not set",
            ));
        }
        _ => {}
    }

    let spacing_min = parse_spacing("spacing_min", draft.spacing_min.as_deref())?;
    let spacing_max = parse_spacing("spacing_max", draft.spacing_max.as_deref())?;
    if let (Some(lo), Some(hi)) = (spacing_min, spacing_max) {
        if lo > hi {
            return Err(ValidationError::new("spacing", "spacing_min must not exceed spacing_max"));
        }
    }

    if draft.dist == DistributionKind::Uniform && draft.max_time.is_none() {
        return Err(ValidationError::new(
            "dist",
            "max_time must be provided for the uniform distribution",
        ));
    }
    let distribution = Distribution::from_params(draft.dist, &draft.dist_params)?;

    Ok(ValidFields {
        title: draft.title.clone(),
        message: draft.message.clone(),
        work_hours_start: draft.work_hours_start,
        work_hours_end: draft.work_hours_end,
        work_days,
        min_time: draft.min_time,
        max_time: draft.max_time,
        distribution,
        repeat: draft.repeat,
        spacing_min,
        spacing_max,
    })
}

fn parse_spacing(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<ReminderDuration>, ValidationError> {
    raw.map(|raw| {
        raw.parse()
            .map_err(|err| ValidationError::new(field, format!("{err}")))
    })
    .transpose()
}
