use chrono::{Datelike, NaiveDateTime, NaiveTime, TimeDelta};

use super::{DEFAULT_SPACING_MIN_SECS, Reminder};

fn add_saturating(at: NaiveDateTime, delta: TimeDelta) -> NaiveDateTime {
    at.checked_add_signed(delta).unwrap_or(NaiveDateTime::MAX)
}

impl Reminder {
    /// Whether every calendar, absolute and spacing condition holds at `at`.
    /// Liveness is not considered, see [`Reminder::can_trigger`].
    pub fn window_allows(&self, at: NaiveDateTime) -> bool {
        let time = at.time();

        if self.work_hours_start.is_some_and(|start| time < start) {
            return false;
        }
        if self.work_hours_end.is_some_and(|end| time > end) {
            return false;
        }
        if !self.work_days.allows(at.weekday()) {
            return false;
        }
        if self.min_time.is_some_and(|min_time| at < min_time) {
            return false;
        }
        if self.max_time.is_some_and(|max_time| at > max_time) {
            return false;
        }

        match self.spacing_window() {
            Some((lo, hi)) => at >= lo && hi.is_none_or(|hi| at <= hi),
            None => true,
        }
    }

    /// Earliest instant at or after `now` that the window allows, or `None`
    /// when no such instant exists.
    pub fn next_allowed_time(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        if self.window_allows(now) {
            return Some(now);
        }

        let mut next = now;

        if let Some(min_time) = self.min_time {
            next = next.max(min_time);
        }
        if self.max_time.is_some_and(|max_time| next > max_time) {
            return None;
        }

        let spacing = self.spacing_window();
        if let Some((lo, hi)) = spacing {
            next = next.max(lo);
            if hi.is_some_and(|hi| next > hi) {
                return None;
            }
        }

        let past_work_hours = self.work_hours_end.is_some_and(|end| next.time() > end);
        if past_work_hours || !self.work_days.allows(next.weekday()) {
            let mut day = next.date().succ_opt()?;
            // At least one work day exists, so a week always has one.
            for _ in 0..7 {
                if self.work_days.allows(day.weekday()) {
                    break;
                }
                day = day.succ_opt()?;
            }
            next = day.and_time(NaiveTime::MIN);
        }

        if let Some(start) = self.work_hours_start {
            if next.time() < start {
                next = next.date().and_time(start);
            }
        }

        if self.max_time.is_some_and(|max_time| next > max_time) {
            return None;
        }
        if spacing.is_some_and(|(_, hi)| hi.is_some_and(|hi| next > hi)) {
            return None;
        }

        Some(next)
    }

    /// Spacing bounds measured from the last fire. Only repeating reminders
    /// that have fired before are constrained.
    fn spacing_window(&self) -> Option<(NaiveDateTime, Option<NaiveDateTime>)> {
        if !self.repeat {
            return None;
        }
        let last = self.last_trigger_time?;

        let lo = self
            .spacing_min
            .map(|spacing| spacing.as_delta())
            .unwrap_or_else(|| TimeDelta::seconds(DEFAULT_SPACING_MIN_SECS));
        let hi = self.spacing_max.map(|spacing| add_saturating(last, spacing.as_delta()));

        Some((add_saturating(last, lo), hi))
    }
}
