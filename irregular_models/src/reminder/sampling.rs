use chrono::{NaiveDateTime, TimeDelta};
use rand::Rng;

use crate::{distribution::Distribution, error::ReminderError};

use super::Reminder;

/// Upper bound on draws before sampling gives up.
pub const MAX_SAMPLING_ATTEMPTS: u32 = 1_000;

/// What to do with a drawn candidate the window does not allow.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SamplingPolicy {
    /// Move the candidate forward to the earliest allowed instant.
    #[default]
    Next,
    /// Throw the candidate away and draw again.
    Resample,
}

impl Reminder {
    pub fn sample_trigger_time<R: Rng + ?Sized>(
        &self,
        now: NaiveDateTime,
        policy: SamplingPolicy,
        rng: &mut R,
    ) -> Result<NaiveDateTime, ReminderError> {
        if self.next_allowed_time(now).is_none() {
            return Err(ReminderError::SamplingExhausted {
                attempts: 0,
                reason: "the trigger window has no instant left",
            });
        }

        let window = self.uniform_window(now);

        for _ in 0..MAX_SAMPLING_ATTEMPTS {
            let offset = self.distribution.draw_offset(rng, window);
            let Some(candidate) = offset_from(now, offset) else {
                continue;
            };

            match policy {
                SamplingPolicy::Next => {
                    if let Some(next) = self.next_allowed_time(candidate.max(now)) {
                        return Ok(next);
                    }
                }
                SamplingPolicy::Resample => {
                    if candidate >= now && self.window_allows(candidate) {
                        return Ok(candidate);
                    }
                }
            }
        }

        Err(ReminderError::SamplingExhausted {
            attempts: MAX_SAMPLING_ATTEMPTS,
            reason: "no drawn candidate fell inside the trigger window",
        })
    }

    /// Uniform bounds in seconds from `now`. Negative offsets are clamped.
    fn uniform_window(&self, now: NaiveDateTime) -> (f64, f64) {
        if self.distribution != Distribution::Uniform {
            return (0.0, 0.0);
        }

        let seconds = |at: NaiveDateTime| (at - now).num_milliseconds() as f64 / 1_000.0;
        let low = self.min_time.map(seconds).unwrap_or(0.0).max(0.0);
        let high = self.max_time.map(seconds).unwrap_or(low).max(low);
        (low, high)
    }
}

fn offset_from(now: NaiveDateTime, offset_secs: f64) -> Option<NaiveDateTime> {
    if !offset_secs.is_finite() {
        return None;
    }

    let delta = TimeDelta::try_milliseconds((offset_secs * 1_000.0) as i64)?;
    now.checked_add_signed(delta)
}
