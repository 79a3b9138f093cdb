use chrono::NaiveDateTime;
use thiserror::Error;

use crate::reminder::ReminderId;

/// A reminder field that is malformed or contradicts another field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no trigger time found after {attempts} attempts: {reason}")]
    SamplingExhausted { attempts: u32, reason: &'static str },

    #[error(
        "reminder {id} is due at {due} but its trigger window rejects {checked_at}"
    )]
    Consistency {
        id: ReminderId,
        due: NaiveDateTime,
        checked_at: NaiveDateTime,
    },
}
