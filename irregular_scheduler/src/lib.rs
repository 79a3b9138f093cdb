pub mod clock;
pub mod cursor;
pub mod delivery;
mod error;
mod reconcile;
pub mod runner_client;
mod service;
pub mod synchronizer;
mod watcher;

#[cfg(test)]
mod test_utils;

pub use clock::{Clock, SystemClock, TokioClock};
pub use cursor::{CursorEntry, SchedulerCursor};
pub use delivery::{LogDeliveryChannel, ReminderDeliveryChannel};
pub use error::ServiceError;
pub use reconcile::{ReconciliationReport, spawn_reconciler};
pub use runner_client::{DEFAULT_RUNNER_TIMEOUT, HttpJobRunner, JobRunner, RunnerError};
pub use service::{Diagnostics, FireOutcome, ReminderService};
pub use synchronizer::{JobSynchronizer, SyncFault};
pub use watcher::ReminderWatcher;
