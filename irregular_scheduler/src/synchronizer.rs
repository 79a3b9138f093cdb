use std::sync::Arc;

use irregular_models::{
    job::{CreateJobRequest, JobId, UpdateJobRequest},
    reminder::{Reminder, ReminderId},
};
use thiserror::Error;

use crate::{
    clock::Clock,
    runner_client::{JobRunner, RunnerError},
};

/// A runner call that failed. The local reminder stays as it is and
/// reconciliation repairs the drift later.
#[derive(Debug, Error)]
#[error("could not {operation} job for reminder {reminder_id}: {source}")]
pub struct SyncFault {
    pub operation: &'static str,
    pub reminder_id: ReminderId,
    #[source]
    pub source: RunnerError,
}

/// Maps reminder lifecycle changes onto runner job calls.
pub struct JobSynchronizer {
    runner: Arc<dyn JobRunner>,
    clock: Arc<dyn Clock>,
    callback_url: String,
}

impl JobSynchronizer {
    pub fn new(runner: Arc<dyn JobRunner>, clock: Arc<dyn Clock>, callback_url: String) -> Self {
        Self {
            runner,
            clock,
            callback_url,
        }
    }

    pub fn runner(&self) -> &dyn JobRunner {
        self.runner.as_ref()
    }

    /// Creates the runner job. A reminder that starts out dead gets its job
    /// paused right away.
    pub async fn register(&self, reminder: &Reminder) -> Result<JobId, SyncFault> {
        let request = CreateJobRequest {
            id: Some(reminder.job_id.clone().unwrap_or_else(|| reminder.id.to_string())),
            callback_url: self.callback_url.clone(),
            args: reminder.job_args(),
            run_at: self.clock.to_utc(reminder.next_trigger_time),
        };

        let job = self
            .runner
            .create_job(request)
            .await
            .map_err(|source| fault("register", reminder, source))?;
        log::info!(
            "[SYNC] Registered job. [reminder_id = {}, job_id = {}, run_at = {}]",
            reminder.id,
            job.id,
            job.run_at
        );

        if !reminder.alive {
            self.runner
                .pause_job(&job.id)
                .await
                .map_err(|source| fault("pause", reminder, source))?;
        }

        Ok(job.id)
    }

    /// Brings the runner job in line with `after`. Returns the new job id when
    /// the reminder had none and one was registered.
    pub async fn update(
        &self,
        before: &Reminder,
        after: &Reminder,
    ) -> Result<Option<JobId>, SyncFault> {
        let Some(job_id) = after.job_id.as_deref() else {
            return self.register(after).await.map(Some);
        };

        let payload_changed = before.title != after.title || before.message != after.message;
        let time_changed = before.next_trigger_time != after.next_trigger_time;
        let rearm = time_changed || after.last_trigger_time != before.last_trigger_time;

        if payload_changed || (rearm && after.alive) {
            let request = UpdateJobRequest {
                run_at: rearm.then(|| self.clock.to_utc(after.next_trigger_time)),
                args: payload_changed.then(|| after.job_args()),
            };
            self.runner
                .update_job(job_id, request)
                .await
                .map_err(|source| fault("update", after, source))?;
            log::info!(
                "[SYNC] Updated job. [reminder_id = {}, job_id = {}, next = {}]",
                after.id,
                job_id,
                after.next_trigger_time
            );
        }

        match (before.alive, after.alive) {
            (false, true) => {
                self.runner
                    .resume_job(job_id)
                    .await
                    .map_err(|source| fault("resume", after, source))?;
                log::info!("[SYNC] Resumed job. [reminder_id = {}, job_id = {}]", after.id, job_id);
            }
            (true, false) => {
                self.runner
                    .pause_job(job_id)
                    .await
                    .map_err(|source| fault("pause", after, source))?;
                log::info!("[SYNC] Paused job. [reminder_id = {}, job_id = {}]", after.id, job_id);
            }
            _ => {}
        }

        Ok(None)
    }

    /// Removes the runner job. A job the runner does not know counts as gone.
    pub async fn delete(&self, reminder: &Reminder) -> Result<(), SyncFault> {
        let Some(job_id) = reminder.job_id.as_deref() else {
            return Ok(());
        };

        let deleted = self
            .runner
            .delete_job(job_id)
            .await
            .map_err(|source| fault("delete", reminder, source))?;
        log::info!(
            "[SYNC] Deleted job. [reminder_id = {}, job_id = {}, existed = {}]",
            reminder.id,
            job_id,
            deleted
        );
        Ok(())
    }
}

fn fault(operation: &'static str, reminder: &Reminder, source: RunnerError) -> SyncFault {
    SyncFault {
        operation,
        reminder_id: reminder.id,
        source,
    }
}
