use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use irregular_models::{
    job::{JobId, UpdateJobRequest},
    reminder::Reminder,
};
use serde::Serialize;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{error::ServiceError, service::ReminderService};

/// Runner `run_at` values within this many seconds of the reminder count as
/// in sync.
const RUN_AT_SLACK_SECS: i64 = 1;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub registered: usize,
    pub attached: usize,
    pub rearmed: usize,
    pub paused: usize,
    pub orphans_deleted: usize,
    pub failures: usize,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

impl ReminderService {
    /// Compares the runner's job table with the reminders and repairs drift:
    /// registers missing jobs, re-arms or pauses jobs whose state disagrees
    /// and deletes jobs no reminder owns.
    ///
    /// Reminders are read before the job table, so a job never looks missing
    /// for a reminder that was registered in between. Orphans are checked
    /// against a fresh read before they are deleted.
    pub async fn reconcile(&self) -> Result<ReconciliationReport, ServiceError> {
        let mut report = ReconciliationReport::default();
        let reminders = self.storage().get_all().await?;

        let jobs: HashMap<JobId, Option<DateTime<Utc>>> =
            match self.synchronizer().runner().list_jobs().await {
                Ok(jobs) => jobs
                    .into_iter()
                    .map(|job| (job.id, job.next_run_time))
                    .collect(),
                Err(err) => {
                    log::warn!("[RECONCILE] Could not list runner jobs. [error = {}]", err);
                    report.failures += 1;
                    return Ok(report);
                }
            };

        let mut owned: HashSet<JobId> = HashSet::new();

        for reminder in reminders {
            let candidate = reminder
                .job_id
                .clone()
                .unwrap_or_else(|| reminder.id.to_string());

            match jobs.get(&candidate) {
                Some(next_run_time) => {
                    owned.insert(candidate.clone());
                    let reminder = if reminder.job_id.is_none() {
                        report.attached += 1;
                        match self.attach_job(reminder.id, candidate.clone()).await? {
                            Some(reminder) => reminder,
                            None => continue,
                        }
                    } else {
                        reminder
                    };
                    self.align_job(&reminder, &candidate, *next_run_time, &mut report)
                        .await;
                }
                None if reminder.alive => {
                    self.register_missing(reminder, &mut report).await?;
                }
                None => {}
            }
        }

        let unowned: Vec<&JobId> = jobs.keys().filter(|id| !owned.contains(*id)).collect();
        let claimed: HashSet<JobId> = if unowned.is_empty() {
            HashSet::new()
        } else {
            self.storage()
                .get_all()
                .await?
                .into_iter()
                .map(|reminder| reminder.job_id.unwrap_or_else(|| reminder.id.to_string()))
                .collect()
        };

        for job_id in unowned.into_iter().filter(|id| !claimed.contains(*id)) {
            log::warn!("[RECONCILE] Deleting orphan job. [job_id = {}]", job_id);
            match self.synchronizer().runner().delete_job(job_id).await {
                Ok(_) => report.orphans_deleted += 1,
                Err(err) => {
                    log::warn!("[RECONCILE] Could not delete orphan job. [job_id = {}, error = {}]", job_id, err);
                    report.failures += 1;
                }
            }
        }

        if !report.is_clean() {
            log::warn!("[RECONCILE] Drift repaired. {:?}", report);
            self.recompute_cursor().await;
        }
        Ok(report)
    }

    async fn align_job(
        &self,
        reminder: &Reminder,
        job_id: &str,
        next_run_time: Option<DateTime<Utc>>,
        report: &mut ReconciliationReport,
    ) {
        let runner = self.synchronizer().runner();

        if !reminder.alive {
            if next_run_time.is_some() {
                log::warn!("[RECONCILE] Pausing job of dead reminder. [reminder_id = {}]", reminder.id);
                match runner.pause_job(job_id).await {
                    Ok(_) => report.paused += 1,
                    Err(err) => {
                        log::warn!("[RECONCILE] Pause failed. [job_id = {}, error = {}]", job_id, err);
                        report.failures += 1;
                    }
                }
            }
            return;
        }

        let expected = self.clock().to_utc(reminder.next_trigger_time);
        let in_sync = next_run_time
            .is_some_and(|run_at| (run_at - expected).num_seconds().abs() <= RUN_AT_SLACK_SECS);
        if in_sync {
            return;
        }

        log::warn!(
            "[RECONCILE] Re-arming job. [reminder_id = {}, job_id = {}, runner = {:?}, expected = {}]",
            reminder.id,
            job_id,
            next_run_time,
            expected
        );
        let request = UpdateJobRequest {
            run_at: Some(expected),
            args: Some(reminder.job_args()),
        };
        let rearmed = match runner.update_job(job_id, request).await {
            Ok(_) if next_run_time.is_none() => runner.resume_job(job_id).await.map(|_| ()),
            Ok(_) => Ok(()),
            Err(err) => Err(err),
        };
        match rearmed {
            Ok(()) => report.rearmed += 1,
            Err(err) => {
                log::warn!("[RECONCILE] Re-arm failed. [job_id = {}, error = {}]", job_id, err);
                report.failures += 1;
            }
        }
    }

    /// Registers under a fresh id, since the runner never hands out an id twice.
    async fn register_missing(
        &self,
        mut reminder: Reminder,
        report: &mut ReconciliationReport,
    ) -> Result<(), ServiceError> {
        log::warn!("[RECONCILE] Reminder has no runner job. [reminder_id = {}]", reminder.id);
        reminder.job_id = Some(Uuid::new_v4().to_string());

        match self.synchronizer().register(&reminder).await {
            Ok(job_id) => {
                report.registered += 1;
                self.attach_job(reminder.id, job_id).await?;
            }
            Err(fault) => {
                log::error!("[SYNC] {}", fault);
                report.failures += 1;
            }
        }
        Ok(())
    }
}

/// Runs [`ReminderService::reconcile`] right away and then every `interval`
/// until cancelled.
pub fn spawn_reconciler(
    service: Arc<ReminderService>,
    interval: Duration,
    cancellation_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = service.reconcile().await {
                        log::error!("[RECONCILE] Failed. [error = {}]", err);
                    }
                }
            }
        }
        log::info!("[RECONCILE] Stopped.");
    })
}
