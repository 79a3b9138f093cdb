use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use chrono::NaiveDateTime;
use irregular_models::{
    error::ReminderError,
    job::{DeliveryCallback, JobId},
    reminder::{Reminder, ReminderDraft, ReminderId, ReminderPatch},
};
use irregular_storage::ReminderStorage;
use rand::{SeedableRng, rngs::StdRng};
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;

use crate::{
    clock::Clock,
    cursor::{CursorEntry, SchedulerCursor},
    delivery::ReminderDeliveryChannel,
    error::ServiceError,
    synchronizer::JobSynchronizer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FireOutcome {
    Fired,
    NotDue,
    /// The reminder was due but its window rejected the fire, so it got a new
    /// trigger time instead.
    Rescheduled,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub now: NaiveDateTime,
    pub cursor: Option<CursorEntry>,
    pub reminders: usize,
    pub alive: usize,
    /// Alive reminders the runner does not know about yet.
    pub missing_jobs: Vec<ReminderId>,
    pub watcher_running: bool,
}

/// Owns every reminder mutation. Read-modify-write sequences run under one
/// lock; runner calls and delivery happen after it is released.
pub struct ReminderService {
    storage: Arc<dyn ReminderStorage>,
    synchronizer: JobSynchronizer,
    cursor: SchedulerCursor,
    delivery: Arc<dyn ReminderDeliveryChannel>,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
    mutation: AsyncMutex<()>,
    watcher_running: AtomicBool,
}

impl ReminderService {
    pub fn new(
        storage: Arc<dyn ReminderStorage>,
        synchronizer: JobSynchronizer,
        delivery: Arc<dyn ReminderDeliveryChannel>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cursor: SchedulerCursor::new(storage.clone()),
            storage,
            synchronizer,
            delivery,
            clock,
            rng: Mutex::new(StdRng::from_entropy()),
            mutation: AsyncMutex::new(()),
            watcher_running: AtomicBool::new(false),
        }
    }

    /// Fixes the sampler seed, for reproducible runs.
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub fn cursor(&self) -> &SchedulerCursor {
        &self.cursor
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn storage(&self) -> &dyn ReminderStorage {
        self.storage.as_ref()
    }

    pub(crate) fn synchronizer(&self) -> &JobSynchronizer {
        &self.synchronizer
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }

    pub async fn create(
        &self,
        device_id: &str,
        draft: ReminderDraft,
    ) -> Result<Reminder, ServiceError> {
        let reminder = {
            let _guard = self.mutation.lock().await;
            let now = self.clock.now();
            let reminder =
                self.with_rng(|rng| Reminder::new(device_id.to_owned(), draft, now, rng))?;
            self.storage.insert(reminder).await?
        };
        log::info!(
            "[CREATE] Reminder created. [reminder_id = {}, device_id = {}, next = {}, alive = {}]",
            reminder.id,
            reminder.device_id,
            reminder.next_trigger_time,
            reminder.alive
        );

        let reminder = match self.synchronizer.register(&reminder).await {
            Ok(job_id) => self.attach_job(reminder.id, job_id).await?.unwrap_or(reminder),
            Err(fault) => {
                log::error!("[SYNC] {}", fault);
                reminder
            }
        };

        self.recompute_cursor().await;
        Ok(reminder)
    }

    pub async fn get(&self, device_id: &str, id: ReminderId) -> Result<Reminder, ServiceError> {
        match self.storage.get(id).await? {
            Some(reminder) if reminder.device_id == device_id => Ok(reminder),
            _ => Err(ServiceError::NotFound(id)),
        }
    }

    pub async fn list(&self, device_id: &str) -> Result<Vec<Reminder>, ServiceError> {
        Ok(self.storage.get_all_device_reminders(device_id).await?)
    }

    pub async fn update(
        &self,
        device_id: &str,
        id: ReminderId,
        patch: ReminderPatch,
    ) -> Result<Reminder, ServiceError> {
        let (before, after) = {
            let _guard = self.mutation.lock().await;
            let before = self.get(device_id, id).await?;
            let now = self.clock.now();
            let after = self.with_rng(|rng| before.with_changes(patch, now, rng))?;
            let after = self.storage.update(after).await?;
            (before, after)
        };
        log::info!(
            "[UPDATE] Reminder updated. [reminder_id = {}, next = {}, alive = {}]",
            after.id,
            after.next_trigger_time,
            after.alive
        );

        let after = self.sync(&before, after).await?;
        self.recompute_cursor().await;
        Ok(after)
    }

    /// Deletes the runner job and then the reminder. Returns `false` when the
    /// device has no such reminder.
    pub async fn delete(&self, device_id: &str, id: ReminderId) -> Result<bool, ServiceError> {
        let reminder = {
            let _guard = self.mutation.lock().await;
            match self.storage.get(id).await? {
                Some(reminder) if reminder.device_id == device_id => reminder,
                _ => return Ok(false),
            }
        };

        if let Err(fault) = self.synchronizer.delete(&reminder).await {
            log::error!("[SYNC] {}", fault);
        }

        let deleted = {
            let _guard = self.mutation.lock().await;
            self.storage.delete(id).await?
        };
        log::info!("[DELETE] Reminder deleted. [reminder_id = {}]", id);

        self.recompute_cursor().await;
        Ok(deleted)
    }

    /// Fires the reminder if it is due. Safe to call from several paths for
    /// the same fire: only the first call finds it due.
    pub async fn fire_due(&self, id: ReminderId) -> Result<FireOutcome, ServiceError> {
        let step = {
            let _guard = self.mutation.lock().await;
            match self.storage.get(id).await? {
                None => None,
                Some(before) => {
                    let mut after = before.clone();
                    let now = self.clock.now();

                    match self.with_rng(|rng| after.trigger_if_ready(now, rng)) {
                        Ok(false) => None,
                        Ok(true) => {
                            let after = self.storage.update(after).await?;
                            Some((before, after, FireOutcome::Fired))
                        }
                        Err(fault @ ReminderError::Consistency { .. }) => {
                            log::error!("[FIRE] {}", fault);
                            self.with_rng(|rng| after.reschedule(now, rng));
                            let after = self.storage.update(after).await?;
                            Some((before, after, FireOutcome::Rescheduled))
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
            }
        };

        let outcome = match step {
            None => FireOutcome::NotDue,
            Some((before, after, outcome)) => {
                if outcome == FireOutcome::Fired {
                    log::info!(
                        "[FIRE] Reminder fired. [reminder_id = {}, alive = {}, next = {}]",
                        after.id,
                        after.alive,
                        after.next_trigger_time
                    );
                    if let Err(err) = self.delivery.send_reminder_notification(&after).await {
                        log::error!("[DELIVER] Delivery failed. [reminder_id = {}, error = {:#}]", after.id, err);
                    }
                } else {
                    log::warn!(
                        "[FIRE] Reminder rescheduled. [reminder_id = {}, alive = {}, next = {}]",
                        after.id,
                        after.alive,
                        after.next_trigger_time
                    );
                }
                self.sync(&before, after).await?;
                outcome
            }
        };

        self.recompute_cursor().await;
        Ok(outcome)
    }

    /// Entry point for the runner's fire callback.
    pub async fn handle_delivery_callback(
        &self,
        callback: &DeliveryCallback,
    ) -> Result<FireOutcome, ServiceError> {
        let id = self.reminder_for_job(&callback.job_id).await?;
        let outcome = self.fire_due(id).await?;
        log::info!(
            "[FIRE] Runner callback handled. [job_id = {}, reminder_id = {}, outcome = {:?}]",
            callback.job_id,
            id,
            outcome
        );
        Ok(outcome)
    }

    pub async fn diagnostics(&self) -> Result<Diagnostics, ServiceError> {
        let reminders = self.storage.get_all().await?;
        let missing_jobs = reminders
            .iter()
            .filter(|reminder| reminder.alive && reminder.job_id.is_none())
            .map(|reminder| reminder.id)
            .collect();

        Ok(Diagnostics {
            now: self.clock.now(),
            cursor: self.cursor.current(),
            reminders: reminders.len(),
            alive: reminders.iter().filter(|reminder| reminder.alive).count(),
            missing_jobs,
            watcher_running: self.watcher_running.load(Ordering::SeqCst),
        })
    }

    pub(crate) async fn recompute_cursor(&self) {
        if let Err(err) = self.cursor.recompute().await {
            log::error!("[CURSOR] Recompute failed. [error = {}]", err);
        }
    }

    /// Stores `job_id` on the reminder unless it was deleted in the meantime.
    pub(crate) async fn attach_job(
        &self,
        id: ReminderId,
        job_id: JobId,
    ) -> Result<Option<Reminder>, ServiceError> {
        let _guard = self.mutation.lock().await;
        let Some(mut reminder) = self.storage.get(id).await? else {
            log::warn!("[SYNC] Reminder vanished before its job was attached. [reminder_id = {}, job_id = {}]", id, job_id);
            return Ok(None);
        };

        if reminder.job_id.as_deref() == Some(job_id.as_str()) {
            return Ok(Some(reminder));
        }

        reminder.job_id = Some(job_id);
        Ok(Some(self.storage.update(reminder).await?))
    }

    async fn sync(&self, before: &Reminder, after: Reminder) -> Result<Reminder, ServiceError> {
        match self.synchronizer.update(before, &after).await {
            Ok(Some(job_id)) => Ok(self.attach_job(after.id, job_id).await?.unwrap_or(after)),
            Ok(None) => Ok(after),
            Err(fault) => {
                log::error!("[SYNC] {}", fault);
                Ok(after)
            }
        }
    }

    async fn reminder_for_job(&self, job_id: &str) -> Result<ReminderId, ServiceError> {
        // Jobs are registered under the reminder id unless reconciliation had
        // to pick a fresh one.
        if let Ok(id) = job_id.parse::<ReminderId>() {
            if let Some(reminder) = self.storage.get(id).await? {
                if reminder.job_id.as_deref().is_none_or(|own| own == job_id) {
                    return Ok(id);
                }
            }
        }

        self.storage
            .get_all()
            .await?
            .into_iter()
            .find(|reminder| reminder.job_id.as_deref() == Some(job_id))
            .map(|reminder| reminder.id)
            .ok_or_else(|| ServiceError::UnknownJob(job_id.to_owned()))
    }

    pub(crate) fn claim_watcher(&self) -> bool {
        self.watcher_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn release_watcher(&self) {
        self.watcher_running.store(false, Ordering::SeqCst);
    }
}
