use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    error::ServiceError,
    service::{FireOutcome, ReminderService},
};

/// Longest the watcher sleeps before looking at the cursor again.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Local fallback for the runner: fires the cursor reminder once its time
/// has come. One per service.
pub struct ReminderWatcher;

struct RunningGuard(Arc<ReminderService>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.release_watcher();
    }
}

impl ReminderWatcher {
    pub fn spawn(
        service: Arc<ReminderService>,
        cancellation_token: CancellationToken,
    ) -> Result<JoinHandle<()>, ServiceError> {
        if !service.claim_watcher() {
            return Err(ServiceError::WatcherAlreadyRunning);
        }

        let guard = RunningGuard(service.clone());
        Ok(tokio::spawn(async move {
            Self::watch(&service, cancellation_token).await;
            drop(guard);
        }))
    }

    async fn watch(service: &ReminderService, cancellation_token: CancellationToken) {
        let mut cursor = service.cursor().subscribe();
        service.recompute_cursor().await;
        log::info!("[WATCHER] Started.");

        loop {
            if cancellation_token.is_cancelled() {
                break;
            }

            let entry = *cursor.borrow_and_update();
            let wait = match entry {
                None => POLL_INTERVAL,
                Some(entry) => {
                    let remaining = service.clock().until(entry.next_trigger_time);
                    if !remaining.is_zero() {
                        remaining.min(POLL_INTERVAL)
                    } else {
                        match service.fire_due(entry.id).await {
                            Ok(FireOutcome::Fired | FireOutcome::Rescheduled) => continue,
                            Ok(FireOutcome::NotDue) => {
                                log::debug!("[WATCHER] Cursor reminder was not due. [reminder_id = {}]", entry.id);
                                POLL_INTERVAL
                            }
                            Err(err) => {
                                log::error!("[WATCHER] Fire failed. [reminder_id = {}, error = {}]", entry.id, err);
                                POLL_INTERVAL
                            }
                        }
                    }
                }
            };

            tokio::select! {
                _ = cancellation_token.cancelled() => break,
                changed = cursor.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }

        log::info!("[WATCHER] Stopped.");
    }
}
