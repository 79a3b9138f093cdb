use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use irregular_models::{
    distribution::DistributionKind,
    job::{CreateJobRequest, JobArgs, JobId, JobResponse, JobSummary, UpdateJobRequest},
    reminder::{Reminder, ReminderDraft, ReminderId},
};
use irregular_storage::InMemoryReminderStorage;
use tokio::sync::oneshot;

use crate::{
    clock::TokioClock,
    delivery::ReminderDeliveryChannel,
    runner_client::{JobRunner, RunnerError},
    service::ReminderService,
    synchronizer::JobSynchronizer,
};

#[derive(Debug, Clone, PartialEq)]
pub struct FakeJob {
    pub run_at: DateTime<Utc>,
    pub paused: bool,
    pub args: JobArgs,
}

/// Parks one `list_jobs` call until the test releases it.
pub struct ListGate {
    reached: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
    snapshot_first: bool,
}

/// In-process stand-in for the runner that records every call.
#[derive(Default)]
pub struct FakeRunner {
    pub jobs: Mutex<HashMap<JobId, FakeJob>>,
    pub calls: Mutex<Vec<String>>,
    pub failing: AtomicBool,
    pub list_gate: Mutex<Option<ListGate>>,
}

impl FakeRunner {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn job(&self, id: &str) -> Option<FakeJob> {
        self.jobs.lock().unwrap().get(id).cloned()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Holds the next `list_jobs` call. The first receiver resolves once the
    /// call is parked; sending on the returned sender lets it finish. With
    /// `snapshot_first` the job table is read before parking.
    pub fn hold_next_list(
        &self,
        snapshot_first: bool,
    ) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (reached_tx, reached_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *self.list_gate.lock().unwrap() = Some(ListGate {
            reached: reached_tx,
            release: release_rx,
            snapshot_first,
        });
        (reached_rx, release_tx)
    }

    fn snapshot(&self) -> Vec<JobSummary> {
        let jobs = self.jobs.lock().unwrap();
        jobs.iter().map(|(id, job)| Self::summary(id, job)).collect()
    }

    fn record(&self, call: String) -> Result<(), RunnerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RunnerError::Status {
                status: 503,
                body: "unavailable".to_owned(),
            });
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }

    fn summary(id: &str, job: &FakeJob) -> JobSummary {
        JobSummary {
            id: id.to_owned(),
            next_run_time: (!job.paused).then_some(job.run_at),
        }
    }
}

#[async_trait]
impl JobRunner for FakeRunner {
    async fn create_job(&self, request: CreateJobRequest) -> Result<JobResponse, RunnerError> {
        let id = request.id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.record(format!("create {id}"))?;

        let mut jobs = self.jobs.lock().unwrap();
        if jobs.contains_key(&id) {
            return Err(RunnerError::Status {
                status: 409,
                body: "job id already used".to_owned(),
            });
        }
        jobs.insert(
            id.clone(),
            FakeJob {
                run_at: request.run_at,
                paused: false,
                args: request.args,
            },
        );
        Ok(JobResponse {
            id,
            run_at: request.run_at,
        })
    }

    async fn update_job(
        &self,
        id: &str,
        request: UpdateJobRequest,
    ) -> Result<JobResponse, RunnerError> {
        self.record(format!("update {id}"))?;

        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| RunnerError::NotFound(id.to_owned()))?;
        if let Some(run_at) = request.run_at {
            job.run_at = run_at;
        }
        if let Some(args) = request.args {
            job.args = args;
        }
        Ok(JobResponse {
            id: id.to_owned(),
            run_at: job.run_at,
        })
    }

    async fn pause_job(&self, id: &str) -> Result<JobSummary, RunnerError> {
        self.record(format!("pause {id}"))?;

        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| RunnerError::NotFound(id.to_owned()))?;
        job.paused = true;
        Ok(Self::summary(id, job))
    }

    async fn resume_job(&self, id: &str) -> Result<JobSummary, RunnerError> {
        self.record(format!("resume {id}"))?;

        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| RunnerError::NotFound(id.to_owned()))?;
        job.paused = false;
        Ok(Self::summary(id, job))
    }

    async fn delete_job(&self, id: &str) -> Result<bool, RunnerError> {
        self.record(format!("delete {id}"))?;
        Ok(self.jobs.lock().unwrap().remove(id).is_some())
    }

    async fn list_jobs(&self) -> Result<Vec<JobSummary>, RunnerError> {
        self.record("list".to_owned())?;
        let gate = self.list_gate.lock().unwrap().take();
        let Some(gate) = gate else {
            return Ok(self.snapshot());
        };

        let early = gate.snapshot_first.then(|| self.snapshot());
        let _ = gate.reached.send(());
        let _ = gate.release.await;
        Ok(early.unwrap_or_else(|| self.snapshot()))
    }
}

#[derive(Default)]
pub struct RecordingChannel {
    pub delivered: Mutex<Vec<ReminderId>>,
}

#[async_trait]
impl ReminderDeliveryChannel for RecordingChannel {
    async fn send_reminder_notification(&self, reminder: &Reminder) -> anyhow::Result<()> {
        self.delivered.lock().unwrap().push(reminder.id);
        Ok(())
    }
}

pub struct TestContext {
    pub service: Arc<ReminderService>,
    pub runner: Arc<FakeRunner>,
    pub channel: Arc<RecordingChannel>,
    pub storage: Arc<InMemoryReminderStorage>,
}

impl TestContext {
    pub fn new(start: NaiveDateTime) -> Self {
        let runner = Arc::new(FakeRunner::default());
        let channel = Arc::new(RecordingChannel::default());
        let storage = Arc::new(InMemoryReminderStorage::new());
        let clock = Arc::new(TokioClock::starting_at(start));
        let synchronizer = JobSynchronizer::new(
            runner.clone(),
            clock.clone(),
            "http://service.test/v1/deliveries".to_owned(),
        );
        let service = ReminderService::new(storage.clone(), synchronizer, channel.clone(), clock)
            .with_seed(7);

        Self {
            service: Arc::new(service),
            runner,
            channel,
            storage,
        }
    }

    pub fn delivered(&self) -> Vec<ReminderId> {
        self.channel.delivered.lock().unwrap().clone()
    }
}

/// Monday 2025-01-06, 08:00.
pub fn monday() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 6)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap()
}

pub fn uniform_draft(now: NaiveDateTime, from_secs: i64, to_secs: i64) -> ReminderDraft {
    ReminderDraft {
        title: "Water".to_owned(),
        message: "Drink a glass of water".to_owned(),
        min_time: Some(now + TimeDelta::seconds(from_secs)),
        max_time: Some(now + TimeDelta::seconds(to_secs)),
        ..Default::default()
    }
}

pub fn exponential_draft(mean: &str) -> ReminderDraft {
    ReminderDraft {
        title: "Stretch".to_owned(),
        message: "Stand up".to_owned(),
        dist: DistributionKind::Exponential,
        dist_params: [("mean".to_owned(), mean.to_owned())].into(),
        ..Default::default()
    }
}

pub fn office_hours(mut draft: ReminderDraft) -> ReminderDraft {
    draft.work_hours_start = NaiveTime::from_hms_opt(9, 0, 0);
    draft.work_hours_end = NaiveTime::from_hms_opt(17, 0, 0);
    draft.work_days = Some(vec![true, true, true, true, true, false, false]);
    draft
}
