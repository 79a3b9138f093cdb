//! Single owner of the job table. Every change goes through one task fed by
//! an mpsc mailbox; per-job timers only post `Due` messages back to it.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use irregular_models::job::{
    CreateJobRequest, JobDeleted, JobId, JobResponse, JobSummary, UpdateJobRequest,
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

use crate::{
    error::JobError,
    job::{Job, JobState},
    storage::JobStorage,
    worker::JobWorker,
};

const MAILBOX_SIZE: usize = 64;

type Reply<T> = oneshot::Sender<Result<T, JobError>>;

#[derive(Debug)]
enum JobManagerMessage {
    Create {
        request: CreateJobRequest,
        reply: Reply<JobResponse>,
    },
    Update {
        id: JobId,
        request: UpdateJobRequest,
        reply: Reply<JobResponse>,
    },
    Pause {
        id: JobId,
        reply: Reply<JobSummary>,
    },
    Resume {
        id: JobId,
        reply: Reply<JobSummary>,
    },
    Delete {
        id: JobId,
        reply: Reply<JobDeleted>,
    },
    List {
        reply: Reply<Vec<JobSummary>>,
    },
    Due {
        id: JobId,
        run_at: DateTime<Utc>,
    },
}

/// Cheap, cloneable way to talk to a running [`JobManager`].
#[derive(Clone)]
pub struct JobManagerHandle {
    sender: mpsc::Sender<JobManagerMessage>,
}

impl JobManagerHandle {
    async fn request<T>(
        &self,
        message: impl FnOnce(Reply<T>) -> JobManagerMessage,
    ) -> Result<T, JobError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(message(reply))
            .await
            .map_err(|_| JobError::ManagerStopped)?;
        response.await.map_err(|_| JobError::ManagerStopped)?
    }

    pub async fn create_job(&self, request: CreateJobRequest) -> Result<JobResponse, JobError> {
        self.request(|reply| JobManagerMessage::Create { request, reply })
            .await
    }

    pub async fn update_job(
        &self,
        id: JobId,
        request: UpdateJobRequest,
    ) -> Result<JobResponse, JobError> {
        self.request(|reply| JobManagerMessage::Update { id, request, reply })
            .await
    }

    pub async fn pause_job(&self, id: JobId) -> Result<JobSummary, JobError> {
        self.request(|reply| JobManagerMessage::Pause { id, reply })
            .await
    }

    pub async fn resume_job(&self, id: JobId) -> Result<JobSummary, JobError> {
        self.request(|reply| JobManagerMessage::Resume { id, reply })
            .await
    }

    pub async fn delete_job(&self, id: JobId) -> Result<JobDeleted, JobError> {
        self.request(|reply| JobManagerMessage::Delete { id, reply })
            .await
    }

    pub async fn list_jobs(&self) -> Result<Vec<JobSummary>, JobError> {
        self.request(|reply| JobManagerMessage::List { reply }).await
    }
}

pub struct JobManager {
    jobs: HashMap<JobId, Job>,
    timers: HashMap<JobId, DropGuard>,
    storage: Arc<dyn JobStorage>,
    worker: Arc<dyn JobWorker>,
    sender: mpsc::WeakSender<JobManagerMessage>,
    cancellation_token: CancellationToken,
}

impl JobManager {
    /// Loads the job table, re-arms every scheduled job (overdue ones fire
    /// right away) and starts the manager task.
    pub async fn start(
        storage: Arc<dyn JobStorage>,
        worker: Arc<dyn JobWorker>,
        cancellation_token: CancellationToken,
    ) -> anyhow::Result<(JobManagerHandle, JoinHandle<()>)> {
        let jobs = storage.get_all().await?;
        let (sender, receiver) = mpsc::channel(MAILBOX_SIZE);

        let mut manager = JobManager {
            jobs: HashMap::new(),
            timers: HashMap::new(),
            storage,
            worker,
            sender: sender.downgrade(),
            cancellation_token,
        };
        for job in jobs {
            if job.state == JobState::Scheduled {
                manager.arm(&job);
            }
            manager.jobs.insert(job.id.clone(), job);
        }
        log::info!(
            "[RUNNER] Job table loaded. [jobs = {}, armed = {}]",
            manager.jobs.len(),
            manager.timers.len()
        );

        let task = tokio::spawn(manager.handle_messages(receiver));
        Ok((JobManagerHandle { sender }, task))
    }

    async fn handle_messages(mut self, mut receiver: mpsc::Receiver<JobManagerMessage>) {
        loop {
            let message = tokio::select! {
                _ = self.cancellation_token.cancelled() => break,
                message = receiver.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            self.handle_message(message).await;
        }

        self.timers.clear();
        log::info!("[RUNNER] Job manager stopped.");
    }

    async fn handle_message(&mut self, message: JobManagerMessage) {
        match message {
            JobManagerMessage::Create { request, reply } => {
                let _ = reply.send(self.create(request).await);
            }
            JobManagerMessage::Update { id, request, reply } => {
                let _ = reply.send(self.update(&id, request).await);
            }
            JobManagerMessage::Pause { id, reply } => {
                let _ = reply.send(self.set_paused(&id, true).await);
            }
            JobManagerMessage::Resume { id, reply } => {
                let _ = reply.send(self.set_paused(&id, false).await);
            }
            JobManagerMessage::Delete { id, reply } => {
                let _ = reply.send(self.delete(&id).await);
            }
            JobManagerMessage::List { reply } => {
                let _ = reply.send(Ok(self.list()));
            }
            JobManagerMessage::Due { id, run_at } => self.fire(&id, run_at).await,
        }
    }

    async fn create(&mut self, request: CreateJobRequest) -> Result<JobResponse, JobError> {
        let id = request
            .id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if self.jobs.contains_key(&id) {
            return Err(JobError::AlreadyExists(id));
        }

        let job = Job {
            id,
            run_at: request.run_at,
            state: JobState::Scheduled,
            callback_url: request.callback_url,
            args: request.args,
        };
        let response = job.response();
        self.commit(job).await?;

        log::info!(
            "[RUNNER] Job created. [job_id = {}, run_at = {}]",
            response.id,
            response.run_at
        );
        Ok(response)
    }

    async fn update(&mut self, id: &str, request: UpdateJobRequest) -> Result<JobResponse, JobError> {
        let job = self.live(id)?.with_update(request);
        let response = job.response();
        log::info!(
            "[RUNNER] Job updated. [job_id = {}, run_at = {}, state = {}]",
            job.id,
            job.run_at,
            job.state
        );
        self.commit(job).await?;
        Ok(response)
    }

    async fn set_paused(&mut self, id: &str, paused: bool) -> Result<JobSummary, JobError> {
        let current = self.live(id)?;
        let next_state = match (current.state, paused) {
            (JobState::Scheduled, true) => JobState::Paused,
            (JobState::Paused, false) => JobState::Scheduled,
            _ => return Ok(current.summary()),
        };

        let mut job = current.clone();
        job.state = next_state;
        let summary = job.summary();
        log::info!("[RUNNER] Job {}. [job_id = {}]", next_state, job.id);
        self.commit(job).await?;
        Ok(summary)
    }

    async fn delete(&mut self, id: &str) -> Result<JobDeleted, JobError> {
        let job = match self.jobs.get(id) {
            None => return Err(JobError::NotFound(id.to_owned())),
            Some(job) if job.is_deleted() => return Ok(job.deleted(false)),
            Some(job) => job,
        };

        let mut tombstone = job.clone();
        tombstone.state = JobState::Deleted;
        let deleted = tombstone.deleted(true);
        self.commit(tombstone).await?;

        log::info!("[RUNNER] Job deleted. [job_id = {}]", id);
        Ok(deleted)
    }

    fn list(&self) -> Vec<JobSummary> {
        let mut jobs: Vec<JobSummary> = self
            .jobs
            .values()
            .filter(|job| !job.is_deleted())
            .map(Job::summary)
            .collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }

    async fn fire(&mut self, id: &str, run_at: DateTime<Utc>) {
        let Some(job) = self.jobs.get(id) else {
            return;
        };
        if job.state != JobState::Scheduled || job.run_at != run_at {
            log::debug!("[FIRE] Ignoring stale timer. [job_id = {}, run_at = {}]", id, run_at);
            return;
        }

        let mut fired = job.clone();
        fired.state = JobState::Fired;
        self.timers.remove(id);
        if let Err(err) = self.storage.save(&fired).await {
            log::error!("[FIRE] Could not persist fired job. [job_id = {}, error = {:#}]", id, err);
        }
        self.jobs.insert(fired.id.clone(), fired.clone());

        log::info!("[FIRE] Job is due. [job_id = {}, run_at = {}]", id, run_at);
        let worker = self.worker.clone();
        tokio::spawn(async move {
            match worker.handle_job(&fired).await {
                Ok(()) => log::info!("[FIRE] Callback delivered. [job_id = {}]", fired.id),
                Err(err) => log::error!(
                    "[FIRE] Callback failed. [job_id = {}, error = {:#}]",
                    fired.id,
                    err
                ),
            }
        });
    }

    fn live(&self, id: &str) -> Result<&Job, JobError> {
        self.jobs
            .get(id)
            .filter(|job| !job.is_deleted())
            .ok_or_else(|| JobError::NotFound(id.to_owned()))
    }

    /// Persists first; memory and timers only change once the row is saved.
    async fn commit(&mut self, job: Job) -> Result<(), JobError> {
        self.storage.save(&job).await?;

        if job.state == JobState::Scheduled {
            self.arm(&job);
        } else {
            self.timers.remove(&job.id);
        }
        self.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    fn arm(&mut self, job: &Job) {
        let Some(sender) = self.sender.upgrade() else {
            return;
        };

        let cancellation_token = self.cancellation_token.child_token();
        let task_cancellation_token = cancellation_token.clone();
        let delay = (job.run_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let id = job.id.clone();
        let run_at = job.run_at;

        tokio::spawn(async move {
            tokio::select! {
                _ = task_cancellation_token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = sender.send(JobManagerMessage::Due { id, run_at }).await;
                }
            }
        });

        // Replacing the guard cancels the previous timer of this job.
        self.timers
            .insert(job.id.clone(), cancellation_token.drop_guard());
    }
}
