use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use irregular_models::job::{JobArgs, JobDeleted, JobId, JobResponse, JobSummary, UpdateJobRequest};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Scheduled,
    Paused,
    Fired,
    /// Tombstone. The id stays taken forever.
    Deleted,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Scheduled => "scheduled",
            JobState::Paused => "paused",
            JobState::Fired => "fired",
            JobState::Deleted => "deleted",
        }
    }
}

impl Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(JobState::Scheduled),
            "paused" => Ok(JobState::Paused),
            "fired" => Ok(JobState::Fired),
            "deleted" => Ok(JobState::Deleted),
            other => Err(format!("unknown job state '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub run_at: DateTime<Utc>,
    pub state: JobState,
    pub callback_url: String,
    pub args: JobArgs,
}

impl Job {
    pub fn next_run_time(&self) -> Option<DateTime<Utc>> {
        (self.state == JobState::Scheduled).then_some(self.run_at)
    }

    pub fn is_deleted(&self) -> bool {
        self.state == JobState::Deleted
    }

    /// Applies a PATCH. A new `run_at` re-arms a job that already fired; a
    /// paused job stays paused.
    pub fn with_update(&self, request: UpdateJobRequest) -> Job {
        let mut job = self.clone();
        if let Some(args) = request.args {
            job.args = args;
        }
        if let Some(run_at) = request.run_at {
            job.run_at = run_at;
            if job.state == JobState::Fired {
                job.state = JobState::Scheduled;
            }
        }
        job
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id.clone(),
            next_run_time: self.next_run_time(),
        }
    }

    pub fn response(&self) -> JobResponse {
        JobResponse {
            id: self.id.clone(),
            run_at: self.run_at,
        }
    }

    pub fn deleted(&self, deleted: bool) -> JobDeleted {
        JobDeleted {
            id: self.id.clone(),
            deleted,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn job(state: JobState) -> Job {
        Job {
            id: "job".to_owned(),
            run_at: Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap(),
            state,
            callback_url: "http://service/v1/deliveries".to_owned(),
            args: JobArgs {
                device_id: "phone".to_owned(),
                title: "Water".to_owned(),
                message: String::new(),
            },
        }
    }

    #[test]
    fn only_scheduled_jobs_have_a_next_run_time() {
        assert!(job(JobState::Scheduled).next_run_time().is_some());
        assert_eq!(job(JobState::Paused).next_run_time(), None);
        assert_eq!(job(JobState::Fired).next_run_time(), None);
        assert_eq!(job(JobState::Deleted).next_run_time(), None);
    }

    #[test]
    fn new_run_at_rearms_a_fired_job() {
        let run_at = Utc.with_ymd_and_hms(2025, 1, 7, 9, 0, 0).unwrap();
        let request = UpdateJobRequest {
            run_at: Some(run_at),
            args: None,
        };

        let rearmed = job(JobState::Fired).with_update(request.clone());
        assert_eq!(rearmed.state, JobState::Scheduled);
        assert_eq!(rearmed.next_run_time(), Some(run_at));

        let paused = job(JobState::Paused).with_update(request);
        assert_eq!(paused.state, JobState::Paused);
        assert_eq!(paused.run_at, run_at);
    }

    #[test]
    fn args_only_update_keeps_the_state() {
        let mut args = job(JobState::Fired).args;
        args.title = "Walk".to_owned();
        let updated = job(JobState::Fired).with_update(UpdateJobRequest {
            run_at: None,
            args: Some(args),
        });

        assert_eq!(updated.state, JobState::Fired);
        assert_eq!(updated.args.title, "Walk");
    }

    #[test]
    fn state_names_parse_back() {
        for state in [
            JobState::Scheduled,
            JobState::Paused,
            JobState::Fired,
            JobState::Deleted,
        ] {
            assert_eq!(state.as_str().parse::<JobState>(), Ok(state));
        }
        assert!("armed".parse::<JobState>().is_err());
    }
}
