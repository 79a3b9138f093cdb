use std::time::Duration;

use async_trait::async_trait;
use irregular_models::job::{
    CreateJobRequest, JobDeleted, JobId, JobResponse, JobSummary, UpdateJobRequest,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub const DEFAULT_RUNNER_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("runner request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("runner has no job {0}")]
    NotFound(JobId),

    #[error("runner answered {status}: {body}")]
    Status { status: u16, body: String },
}

/// Job CRUD against the runner process.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn create_job(&self, request: CreateJobRequest) -> Result<JobResponse, RunnerError>;
    async fn update_job(
        &self,
        id: &str,
        request: UpdateJobRequest,
    ) -> Result<JobResponse, RunnerError>;
    async fn pause_job(&self, id: &str) -> Result<JobSummary, RunnerError>;
    async fn resume_job(&self, id: &str) -> Result<JobSummary, RunnerError>;
    /// `Ok(false)` when the runner never had the job.
    async fn delete_job(&self, id: &str) -> Result<bool, RunnerError>;
    async fn list_jobs(&self) -> Result<Vec<JobSummary>, RunnerError>;
}

pub struct HttpJobRunner {
    client: reqwest::Client,
    base_url: String,
}

impl HttpJobRunner {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RunnerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn decode<T: DeserializeOwned>(id: &str, response: reqwest::Response) -> Result<T, RunnerError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(RunnerError::NotFound(id.to_owned()));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RunnerError::Status {
            status: status.as_u16(),
            body,
        });
    }

    Ok(response.json().await?)
}

#[async_trait]
impl JobRunner for HttpJobRunner {
    async fn create_job(&self, request: CreateJobRequest) -> Result<JobResponse, RunnerError> {
        let id = request.id.clone().unwrap_or_default();
        let response = self.client.post(self.url("/jobs")).json(&request).send().await?;
        decode(&id, response).await
    }

    async fn update_job(
        &self,
        id: &str,
        request: UpdateJobRequest,
    ) -> Result<JobResponse, RunnerError> {
        let response = self
            .client
            .patch(self.url(&format!("/jobs/{id}")))
            .json(&request)
            .send()
            .await?;
        decode(id, response).await
    }

    async fn pause_job(&self, id: &str) -> Result<JobSummary, RunnerError> {
        let response = self
            .client
            .post(self.url(&format!("/jobs/{id}/pause")))
            .send()
            .await?;
        decode(id, response).await
    }

    async fn resume_job(&self, id: &str) -> Result<JobSummary, RunnerError> {
        let response = self
            .client
            .post(self.url(&format!("/jobs/{id}/resume")))
            .send()
            .await?;
        decode(id, response).await
    }

    async fn delete_job(&self, id: &str) -> Result<bool, RunnerError> {
        let response = self
            .client
            .delete(self.url(&format!("/jobs/{id}")))
            .send()
            .await?;

        match decode::<JobDeleted>(id, response).await {
            Ok(deleted) => Ok(deleted.deleted),
            Err(RunnerError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn list_jobs(&self) -> Result<Vec<JobSummary>, RunnerError> {
        let response = self.client.get(self.url("/jobs")).send().await?;
        decode("", response).await
    }
}
