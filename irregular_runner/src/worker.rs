use std::time::Duration;

use async_trait::async_trait;
use irregular_models::job::DeliveryCallback;

use crate::job::Job;

/// Does whatever a job stands for once its time has come.
#[async_trait]
pub trait JobWorker: Send + Sync + 'static {
    async fn handle_job(&self, job: &Job) -> anyhow::Result<()>;
}

/// POSTs `{job_id, args}` to the job's callback URL.
pub struct CallbackWorker {
    client: reqwest::Client,
}

impl CallbackWorker {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl JobWorker for CallbackWorker {
    async fn handle_job(&self, job: &Job) -> anyhow::Result<()> {
        let callback = DeliveryCallback {
            job_id: job.id.clone(),
            args: job.args.clone(),
        };

        self.client
            .post(&job.callback_url)
            .json(&callback)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}
