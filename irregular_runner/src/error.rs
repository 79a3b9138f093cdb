use irregular_models::job::JobId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("job {0} does not exist")]
    NotFound(JobId),

    #[error("job id {0} was already used")]
    AlreadyExists(JobId),

    #[error("job storage failed: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("job manager is not running")]
    ManagerStopped,
}
