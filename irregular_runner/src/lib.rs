//! Standalone job runner: keeps a durable table of one-shot jobs and POSTs
//! each job's callback when its `run_at` arrives.

mod error;
pub mod http;
pub mod job;
pub mod manager;
pub mod settings;
pub mod storage;
pub mod worker;

pub use error::JobError;
pub use job::{Job, JobState};
pub use manager::{JobManager, JobManagerHandle};
pub use storage::{InMemoryJobStorage, JobStorage, SqliteJobStorage};
pub use worker::{CallbackWorker, JobWorker};
