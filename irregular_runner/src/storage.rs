mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use irregular_models::job::JobId;
use tokio::sync::RwLock;

use crate::job::Job;

pub use sqlite::{SqliteJobStorage, connect};

/// Durable job table. Tombstoned jobs are kept so their ids stay taken.
#[async_trait]
pub trait JobStorage: Send + Sync {
    async fn get_all(&self) -> anyhow::Result<Vec<Job>>;
    /// Inserts or replaces the row with the job's id.
    async fn save(&self, job: &Job) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct InMemoryJobStorage {
    store: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStorage for InMemoryJobStorage {
    async fn get_all(&self) -> anyhow::Result<Vec<Job>> {
        let store = self.store.read().await;
        let mut jobs: Vec<Job> = store.values().cloned().collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(jobs)
    }

    async fn save(&self, job: &Job) -> anyhow::Result<()> {
        self.store.write().await.insert(job.id.clone(), job.clone());
        Ok(())
    }
}
