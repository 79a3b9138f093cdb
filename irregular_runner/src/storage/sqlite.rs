use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use super::JobStorage;
use crate::job::{Job, JobState};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY NOT NULL,
    run_at TEXT NOT NULL,
    state TEXT NOT NULL,
    callback_url TEXT NOT NULL,
    args TEXT NOT NULL
);
";

/// Opens the job database and creates the table if needed. In-memory
/// databases get a single connection that is never recycled.
pub async fn connect(url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let mut pool_options = SqlitePoolOptions::new();
    if url.contains(":memory:") || url.contains("mode=memory") {
        pool_options = pool_options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }

    let pool = pool_options.connect_with(options).await?;
    sqlx::raw_sql(SCHEMA).execute(&pool).await?;
    Ok(pool)
}

#[derive(Debug, sqlx::FromRow)]
struct JobStorageModel {
    id: String,
    run_at: DateTime<Utc>,
    state: String,
    callback_url: String,
    args: String,
}

impl TryFrom<JobStorageModel> for Job {
    type Error = anyhow::Error;

    fn try_from(value: JobStorageModel) -> Result<Self, Self::Error> {
        let state = JobState::from_str(&value.state)
            .map_err(|reason| anyhow::anyhow!("job {}: {}", value.id, reason))?;
        let args = serde_json::from_str(&value.args)
            .with_context(|| format!("job {} has unreadable args", value.id))?;

        Ok(Job {
            id: value.id,
            run_at: value.run_at,
            state,
            callback_url: value.callback_url,
            args,
        })
    }
}

pub struct SqliteJobStorage {
    pool: SqlitePool,
}

impl SqliteJobStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStorage for SqliteJobStorage {
    async fn get_all(&self) -> anyhow::Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobStorageModel>("SELECT * FROM jobs ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn save(&self, job: &Job) -> anyhow::Result<()> {
        let args = serde_json::to_string(&job.args)?;
        sqlx::query(
            "
INSERT INTO jobs (id, run_at, state, callback_url, args)
VALUES (?, ?, ?, ?, ?)
ON CONFLICT (id) DO UPDATE SET
    run_at = excluded.run_at,
    state = excluded.state,
    callback_url = excluded.callback_url,
    args = excluded.args
",
        )
        .bind(&job.id)
        .bind(job.run_at)
        .bind(job.state.as_str())
        .bind(&job.callback_url)
        .bind(args)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
