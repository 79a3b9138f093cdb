use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use irregular_models::job::{JobDeleted, JobResponse, JobSummary};
use irregular_runner::{InMemoryJobStorage, Job, JobManager, JobWorker, http};
use reqwest::StatusCode;
use serde_json::json;
use tokio_util::sync::CancellationToken;

struct IdleWorker;

#[async_trait]
impl JobWorker for IdleWorker {
    async fn handle_job(&self, _job: &Job) -> anyhow::Result<()> {
        Ok(())
    }
}

struct TestRunner {
    base_url: String,
    client: reqwest::Client,
    cancellation_token: CancellationToken,
}

impl Drop for TestRunner {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}

async fn spawn_runner() -> TestRunner {
    let cancellation_token = CancellationToken::new();
    let (manager, _task) = JobManager::start(
        Arc::new(InMemoryJobStorage::new()),
        Arc::new(IdleWorker),
        cancellation_token.clone(),
    )
    .await
    .unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let shutdown = cancellation_token.clone();
    tokio::spawn(async move {
        axum::serve(listener, http::router(manager))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .unwrap();
    });

    TestRunner {
        base_url: format!("http://{address}"),
        client: reqwest::Client::new(),
        cancellation_token,
    }
}

impl TestRunner {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn create(&self, id: &str) -> reqwest::Response {
        let run_at = Utc::now() + TimeDelta::hours(1);
        self.client
            .post(self.url("/jobs"))
            .json(&json!({
                "id": id,
                "callback_url": "http://127.0.0.1:9/v1/deliveries",
                "args": {"device_id": "phone", "title": "Water", "message": ""},
                "run_at": run_at,
            }))
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn health_answers() {
    let runner = spawn_runner().await;
    let response = runner.client.get(runner.url("/")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn job_lifecycle_over_http() {
    let runner = spawn_runner().await;

    let response = runner.create("job-1").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: JobResponse = response.json().await.unwrap();
    assert_eq!(created.id, "job-1");

    let paused: JobSummary = runner
        .client
        .post(runner.url("/jobs/job-1/pause"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(paused.next_run_time, None);

    let run_at = Utc::now() + TimeDelta::hours(2);
    let updated: JobResponse = runner
        .client
        .patch(runner.url("/jobs/job-1"))
        .json(&json!({ "run_at": run_at }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated.run_at, run_at);

    let resumed: JobSummary = runner
        .client
        .post(runner.url("/jobs/job-1/resume"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resumed.next_run_time, Some(run_at));

    let jobs: Vec<JobSummary> = runner
        .client
        .get(runner.url("/jobs"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(jobs, vec![resumed]);

    let deleted: JobDeleted = runner
        .client
        .delete(runner.url("/jobs/job-1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(deleted.deleted);
}

#[tokio::test]
async fn reused_id_is_a_conflict() {
    let runner = spawn_runner().await;
    assert_eq!(runner.create("job-1").await.status(), StatusCode::CREATED);
    assert_eq!(runner.create("job-1").await.status(), StatusCode::CONFLICT);

    runner
        .client
        .delete(runner.url("/jobs/job-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(runner.create("job-1").await.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let runner = spawn_runner().await;

    let pause = runner
        .client
        .post(runner.url("/jobs/nope/pause"))
        .send()
        .await
        .unwrap();
    assert_eq!(pause.status(), StatusCode::NOT_FOUND);

    let delete = runner
        .client
        .delete(runner.url("/jobs/nope"))
        .send()
        .await
        .unwrap();
    assert_eq!(delete.status(), StatusCode::NOT_FOUND);
}
