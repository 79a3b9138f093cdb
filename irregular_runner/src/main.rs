use std::{sync::Arc, time::Duration};

use anyhow::Context;
use irregular_runner::{
    CallbackWorker, JobManager, SqliteJobStorage, http, settings::RunnerSettings,
    storage::connect,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    pretty_env_logger::init();

    let settings = RunnerSettings::load().context("could not load runner settings")?;
    log::info!("[RUNNER] Starting. [settings = {:?}]", settings);

    let pool = connect(&settings.database.url)
        .await
        .with_context(|| format!("could not open {}", settings.database.url))?;
    let storage = Arc::new(SqliteJobStorage::new(pool));
    let worker = Arc::new(CallbackWorker::new(Duration::from_secs(
        settings.callback_timeout_secs,
    ))?);

    let cancellation_token = CancellationToken::new();
    let (manager, manager_task) =
        JobManager::start(storage, worker, cancellation_token.clone()).await?;

    let address = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("could not bind {address}"))?;
    log::info!("[RUNNER] Listening. [address = {}]", address);

    let shutdown = cancellation_token.clone();
    axum::serve(listener, http::router(manager))
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("[RUNNER] Shutting down.");
            shutdown.cancel();
        })
        .await?;

    cancellation_token.cancel();
    manager_task.await?;
    Ok(())
}
