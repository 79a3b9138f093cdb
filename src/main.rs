use std::sync::Arc;

use anyhow::Context;
use irregular::{api, appsettings::AppSettings};
use irregular_scheduler::{
    HttpJobRunner, JobSynchronizer, LogDeliveryChannel, ReminderService, ReminderWatcher,
    SystemClock, spawn_reconciler,
};
use irregular_storage::{SqliteReminderStorage, sqlite};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    pretty_env_logger::init();

    let settings = AppSettings::load().context("could not load appsettings")?;
    log::info!("[APP] Starting. [settings = {:?}]", settings);

    let pool = sqlite::connect(&settings.database.url)
        .await
        .with_context(|| format!("could not open {}", settings.database.url))?;
    let storage = Arc::new(SqliteReminderStorage::new(pool));
    let clock = Arc::new(SystemClock::new(settings.scheduler.timezone()?));
    let runner = Arc::new(HttpJobRunner::new(
        settings.runner.base_url.clone(),
        settings.runner.timeout(),
    )?);
    let synchronizer = JobSynchronizer::new(runner, clock.clone(), settings.callback_url.clone());
    let service = Arc::new(ReminderService::new(
        storage,
        synchronizer,
        Arc::new(LogDeliveryChannel),
        clock,
    ));

    let cancellation_token = CancellationToken::new();
    let watcher = if settings.scheduler.watcher_enabled {
        Some(ReminderWatcher::spawn(service.clone(), cancellation_token.clone())?)
    } else {
        log::info!("[WATCHER] Disabled, the runner callback is the only trigger.");
        None
    };
    let reconciler = spawn_reconciler(
        service.clone(),
        settings.scheduler.reconcile_interval(),
        cancellation_token.clone(),
    );

    let address = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("could not bind {address}"))?;
    log::info!("[APP] Listening. [address = {}]", address);

    let shutdown = cancellation_token.clone();
    axum::serve(listener, api::router(service))
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("[APP] Shutting down.");
            shutdown.cancel();
        })
        .await?;

    cancellation_token.cancel();
    if let Some(watcher) = watcher {
        watcher.await?;
    }
    reconciler.await?;
    Ok(())
}
