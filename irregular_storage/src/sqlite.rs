mod reminder_storage;

use std::str::FromStr;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

pub use reminder_storage::SqliteReminderStorage;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS reminders (
    id TEXT PRIMARY KEY NOT NULL,
    version INTEGER NOT NULL,
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    work_hours_start TEXT,
    work_hours_end TEXT,
    work_days TEXT NOT NULL,
    min_time TEXT,
    max_time TEXT,
    dist TEXT NOT NULL,
    dist_params TEXT NOT NULL,
    repeat BOOLEAN NOT NULL,
    spacing_min TEXT,
    spacing_max TEXT,
    alive BOOLEAN NOT NULL,
    last_trigger_time TEXT,
    next_trigger_time TEXT NOT NULL,
    device_id TEXT NOT NULL,
    job_id TEXT
);
CREATE INDEX IF NOT EXISTS reminders_alive_next ON reminders (alive, next_trigger_time);
CREATE INDEX IF NOT EXISTS reminders_device ON reminders (device_id);
";

/// Opens the pool and makes sure the schema exists.
///
/// In-memory databases live as long as their connection, so they get a single
/// connection that is never recycled.
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
    migrate(&pool).await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}
