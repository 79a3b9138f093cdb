use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RunnerSettings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    #[serde(default = "default_callback_timeout_secs")]
    pub callback_timeout_secs: u64,
}

fn default_callback_timeout_secs() -> u64 {
    10
}

impl RunnerSettings {
    /// `runner` file, optional `runner.local`, then `RUNNER__SECTION__KEY`
    /// environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("runner").required(true))
            .add_source(File::with_name("runner.local").required(false))
            .add_source(Environment::with_prefix("RUNNER").separator("__"))
            .build()?;

        settings.try_deserialize()
    }
}
