use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;

/// Settings shared by every service: where to listen, how many runtime
/// workers to start and the default log filter.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_port() -> u16 {
    8490
}

fn default_workers() -> usize {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            workers: default_workers(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Reads `configuration.{toml,yaml,json}` if present, then `PORT`,
    /// `WORKERS` and `LOG_LEVEL` from the environment (after `.env`).
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()
    }

    fn validate(self) -> Result<Self, AppError> {
        if self.workers == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "WORKERS must be at least 1"
            )));
        }
        Ok(self)
    }
}
