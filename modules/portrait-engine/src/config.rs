use std::time::Duration;

use anyhow::{Context, Result};

/// Knobs the engine itself needs. Independent of where they came from.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Budget for a single liveness probe.
    pub liveness_timeout: Duration,
    /// Budget for every record-store and blob-store call.
    pub io_timeout: Duration,
    /// Probes in flight at once while vetting one stage's candidates.
    pub probe_concurrency: usize,
    /// People processed at once by the batch orchestrator.
    pub batch_concurrency: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            liveness_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(15),
            probe_concurrency: 4,
            batch_concurrency: 4,
        }
    }
}

/// Process configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct PortraitConfig {
    // Record store
    pub database_url: String,

    // Blob store
    pub storage_url: String,
    pub storage_service_key: String,
    pub storage_bucket: String,

    // Web server
    pub web_host: String,
    pub web_port: u16,

    pub engine: EngineSettings,
}

impl PortraitConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = EngineSettings::default();
        let config = Self {
            database_url: required_env("DATABASE_URL")?,
            storage_url: required_env("STORAGE_URL")?,
            storage_service_key: required_env("STORAGE_SERVICE_KEY")?,
            storage_bucket: std::env::var("STORAGE_BUCKET")
                .unwrap_or_else(|_| "avatars".to_string()),
            web_host: std::env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: parse_env("WEB_PORT", 3000)?,
            engine: EngineSettings {
                liveness_timeout: Duration::from_secs(parse_env(
                    "LIVENESS_TIMEOUT_SECS",
                    defaults.liveness_timeout.as_secs(),
                )?),
                io_timeout: Duration::from_secs(parse_env(
                    "IO_TIMEOUT_SECS",
                    defaults.io_timeout.as_secs(),
                )?),
                probe_concurrency: parse_env("PROBE_CONCURRENCY", defaults.probe_concurrency)?
                    .max(1),
                batch_concurrency: parse_env("BATCH_CONCURRENCY", defaults.batch_concurrency)?
                    .max(1),
            },
        };

        config.log_keys();
        Ok(config)
    }

    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            let head: String = val.chars().take(5).collect();
            format!("{}...({} chars)", head, val.len())
        }

        tracing::info!("Config loaded:");
        tracing::info!("  STORAGE_URL: {}", self.storage_url);
        tracing::info!("  STORAGE_BUCKET: {}", self.storage_bucket);
        tracing::info!("  STORAGE_SERVICE_KEY: {}", preview(&self.storage_service_key));
        tracing::info!(
            liveness_timeout_secs = self.engine.liveness_timeout.as_secs(),
            io_timeout_secs = self.engine.io_timeout.as_secs(),
            probe_concurrency = self.engine.probe_concurrency,
            batch_concurrency = self.engine.batch_concurrency,
            "  Engine settings"
        );
    }
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("{key} environment variable is required"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a valid value, got {raw:?}")),
        Err(_) => Ok(default),
    }
}
