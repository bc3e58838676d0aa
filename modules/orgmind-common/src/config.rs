use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

pub const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";

/// Inputs the engine reads at run start. Never mutated while a run is active.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// JSON Lines file, one record per line.
    pub source_path: PathBuf,
    /// Max records loaded per run, regardless of source size.
    pub record_limit: usize,
    pub batch_interval: Duration,
    pub batch_size: usize,
    /// Per capability call. `None` waits indefinitely.
    pub stage_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from("data/messages.jsonl"),
            record_limit: 100,
            batch_interval: Duration::from_secs(15),
            batch_size: 10,
            stage_timeout: Some(Duration::from_secs(120)),
        }
    }
}

/// Application configuration loaded from environment variables (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub engine: EngineConfig,

    // AI provider
    pub anthropic_api_key: String,
    pub model: String,

    // Web server
    pub web_host: String,
    pub web_port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = EngineConfig::default();
        let stage_timeout_secs = parsed_env("ORGMIND_STAGE_TIMEOUT_SECS", 120u64);

        Self {
            engine: EngineConfig {
                source_path: env::var("ORGMIND_SOURCE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.source_path),
                record_limit: parsed_env("ORGMIND_RECORD_LIMIT", defaults.record_limit),
                batch_interval: Duration::from_secs(parsed_env(
                    "ORGMIND_BATCH_INTERVAL_SECS",
                    defaults.batch_interval.as_secs(),
                )),
                batch_size: parsed_env("ORGMIND_BATCH_SIZE", defaults.batch_size).max(1),
                stage_timeout: (stage_timeout_secs > 0)
                    .then(|| Duration::from_secs(stage_timeout_secs)),
            },
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            model: env::var("ORGMIND_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: parsed_env("WEB_PORT", 3000),
        }
    }

    pub fn log_redacted(&self) {
        fn preview(val: &str) -> String {
            if val.is_empty() {
                return "<not set>".to_string();
            }
            let n = val.len().min(5);
            format!("{}...({} chars)", &val[..n], val.len())
        }

        info!("Config loaded:");
        info!("  ORGMIND_SOURCE_PATH: {}", self.engine.source_path.display());
        info!("  ORGMIND_RECORD_LIMIT: {}", self.engine.record_limit);
        info!("  ORGMIND_BATCH_INTERVAL_SECS: {}", self.engine.batch_interval.as_secs());
        info!("  ORGMIND_BATCH_SIZE: {}", self.engine.batch_size);
        info!(
            "  ORGMIND_STAGE_TIMEOUT_SECS: {}",
            self.engine.stage_timeout.map(|d| d.as_secs()).unwrap_or(0)
        );
        info!("  ORGMIND_MODEL: {}", self.model);
        info!("  ANTHROPIC_API_KEY: {}", preview(&self.anthropic_api_key));
    }
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = raw.as_str(), "Unparseable config value, using default");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.record_limit, 100);
        assert_eq!(config.stage_timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn parsed_env_falls_back_on_garbage() {
        env::set_var("ORGMIND_TEST_PARSE_GARBAGE", "ten");
        assert_eq!(parsed_env("ORGMIND_TEST_PARSE_GARBAGE", 10usize), 10);
        env::set_var("ORGMIND_TEST_PARSE_OK", " 25 ");
        assert_eq!(parsed_env("ORGMIND_TEST_PARSE_OK", 10usize), 25);
        assert_eq!(parsed_env("ORGMIND_TEST_PARSE_MISSING", 7u16), 7);
    }
}
