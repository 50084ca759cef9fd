use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_keepalive_interval_ms() -> u64 {
    10_000
}
fn default_idle_threshold_ms() -> u64 {
    60_000
}

/// Everything the runtime needs to talk to one console server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RuntimeConfig {
    /// Endpoint every request is POSTed to.
    pub base_url: String,
    /// Application identifier sent on every request.
    pub app: String,
    /// Client identifier sent on every request.
    pub client: String,
    /// Pre-fill for the login prompt when the server does not send one.
    #[serde(default)]
    pub default_user: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,
    /// A keepalive tick only polls once the session has been idle this long.
    #[serde(default = "default_idle_threshold_ms")]
    pub idle_threshold_ms: u64,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl RuntimeConfig {
    pub fn new(
        base_url: impl Into<String>,
        app: impl Into<String>,
        client: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            app: app.into(),
            client: client.into(),
            default_user: None,
            request_timeout_ms: default_request_timeout_ms(),
            keepalive_interval_ms: default_keepalive_interval_ms(),
            idle_threshold_ms: default_idle_threshold_ms(),
            log_dir: None,
        }
    }

    /// Builds a config from `OPSDECK_*` environment variables, loading a
    /// `.env` file first when one is present.
    pub fn from_env() -> anyhow::Result<Self> {
        if dotenvy::dotenv().is_ok() {
            info!("loaded environment from .env");
        }
        let base_url = env::var("OPSDECK_URL").context("OPSDECK_URL is not set")?;
        let mut config = Self::new(
            base_url,
            env::var("OPSDECK_APP").unwrap_or_else(|_| "admin".into()),
            env::var("OPSDECK_CLIENT").unwrap_or_else(|_| "desktop".into()),
        );
        config.default_user = env::var("OPSDECK_DEFAULT_USER").ok();
        config.log_dir = env::var("OPSDECK_LOG_DIR").ok().map(PathBuf::from);
        if let Some(ms) = env_ms("OPSDECK_REQUEST_TIMEOUT_MS")? {
            config.request_timeout_ms = ms;
        }
        if let Some(ms) = env_ms("OPSDECK_KEEPALIVE_INTERVAL_MS")? {
            config.keepalive_interval_ms = ms;
        }
        if let Some(ms) = env_ms("OPSDECK_IDLE_THRESHOLD_MS")? {
            config.idle_threshold_ms = ms;
        }
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_millis(self.idle_threshold_ms)
    }
}

fn env_ms(name: &str) -> anyhow::Result<Option<u64>> {
    match env::var(name) {
        Ok(raw) => {
            let ms = raw
                .parse::<u64>()
                .with_context(|| format!("{name} must be an integer millisecond count"))?;
            Ok(Some(ms))
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = RuntimeConfig::new("http://localhost:8080/console", "admin", "desktop");
        assert_eq!(c.request_timeout(), Duration::from_secs(30));
        assert!(c.keepalive_interval() < c.idle_threshold());
    }
}
