//! Configuration resolution
//!
//! TOML file with environment-variable overrides; ENV wins over TOML,
//! TOML over defaults. Secrets (LLM key, mailbox token) are normally
//! supplied through the environment.

use fxrecon_common::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

const DEFAULT_PORT: u16 = 5830;
const DEFAULT_DATABASE_PATH: &str = "fxrecon.db";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EngineConfig {
    /// HTTP listen port
    #[serde(default)]
    pub port: Option<u16>,

    /// SQLite database path
    #[serde(default)]
    pub database_path: Option<String>,

    /// LLM provider credentials
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub openai_base_url: Option<String>,
    #[serde(default)]
    pub openai_model: Option<String>,

    /// Mailbox access token; polling is disabled when absent
    #[serde(default)]
    pub gmail_access_token: Option<String>,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,

    /// Bearer token required on the event stream
    #[serde(default)]
    pub stream_token: Option<String>,

    /// Base URL task callbacks are delivered to; defaults to the
    /// engine's own listen address
    #[serde(default)]
    pub callback_base: Option<String>,
}

impl EngineConfig {
    /// Load from a TOML file (missing file is an empty config), then
    /// apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            let parsed: EngineConfig = toml::from_str(&raw)
                .map_err(|e| Error::Config(format!("invalid config file {path:?}: {e}")))?;
            info!(?path, "configuration loaded");
            parsed
        } else {
            warn!(?path, "config file not found, using defaults");
            EngineConfig::default()
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(port) = std::env::var("FXRECON_PORT") {
            match port.parse() {
                Ok(p) => self.port = Some(p),
                Err(_) => warn!(port, "ignoring unparseable FXRECON_PORT"),
            }
        }
        for (var, slot) in [
            ("FXRECON_DATABASE_PATH", &mut self.database_path),
            ("FXRECON_OPENAI_API_KEY", &mut self.openai_api_key),
            ("FXRECON_OPENAI_BASE_URL", &mut self.openai_base_url),
            ("FXRECON_OPENAI_MODEL", &mut self.openai_model),
            ("FXRECON_GMAIL_ACCESS_TOKEN", &mut self.gmail_access_token),
            ("FXRECON_STREAM_TOKEN", &mut self.stream_token),
            ("FXRECON_CALLBACK_BASE", &mut self.callback_base),
        ] {
            if let Ok(value) = std::env::var(var) {
                if !value.trim().is_empty() {
                    *slot = Some(value);
                }
            }
        }
        if let Ok(interval) = std::env::var("FXRECON_POLL_INTERVAL_SECS") {
            match interval.parse() {
                Ok(secs) => self.poll_interval_secs = Some(secs),
                Err(_) => warn!(interval, "ignoring unparseable FXRECON_POLL_INTERVAL_SECS"),
            }
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn database_path(&self) -> &str {
        self.database_path
            .as_deref()
            .unwrap_or(DEFAULT_DATABASE_PATH)
    }

    pub fn poll_interval_secs(&self) -> u64 {
        self.poll_interval_secs
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS)
    }

    pub fn callback_base(&self) -> String {
        self.callback_base
            .clone()
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", self.port()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.port(), DEFAULT_PORT);
        assert_eq!(config.database_path(), DEFAULT_DATABASE_PATH);
        assert_eq!(config.poll_interval_secs(), DEFAULT_POLL_INTERVAL_SECS);
        assert_eq!(config.callback_base(), format!("http://127.0.0.1:{DEFAULT_PORT}"));
    }

    #[test]
    fn toml_values_are_read() {
        let config: EngineConfig = toml::from_str(
            r#"
            port = 8080
            database_path = "/var/lib/fxrecon/fxrecon.db"
            poll_interval_secs = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.port(), 8080);
        assert_eq!(config.database_path(), "/var/lib/fxrecon/fxrecon.db");
        assert_eq!(config.poll_interval_secs(), 10);
    }
}
