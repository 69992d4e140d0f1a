use std::env;
use thiserror::Error;
use tokio::time::Duration;
use tracing::info;

use crate::client::ClientConfig;
use crate::run::RunnerSettings;
use crate::utils::{parse_bool_flag, parse_duration_string};

/// Environment configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must start with http:// or https://, got '{value}'")]
    InvalidUrl { var: &'static str, value: String },

    #[error("{var} is not a valid port: '{value}'")]
    InvalidPort { var: &'static str, value: String },

    #[error("Invalid {var} format: '{value}'. {message}")]
    InvalidDuration {
        var: &'static str,
        value: String,
        message: String,
    },

    #[error("{var} must be greater than zero")]
    ZeroDuration { var: &'static str },
}

/// Process-level configuration for the load tester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub target_url: String,
    pub port: u16,
    pub request_timeout: Duration,
    pub client_timeout: Duration,
    pub drain_timeout: Duration,
    pub skip_tls_verify: bool,
    pub custom_headers: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_url: "http://localhost:8000".to_string(),
            port: 3006,
            request_timeout: Duration::from_secs(5),
            client_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(5),
            skip_tls_verify: false,
            custom_headers: None,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let target_url = env_or("TARGET_URL", &defaults.target_url);
        if !(target_url.starts_with("http://") || target_url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl {
                var: "TARGET_URL",
                value: target_url,
            });
        }

        let port = match env_nonempty("PORT") {
            Some(value) => value.trim().parse::<u16>().map_err(|_| ConfigError::InvalidPort {
                var: "PORT",
                value: value.clone(),
            })?,
            None => defaults.port,
        };

        let request_timeout = duration_var("REQUEST_TIMEOUT", defaults.request_timeout)?;
        let client_timeout = duration_var("CLIENT_TIMEOUT", defaults.client_timeout)?;
        let drain_timeout = duration_var("DRAIN_TIMEOUT", defaults.drain_timeout)?;

        let skip_tls_verify = env_nonempty("SKIP_TLS_VERIFY")
            .map(|v| parse_bool_flag(&v))
            .unwrap_or(defaults.skip_tls_verify);

        let custom_headers = env_nonempty("CUSTOM_HEADERS");

        Ok(EngineConfig {
            target_url,
            port,
            request_timeout,
            client_timeout,
            drain_timeout,
            skip_tls_verify,
            custom_headers,
        })
    }

    /// Creates a ClientConfig from this Config.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: self.client_timeout,
            skip_tls_verify: self.skip_tls_verify,
            custom_headers: self.custom_headers.clone(),
        }
    }

    /// Timing settings for the [`LoadRunner`](crate::run::LoadRunner).
    pub fn to_runner_settings(&self) -> RunnerSettings {
        RunnerSettings {
            request_timeout: self.request_timeout,
            drain_timeout: self.drain_timeout,
            ..RunnerSettings::default()
        }
    }

    /// Logs the configuration summary.
    pub fn log_summary(&self) {
        info!(
            target_url = %self.target_url,
            port = self.port,
            request_timeout_ms = self.request_timeout.as_millis() as u64,
            client_timeout_ms = self.client_timeout.as_millis() as u64,
            drain_timeout_ms = self.drain_timeout.as_millis() as u64,
            skip_tls_verify = self.skip_tls_verify,
            custom_headers = self.custom_headers.is_some(),
            "Load tester configuration"
        );
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_nonempty(key).unwrap_or_else(|| default.to_string())
}

fn duration_var(var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    let value = match env_nonempty(var) {
        Some(v) => v,
        None => return Ok(default),
    };
    let duration =
        parse_duration_string(&value).map_err(|message| ConfigError::InvalidDuration {
            var,
            value: value.clone(),
            message,
        })?;
    if duration.is_zero() {
        return Err(ConfigError::ZeroDuration { var });
    }
    Ok(duration)
}

/// Prints helpful configuration documentation.
pub fn print_config_help() {
    eprintln!("Optional environment variables:");
    eprintln!("  TARGET_URL              - Base URL of the service under test (default: http://localhost:8000)");
    eprintln!("  PORT                    - Control surface port (default: 3006)");
    eprintln!("  REQUEST_TIMEOUT         - Per-request timeout: 500ms, 5s (default: 5s)");
    eprintln!("  CLIENT_TIMEOUT          - HTTP client timeout (default: 10s)");
    eprintln!("  DRAIN_TIMEOUT           - Wait for in-flight requests on stop (default: 5s)");
    eprintln!("  SKIP_TLS_VERIFY         - Skip TLS certificate verification (default: false)");
    eprintln!("  CUSTOM_HEADERS          - Comma-separated headers (use \\, for literal commas)");
    eprintln!("  METRIC_NAMESPACE        - Prometheus metric namespace (default: shelter_loadtest)");
    eprintln!("  LOG_FORMAT              - 'json' for JSON logs (default: text)");
    eprintln!("  RUST_LOG                - Log filter (default: info)");
}
