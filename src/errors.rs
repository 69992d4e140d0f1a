//! Error types for the load generation engine.
//!
//! Only `StartError` ever reaches a caller. Request failures stay inside the
//! dispatched task: they are classified into an [`ErrorCategory`] for metrics,
//! counted as errors, and never stop the run.

use std::fmt;
use thiserror::Error;

use crate::run::{MAX_RPS, MIN_RPS};

/// Why a run could not be started.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartError {
    #[error("RPS must be between {min} and {max}, got {rps}", min = MIN_RPS, max = MAX_RPS)]
    InvalidConfig { rps: i64 },
}

/// Why a single dispatched request counted as a failure.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("request timed out")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,

    #[error("failed to encode request body: {0}")]
    Body(#[from] serde_json::Error),
}

/// Failure classes used as the `category` label on error metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// 4xx responses
    ClientError,
    /// 5xx responses
    ServerError,
    /// DNS, refused or reset connections
    NetworkError,
    TimeoutError,
    TlsError,
    OtherError,
}

impl ErrorCategory {
    /// Classifies a status code; `None` for 2xx and 3xx.
    pub fn from_status_code(status_code: u16) -> Option<Self> {
        match status_code {
            200..=399 => None,
            400..=499 => Some(ErrorCategory::ClientError),
            500..=599 => Some(ErrorCategory::ServerError),
            _ => Some(ErrorCategory::OtherError),
        }
    }

    pub fn from_reqwest_error(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            return ErrorCategory::TimeoutError;
        }
        if error.is_redirect() {
            return ErrorCategory::ClientError;
        }

        // Handshake failures surface as connect errors, check the message first
        let message = error.to_string().to_ascii_lowercase();
        if ["certificate", "tls", "ssl"]
            .iter()
            .any(|needle| message.contains(needle))
        {
            return ErrorCategory::TlsError;
        }

        if error.is_connect() || error.is_request() || error.is_body() || error.is_decode() {
            ErrorCategory::NetworkError
        } else {
            ErrorCategory::OtherError
        }
    }

    /// Categorize a failed dispatch.
    pub fn from_request_error(error: &RequestError) -> Self {
        match error {
            RequestError::Transport(e) => Self::from_reqwest_error(e),
            RequestError::Status(code) => {
                Self::from_status_code(*code).unwrap_or(ErrorCategory::OtherError)
            }
            RequestError::Timeout => ErrorCategory::TimeoutError,
            RequestError::Cancelled | RequestError::Body(_) => ErrorCategory::OtherError,
        }
    }

    /// Get the Prometheus label for this error category.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::ClientError => "client_error",
            ErrorCategory::ServerError => "server_error",
            ErrorCategory::NetworkError => "network_error",
            ErrorCategory::TimeoutError => "timeout_error",
            ErrorCategory::TlsError => "tls_error",
            ErrorCategory::OtherError => "other_error",
        }
    }

    /// Get a human-readable description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCategory::ClientError => "HTTP 4xx Client Errors",
            ErrorCategory::ServerError => "HTTP 5xx Server Errors",
            ErrorCategory::NetworkError => "Network/Connection Errors",
            ErrorCategory::TimeoutError => "Request Timeout Errors",
            ErrorCategory::TlsError => "TLS/SSL Certificate Errors",
            ErrorCategory::OtherError => "Other/Unknown Errors",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_and_redirect_codes_are_not_errors() {
        for code in [200, 201, 204, 301, 302, 304, 399] {
            assert_eq!(ErrorCategory::from_status_code(code), None, "code {}", code);
        }
    }

    #[test]
    fn error_codes_are_categorized() {
        assert_eq!(
            ErrorCategory::from_status_code(400),
            Some(ErrorCategory::ClientError)
        );
        assert_eq!(
            ErrorCategory::from_status_code(429),
            Some(ErrorCategory::ClientError)
        );
        assert_eq!(
            ErrorCategory::from_status_code(503),
            Some(ErrorCategory::ServerError)
        );
        assert_eq!(
            ErrorCategory::from_status_code(600),
            Some(ErrorCategory::OtherError)
        );
    }

    #[test]
    fn request_errors_map_to_categories() {
        assert_eq!(
            ErrorCategory::from_request_error(&RequestError::Status(500)),
            ErrorCategory::ServerError
        );
        assert_eq!(
            ErrorCategory::from_request_error(&RequestError::Status(404)),
            ErrorCategory::ClientError
        );
        assert_eq!(
            ErrorCategory::from_request_error(&RequestError::Timeout),
            ErrorCategory::TimeoutError
        );
        assert_eq!(
            ErrorCategory::from_request_error(&RequestError::Cancelled),
            ErrorCategory::OtherError
        );
    }

    #[test]
    fn labels() {
        assert_eq!(ErrorCategory::ServerError.label(), "server_error");
        assert_eq!(ErrorCategory::TimeoutError.label(), "timeout_error");
        assert!(ErrorCategory::ClientError.to_string().contains("4xx"));
    }

    #[test]
    fn invalid_config_message_names_bounds() {
        let err = StartError::InvalidConfig { rps: 1001 };
        let msg = err.to_string();
        assert!(msg.contains("between 1 and 1000"), "message was: {}", msg);
        assert!(msg.contains("1001"), "message was: {}", msg);
    }
}
