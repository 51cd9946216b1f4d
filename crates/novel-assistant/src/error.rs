//! Error types for the assistant gateway.

use std::time::Duration;

use thiserror::Error;

/// Marker the service puts in the body when the caller's region is blocked.
const REGION_DENIED_CODE: &str = "unsupported_country_region_territory";

/// Errors returned by [`AssistantGateway`](crate::AssistantGateway) calls.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Network failure, rate limiting or a server-side error. Retryable.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Credentials rejected or region denied. Never retried.
    #[error("permission denied: {0}")]
    Permission(String),

    /// The remote thread no longer exists.
    #[error("thread not found: {0}")]
    ThreadNotFound(String),

    /// The run reached a terminal state other than completed.
    #[error("run {run_id} ended with status {status}")]
    RunFailed {
        /// Remote run id.
        run_id: String,
        /// Terminal status reported by the service.
        status: String,
        /// Error detail from the service, if any.
        detail: Option<String>,
    },

    /// The run did not finish within the configured timeout.
    #[error("run {run_id} timed out after {elapsed:?}")]
    RunTimeout {
        /// Remote run id.
        run_id: String,
        /// Wall-clock time spent waiting.
        elapsed: Duration,
    },

    /// Any other non-success response.
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or error message.
        message: String,
    },

    /// The response body could not be understood.
    #[error("failed to parse response: {0}")]
    Parse(String),
}

impl GatewayError {
    /// Classify a non-success HTTP response.
    ///
    /// `thread_id` is set for thread-scoped endpoints, where a 404 means the
    /// thread itself is gone.
    pub fn from_status(status: u16, body: &str, thread_id: Option<&str>) -> Self {
        if body.contains(REGION_DENIED_CODE) {
            return Self::Permission(format!("region denied ({})", status));
        }
        match (status, thread_id) {
            (401 | 403, _) => Self::Permission(format!("HTTP {}: {}", status, body)),
            (404, Some(thread_id)) => Self::ThreadNotFound(thread_id.to_string()),
            (429, _) | (500..=599, _) => Self::Transient(format!("HTTP {}: {}", status, body)),
            _ => Self::Api {
                status,
                message: body.to_string(),
            },
        }
    }

    /// Returns true for errors worth retrying at the request level.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Returns true for errors that justify re-issuing a whole run.
    pub fn is_run_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transient(_) | Self::RunFailed { .. } | Self::RunTimeout { .. }
        )
    }

    /// Returns true if the service refused the caller.
    pub fn is_permission(&self) -> bool {
        matches!(self, Self::Permission(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Transient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failures_are_permission() {
        assert!(GatewayError::from_status(401, "bad key", None).is_permission());
        assert!(GatewayError::from_status(403, "", Some("thread_1")).is_permission());
    }

    #[test]
    fn test_region_denial_is_permission() {
        let body = r#"{"error":{"code":"unsupported_country_region_territory"}}"#;
        let err = GatewayError::from_status(400, body, None);
        assert!(err.is_permission());
        assert!(!err.is_run_retryable());
    }

    #[test]
    fn test_thread_scoped_404() {
        let err = GatewayError::from_status(404, "", Some("thread_1"));
        assert!(matches!(err, GatewayError::ThreadNotFound(ref id) if id == "thread_1"));

        let err = GatewayError::from_status(404, "no such assistant", None);
        assert!(matches!(err, GatewayError::Api { status: 404, .. }));
    }

    #[test]
    fn test_rate_limit_and_server_errors_are_transient() {
        assert!(GatewayError::from_status(429, "slow down", None).is_transient());
        assert!(GatewayError::from_status(500, "", None).is_transient());
        assert!(GatewayError::from_status(503, "", Some("t")).is_transient());
        assert!(!GatewayError::from_status(400, "bad request", None).is_transient());
    }

    #[test]
    fn test_run_retryable() {
        let failed = GatewayError::RunFailed {
            run_id: "run_1".into(),
            status: "failed".into(),
            detail: None,
        };
        let timeout = GatewayError::RunTimeout {
            run_id: "run_1".into(),
            elapsed: Duration::from_secs(90),
        };
        assert!(failed.is_run_retryable());
        assert!(timeout.is_run_retryable());
        assert!(!failed.is_transient());
        assert!(!GatewayError::ThreadNotFound("t".into()).is_run_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = GatewayError::RunFailed {
            run_id: "run_1".into(),
            status: "expired".into(),
            detail: None,
        };
        assert_eq!(err.to_string(), "run run_1 ended with status expired");
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: GatewayError = json_err.into();
        assert!(matches!(err, GatewayError::Parse(_)));
    }
}
