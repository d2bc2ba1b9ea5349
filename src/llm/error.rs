//! Typed errors for backend calls
//!
//! Every failure to get a usable HTTP answer from the tutor backend is a
//! connection problem from the user's point of view, but the variants keep
//! enough detail for logs without string matching.

use thiserror::Error;

/// Backend call errors with typed variants
///
/// - `Status` - the backend answered with a non-2xx status
/// - `Timeout` - no answer within the configured request timeout
/// - `Network` - connection refused, DNS, TLS and similar transport issues
/// - `Service` - a `{"status": "error"}` body, e.g. the quiz dataset is missing
/// - `Other` - catch-all for failures before the request left the client
#[derive(Debug, Error)]
pub enum BackendError {
    /// Non-success HTTP status
    #[error("Backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Request timed out
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Network connectivity issue
    #[error("Network error: {0}")]
    Network(String),

    /// The backend answered 2xx but reported a failure in the body
    #[error("Backend reported an error: {0}")]
    Service(String),

    /// Other errors not fitting the above categories
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl BackendError {
    /// Whether this failure should be reported as a connection problem
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            BackendError::Status { .. } | BackendError::Timeout(_) | BackendError::Network(_)
        )
    }

    /// HTTP status of the failed call, if the backend answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Convert HTTP status code and error text into typed BackendError
    pub fn from_http_status(status: reqwest::StatusCode, body: String) -> Self {
        BackendError::Status {
            status: status.as_u16(),
            body,
        }
    }

    /// Convert network/connection errors into typed BackendError
    pub fn from_network_error(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BackendError::Timeout(e.to_string())
        } else if let Some(status) = e.status() {
            Self::from_http_status(status, e.to_string())
        } else if e.is_connect() || e.is_request() {
            BackendError::Network(format!("Connection failed: {}", e))
        } else {
            BackendError::Other(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http_status() {
        let err = BackendError::from_http_status(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            "boom".to_string(),
        );
        assert_eq!(err.status(), Some(500));
        assert!(err.is_connection_error());
        assert_eq!(err.to_string(), "Backend returned HTTP 500: boom");
    }

    #[test]
    fn test_other_is_not_connection_error() {
        let err = BackendError::Other(anyhow::anyhow!("bad url"));
        assert!(!err.is_connection_error());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_network_display() {
        let err = BackendError::Network("Connection failed: refused".to_string());
        assert_eq!(err.to_string(), "Network error: Connection failed: refused");
    }
}
