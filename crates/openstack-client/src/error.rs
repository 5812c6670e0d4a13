//! OpenStack client errors

use thiserror::Error;

/// Errors that can occur when interacting with the OpenStack APIs
#[derive(Debug, Error)]
pub enum OpenStackError {
    /// HTTP request/response error (connection refused, timeout, TLS, ...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// OpenStack API returned an unexpected status
    #[error("OpenStack API error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body or description
        message: String,
    },

    /// Resource not found (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request conflicts with the current resource state (HTTP 409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Keystone rejected the credentials or returned no token
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Invalid request (e.g., missing required fields)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No usable endpoint for a service in the catalog
    #[error("Endpoint not found: {0}")]
    Endpoint(String),

    /// Local I/O error (reading an image file for upload)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A retryable call kept failing with transient errors
    #[error("request failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Last error observed
        #[source]
        source: Box<OpenStackError>,
    },
}

impl OpenStackError {
    /// HTTP status code carried by this error, if any
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::NotFound(_) => Some(404),
            Self::Conflict(_) => Some(409),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::RetriesExhausted { source, .. } => source.status(),
            _ => None,
        }
    }

    /// True for HTTP 404 equivalents
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// True for HTTP 409 equivalents
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }

    /// True for errors worth retrying: 500, 503, timeouts and network failures
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api { status, .. } => matches!(status, 500 | 503),
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || matches!(e.status().map(|s| s.as_u16()), Some(500 | 503))
            }
            _ => false,
        }
    }
}
