//! Error taxonomy for console API calls.
//!
//! Every failure carries a machine-readable code, a message and the HTTP status.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Code used when a response cannot be interpreted as a JSON error envelope.
pub const NETWORK_ERROR_CODE: &str = "NETWORK_ERROR";

/// Code used when a 2xx body does not follow the `{ success, data }` envelope.
pub const INVALID_RESPONSE_CODE: &str = "INVALID_RESPONSE";

/// Code used when a request body cannot be encoded.
pub const INVALID_REQUEST_CODE: &str = "INVALID_REQUEST";

/// Code attached to `SessionExpired` when it is surfaced as a detail.
pub const SESSION_EXPIRED_CODE: &str = "SESSION_EXPIRED";

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Structured error payload carried by every non-session error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    /// HTTP status of the failed response, 0 when no response was received.
    pub status: u16,
    pub details: Option<serde_json::Value>,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>, status: u16) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            status,
            details: None,
        }
    }

    pub fn with_details(mut self, details: Option<serde_json::Value>) -> Self {
        self.details = details;
        self
    }
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.status == 0 {
            write!(f, "{} ({})", self.message, self.code)
        } else {
            write!(f, "{} ({}, status {})", self.message, self.code, self.status)
        }
    }
}

/// Errors surfaced by the session core.
///
/// `Clone` so a single renewal outcome can be handed to every coalesced waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Session expired - please log in again")]
    SessionExpired,

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(ErrorDetail),

    #[error("Validation failed: {0}")]
    Validation(ErrorDetail),

    #[error("Network error: {0}")]
    Network(ErrorDetail),

    #[error("Server error: {0}")]
    Server(ErrorDetail),
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Transport-level failure: no HTTP response was received.
    pub fn network(message: impl Into<String>) -> Self {
        ApiError::Network(ErrorDetail::new(NETWORK_ERROR_CODE, message, 0))
    }

    /// The request could not be built locally.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        ApiError::Validation(ErrorDetail::new(INVALID_REQUEST_CODE, message, 0))
    }

    /// Classify a server-provided error payload by HTTP status.
    ///
    /// `credential_endpoint` marks login/register calls, where a 401 means the
    /// submitted credentials were rejected rather than the session.
    pub fn from_detail(detail: ErrorDetail, credential_endpoint: bool) -> Self {
        match detail.status {
            401 if credential_endpoint => ApiError::InvalidCredentials(detail),
            400 | 422 => ApiError::Validation(detail),
            _ => ApiError::Server(detail),
        }
    }

    /// Error for a non-2xx response whose body is not a JSON error envelope.
    pub fn from_unparsed(status: u16, body: &str) -> Self {
        let message = if body.trim().is_empty() {
            format!("Request failed with status {}", status)
        } else {
            Self::truncate_body(body)
        };
        ApiError::Network(ErrorDetail::new(NETWORK_ERROR_CODE, message, status))
    }

    pub fn detail(&self) -> Option<&ErrorDetail> {
        match self {
            ApiError::SessionExpired => None,
            ApiError::InvalidCredentials(d)
            | ApiError::Validation(d)
            | ApiError::Network(d)
            | ApiError::Server(d) => Some(d),
        }
    }

    /// Machine-readable code for display layers.
    pub fn code(&self) -> &str {
        match self.detail() {
            Some(d) => &d.code,
            None => SESSION_EXPIRED_CODE,
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.detail().map(|d| d.status).filter(|s| *s != 0)
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        let status = e.status().map(|s| s.as_u16()).unwrap_or(0);
        ApiError::Network(ErrorDetail::new(NETWORK_ERROR_CODE, e.to_string(), status))
    }
}
