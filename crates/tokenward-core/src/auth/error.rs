use thiserror::Error;

use crate::api::TransportError;

/// Outcome of a session operation that did not succeed.
///
/// "Not authenticated" is an expected, typed outcome (`NoSession`,
/// `SessionExpired`), never a panic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Login failed: {reason}")]
    Authentication { reason: String },

    #[error("Registration failed: {reason}")]
    Registration { reason: String },

    #[error("Not logged in")]
    NoSession,

    #[error("Session expired - please log in again")]
    SessionExpired,

    #[error("Request failed with status {status}: {body}")]
    Request { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Credential storage error: {0}")]
    Storage(String),
}

impl SessionError {
    /// True when the caller must drop to an unauthenticated view
    pub fn requires_login(&self) -> bool {
        matches!(self, SessionError::NoSession | SessionError::SessionExpired)
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::InvalidRequest(err.to_string())
    }
}
