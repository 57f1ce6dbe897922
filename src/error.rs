//! Closed error taxonomy shared by every component.
//!
//! `HubError` is the single `Result` error type used from the socket read
//! loop down through the registry and the store. The router's top-level
//! catch turns any `HubError` into a wire `Error` envelope via [`HubError::kind`].

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum HubError {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("policy violation: {0}")]
    Policy(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not a member: {0}")]
    NotMember(String),

    #[error("bad pin")]
    BadPin,

    #[error("capacity exceeded: {0}")]
    Capacity(String),

    #[error("peer offline: {0}")]
    Offline(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HubError {
    /// The wire taxonomy string carried in `Error` envelope payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            HubError::Protocol(_) => "PROTOCOL",
            HubError::Policy(_) => "POLICY",
            HubError::Auth(_) => "AUTH",
            HubError::NotFound(_) => "NOT_FOUND",
            HubError::NotMember(_) => "NOT_MEMBER",
            HubError::BadPin => "BAD_PIN",
            HubError::Capacity(_) => "CAPACITY",
            HubError::Offline(_) => "OFFLINE",
            HubError::Timeout(_) => "TIMEOUT",
            HubError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<sqlx::Error> for HubError {
    fn from(e: sqlx::Error) -> Self {
        HubError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for HubError {
    fn from(e: serde_json::Error) -> Self {
        HubError::Protocol(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_taxonomy() {
        assert_eq!(HubError::BadPin.kind(), "BAD_PIN");
        assert_eq!(HubError::NotMember("x".into()).kind(), "NOT_MEMBER");
        assert_eq!(HubError::Capacity("full".into()).kind(), "CAPACITY");
    }
}
