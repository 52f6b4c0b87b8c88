//! Error types for the realtime session client.

use thiserror::Error;

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a realtime session.
#[derive(Error, Debug)]
pub enum Error {
    /// The credential backend rejected the request or was unreachable.
    #[error("credential error: {message}{}", fmt_status(*.status))]
    Credential {
        /// HTTP status, if a response was received.
        status: Option<u16>,
        message: String,
    },

    /// The local audio capture device is unavailable or was denied.
    #[error("media access error: {0}")]
    MediaAccess(String),

    /// An operation was invoked out of its required order.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The remote negotiation endpoint rejected the offer.
    #[error("negotiation error: {message}{}", fmt_status(*.status))]
    Negotiation {
        /// HTTP status, if a response was received.
        status: Option<u16>,
        message: String,
    },

    /// A message was sent without an open control channel.
    #[error("control channel not ready")]
    ChannelNotReady,

    /// The operation was overtaken by a disconnect.
    #[error("aborted: session was disconnected")]
    Aborted,

    /// Peer connection failure while building the transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

fn fmt_status(status: Option<u16>) -> String {
    match status {
        Some(code) => format!(" (status {})", code),
        None => String::new(),
    }
}

impl Error {
    /// Creates a credential error from an HTTP status.
    pub fn credential_status(status: reqwest::StatusCode) -> Self {
        Error::Credential {
            status: Some(status.as_u16()),
            message: status_text(status),
        }
    }

    /// Creates a negotiation error from an HTTP status.
    pub fn negotiation_status(status: reqwest::StatusCode) -> Self {
        Error::Negotiation {
            status: Some(status.as_u16()),
            message: status_text(status),
        }
    }

    /// Returns the HTTP status carried by credential and negotiation errors.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Error::Credential { status, .. } | Error::Negotiation { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<webrtc::Error> for Error {
    fn from(e: webrtc::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

fn status_text(status: reqwest::StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_status_display() {
        let err = Error::credential_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.to_string(),
            "credential error: Internal Server Error (status 500)"
        );
        assert_eq!(err.http_status(), Some(500));
    }

    #[test]
    fn test_negotiation_without_status() {
        let err = Error::Negotiation {
            status: None,
            message: "connection refused".to_string(),
        };
        assert_eq!(err.to_string(), "negotiation error: connection refused");
        assert_eq!(err.http_status(), None);
    }

    #[test]
    fn test_channel_not_ready_display() {
        assert_eq!(Error::ChannelNotReady.to_string(), "control channel not ready");
    }
}
