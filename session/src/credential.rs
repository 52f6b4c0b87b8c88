//! Ephemeral credential acquisition.

use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::{Error, Result};

/// A single-session bearer token minted by the trusted backend.
///
/// The token is never printed: `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct EphemeralCredential(String);

impl EphemeralCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for EphemeralCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EphemeralCredential(***)")
    }
}

/// Response of the credential endpoint.
#[derive(Debug, Deserialize)]
struct EphemeralSession {
    client_secret: ClientSecret,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: String,
}

/// Fetches a fresh credential from `POST {api_base}/session`.
///
/// A single request is made; failures are returned as [`Error::Credential`].
pub(crate) async fn fetch(
    http: &reqwest::Client,
    config: &SessionConfig,
) -> Result<EphemeralCredential> {
    let url = config.session_url();
    debug!("Requesting ephemeral session: {}", url);

    let response = http
        .post(&url)
        .header(CONTENT_TYPE, "application/json")
        .send()
        .await
        .map_err(|e| Error::Credential {
            status: None,
            message: format!("backend unreachable: {}", e),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::credential_status(status));
    }

    let body = response.bytes().await.map_err(|e| Error::Credential {
        status: Some(status.as_u16()),
        message: format!("failed to read response: {}", e),
    })?;
    let session: EphemeralSession =
        serde_json::from_slice(&body).map_err(|e| Error::Credential {
            status: Some(status.as_u16()),
            message: format!("malformed session response: {}", e),
        })?;

    if session.client_secret.value.is_empty() {
        return Err(Error::Credential {
            status: Some(status.as_u16()),
            message: "session response carried an empty token".to_string(),
        });
    }

    Ok(EphemeralCredential(session.client_secret.value))
}
