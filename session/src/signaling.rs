//! SDP offer/answer exchange with the remote negotiation endpoint.

use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SessionConfig;
use crate::credential::EphemeralCredential;
use crate::error::{Error, Result};

/// Kind of a session description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// A session description exchanged during negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Posts the local offer and returns the remote answer.
///
/// Exactly one request is made, authenticated with the ephemeral credential.
pub(crate) async fn exchange(
    http: &reqwest::Client,
    config: &SessionConfig,
    credential: &EphemeralCredential,
    offer: &SessionDescription,
) -> Result<SessionDescription> {
    debug!(
        "Posting offer to {} (model={}, {} bytes)",
        config.realtime_url(),
        config.model(),
        offer.sdp.len()
    );

    let response = http
        .post(config.realtime_url())
        .query(&[("model", config.model())])
        .bearer_auth(credential.expose())
        .header(CONTENT_TYPE, "application/sdp")
        .body(offer.sdp.clone())
        .send()
        .await
        .map_err(|e| Error::Negotiation {
            status: None,
            message: format!("negotiation endpoint unreachable: {}", e),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::negotiation_status(status));
    }

    let sdp = response.text().await.map_err(|e| Error::Negotiation {
        status: Some(status.as_u16()),
        message: format!("failed to read answer: {}", e),
    })?;
    if sdp.trim().is_empty() {
        return Err(Error::Negotiation {
            status: Some(status.as_u16()),
            message: "empty answer".to_string(),
        });
    }

    debug!("Received answer ({} bytes)", sdp.len());
    Ok(SessionDescription::answer(sdp))
}
