//! Immutable session configuration.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{IceServer, DEFAULT_STUN_SERVER, MODEL_GPT4O_REALTIME_PREVIEW};

/// Default HTTP endpoint for the SDP offer/answer exchange.
pub const DEFAULT_REALTIME_URL: &str = "https://api.openai.com/v1/realtime";

/// Default label of the control data channel.
pub const DEFAULT_CHANNEL_LABEL: &str = "oai-events";

/// Default instructions sent when the control channel opens.
pub const DEFAULT_GREETING: &str = "Hello, I'm your voice assistant. How can I help you?";

/// Default timeout for credential and negotiation requests.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration of a realtime session client.
///
/// Built once through [`SessionConfig::builder`] and shared read-only by the
/// client for its whole lifetime.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    api_base: String,
    model: String,
    realtime_url: String,
    ice_servers: Vec<IceServer>,
    channel_label: String,
    greeting: Option<String>,
    http_timeout: Duration,
}

impl SessionConfig {
    /// Creates a builder with the backend base address and model.
    pub fn builder(api_base: impl Into<String>, model: impl Into<String>) -> SessionConfigBuilder {
        SessionConfigBuilder::new(api_base, model)
    }

    /// Backend base address serving `/session`.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Realtime model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Negotiation endpoint receiving the SDP offer.
    pub fn realtime_url(&self) -> &str {
        &self.realtime_url
    }

    pub fn ice_servers(&self) -> &[IceServer] {
        &self.ice_servers
    }

    pub fn channel_label(&self) -> &str {
        &self.channel_label
    }

    /// Instructions sent as the first event once the control channel opens.
    pub fn greeting(&self) -> Option<&str> {
        self.greeting.as_deref()
    }

    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }

    /// Full URL of the credential endpoint.
    pub fn session_url(&self) -> String {
        format!("{}/session", self.api_base.trim_end_matches('/'))
    }
}

/// Builder for [`SessionConfig`].
pub struct SessionConfigBuilder {
    api_base: String,
    model: String,
    realtime_url: Option<String>,
    ice_servers: Option<Vec<IceServer>>,
    channel_label: Option<String>,
    greeting: Option<Option<String>>,
    http_timeout: Option<Duration>,
}

impl SessionConfigBuilder {
    /// Creates a new builder.
    pub fn new(api_base: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            model: model.into(),
            realtime_url: None,
            ice_servers: None,
            channel_label: None,
            greeting: None,
            http_timeout: None,
        }
    }

    /// Sets the negotiation endpoint URL.
    pub fn realtime_url(mut self, url: impl Into<String>) -> Self {
        self.realtime_url = Some(url.into());
        self
    }

    /// Replaces the ICE server list.
    pub fn ice_servers(mut self, servers: Vec<IceServer>) -> Self {
        self.ice_servers = Some(servers);
        self
    }

    /// Sets the control channel label.
    pub fn channel_label(mut self, label: impl Into<String>) -> Self {
        self.channel_label = Some(label.into());
        self
    }

    /// Sets the greeting instructions. `None` disables the greeting.
    pub fn greeting(mut self, greeting: Option<String>) -> Self {
        self.greeting = Some(greeting);
        self
    }

    /// Sets the timeout for credential and negotiation requests.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> Result<SessionConfig> {
        if self.api_base.is_empty() {
            return Err(Error::InvalidConfig("API base address is required".to_string()));
        }
        if self.model.is_empty() {
            return Err(Error::InvalidConfig("model is required".to_string()));
        }
        let channel_label = self
            .channel_label
            .unwrap_or_else(|| DEFAULT_CHANNEL_LABEL.to_string());
        if channel_label.is_empty() {
            return Err(Error::InvalidConfig("channel label must not be empty".to_string()));
        }

        Ok(SessionConfig {
            api_base: self.api_base,
            model: self.model,
            realtime_url: self
                .realtime_url
                .unwrap_or_else(|| DEFAULT_REALTIME_URL.to_string()),
            ice_servers: self
                .ice_servers
                .unwrap_or_else(|| vec![IceServer::new(DEFAULT_STUN_SERVER)]),
            channel_label,
            greeting: self
                .greeting
                .unwrap_or_else(|| Some(DEFAULT_GREETING.to_string())),
            http_timeout: self.http_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT),
        })
    }
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self::new("http://localhost:8000", MODEL_GPT4O_REALTIME_PREVIEW)
    }
}
