//! Type definitions shared across the session client.

use serde::{Deserialize, Serialize};

// ============================================================================
// Models
// ============================================================================

/// GPT-4o realtime preview model.
pub const MODEL_GPT4O_REALTIME_PREVIEW: &str = "gpt-4o-realtime-preview";
/// GPT-4o realtime preview model (2024-10-01 version).
pub const MODEL_GPT4O_REALTIME_PREVIEW_20241001: &str = "gpt-4o-realtime-preview-2024-10-01";
/// GPT-4o realtime preview model (2024-12-17 version).
pub const MODEL_GPT4O_REALTIME_PREVIEW_20241217: &str = "gpt-4o-realtime-preview-2024-12-17";
/// GPT-4o mini realtime preview model.
pub const MODEL_GPT4O_MINI_REALTIME_PREVIEW: &str = "gpt-4o-mini-realtime-preview";

// ============================================================================
// Lifecycle States
// ============================================================================

/// Lifecycle state of a session client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Fresh client, nothing acquired.
    #[default]
    Idle,
    /// Credential fetch in flight as part of connect.
    CredentialPending,
    /// Local media prepared, ready to connect.
    MediaReady,
    /// Peer transport being built and negotiated.
    Negotiating,
    /// Offer/answer exchange completed.
    Connected,
    /// Torn down by disconnect or an unrecovered failure.
    Closed,
}

impl SessionState {
    /// Returns true while a connect call owns the state machine.
    pub fn is_connecting(&self) -> bool {
        matches!(self, SessionState::CredentialPending | SessionState::Negotiating)
    }
}

/// Peer connection state as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerConnectionState {
    #[default]
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl From<webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState>
    for PeerConnectionState
{
    fn from(state: webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState) -> Self {
        use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState as S;
        match state {
            S::New | S::Unspecified => PeerConnectionState::New,
            S::Connecting => PeerConnectionState::Connecting,
            S::Connected => PeerConnectionState::Connected,
            S::Disconnected => PeerConnectionState::Disconnected,
            S::Failed => PeerConnectionState::Failed,
            S::Closed => PeerConnectionState::Closed,
        }
    }
}

/// Ready state of the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    #[default]
    Connecting,
    Open,
    Closing,
    Closed,
}

impl From<webrtc::data_channel::data_channel_state::RTCDataChannelState> for ChannelState {
    fn from(state: webrtc::data_channel::data_channel_state::RTCDataChannelState) -> Self {
        use webrtc::data_channel::data_channel_state::RTCDataChannelState as S;
        match state {
            S::Open => ChannelState::Open,
            S::Closing => ChannelState::Closing,
            S::Closed => ChannelState::Closed,
            S::Connecting | S::Unspecified => ChannelState::Connecting,
        }
    }
}

// ============================================================================
// ICE
// ============================================================================

/// Default public STUN server.
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// An ICE server used for relay/discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub credential: String,
}

impl IceServer {
    /// Creates an ICE server entry for a single URL without credentials.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            ..Default::default()
        }
    }
}

/// Point-in-time view of the client and its sub-channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SessionStateSnapshot {
    pub state: SessionState,
    pub peer: Option<PeerConnectionState>,
    pub channel: Option<ChannelState>,
}
