//! Peer transport abstraction.
//!
//! The session client drives negotiation through these traits; the production
//! implementation lives in [`crate::peer`]. Callbacks raised by the
//! transport are delivered as events over unbounded channels.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::media::{LocalAudioTrack, RemoteAudioStream};
use crate::signaling::SessionDescription;
use crate::types::{ChannelState, IceServer, PeerConnectionState};

/// Events raised by a peer transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// Remote media arrived.
    RemoteTrack(RemoteAudioStream),
    /// The peer connection state changed.
    StateChanged(PeerConnectionState),
}

/// Events raised by a control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Open,
    Message(String),
    Error(String),
    Closed,
}

/// Creates peer transports.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Builds a new, unnegotiated peer transport.
    async fn create(
        &self,
        ice_servers: &[IceServer],
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerTransport>>;
}

/// A peer connection carrying audio and a control channel.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Attaches a local track for sending.
    async fn add_local_track(&self, track: &LocalAudioTrack) -> Result<()>;

    /// Registers a receive-only audio transceiver.
    async fn add_receive_only_audio(&self) -> Result<()>;

    /// Creates the ordered, reliable control channel.
    async fn create_control_channel(
        &self,
        label: &str,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Result<Arc<dyn ControlChannel>>;

    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Commits the local description.
    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    /// Returns the committed local description, which may differ from the
    /// created offer once candidates have been gathered.
    async fn local_description(&self) -> Option<SessionDescription>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    /// Current connection state, read from the underlying connection.
    fn connection_state(&self) -> PeerConnectionState;

    async fn close(&self) -> Result<()>;
}

/// The control sub-channel of a peer transport.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    fn label(&self) -> &str;

    /// Current ready state, read from the underlying channel.
    fn ready_state(&self) -> ChannelState;

    async fn send_text(&self, text: String) -> Result<()>;

    async fn close(&self) -> Result<()>;
}
