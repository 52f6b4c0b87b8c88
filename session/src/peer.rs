//! WebRTC transport backed by webrtc-rs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::error::Result;
use crate::media::{LocalAudioTrack, RemoteAudioStream};
use crate::signaling::{SdpType, SessionDescription};
use crate::transport::{
    ChannelEvent, ControlChannel, PeerTransport, TransportEvent, TransportFactory,
};
use crate::types::{ChannelState, IceServer, PeerConnectionState};

/// Upper bound on waiting for ICE gathering before posting the offer.
pub const ICE_GATHER_TIMEOUT: Duration = Duration::from_secs(5);

/// Buffered RTP payloads per remote track before packets are dropped.
const REMOTE_PACKET_BUFFER: usize = 256;

/// Builds webrtc-rs peer connections with the default codecs and interceptors.
#[derive(Debug, Clone, Default)]
pub struct WebRtcTransportFactory;

impl WebRtcTransportFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(
        &self,
        ice_servers: &[IceServer],
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerTransport>> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone(),
                    credential: server.credential.clone(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let pc = Arc::new(api.new_peer_connection(rtc_config).await?);

        let state_tx = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            debug!(state = %state, "Peer connection state changed");
            let _ = state_tx.send(TransportEvent::StateChanged(state.into()));
            Box::pin(async {})
        }));

        pc.on_ice_connection_state_change(Box::new(|state| {
            debug!(ice_state = %state, "ICE connection state changed");
            Box::pin(async {})
        }));

        let track_tx = events;
        pc.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
            let track_tx = track_tx.clone();
            Box::pin(async move {
                if track.kind() != RTPCodecType::Audio {
                    debug!(track_id = %track.id(), "Ignoring non-audio remote track");
                    return;
                }
                let (packets, stream) = RemoteAudioStream::channel(
                    track.id(),
                    track.stream_id(),
                    track.codec().capability.mime_type,
                    REMOTE_PACKET_BUFFER,
                );
                if track_tx.send(TransportEvent::RemoteTrack(stream)).is_ok() {
                    tokio::spawn(pump_remote_track(track, packets));
                }
            })
        }));

        Ok(Arc::new(WebRtcTransport { pc }))
    }
}

/// Forwards RTP payloads of a remote track until it ends or the sink goes away.
async fn pump_remote_track(track: Arc<TrackRemote>, packets: mpsc::Sender<Bytes>) {
    loop {
        match track.read_rtp().await {
            Ok((packet, _)) => match packets.try_send(packet.payload) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => break,
            },
            Err(e) => {
                debug!(track_id = %track.id(), "Remote track ended: {}", e);
                break;
            }
        }
    }
}

/// A webrtc-rs peer connection.
pub struct WebRtcTransport {
    pc: Arc<RTCPeerConnection>,
}

impl WebRtcTransport {
    /// Returns the underlying RTCPeerConnection.
    pub fn inner(&self) -> &Arc<RTCPeerConnection> {
        &self.pc
    }
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn add_local_track(&self, track: &LocalAudioTrack) -> Result<()> {
        let rtc_track: Arc<dyn TrackLocal + Send + Sync> = track.rtc_track();
        let sender = self.pc.add_track(rtc_track).await?;

        // RTCP must be drained for interceptors (NACK, reports) to run.
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });
        Ok(())
    }

    async fn add_receive_only_audio(&self) -> Result<()> {
        self.pc
            .add_transceiver_from_kind(
                RTPCodecType::Audio,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await?;
        Ok(())
    }

    async fn create_control_channel(
        &self,
        label: &str,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Result<Arc<dyn ControlChannel>> {
        let dc = self.pc.create_data_channel(label, None).await?;

        let open_tx = events.clone();
        dc.on_open(Box::new(move || {
            let _ = open_tx.send(ChannelEvent::Open);
            Box::pin(async {})
        }));

        let message_tx = events.clone();
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            if msg.is_string {
                let text = String::from_utf8_lossy(&msg.data).into_owned();
                let _ = message_tx.send(ChannelEvent::Message(text));
            } else {
                debug!("Ignoring binary control message ({} bytes)", msg.data.len());
            }
            Box::pin(async {})
        }));

        let error_tx = events.clone();
        dc.on_error(Box::new(move |err| {
            let _ = error_tx.send(ChannelEvent::Error(err.to_string()));
            Box::pin(async {})
        }));

        let close_tx = events;
        dc.on_close(Box::new(move || {
            let _ = close_tx.send(ChannelEvent::Closed);
            Box::pin(async {})
        }));

        Ok(Arc::new(WebRtcControlChannel { dc }))
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.pc.create_offer(None).await?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = to_rtc_description(desc)?;
        let mut gather_complete = self.pc.gathering_complete_promise().await;
        self.pc.set_local_description(desc).await?;

        // The negotiation endpoint does not accept trickled candidates.
        if tokio::time::timeout(ICE_GATHER_TIMEOUT, gather_complete.recv())
            .await
            .is_err()
        {
            warn!(
                "ICE gathering did not complete within {:?}, sending partial candidates",
                ICE_GATHER_TIMEOUT
            );
        }
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.pc.local_description().await.map(|desc| SessionDescription {
            sdp_type: match desc.sdp_type {
                RTCSdpType::Answer | RTCSdpType::Pranswer => SdpType::Answer,
                _ => SdpType::Offer,
            },
            sdp: desc.sdp,
        })
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc
            .set_remote_description(to_rtc_description(desc)?)
            .await?;
        Ok(())
    }

    fn connection_state(&self) -> PeerConnectionState {
        self.pc.connection_state().into()
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await?;
        Ok(())
    }
}

fn to_rtc_description(desc: SessionDescription) -> Result<RTCSessionDescription> {
    let rtc = match desc.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp)?,
    };
    Ok(rtc)
}

/// A webrtc-rs data channel used as the control channel.
pub struct WebRtcControlChannel {
    dc: Arc<RTCDataChannel>,
}

#[async_trait]
impl ControlChannel for WebRtcControlChannel {
    fn label(&self) -> &str {
        self.dc.label()
    }

    fn ready_state(&self) -> ChannelState {
        self.dc.ready_state().into()
    }

    async fn send_text(&self, text: String) -> Result<()> {
        self.dc.send_text(text).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.dc.close().await?;
        Ok(())
    }
}
