//! Realtime voice session client over WebRTC.
//!
//! This crate connects a local microphone to a realtime voice model. A
//! trusted backend mints a short-lived credential; the client then builds a
//! WebRTC peer connection carrying the audio and a control channel, and
//! negotiates it with the realtime endpoint by a single SDP offer/answer
//! exchange.
//!
//! # Features
//!
//! - Ephemeral credential acquisition from a trusted backend
//! - Local audio capture through a pluggable [`MediaDevices`] provider
//! - Remote audio delivered to a caller-owned [`AudioSink`]
//! - JSON control events over an ordered data channel
//! - Cancellable connect and idempotent teardown
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rtcvoice_session::{AudioOutput, Client, SessionConfig, VirtualMicrophone};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::builder("http://localhost:8000", "gpt-4o-realtime-preview")
//!         .greeting(Some("Hello!".to_string()))
//!         .build()?;
//!     let client = Client::with_webrtc(config, Arc::new(VirtualMicrophone::new()))?;
//!
//!     let output = Arc::new(AudioOutput::new());
//!     client.prepare_local_media(output.clone()).await?;
//!     client.connect().await?;
//!
//!     let mut events = client.subscribe();
//!     client.send_message("What's the weather like?").await?;
//!     while let Ok(event) = events.recv().await {
//!         if let Some(delta) = &event.delta {
//!             print!("{}", delta);
//!         }
//!         if event.is_response_done() {
//!             break;
//!         }
//!     }
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod credential;
pub mod error;
pub mod event;
pub mod media;
pub mod peer;
pub mod signaling;
pub mod transport;
pub mod types;

// Re-export main types
pub use client::Client;
pub use config::{SessionConfig, SessionConfigBuilder};
pub use credential::EphemeralCredential;
pub use error::{Error, Result};
pub use event::{ClientEvent, EventError, ServerEvent};
pub use media::{
    AudioOutput, AudioSink, LocalAudioTrack, LocalMediaStream, MediaDevices, RemoteAudioStream,
    VirtualMicrophone,
};
pub use peer::{WebRtcControlChannel, WebRtcTransport, WebRtcTransportFactory};
pub use signaling::{SdpType, SessionDescription};
pub use transport::{ChannelEvent, ControlChannel, PeerTransport, TransportEvent, TransportFactory};
pub use types::*;
