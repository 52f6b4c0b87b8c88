//! Local capture and remote playback handles.
//!
//! The session client owns the [`LocalMediaStream`] it obtains from a
//! [`MediaDevices`] provider and only writes into the caller's [`AudioSink`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use webrtc::api::media_engine::MIME_TYPE_OPUS;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::error::{Error, Result};

/// A single 20ms Opus frame encoding silence (TOC 0xf8, CELT FB).
pub const OPUS_SILENCE_FRAME: [u8; 3] = [0xf8, 0xff, 0xfe];

/// Opus sample rate used by local tracks.
pub const OPUS_CLOCK_RATE: u32 = 48_000;

const MEDIA_ACCESS_HINT: &str =
    "failed to access microphone; please grant microphone permission and retry";

// ============================================================================
// Local Media
// ============================================================================

/// Source of local audio capture streams.
///
/// Implementations stand in for the platform permission prompt: they either
/// hand out a stream or fail with [`Error::MediaAccess`].
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Opens the local microphone.
    async fn open_microphone(&self) -> Result<LocalMediaStream>;
}

/// An outbound audio track.
///
/// Cloning is cheap; all clones share the enabled and stopped flags.
#[derive(Clone)]
pub struct LocalAudioTrack {
    inner: Arc<LocalTrackInner>,
}

struct LocalTrackInner {
    track: Arc<TrackLocalStaticSample>,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl LocalAudioTrack {
    /// Creates an Opus track.
    pub fn opus(id: impl Into<String>, stream_id: impl Into<String>) -> Self {
        let track = TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: OPUS_CLOCK_RATE,
                channels: 2,
                ..Default::default()
            },
            id.into(),
            stream_id.into(),
        );
        Self {
            inner: Arc::new(LocalTrackInner {
                track: Arc::new(track),
                enabled: AtomicBool::new(true),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> &str {
        self.inner.track.id()
    }

    pub fn stream_id(&self) -> &str {
        self.inner.track.stream_id()
    }

    /// Returns the underlying webrtc-rs track.
    pub fn rtc_track(&self) -> Arc<TrackLocalStaticSample> {
        self.inner.track.clone()
    }

    /// Enables or disables outbound audio. Disabled tracks send silence.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Stops the track and releases its hold on the capture device.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Writes one encoded Opus frame.
    ///
    /// While disabled, the frame is replaced by [`OPUS_SILENCE_FRAME`] of the
    /// same duration. Writing to a stopped track fails.
    pub async fn write_sample(&self, data: Bytes, duration: Duration) -> Result<()> {
        if self.is_stopped() {
            return Err(Error::MediaAccess(format!("track {} is stopped", self.id())));
        }
        let data = self.outbound_payload(data);
        self.inner
            .track
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    /// The payload actually sent for `data` given the enabled flag.
    fn outbound_payload(&self, data: Bytes) -> Bytes {
        if self.is_enabled() {
            data
        } else {
            Bytes::from_static(&OPUS_SILENCE_FRAME)
        }
    }
}

impl std::fmt::Debug for LocalAudioTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalAudioTrack")
            .field("id", &self.id())
            .field("enabled", &self.is_enabled())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// A captured local stream: one or more audio tracks.
#[derive(Debug, Clone)]
pub struct LocalMediaStream {
    id: String,
    tracks: Vec<LocalAudioTrack>,
}

impl LocalMediaStream {
    pub fn new(id: impl Into<String>, tracks: Vec<LocalAudioTrack>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[LocalAudioTrack] {
        &self.tracks
    }

    /// Stops every track individually.
    pub fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        for track in &self.tracks {
            track.set_enabled(enabled);
        }
    }
}

/// A software microphone fed by the hosting application.
///
/// Each call to `open_microphone` yields a fresh stream with a single Opus
/// track; encoded frames are pushed with [`LocalAudioTrack::write_sample`].
#[derive(Debug, Clone)]
pub struct VirtualMicrophone {
    available: bool,
}

impl VirtualMicrophone {
    pub fn new() -> Self {
        Self { available: true }
    }

    /// A microphone whose permission has been refused.
    pub fn denied() -> Self {
        Self { available: false }
    }
}

impl Default for VirtualMicrophone {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaDevices for VirtualMicrophone {
    async fn open_microphone(&self) -> Result<LocalMediaStream> {
        if !self.available {
            return Err(Error::MediaAccess(MEDIA_ACCESS_HINT.to_string()));
        }
        let stream_id = format!("mic-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        let track = LocalAudioTrack::opus("audio", stream_id.clone());
        Ok(LocalMediaStream::new(stream_id, vec![track]))
    }
}

// ============================================================================
// Remote Media
// ============================================================================

/// The inbound audio stream negotiated with the remote peer.
pub struct RemoteAudioStream {
    track_id: String,
    stream_id: String,
    mime_type: String,
    packets: mpsc::Receiver<Bytes>,
}

impl RemoteAudioStream {
    /// Creates a stream and the sender feeding it encoded payloads.
    pub fn channel(
        track_id: impl Into<String>,
        stream_id: impl Into<String>,
        mime_type: impl Into<String>,
        capacity: usize,
    ) -> (mpsc::Sender<Bytes>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        let stream = Self {
            track_id: track_id.into(),
            stream_id: stream_id.into(),
            mime_type: mime_type.into(),
            packets: rx,
        };
        (tx, stream)
    }

    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Receives the next encoded payload. Returns None when the track ends.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.packets.recv().await
    }
}

impl std::fmt::Debug for RemoteAudioStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteAudioStream")
            .field("track_id", &self.track_id)
            .field("stream_id", &self.stream_id)
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// Output target for the remote audio stream.
///
/// Owned by the caller; the session client keeps only a weak reference.
pub trait AudioSink: Send + Sync {
    /// Replaces the current source with `stream`.
    fn attach(&self, stream: RemoteAudioStream);

    /// Clears the current source.
    fn detach(&self);
}

/// A simple [`AudioSink`] holding at most one remote stream.
#[derive(Default)]
pub struct AudioOutput {
    source: Mutex<Option<RemoteAudioStream>>,
}

impl AudioOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_source(&self) -> bool {
        self.source.lock().is_some()
    }

    /// Track id of the attached stream.
    pub fn source_track_id(&self) -> Option<String> {
        self.source.lock().as_ref().map(|s| s.track_id.clone())
    }

    /// Takes the attached stream for playback.
    pub fn take_source(&self) -> Option<RemoteAudioStream> {
        self.source.lock().take()
    }
}

impl AudioSink for AudioOutput {
    fn attach(&self, stream: RemoteAudioStream) {
        *self.source.lock() = Some(stream);
    }

    fn detach(&self) {
        self.source.lock().take();
    }
}
