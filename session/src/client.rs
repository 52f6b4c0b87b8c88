//! Realtime session client.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::credential::{self, EphemeralCredential};
use crate::error::{Error, Result};
use crate::event::{ClientEvent, ServerEvent};
use crate::media::{AudioSink, LocalAudioTrack, LocalMediaStream, MediaDevices};
use crate::peer::WebRtcTransportFactory;
use crate::signaling;
use crate::transport::{
    ChannelEvent, ControlChannel, PeerTransport, TransportEvent, TransportFactory,
};
use crate::types::{ChannelState, PeerConnectionState, SessionState, SessionStateSnapshot};

/// Capacity of the inbound event broadcast.
const EVENT_BUFFER: usize = 256;

const MEDIA_REQUIRED: &str = "local media must be prepared before connecting";
const SINK_REQUIRED: &str = "an audio output sink must be provided before connecting";
const LOST_CONNECTION: &str = "the lost connection must be disconnected first";
const MEDIA_IN_USE: &str = "local media cannot be replaced while a connection is active";

/// Client for one realtime voice session over WebRTC.
///
/// The client fetches an ephemeral credential from a trusted backend, owns the
/// local microphone stream, negotiates a peer connection with the realtime
/// endpoint and exposes a small API over the resulting control channel.
///
/// All methods take `&self`; wrap the client in an `Arc` to call
/// [`Client::disconnect`] while [`Client::connect`] is still pending.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use rtcvoice_session::{AudioOutput, Client, SessionConfig, VirtualMicrophone};
///
/// # async fn run() -> rtcvoice_session::Result<()> {
/// let config = SessionConfig::builder("http://localhost:8000", "gpt-4o-realtime-preview")
///     .build()?;
/// let client = Client::with_webrtc(config, Arc::new(VirtualMicrophone::new()))?;
///
/// let output = Arc::new(AudioOutput::new());
/// client.prepare_local_media(output.clone()).await?;
/// client.connect().await?;
/// client.send_message("Tell me a joke").await?;
///
/// client.disconnect().await;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    config: Arc<SessionConfig>,
    http: reqwest::Client,
    devices: Arc<dyn MediaDevices>,
    factory: Arc<dyn TransportFactory>,
    inner: Arc<Mutex<Inner>>,
    media_gate: tokio::sync::Mutex<()>,
    events: broadcast::Sender<ServerEvent>,
}

struct Inner {
    state: SessionState,
    /// Bumped by every disconnect; continuations holding an older value are stale.
    generation: u64,
    credential: Option<EphemeralCredential>,
    media: Option<LocalMediaStream>,
    sink: Option<Weak<dyn AudioSink>>,
    transport: Option<Arc<dyn PeerTransport>>,
    channel: Option<Arc<dyn ControlChannel>>,
    event_task: Option<JoinHandle<()>>,
    microphone_enabled: bool,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            generation: 0,
            credential: None,
            media: None,
            sink: None,
            transport: None,
            channel: None,
            event_task: None,
            microphone_enabled: true,
        }
    }

    fn is_pristine(&self) -> bool {
        self.state == SessionState::Idle
            && self.credential.is_none()
            && self.media.is_none()
            && self.sink.is_none()
            && self.transport.is_none()
    }

    /// Fails while a transport is held or a connect is under way.
    fn check_media_replaceable(&self) -> Result<()> {
        if self.state.is_connecting() || self.state == SessionState::Connected {
            return Err(Error::Precondition(MEDIA_IN_USE.to_string()));
        }
        if self.transport.is_some() {
            return Err(Error::Precondition(LOST_CONNECTION.to_string()));
        }
        Ok(())
    }

    fn pre_connect_state(&self) -> SessionState {
        if self.media.is_some() {
            SessionState::MediaReady
        } else {
            SessionState::Idle
        }
    }
}

impl Client {
    /// Creates a client with explicit media and transport providers.
    pub fn new(
        config: SessionConfig,
        devices: Arc<dyn MediaDevices>,
        factory: Arc<dyn TransportFactory>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build http client: {}", e)))?;
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        Ok(Self {
            config: Arc::new(config),
            http,
            devices,
            factory,
            inner: Arc::new(Mutex::new(Inner::new())),
            media_gate: tokio::sync::Mutex::new(()),
            events,
        })
    }

    /// Creates a client using the webrtc-rs transport.
    pub fn with_webrtc(config: SessionConfig, devices: Arc<dyn MediaDevices>) -> Result<Self> {
        Self::new(config, devices, Arc::new(WebRtcTransportFactory::new()))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Returns the client state together with the live sub-channel states.
    pub fn snapshot(&self) -> SessionStateSnapshot {
        let inner = self.inner.lock();
        SessionStateSnapshot {
            state: inner.state,
            peer: inner.transport.as_ref().map(|t| t.connection_state()),
            channel: inner.channel.as_ref().map(|c| c.ready_state()),
        }
    }

    /// Returns true while a credential is held and not yet consumed.
    pub fn has_credential(&self) -> bool {
        self.inner.lock().credential.is_some()
    }

    /// Subscribes to events received over the control channel.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// True only when the peer connection is connected and the control
    /// channel is open. Always read from the live sub-components.
    pub fn is_connected(&self) -> bool {
        let inner = self.inner.lock();
        if inner.state != SessionState::Connected {
            return false;
        }
        match (&inner.transport, &inner.channel) {
            (Some(transport), Some(channel)) => {
                transport.connection_state() == PeerConnectionState::Connected
                    && channel.ready_state() == ChannelState::Open
            }
            _ => false,
        }
    }

    // === Credential Acquisition ===

    /// Fetches a fresh ephemeral credential and stores it, replacing any
    /// previously held one.
    pub async fn acquire_credential(&self) -> Result<EphemeralCredential> {
        let generation = self.inner.lock().generation;
        let credential = credential::fetch(&self.http, &self.config).await?;

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            debug!("Discarding credential that arrived after disconnect");
            return Err(Error::Aborted);
        }
        inner.credential = Some(credential.clone());
        info!("Acquired ephemeral credential");
        Ok(credential)
    }

    // === Local Media Preparation ===

    /// Opens the local microphone and remembers where remote audio goes.
    ///
    /// Only a weak reference to `sink` is kept. A previously prepared stream
    /// is stopped and replaced.
    pub async fn prepare_local_media(&self, sink: Arc<dyn AudioSink>) -> Result<()> {
        let _gate = self.media_gate.lock().await;

        let generation = {
            let inner = self.inner.lock();
            inner.check_media_replaceable()?;
            inner.generation
        };

        let stream = self.devices.open_microphone().await?;

        let previous = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                stream.stop();
                return Err(Error::Aborted);
            }
            if let Err(e) = inner.check_media_replaceable() {
                stream.stop();
                return Err(e);
            }
            stream.set_enabled(inner.microphone_enabled);
            inner.sink = Some(Arc::downgrade(&sink));
            inner.state = SessionState::MediaReady;
            info!(
                stream_id = %stream.id(),
                tracks = stream.tracks().len(),
                "Local media prepared"
            );
            inner.media.replace(stream)
        };
        if let Some(previous) = previous {
            previous.stop();
        }
        Ok(())
    }

    /// Enables or disables the outbound microphone tracks.
    pub fn set_microphone_enabled(&self, enabled: bool) {
        let mut inner = self.inner.lock();
        inner.microphone_enabled = enabled;
        if let Some(media) = &inner.media {
            media.set_enabled(enabled);
        }
        debug!(enabled, "Microphone toggled");
    }

    pub fn is_microphone_enabled(&self) -> bool {
        self.inner.lock().microphone_enabled
    }

    // === Peer Transport Negotiation ===

    /// Establishes the peer connection.
    ///
    /// Acquires a credential if none is held, builds the transport, and
    /// performs the offer/answer exchange. On failure every intermediate
    /// resource is released and the client returns to its pre-connect state.
    pub async fn connect(&self) -> Result<()> {
        // Held until the state leaves MediaReady so no prepare slips in between.
        let gate = self.media_gate.lock().await;

        let (generation, tracks, sink, needs_credential) = {
            let mut inner = self.inner.lock();
            if inner.state.is_connecting() {
                return Err(Error::Precondition("connect already in progress".to_string()));
            }
            if inner.state == SessionState::Connected {
                return Err(Error::Precondition("already connected".to_string()));
            }
            if inner.transport.is_some() {
                return Err(Error::Precondition(LOST_CONNECTION.to_string()));
            }
            let tracks = match &inner.media {
                Some(media) => media.tracks().to_vec(),
                None => return Err(Error::Precondition(MEDIA_REQUIRED.to_string())),
            };
            let sink = match &inner.sink {
                Some(sink) if sink.strong_count() > 0 => sink.clone(),
                _ => return Err(Error::Precondition(SINK_REQUIRED.to_string())),
            };
            let needs_credential = inner.credential.is_none();
            inner.state = if needs_credential {
                SessionState::CredentialPending
            } else {
                SessionState::Negotiating
            };
            (inner.generation, tracks, sink, needs_credential)
        };
        drop(gate);
        info!(generation, "Connecting realtime session");

        if needs_credential {
            let result = credential::fetch(&self.http, &self.config).await;
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                debug!("Discarding credential that arrived after disconnect");
                return Err(Error::Aborted);
            }
            inner.state = SessionState::MediaReady;
            match result {
                Ok(credential) => {
                    inner.credential = Some(credential);
                    inner.state = SessionState::Negotiating;
                }
                Err(e) => {
                    warn!("Credential acquisition failed: {}", e);
                    return Err(e);
                }
            }
        }

        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let transport = match self
            .factory
            .create(self.config.ice_servers(), transport_tx)
            .await
        {
            Ok(transport) => transport,
            Err(e) => {
                warn!("Failed to create peer transport: {}", e);
                self.reset_after_failure(generation);
                return Err(e);
            }
        };

        let registered = self.install(generation, |inner| {
            inner.transport = Some(transport.clone());
        });
        let result = match registered {
            Ok(()) => {
                self.negotiate(generation, &transport, tracks, sink, transport_rx)
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!(generation, "Realtime session connected");
                Ok(())
            }
            Err(e) => {
                warn!("Connect failed: {}", e);
                self.abort_connect(generation, &transport).await;
                Err(e)
            }
        }
    }

    /// Build and offer/answer steps on a registered transport.
    async fn negotiate(
        &self,
        generation: u64,
        transport: &Arc<dyn PeerTransport>,
        tracks: Vec<LocalAudioTrack>,
        sink: Weak<dyn AudioSink>,
        transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Result<()> {
        for track in &tracks {
            transport.add_local_track(track).await?;
        }
        transport.add_receive_only_audio().await?;

        // The channel is declared before the offer so the answer reciprocates it.
        let (channel_tx, channel_rx) = mpsc::unbounded_channel();
        let channel = transport
            .create_control_channel(self.config.channel_label(), channel_tx)
            .await?;

        let listener = ConnectionEvents {
            generation,
            inner: Arc::downgrade(&self.inner),
            sink,
            channel: channel.clone(),
            greeting: self.config.greeting().map(str::to_string),
            events: self.events.clone(),
        };
        let task = tokio::spawn(listener.run(transport_rx, channel_rx));
        let abort = task.abort_handle();
        if let Err(e) = self.install(generation, |inner| {
            inner.channel = Some(channel.clone());
            inner.event_task = Some(task);
        }) {
            abort.abort();
            return Err(e);
        }

        let offer = transport.create_offer().await?;
        transport.set_local_description(offer.clone()).await?;
        let offer = transport.local_description().await.unwrap_or(offer);

        let credential = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return Err(Error::Aborted);
            }
            inner.credential.take()
        }
        .ok_or_else(|| Error::Precondition("no credential available for negotiation".to_string()))?;

        let answer = signaling::exchange(&self.http, &self.config, &credential, &offer).await?;
        drop(credential);
        self.check_generation(generation)?;

        transport.set_remote_description(answer).await?;
        self.install(generation, |inner| inner.state = SessionState::Connected)
    }

    /// Applies `f` if no disconnect happened since `generation` was read.
    fn install<F>(&self, generation: u64, f: F) -> Result<()>
    where
        F: FnOnce(&mut Inner),
    {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return Err(Error::Aborted);
        }
        f(&mut *inner);
        Ok(())
    }

    fn check_generation(&self, generation: u64) -> Result<()> {
        self.install(generation, |_| {})
    }

    /// Returns to the pre-connect state, dropping the credential. Yields the
    /// channel and listener still to be released, or None when stale.
    fn reset_after_failure(&self, generation: u64) -> Option<Leftovers> {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return None;
        }
        inner.transport = None;
        inner.credential = None;
        inner.state = inner.pre_connect_state();
        Some(Leftovers {
            channel: inner.channel.take(),
            event_task: inner.event_task.take(),
        })
    }

    /// Tears down a partially built connection.
    async fn abort_connect(&self, generation: u64, transport: &Arc<dyn PeerTransport>) {
        if let Some(leftovers) = self.reset_after_failure(generation) {
            if let Some(task) = leftovers.event_task {
                task.abort();
            }
            if let Some(channel) = leftovers.channel {
                if let Err(e) = channel.close().await {
                    debug!("Failed to close control channel: {}", e);
                }
            }
        }
        if let Err(e) = transport.close().await {
            debug!("Failed to close peer transport: {}", e);
        }
    }

    // === Control Message Send ===

    /// Sends `text` as a response.create event.
    ///
    /// Fails with [`Error::ChannelNotReady`] unless connected with the
    /// control channel open. Nothing is queued and no acknowledgment is awaited.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let channel = {
            let inner = self.inner.lock();
            match (&inner.state, &inner.channel) {
                (SessionState::Connected, Some(channel))
                    if channel.ready_state() == ChannelState::Open =>
                {
                    channel.clone()
                }
                _ => return Err(Error::ChannelNotReady),
            }
        };
        send_event(channel.as_ref(), &ClientEvent::response_create(text)).await
    }

    // === Teardown ===

    /// Releases every resource held by the session.
    ///
    /// Safe from any state and idempotent. A pending connect is aborted: its
    /// late results are discarded rather than applied.
    pub async fn disconnect(&self) {
        let (channel, transport, media, sink, credential, task) = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            if inner.is_pristine() {
                return;
            }
            inner.state = SessionState::Closed;
            (
                inner.channel.take(),
                inner.transport.take(),
                inner.media.take(),
                inner.sink.take(),
                inner.credential.take(),
                inner.event_task.take(),
            )
        };

        if let Some(task) = task {
            task.abort();
        }
        if let Some(channel) = channel {
            if let Err(e) = channel.close().await {
                warn!("Failed to close control channel: {}", e);
            }
        }
        if let Some(transport) = transport {
            if let Err(e) = transport.close().await {
                warn!("Failed to close peer transport: {}", e);
            }
        }
        if let Some(media) = media {
            for track in media.tracks() {
                track.stop();
            }
            debug!(stream_id = %media.id(), "Local media stopped");
        }
        if let Some(sink) = sink.and_then(|sink| sink.upgrade()) {
            sink.detach();
        }
        drop(credential);

        info!("Realtime session disconnected");
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(task) = self.inner.lock().event_task.take() {
            task.abort();
        }
    }
}

async fn send_event(channel: &dyn ControlChannel, event: &ClientEvent) -> Result<()> {
    let text = event.to_json()?;
    channel.send_text(text).await?;
    debug!(event_type = %event.event_type, "Sent control event");
    Ok(())
}

struct Leftovers {
    channel: Option<Arc<dyn ControlChannel>>,
    event_task: Option<JoinHandle<()>>,
}

/// Per-connection listener for transport and channel callbacks.
struct ConnectionEvents {
    generation: u64,
    inner: Weak<Mutex<Inner>>,
    sink: Weak<dyn AudioSink>,
    channel: Arc<dyn ControlChannel>,
    greeting: Option<String>,
    events: broadcast::Sender<ServerEvent>,
}

impl ConnectionEvents {
    async fn run(
        self,
        mut transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
        mut channel_rx: mpsc::UnboundedReceiver<ChannelEvent>,
    ) {
        let mut transport_open = true;
        let mut channel_open = true;

        while transport_open || channel_open {
            tokio::select! {
                event = transport_rx.recv(), if transport_open => match event {
                    Some(event) => self.on_transport_event(event),
                    None => transport_open = false,
                },
                event = channel_rx.recv(), if channel_open => match event {
                    Some(event) => self.on_channel_event(event).await,
                    None => channel_open = false,
                },
            }
        }
    }

    fn on_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::RemoteTrack(stream) => match self.sink.upgrade() {
                Some(sink) => {
                    info!(
                        track_id = %stream.track_id(),
                        mime_type = %stream.mime_type(),
                        "Attaching remote audio"
                    );
                    sink.attach(stream);
                }
                None => warn!("Remote audio arrived after the output sink was dropped"),
            },
            TransportEvent::StateChanged(state) => {
                info!(state = ?state, "Peer connection state");
                if matches!(state, PeerConnectionState::Failed | PeerConnectionState::Closed) {
                    self.mark_closed(state);
                }
            }
        }
    }

    fn mark_closed(&self, state: PeerConnectionState) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut inner = inner.lock();
        if inner.generation == self.generation && inner.state == SessionState::Connected {
            warn!(state = ?state, "Peer connection lost");
            inner.state = SessionState::Closed;
        }
    }

    async fn on_channel_event(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Open => {
                info!(label = %self.channel.label(), "Control channel opened");
                if let Some(greeting) = &self.greeting {
                    let event = ClientEvent::response_create(greeting.as_str());
                    if let Err(e) = send_event(self.channel.as_ref(), &event).await {
                        warn!("Failed to send greeting: {}", e);
                    }
                }
            }
            ChannelEvent::Message(text) => match ServerEvent::parse(&text) {
                Ok(event) => {
                    if let Some(error) = event.error.as_ref().filter(|_| event.is_error()) {
                        warn!("Server error event: {}", error);
                    } else {
                        debug!(event_type = %event.event_type, "Received control event");
                    }
                    let _ = self.events.send(event);
                }
                Err(e) => warn!("Dropping malformed control message: {}", e),
            },
            ChannelEvent::Error(e) => warn!("Control channel error: {}", e),
            ChannelEvent::Closed => info!("Control channel closed"),
        }
    }
}
