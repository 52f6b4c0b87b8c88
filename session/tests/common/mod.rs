//! Shared fixtures: an in-process credential/negotiation backend and a
//! scripted peer transport.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};

use rtcvoice_session::{
    ChannelEvent, ChannelState, Client, ControlChannel, IceServer, LocalAudioTrack,
    LocalMediaStream, MediaDevices, PeerConnectionState, PeerTransport, RemoteAudioStream, Result,
    SessionConfig, SessionConfigBuilder, SessionDescription, TransportEvent, TransportFactory,
    VirtualMicrophone,
};

pub const TEST_MODEL: &str = "gpt-4o-realtime-preview-2024-12-17";
pub const ANSWER_SDP: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";

// ============================================================================
// Backend
// ============================================================================

/// Counters and knobs shared with the backend handlers.
pub struct BackendState {
    pub session_calls: AtomicUsize,
    pub realtime_calls: AtomicUsize,
    pub session_status: AtomicU16,
    pub realtime_status: AtomicU16,
    pub authorizations: Mutex<Vec<String>>,
    pub models: Mutex<Vec<String>>,
    pub offers: Mutex<Vec<String>>,
    pub session_gate: Mutex<Option<Arc<Notify>>>,
    pub realtime_gate: Mutex<Option<Arc<Notify>>>,
}

impl BackendState {
    fn new() -> Self {
        Self {
            session_calls: AtomicUsize::new(0),
            realtime_calls: AtomicUsize::new(0),
            session_status: AtomicU16::new(200),
            realtime_status: AtomicU16::new(200),
            authorizations: Mutex::new(Vec::new()),
            models: Mutex::new(Vec::new()),
            offers: Mutex::new(Vec::new()),
            session_gate: Mutex::new(None),
            realtime_gate: Mutex::new(None),
        }
    }

    pub fn session_calls(&self) -> usize {
        self.session_calls.load(Ordering::SeqCst)
    }

    pub fn realtime_calls(&self) -> usize {
        self.realtime_calls.load(Ordering::SeqCst)
    }

    /// Holds credential responses until the returned notify fires.
    pub fn hold_sessions(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.session_gate.lock() = Some(gate.clone());
        gate
    }

    /// Holds negotiation responses until the returned notify fires.
    pub fn hold_realtime(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.realtime_gate.lock() = Some(gate.clone());
        gate
    }
}

pub struct Backend {
    pub addr: SocketAddr,
    pub state: Arc<BackendState>,
}

impl Backend {
    pub async fn start() -> Self {
        let state = Arc::new(BackendState::new());
        let app = Router::new()
            .route("/session", post(handle_session))
            .route("/v1/realtime", post(handle_realtime))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn config(&self) -> SessionConfig {
        self.config_builder().build().unwrap()
    }

    pub fn config_builder(&self) -> SessionConfigBuilder {
        SessionConfig::builder(format!("http://{}", self.addr), TEST_MODEL)
            .realtime_url(format!("http://{}/v1/realtime", self.addr))
            .ice_servers(vec![IceServer::new("stun:127.0.0.1:3478")])
            .http_timeout(Duration::from_secs(5))
    }
}

async fn handle_session(State(state): State<Arc<BackendState>>) -> Response {
    let n = state.session_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let gate = state.session_gate.lock().clone();
    if let Some(gate) = gate {
        gate.notified().await;
    }

    let status = StatusCode::from_u16(state.session_status.load(Ordering::SeqCst)).unwrap();
    if !status.is_success() {
        return (status, "session denied").into_response();
    }
    Json(serde_json::json!({
        "id": format!("sess_{}", n),
        "object": "realtime.session",
        "client_secret": { "value": format!("token-{}", n), "expires_at": 0 }
    }))
    .into_response()
}

async fn handle_realtime(
    State(state): State<Arc<BackendState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    state.realtime_calls.fetch_add(1, Ordering::SeqCst);
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    state.authorizations.lock().push(auth);
    state
        .models
        .lock()
        .push(params.get("model").cloned().unwrap_or_default());
    state.offers.lock().push(body);

    let gate = state.realtime_gate.lock().clone();
    if let Some(gate) = gate {
        gate.notified().await;
    }

    let status = StatusCode::from_u16(state.realtime_status.load(Ordering::SeqCst)).unwrap();
    if !status.is_success() {
        return (status, "offer rejected").into_response();
    }
    (StatusCode::CREATED, ANSWER_SDP).into_response()
}

// ============================================================================
// Scripted Transport
// ============================================================================

/// Creates [`MockTransport`]s and keeps every one it built.
pub struct MockFactory {
    pub transports: Mutex<Vec<Arc<MockTransport>>>,
    pub fail_create: AtomicBool,
    /// Open the channel and report connected once the answer is applied.
    pub auto_open: AtomicBool,
    /// Shared record of close calls across transports and channels.
    pub closes: Arc<Mutex<Vec<&'static str>>>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            transports: Mutex::new(Vec::new()),
            fail_create: AtomicBool::new(false),
            auto_open: AtomicBool::new(true),
            closes: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn created(&self) -> usize {
        self.transports.lock().len()
    }

    pub fn last(&self) -> Arc<MockTransport> {
        self.transports.lock().last().cloned().expect("no transport created")
    }
}

#[async_trait]
impl TransportFactory for MockFactory {
    async fn create(
        &self,
        _ice_servers: &[IceServer],
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerTransport>> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(rtcvoice_session::Error::Transport("no network".to_string()));
        }
        let transport = Arc::new(MockTransport {
            state: Mutex::new(PeerConnectionState::New),
            events,
            channel: Mutex::new(None),
            tracks: Mutex::new(Vec::new()),
            recv_only: AtomicBool::new(false),
            remote: Mutex::new(None),
            remote_audio: Mutex::new(None),
            closed: AtomicBool::new(false),
            auto_open: self.auto_open.load(Ordering::SeqCst),
            closes: self.closes.clone(),
        });
        self.transports.lock().push(transport.clone());
        Ok(transport)
    }
}

pub struct MockTransport {
    state: Mutex<PeerConnectionState>,
    events: mpsc::UnboundedSender<TransportEvent>,
    channel: Mutex<Option<Arc<MockChannel>>>,
    pub tracks: Mutex<Vec<LocalAudioTrack>>,
    pub recv_only: AtomicBool,
    pub remote: Mutex<Option<SessionDescription>>,
    remote_audio: Mutex<Option<mpsc::Sender<Bytes>>>,
    pub closed: AtomicBool,
    auto_open: bool,
    closes: Arc<Mutex<Vec<&'static str>>>,
}

impl MockTransport {
    pub fn channel(&self) -> Arc<MockChannel> {
        self.channel.lock().clone().expect("no channel created")
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Changes the reported state without raising an event.
    pub fn set_state(&self, state: PeerConnectionState) {
        *self.state.lock() = state;
    }

    /// Changes the reported state and raises the matching event.
    pub fn transition(&self, state: PeerConnectionState) {
        self.set_state(state);
        let _ = self.events.send(TransportEvent::StateChanged(state));
    }

    /// Simulates the remote side adding its audio track.
    pub fn emit_remote_track(&self) {
        let (tx, stream) = RemoteAudioStream::channel("remote-audio", "remote", "audio/opus", 8);
        *self.remote_audio.lock() = Some(tx);
        let _ = self.events.send(TransportEvent::RemoteTrack(stream));
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn add_local_track(&self, track: &LocalAudioTrack) -> Result<()> {
        self.tracks.lock().push(track.clone());
        Ok(())
    }

    async fn add_receive_only_audio(&self) -> Result<()> {
        self.recv_only.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn create_control_channel(
        &self,
        label: &str,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Result<Arc<dyn ControlChannel>> {
        let channel = Arc::new(MockChannel {
            label: label.to_string(),
            state: Mutex::new(ChannelState::Connecting),
            events,
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            closes: self.closes.clone(),
        });
        *self.channel.lock() = Some(channel.clone());
        Ok(channel)
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription::offer("v=0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n"))
    }

    async fn set_local_description(&self, _desc: SessionDescription) -> Result<()> {
        self.set_state(PeerConnectionState::Connecting);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        None
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        *self.remote.lock() = Some(desc);
        if self.auto_open {
            self.transition(PeerConnectionState::Connected);
            self.emit_remote_track();
            if let Some(channel) = self.channel.lock().clone() {
                channel.open();
            }
        }
        Ok(())
    }

    fn connection_state(&self) -> PeerConnectionState {
        *self.state.lock()
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.set_state(PeerConnectionState::Closed);
        self.closes.lock().push("transport");
        Ok(())
    }
}

pub struct MockChannel {
    label: String,
    state: Mutex<ChannelState>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    pub sent: Mutex<Vec<String>>,
    pub closed: AtomicBool,
    closes: Arc<Mutex<Vec<&'static str>>>,
}

impl MockChannel {
    pub fn open(&self) {
        *self.state.lock() = ChannelState::Open;
        let _ = self.events.send(ChannelEvent::Open);
    }

    pub fn set_state(&self, state: ChannelState) {
        *self.state.lock() = state;
    }

    /// Raises a channel error without changing the ready state.
    pub fn fail(&self, message: &str) {
        let _ = self.events.send(ChannelEvent::Error(message.to_string()));
    }

    /// Delivers an inbound text message.
    pub fn deliver(&self, text: &str) {
        let _ = self.events.send(ChannelEvent::Message(text.to_string()));
    }

    pub fn sent(&self) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .iter()
            .map(|s| serde_json::from_str(s).unwrap())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControlChannel for MockChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn ready_state(&self) -> ChannelState {
        *self.state.lock()
    }

    async fn send_text(&self, text: String) -> Result<()> {
        self.sent.lock().push(text);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        *self.state.lock() = ChannelState::Closed;
        self.closes.lock().push("channel");
        Ok(())
    }
}

// ============================================================================
// Devices
// ============================================================================

/// A virtual microphone whose opens can be held until released.
pub struct GatedMicrophone {
    inner: VirtualMicrophone,
    started: AtomicUsize,
    gate: Mutex<Option<Arc<Notify>>>,
    opened: Mutex<Vec<LocalAudioTrack>>,
}

impl GatedMicrophone {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: VirtualMicrophone::new(),
            started: AtomicUsize::new(0),
            gate: Mutex::new(None),
            opened: Mutex::new(Vec::new()),
        })
    }

    /// Holds subsequent opens until the returned notify fires.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// First track of every stream handed out, in open order.
    pub fn opened(&self) -> Vec<LocalAudioTrack> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl MediaDevices for GatedMicrophone {
    async fn open_microphone(&self) -> Result<LocalMediaStream> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let stream = self.inner.open_microphone().await?;
        self.opened.lock().extend(stream.tracks().first().cloned());
        Ok(stream)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Routes client logs to the test writer; set RUST_LOG to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub backend: Backend,
    pub factory: Arc<MockFactory>,
    pub client: Arc<Client>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with(|b| b).await
    }

    pub async fn with<F>(configure: F) -> Self
    where
        F: FnOnce(SessionConfigBuilder) -> SessionConfigBuilder,
    {
        Self::build(configure, Arc::new(VirtualMicrophone::new())).await
    }

    pub async fn with_devices(devices: Arc<dyn MediaDevices>) -> Self {
        Self::build(|b| b, devices).await
    }

    async fn build<F>(configure: F, devices: Arc<dyn MediaDevices>) -> Self
    where
        F: FnOnce(SessionConfigBuilder) -> SessionConfigBuilder,
    {
        init_tracing();
        let backend = Backend::start().await;
        let factory = MockFactory::new();
        let config = configure(backend.config_builder()).build().unwrap();
        let client = Client::new(config, devices, factory.clone()).unwrap();
        Self {
            backend,
            factory,
            client: Arc::new(client),
        }
    }
}

/// Polls `cond` until it holds or two seconds pass.
pub async fn wait_until<F: Fn() -> bool>(cond: F) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
