//! Interactive realtime voice session.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use clap::Args;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::debug;

use rtcvoice_session::event::{
    EVENT_TYPE_ERROR, EVENT_TYPE_RESPONSE_AUDIO_TRANSCRIPT_DELTA, EVENT_TYPE_RESPONSE_DONE,
    EVENT_TYPE_RESPONSE_TEXT_DELTA,
};
use rtcvoice_session::media::OPUS_SILENCE_FRAME;
use rtcvoice_session::{
    AudioSink, Client, LocalMediaStream, MediaDevices, RemoteAudioStream, ServerEvent,
    SessionConfig, VirtualMicrophone, MODEL_GPT4O_REALTIME_PREVIEW,
};

use super::{find_context, print_error, print_info, print_success, print_verbose};
use crate::Cli;

/// Duration of one outbound Opus frame.
const FRAME_DURATION: Duration = Duration::from_millis(20);

/// Start an interactive voice session.
///
/// Each line read from stdin is sent as a response request. The local
/// microphone is a virtual one streaming silence.
#[derive(Args)]
pub struct ChatCommand {
    /// Model to use (overrides config file)
    #[arg(long)]
    model: Option<String>,
    /// Credential backend address (overrides config file)
    #[arg(long)]
    api_base: Option<String>,
    /// Greeting instructions (overrides config file, empty disables)
    #[arg(long)]
    greeting: Option<String>,
}

impl ChatCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let config = self.session_config(cli)?;
        print_verbose(cli, &format!("Backend: {}", config.api_base()));
        print_verbose(cli, &format!("Model: {}", config.model()));

        let client = Client::with_webrtc(config, Arc::new(SilentMicrophone::default()))?;
        let output = Arc::new(PlaybackCounter::default());

        client.prepare_local_media(output.clone()).await?;
        print_info("Connecting to realtime session...");
        client.connect().await?;
        print_success("Connected");

        let mut events = client.subscribe();
        let printer = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => print_event(&event),
                    Err(RecvError::Lagged(n)) => debug!("Skipped {} events", n),
                    Err(RecvError::Closed) => break,
                }
            }
        });

        print_help();
        let result = chat_loop(&client).await;

        client.disconnect().await;
        printer.abort();
        print_verbose(
            cli,
            &format!("Received {} bytes of remote audio", output.received()),
        );
        result
    }

    fn session_config(&self, cli: &Cli) -> anyhow::Result<SessionConfig> {
        let ctx = find_context(cli)?.unwrap_or_default();
        if !ctx.name.is_empty() {
            print_verbose(cli, &format!("Using context: {}", ctx.name));
        }

        let api_base = self
            .api_base
            .clone()
            .unwrap_or_else(|| ctx.api_base.clone());
        if api_base.is_empty() {
            anyhow::bail!(
                "no backend configured. Use --api-base or add a context with 'rtcvoice config add-context'"
            );
        }
        let model = self
            .model
            .clone()
            .or_else(|| Some(ctx.model.clone()).filter(|m| !m.is_empty()))
            .unwrap_or_else(|| MODEL_GPT4O_REALTIME_PREVIEW.to_string());

        let mut builder = SessionConfig::builder(api_base, model);
        if !ctx.realtime_url.is_empty() {
            builder = builder.realtime_url(ctx.realtime_url.clone());
        }
        if let Some(greeting) = self.greeting.clone().or(ctx.greeting) {
            builder = builder.greeting(Some(greeting).filter(|g| !g.is_empty()));
        }
        if ctx.timeout > 0 {
            builder = builder.http_timeout(Duration::from_secs(ctx.timeout));
        }
        Ok(builder.build()?)
    }
}

async fn chat_loop(client: &Client) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match line.trim() {
                    "" => {}
                    "/exit" | "/quit" => break,
                    "/mute" => {
                        client.set_microphone_enabled(false);
                        print_info("Microphone muted");
                    }
                    "/unmute" => {
                        client.set_microphone_enabled(true);
                        print_info("Microphone unmuted");
                    }
                    "/status" => {
                        let snapshot = client.snapshot();
                        println!(
                            "state: {:?}, peer: {:?}, channel: {:?}, connected: {}",
                            snapshot.state,
                            snapshot.peer,
                            snapshot.channel,
                            client.is_connected()
                        );
                    }
                    "/help" => print_help(),
                    cmd if cmd.starts_with('/') => {
                        print_error(&format!("Unknown command: {} (try /help)", cmd));
                    }
                    text => {
                        if let Err(e) = client.send_message(text).await {
                            print_error(&format!("Failed to send: {}", e));
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    Ok(())
}

fn print_help() {
    println!("\nType a message and press enter to ask for a response.");
    println!("Commands:");
    println!("  /mute, /unmute - Toggle the microphone");
    println!("  /status        - Show connection state");
    println!("  /exit, /quit   - End session");
    println!("  /help          - Show this help");
    println!();
}

fn print_event(event: &ServerEvent) {
    match event.event_type.as_str() {
        EVENT_TYPE_RESPONSE_TEXT_DELTA | EVENT_TYPE_RESPONSE_AUDIO_TRANSCRIPT_DELTA => {
            if let Some(delta) = &event.delta {
                print!("{}", delta);
                let _ = std::io::stdout().flush();
            }
        }
        EVENT_TYPE_RESPONSE_DONE => println!(),
        EVENT_TYPE_ERROR => {
            if let Some(err) = &event.error {
                print_error(&format!("Server error: {}", err));
            }
        }
        other => debug!(event_type = other, "Event"),
    }
}

/// A virtual microphone that keeps every opened track fed with silence.
#[derive(Default)]
struct SilentMicrophone {
    inner: VirtualMicrophone,
}

#[async_trait]
impl MediaDevices for SilentMicrophone {
    async fn open_microphone(&self) -> rtcvoice_session::Result<LocalMediaStream> {
        let stream = self.inner.open_microphone().await?;
        for track in stream.tracks() {
            let track = track.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(FRAME_DURATION);
                loop {
                    ticker.tick().await;
                    let frame = Bytes::from_static(&OPUS_SILENCE_FRAME);
                    if let Err(e) = track.write_sample(frame, FRAME_DURATION).await {
                        debug!(track_id = %track.id(), "Microphone feed ended: {}", e);
                        break;
                    }
                }
            });
        }
        Ok(stream)
    }
}

/// Drains remote audio and counts the received bytes.
#[derive(Default)]
struct PlaybackCounter {
    received: Arc<AtomicUsize>,
    drain: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackCounter {
    fn received(&self) -> usize {
        self.received.load(Ordering::Relaxed)
    }
}

impl AudioSink for PlaybackCounter {
    fn attach(&self, mut stream: RemoteAudioStream) {
        debug!(
            track_id = %stream.track_id(),
            mime_type = %stream.mime_type(),
            "Remote audio attached"
        );
        let received = self.received.clone();
        let task = tokio::spawn(async move {
            while let Some(payload) = stream.recv().await {
                received.fetch_add(payload.len(), Ordering::Relaxed);
            }
        });
        if let Some(previous) = self.drain.lock().replace(task) {
            previous.abort();
        }
    }

    fn detach(&self) {
        if let Some(task) = self.drain.lock().take() {
            task.abort();
        }
    }
}
