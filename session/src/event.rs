//! Control channel event envelopes.

use serde::{Deserialize, Serialize};

use crate::error::Result;

// ============================================================================
// Client Event Types (sent from client to server)
// ============================================================================

/// Session update event.
pub const EVENT_TYPE_SESSION_UPDATE: &str = "session.update";

/// Conversation item events.
pub const EVENT_TYPE_CONVERSATION_ITEM_CREATE: &str = "conversation.item.create";

/// Response events.
pub const EVENT_TYPE_RESPONSE_CREATE: &str = "response.create";
pub const EVENT_TYPE_RESPONSE_CANCEL: &str = "response.cancel";

// ============================================================================
// Server Event Types (sent from server to client)
// ============================================================================

/// Error event.
pub const EVENT_TYPE_ERROR: &str = "error";

/// Session events.
pub const EVENT_TYPE_SESSION_CREATED: &str = "session.created";
pub const EVENT_TYPE_SESSION_UPDATED: &str = "session.updated";

/// Input audio buffer events.
pub const EVENT_TYPE_INPUT_AUDIO_BUFFER_SPEECH_STARTED: &str = "input_audio_buffer.speech_started";
pub const EVENT_TYPE_INPUT_AUDIO_BUFFER_SPEECH_STOPPED: &str = "input_audio_buffer.speech_stopped";

/// Response events.
pub const EVENT_TYPE_RESPONSE_CREATED: &str = "response.created";
pub const EVENT_TYPE_RESPONSE_DONE: &str = "response.done";

/// Response text events.
pub const EVENT_TYPE_RESPONSE_TEXT_DELTA: &str = "response.text.delta";
pub const EVENT_TYPE_RESPONSE_TEXT_DONE: &str = "response.text.done";

/// Response audio transcript events.
pub const EVENT_TYPE_RESPONSE_AUDIO_TRANSCRIPT_DELTA: &str = "response.audio_transcript.delta";
pub const EVENT_TYPE_RESPONSE_AUDIO_TRANSCRIPT_DONE: &str = "response.audio_transcript.done";

// ============================================================================
// Client Event
// ============================================================================

/// Event envelope written to the control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEvent {
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: String,

    /// Client-generated event identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,

    /// Response parameters (for response.create).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseInstructions>,
}

/// Instructions carried by a response.create event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseInstructions {
    pub instructions: String,
}

impl ClientEvent {
    /// Creates a response.create event asking the model to respond to `instructions`.
    pub fn response_create(instructions: impl Into<String>) -> Self {
        Self {
            event_type: EVENT_TYPE_RESPONSE_CREATE.to_string(),
            event_id: Some(generate_event_id()),
            response: Some(ResponseInstructions {
                instructions: instructions.into(),
            }),
        }
    }

    /// Encodes the event as JSON text.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Server Event
// ============================================================================

/// Event received over the control channel.
///
/// Only the commonly used fields are typed; the full payload is kept in `raw`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerEvent {
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: String,

    /// Unique event identifier.
    #[serde(default)]
    pub event_id: Option<String>,

    /// Response payload (for response.* events).
    #[serde(default)]
    pub response: Option<serde_json::Value>,

    /// Response identifier.
    #[serde(default)]
    pub response_id: Option<String>,

    /// Item ID (for various events).
    #[serde(default)]
    pub item_id: Option<String>,

    /// Incremental text (for *.delta events).
    #[serde(default)]
    pub delta: Option<String>,

    /// Final text (for response.text.done).
    #[serde(default)]
    pub text: Option<String>,

    /// Transcription text.
    #[serde(default)]
    pub transcript: Option<String>,

    /// Error information.
    #[serde(default)]
    pub error: Option<EventError>,

    /// Raw JSON message.
    #[serde(skip)]
    pub raw: Option<String>,
}

impl ServerEvent {
    /// Parses an inbound control message.
    pub fn parse(text: &str) -> Result<Self> {
        let mut event: ServerEvent = serde_json::from_str(text)?;
        event.raw = Some(text.to_string());
        Ok(event)
    }

    /// Returns true if this is an error event.
    pub fn is_error(&self) -> bool {
        self.event_type == EVENT_TYPE_ERROR
    }

    /// Returns true if this is a response done event.
    pub fn is_response_done(&self) -> bool {
        self.event_type == EVENT_TYPE_RESPONSE_DONE
    }

    /// Returns true if this event carries incremental text or transcript.
    pub fn is_delta(&self) -> bool {
        self.event_type == EVENT_TYPE_RESPONSE_TEXT_DELTA
            || self.event_type == EVENT_TYPE_RESPONSE_AUDIO_TRANSCRIPT_DELTA
    }
}

/// Error information from error events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventError {
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code.as_deref().or(self.error_type.as_deref()) {
            Some(kind) => write!(f, "{}: {}", kind, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

fn generate_event_id() -> String {
    format!("evt_{}", &uuid::Uuid::new_v4().simple().to_string()[..12])
}
