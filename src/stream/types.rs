// Stream types
//
// Core types for chat stream decoding: frames, errors, and the handler
// interface the consumer dispatches into.

use serde_json::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// Out-of-band session metadata delivered as the first frame of a stream
/// that starts a new conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: String,
    pub title: String,
    pub created_at: String,
}

impl SessionInfo {
    /// Detect the session frame: all three fields must be present and
    /// non-empty strings.
    pub(crate) fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            session_id: nonempty_str(value, "session_id")?,
            title: nonempty_str(value, "title")?,
            created_at: nonempty_str(value, "created_at")?,
        })
    }
}

fn nonempty_str(value: &Value, key: &str) -> Option<String> {
    let s = value.get(key)?.as_str()?;
    (!s.is_empty()).then(|| s.to_string())
}

/// One semantic frame decoded from the chat response stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    /// Session metadata (first frame only; never forwarded as content).
    SessionInfo(SessionInfo),
    /// A piece of the assistant's reply text.
    Chunk(String),
    /// Clean terminator (`data: [DONE]`), distinct from end-of-transport.
    Done,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures surfaced through [`StreamHandler::on_error`]. Parse failures
/// are not here - a frame that fails structured parsing falls back to
/// plain text and is never surfaced as an error.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Stream read failed: {0}")]
    Read(String),

    #[error("Stream exceeded {max} frames without terminating")]
    TooLong { max: usize },
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Receives decoded stream events.
///
/// `on_complete` and `on_error` are terminal and mutually exclusive:
/// exactly one of them is invoked, exactly once, as the last call the
/// consumer makes. All methods default to no-ops so handlers implement
/// only what they care about.
pub trait StreamHandler {
    fn on_session_info(&mut self, info: SessionInfo) {
        let _ = info;
    }

    fn on_chunk(&mut self, text: &str) {
        let _ = text;
    }

    fn on_complete(&mut self) {}

    fn on_error(&mut self, error: StreamError) {
        let _ = error;
    }
}
