//! Wire types for the Converse API.
//!
//! Request and response bodies exchanged with the auth and chat services.
//! Streaming frames are not here - they live in `stream::types`, since
//! they are decoded from raw bytes rather than deserialized whole.

pub mod auth;
pub mod chat;

pub use auth::{LoginRequest, RefreshRequest, TokenGrant, UserProfile};
pub use chat::{ChatMessage, ChatReply, ChatRequest, Conversation, ConversationDetail};

use serde::Deserialize;

/// Standard response envelope: every JSON endpoint wraps its payload in a
/// top-level `data` field.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub data: T,
}
