// Chat response streaming
//
// The chat endpoint replies with a chunked byte stream of
// newline-delimited frames: an optional session-info frame first, then
// content chunks, then a `data: [DONE]` terminator. This module turns
// that wire form into typed events with a hard frame bound and
// guaranteed handle release.
//
// `decoder` is pure and synchronous (bytes in, frames out); `consumer`
// owns the async read loop and the callback discipline.

pub mod consumer;
pub mod decoder;
pub mod types;


pub use consumer::consume;
pub use decoder::{FrameDecoder, MAX_STREAM_FRAMES};
pub use types::{SessionInfo, StreamError, StreamFrame, StreamHandler};
