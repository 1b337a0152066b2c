// Stream consumer
//
// Drives a byte stream through the frame decoder, dispatching typed
// events into a handler. Owns the terminal-signal discipline: exactly one
// of `on_complete` / `on_error`, exactly once, always last.

use std::fmt;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use super::decoder::FrameDecoder;
use super::types::{StreamError, StreamFrame, StreamHandler};

/// Consume a chat response stream to completion or failure.
///
/// Every exit path - end-of-transport, `[DONE]` terminator, read error,
/// frame bound exceeded, or the caller dropping this future mid-flight -
/// releases the underlying stream handle. Cancellation invokes no further
/// callbacks.
///
/// No stall timeout is applied here; a caller that wants one can wrap the
/// future in `tokio::time::timeout`, which cancels it and releases the
/// handle all the same.
pub async fn consume<S, E, H>(stream: S, handler: &mut H)
where
    S: Stream<Item = Result<Bytes, E>>,
    E: fmt::Display,
    H: StreamHandler,
{
    let mut stream = Box::pin(stream);
    let mut decoder = FrameDecoder::default();
    let mut frames = Vec::new();

    loop {
        match stream.next().await {
            // End-of-transport with no pending error is a clean finish,
            // terminator or not.
            None => {
                handler.on_complete();
                break;
            }
            Some(Err(e)) => {
                warn!(error = %e, "chat stream read failed");
                handler.on_error(StreamError::Read(e.to_string()));
                break;
            }
            Some(Ok(chunk)) => {
                frames.clear();
                let fed = decoder.feed(&chunk, &mut frames);

                let mut terminated = false;
                for frame in frames.drain(..) {
                    match frame {
                        StreamFrame::SessionInfo(info) => handler.on_session_info(info),
                        StreamFrame::Chunk(text) => handler.on_chunk(&text),
                        StreamFrame::Done => {
                            handler.on_complete();
                            terminated = true;
                            break;
                        }
                    }
                }
                if terminated {
                    break;
                }
                if let Err(e) = fed {
                    warn!(error = %e, "aborting chat stream");
                    handler.on_error(e);
                    break;
                }
            }
        }
    }

    // Dropping the stream releases the underlying connection; this runs
    // on every exit path above, and on cancellation via the caller
    // dropping the future.
    drop(stream);
    debug!("chat stream handle released");
}
