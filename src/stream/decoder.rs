// Frame decoder
//
// Reassembles newline-delimited frames from arbitrarily-chunked bytes and
// classifies each line into a typed frame. Purely synchronous; the async
// read loop lives in `consumer`.

use serde_json::Value;
use tracing::trace;

use super::types::{SessionInfo, StreamError, StreamFrame};

/// Upper bound on frames decoded from one stream. Protects against a
/// malfunctioning or adversarial server that never terminates.
pub const MAX_STREAM_FRAMES: usize = 10_000;

/// Literal payload signalling clean end-of-stream
const DONE_SENTINEL: &str = "[DONE]";

/// Frame prefix for server-sent-event style lines
const DATA_PREFIX: &str = "data: ";

/// Per-stream decoding state. One instance per stream consumption;
/// discard it when the stream ends.
pub struct FrameDecoder {
    /// Bytes received but not yet terminated by a newline. Kept as raw
    /// bytes so a multi-byte character split across chunks survives
    /// intact - a UTF-8 continuation byte can never equal `\n`.
    buffer: Vec<u8>,
    first_frame: bool,
    frame_count: usize,
    max_frames: usize,
    finished: bool,
}

impl FrameDecoder {
    pub fn new(max_frames: usize) -> Self {
        Self {
            buffer: Vec::new(),
            first_frame: true,
            frame_count: 0,
            max_frames,
            finished: false,
        }
    }

    /// Feed raw bytes, appending any frames completed by this chunk to
    /// `out`. Frames decoded before the bound was hit are already in
    /// `out` when this returns an error. After a terminator or an error
    /// the decoder is finished and further feeds are ignored.
    pub fn feed(
        &mut self,
        chunk: &[u8],
        out: &mut Vec<StreamFrame>,
    ) -> Result<(), StreamError> {
        if self.finished {
            return Ok(());
        }
        self.buffer.extend_from_slice(chunk);

        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
            self.process_line(&line, out)?;
            if self.finished {
                break;
            }
        }
        Ok(())
    }

    fn process_line(
        &mut self,
        line: &str,
        out: &mut Vec<StreamFrame>,
    ) -> Result<(), StreamError> {
        if line.trim().is_empty() {
            return Ok(());
        }

        let first = self.first_frame;
        self.first_frame = false;

        let frame = match line.strip_prefix(DATA_PREFIX) {
            Some(payload) => {
                if payload == DONE_SENTINEL {
                    self.finished = true;
                    out.push(StreamFrame::Done);
                    return Ok(());
                }
                classify_payload(payload, first)
            }
            // No frame prefix: the whole line is plain-text content.
            None => Some(StreamFrame::Chunk(line.to_string())),
        };

        match frame {
            Some(StreamFrame::SessionInfo(info)) => {
                // Metadata, not content - exempt from the frame bound.
                out.push(StreamFrame::SessionInfo(info));
            }
            other => {
                if let Some(frame) = other {
                    out.push(frame);
                } else {
                    trace!("dropping structured frame with no content field");
                }
                self.frame_count += 1;
                if self.frame_count >= self.max_frames {
                    self.finished = true;
                    return Err(StreamError::TooLong {
                        max: self.max_frames,
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(MAX_STREAM_FRAMES)
    }
}

/// Classify one `data: ` payload.
///
/// Structured parse failure is an expected branch, not an error: the raw
/// payload text becomes the content.
fn classify_payload(payload: &str, first: bool) -> Option<StreamFrame> {
    let Ok(parsed) = serde_json::from_str::<Value>(payload) else {
        return Some(StreamFrame::Chunk(payload.to_string()));
    };

    // Only the first non-blank frame of a stream may carry session info.
    if first {
        if let Some(info) = SessionInfo::from_value(&parsed) {
            return Some(StreamFrame::SessionInfo(info));
        }
    }

    if let Some(content) = parsed.get("content") {
        return coerce_text(content).map(StreamFrame::Chunk);
    }

    coerce_text(&parsed).map(StreamFrame::Chunk)
}

/// Content may arrive as a string or a number; both render as text.
/// Anything else (objects, arrays, booleans) is not content.
fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
