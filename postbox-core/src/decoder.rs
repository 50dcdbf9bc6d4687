//! Server-Sent-Events frame decoding.
//!
//! The decoder owns a byte buffer that survives across chunks, so a frame
//! split anywhere (even inside a multi-byte character) decodes the same as
//! a frame delivered whole. Only `data:` lines produce payloads.

use serde_json::Value;

use crate::error::DecodeError;

/// Payload that ends the stream without producing an event.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded frame: a JSON payload or the reason it could not be decoded.
pub type DecodedFrame = Result<Value, DecodeError>;

/// Incremental `data: <json>` line decoder.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    terminated: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk and return every frame it completed, in order.
    ///
    /// Bytes after the `[DONE]` sentinel are ignored.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<DecodedFrame> {
        if self.terminated {
            return Vec::new();
        }

        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut consumed = 0;

        while let Some(offset) = self.buffer[consumed..].iter().position(|&b| b == b'\n') {
            let end = consumed + offset;
            let line = &self.buffer[consumed..end];
            consumed = end + 1;

            if let Some(frame) = Self::decode_line(line, &mut self.terminated) {
                frames.push(frame);
            }
            if self.terminated {
                self.buffer.clear();
                return frames;
            }
        }

        self.buffer.drain(..consumed);
        frames
    }

    /// Flush a final line that was not newline-terminated.
    ///
    /// Call once when the byte stream ends.
    pub fn finish(&mut self) -> Vec<DecodedFrame> {
        if self.terminated || self.buffer.is_empty() {
            self.buffer.clear();
            return Vec::new();
        }

        let line = std::mem::take(&mut self.buffer);
        Self::decode_line(&line, &mut self.terminated)
            .into_iter()
            .collect()
    }

    /// Returns true once the `[DONE]` sentinel has been seen.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    fn decode_line(line: &[u8], terminated: &mut bool) -> Option<DecodedFrame> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let payload = line.strip_prefix(b"data:")?;
        let payload = payload.strip_prefix(b" ").unwrap_or(payload);

        let payload = match std::str::from_utf8(payload) {
            Ok(text) => text.trim_end(),
            Err(_) => return Some(Err(DecodeError::InvalidUtf8)),
        };

        if payload.is_empty() {
            return None;
        }

        if payload == DONE_SENTINEL {
            *terminated = true;
            return None;
        }

        log::trace!("decoded frame: {}", payload);

        Some(
            serde_json::from_str(payload).map_err(|e| DecodeError::InvalidJson {
                payload: payload.to_string(),
                reason: e.to_string(),
            }),
        )
    }
}

#[cfg(test)]
#[path = "decoder_tests.rs"]
mod tests;
