//! Incremental decoding of streamed completion responses.
//!
//! The response body is a server-sent-event-style sequence of
//! newline-delimited lines. Only complete lines are decoded; bytes of a
//! line split across network reads stay buffered until the newline arrives.

use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use memchr::memchr;

use crate::api::error::ChatError;
use crate::api::StreamResponse;

type ByteChunks = Pin<Box<dyn Stream<Item = Result<Vec<u8>, ChatError>> + Send>>;

/// What a single decoded line contributes to the fragment sequence.
#[derive(Debug, PartialEq, Eq)]
enum LineEvent {
    /// A non-empty text delta to hand to the consumer.
    Fragment(String),
    /// The stream-terminator sentinel.
    Done,
    /// Comment lines, empty deltas, and malformed payloads.
    Ignored,
}

fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Decode one complete line. Lines without the `data:` marker are ignored,
/// `[DONE]` ends the sequence, and a payload that does not parse is skipped
/// rather than aborting the whole response.
fn decode_line(line: &str) -> LineEvent {
    let Some(payload) = data_payload(line) else {
        return LineEvent::Ignored;
    };

    if payload == "[DONE]" {
        return LineEvent::Done;
    }

    match serde_json::from_str::<StreamResponse>(payload) {
        Ok(chunk) => {
            let content = chunk
                .choices
                .first()
                .and_then(|choice| choice.delta.content.as_deref());
            match content {
                Some(text) if !text.is_empty() => LineEvent::Fragment(text.to_string()),
                _ => LineEvent::Ignored,
            }
        }
        Err(err) => {
            tracing::debug!(error = %err, "skipping undecodable stream line");
            LineEvent::Ignored
        }
    }
}

/// A lazy, single-pass sequence of text fragments decoded from a streaming
/// completion body.
///
/// Pull-based: nothing is read from the transport until the consumer asks
/// for the next fragment. Not restartable; after the terminator or a
/// transport error the stream only ever reports the end.
pub struct CompletionStream {
    chunks: ByteChunks,
    buffer: Vec<u8>,
    pending: VecDeque<String>,
    finished: bool,
}

impl CompletionStream {
    pub fn new(
        chunks: impl Stream<Item = Result<Vec<u8>, ChatError>> + Send + 'static,
    ) -> Self {
        Self {
            chunks: Box::pin(chunks),
            buffer: Vec::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Next text fragment, `Ok(None)` once the stream has ended — via the
    /// `[DONE]` sentinel or body exhaustion, both of which end it normally.
    pub async fn next_fragment(&mut self) -> Result<Option<String>, ChatError> {
        loop {
            if let Some(fragment) = self.pending.pop_front() {
                return Ok(Some(fragment));
            }
            if self.finished {
                return Ok(None);
            }

            match self.chunks.next().await {
                Some(Ok(chunk)) => self.ingest(&chunk),
                Some(Err(err)) => {
                    self.finished = true;
                    return Err(err);
                }
                None => self.finished = true,
            }
        }
    }

    /// Append raw bytes and decode every complete line they finish. A
    /// trailing partial line stays in the buffer for the next read.
    fn ingest(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);

        while let Some(newline) = memchr(b'\n', &self.buffer) {
            let event = match std::str::from_utf8(&self.buffer[..newline]) {
                Ok(line) => decode_line(line.trim()),
                Err(err) => {
                    tracing::warn!(error = %err, "invalid UTF-8 in stream, dropping line");
                    LineEvent::Ignored
                }
            };
            self.buffer.drain(..=newline);

            match event {
                LineEvent::Fragment(text) => self.pending.push_back(text),
                LineEvent::Done => {
                    self.finished = true;
                    return;
                }
                LineEvent::Ignored => {}
            }
        }
    }
}
