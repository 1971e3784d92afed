//! Server-sent-event decoding for streamed chat completions.
//!
//! A streamed completion body is a sequence of lines such as
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//! data: {"choices":[{"delta":{"content":"lo"}}]}
//! data: [DONE]
//! ```
//!
//! [`SseDecoder`] is the synchronous core: it accepts raw byte chunks in any
//! split, keeps the unterminated tail line between calls and returns the
//! content deltas of every complete line. [`decode_deltas`] drives it from an
//! async byte stream (for example `reqwest::Response::bytes_stream`).

use std::pin::Pin;

use encoding_rs::{CoderResult, Decoder, UTF_8};
use futures::{Stream, StreamExt};
use serde::Deserialize;

use crate::models::ApiErrorBody;
use crate::{LMStudioError, Result};

/// Prefix of a data line.
pub const DATA_PREFIX: &str = "data:";

/// Payload that ends the stream.
pub const DONE_PAYLOAD: &str = "[DONE]";

/// Lazy, single-pass stream of content deltas.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Incremental decoder from body bytes to content deltas.
pub struct SseDecoder {
    /// Stateful UTF-8 decoder; holds partial multi-byte sequences between chunks.
    text: Decoder,
    /// Text after the last line feed seen so far.
    buffer: String,
    /// Set once `[DONE]` was seen or [`SseDecoder::finish`] ran.
    finished: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            text: UTF_8.new_decoder_without_bom_handling(),
            buffer: String::new(),
            finished: false,
        }
    }

    /// Whether the decoder has reached the end of the stream.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one chunk of body bytes, returning the deltas of every line it
    /// completes. Returns nothing once the stream is finished.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }
        self.decode(chunk, false);
        self.drain_complete_lines()
    }

    /// Signal end of transport. Flushes the decoder and treats any
    /// unterminated tail as a final line.
    pub fn finish(&mut self) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }
        self.decode(&[], true);
        let mut deltas = self.drain_complete_lines();
        if !self.finished {
            let tail = std::mem::take(&mut self.buffer);
            process_line(&tail, &mut deltas);
            self.finished = true;
        }
        deltas
    }

    fn decode(&mut self, mut bytes: &[u8], last: bool) {
        loop {
            if let Some(needed) = self.text.max_utf8_buffer_length(bytes.len()) {
                self.buffer.reserve(needed);
            }
            let (result, read, _had_errors) =
                self.text.decode_to_string(bytes, &mut self.buffer, last);
            bytes = &bytes[read..];
            match result {
                CoderResult::InputEmpty => break,
                CoderResult::OutputFull => self.buffer.reserve(bytes.len().max(4)),
            }
        }
    }

    fn drain_complete_lines(&mut self) -> Vec<String> {
        let mut deltas = Vec::new();
        let Some(last_newline) = self.buffer.rfind('\n') else {
            return deltas;
        };

        let tail = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, tail);

        for line in complete.split('\n') {
            if process_line(line, &mut deltas) == LineOutcome::Done {
                tracing::debug!("Received [DONE] sentinel");
                self.finished = true;
                self.buffer.clear();
                break;
            }
        }
        deltas
    }
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, PartialEq, Eq)]
enum LineOutcome {
    Continue,
    Done,
}

fn process_line(raw: &str, deltas: &mut Vec<String>) -> LineOutcome {
    let line = raw.trim();
    let Some(payload) = line.strip_prefix(DATA_PREFIX).map(str::trim_start) else {
        if !line.is_empty() {
            tracing::trace!(line = %line, "Ignoring non-data SSE line");
        }
        return LineOutcome::Continue;
    };

    if payload == DONE_PAYLOAD {
        return LineOutcome::Done;
    }

    match parse_frame(payload) {
        Ok(Some(delta)) => deltas.push(delta),
        Ok(None) => {}
        Err(e) => match ApiErrorBody::message_from(payload) {
            Some(message) => {
                tracing::warn!(message = %message, "Skipping SSE error frame");
            }
            None => {
                tracing::warn!(error = %e, data = %payload, "Skipping malformed SSE frame");
            }
        },
    }
    LineOutcome::Continue
}

/// Extract the first choice's non-empty content delta from one frame.
fn parse_frame(payload: &str) -> std::result::Result<Option<String>, serde_json::Error> {
    let chunk: ChatCompletionChunk = serde_json::from_str(payload)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

/// Turn a live body byte stream into a stream of content deltas.
///
/// The stream ends on `[DONE]` or when the body ends. A transport error ends
/// it with [`LMStudioError::StreamInterrupted`]; deltas already yielded stand.
pub fn decode_deltas<S, B, E>(body: S) -> DeltaStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut decoder = SseDecoder::new();
        let mut body = Box::pin(body);

        while let Some(chunk) = body.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!(error = %e, "SSE transport failed");
                    yield Err::<String, LMStudioError>(LMStudioError::StreamInterrupted(e.to_string()));
                    return;
                }
            };

            for delta in decoder.feed(bytes.as_ref()) {
                yield Ok(delta);
            }
            if decoder.is_finished() {
                return;
            }
        }

        for delta in decoder.finish() {
            yield Ok(delta);
        }
    })
}
