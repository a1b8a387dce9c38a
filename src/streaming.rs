//! NDJSON to SSE transcoding for streaming completions.
//!
//! The backend emits one JSON object per line; the caller expects
//! `data: <json>\n\n` frames followed by a single `data: [DONE]\n\n`
//! terminator. [`SseTranscoder`] wraps the upstream byte stream and rewrites
//! it frame by frame, surfacing mid-stream failures as a final error frame
//! rather than a truncated body.

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;
use serde::Serialize;
use tokio::time::{Instant, Sleep};
use tracing::{debug, warn};

use crate::conversion::{ollama_chunk_to_chat_chunk, role_announcement_chunk};
use crate::error::ErrorEnvelope;
use crate::models::ollama::OllamaChatResponse;
use crate::util::RequestLog;

const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

/// Serialize one value as an SSE data frame. Serialization of our own types
/// cannot fail in practice; fall back to an empty object rather than panic.
fn sse_frame<T: Serialize>(value: &T) -> Bytes {
    let json = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
    Bytes::from(format!("data: {json}\n\n"))
}

enum TranscodeState {
    /// Nothing parsed yet; the first well-formed line triggers the role
    /// announcement frame.
    AwaitingFirstLine,
    Streaming,
    /// Terminator emitted; the upstream is no longer polled.
    Done,
}

/// Adapts an upstream NDJSON byte stream into caller-facing SSE frames.
///
/// Buffers partial lines across chunk boundaries, skips blank and
/// unparseable lines, tracks token counts from the terminal line, and
/// enforces an inter-chunk stall deadline. Emits exactly one `[DONE]`
/// terminator on every path, including errors.
pub struct SseTranscoder<S> {
    inner: S,
    buffer: Vec<u8>,
    state: TranscodeState,
    pending: VecDeque<Bytes>,
    completion_id: String,
    created: u64,
    model: String,
    prompt_tokens: u32,
    completion_tokens: u32,
    stall: Pin<Box<Sleep>>,
    stall_timeout: Duration,
    log: Option<RequestLog>,
}

impl<S> SseTranscoder<S>
where
    S: Stream<Item = Result<Bytes, io::Error>> + Unpin,
{
    pub fn new(
        inner: S,
        completion_id: &str,
        created: u64,
        model: &str,
        stall_timeout: Duration,
        log: RequestLog,
    ) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            state: TranscodeState::AwaitingFirstLine,
            pending: VecDeque::new(),
            completion_id: completion_id.to_string(),
            created,
            model: model.to_string(),
            prompt_tokens: 0,
            completion_tokens: 0,
            stall: Box::pin(tokio::time::sleep(stall_timeout)),
            stall_timeout,
            log: Some(log),
        }
    }

    fn finish(&mut self, outcome: &str) {
        if let Some(mut log) = self.log.take() {
            log.complete(outcome, self.prompt_tokens, self.completion_tokens);
        }
        self.state = TranscodeState::Done;
    }

    /// Queue an error frame plus the terminator and close the stream.
    fn fail(&mut self, message: &str) {
        warn!(completion_id = %self.completion_id, reason = message, "stream failed");
        let envelope = ErrorEnvelope::new(message, "service_unavailable", "stream_error");
        self.pending.push_back(sse_frame(&envelope));
        self.pending.push_back(Bytes::from_static(DONE_FRAME));
        self.finish("error");
    }

    /// Translate one backend line into zero or more queued frames.
    fn handle_line(&mut self, line: &[u8]) {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            return;
        }
        let parsed: OllamaChatResponse = match serde_json::from_slice(trimmed) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!(completion_id = %self.completion_id, %err, "skipping malformed backend line");
                return;
            }
        };
        if matches!(self.state, TranscodeState::AwaitingFirstLine) {
            self.pending.push_back(sse_frame(&role_announcement_chunk(
                &self.completion_id,
                self.created,
                &self.model,
            )));
            self.state = TranscodeState::Streaming;
        }
        if let Some(n) = parsed.prompt_eval_count {
            self.prompt_tokens = n;
        }
        if let Some(n) = parsed.eval_count {
            self.completion_tokens = n;
        }
        let chunk =
            ollama_chunk_to_chat_chunk(&parsed, &self.completion_id, self.created, &self.model);
        self.pending.push_back(sse_frame(&chunk));
        if parsed.done {
            self.pending.push_back(Bytes::from_static(DONE_FRAME));
            self.finish("success");
        }
    }

    /// Split complete lines out of the buffer, leaving any partial tail.
    fn drain_lines(&mut self) {
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let rest = self.buffer.split_off(newline + 1);
            let line = std::mem::replace(&mut self.buffer, rest);
            if matches!(self.state, TranscodeState::Done) {
                return;
            }
            self.handle_line(&line[..line.len() - 1]);
        }
    }

    fn on_upstream_end(&mut self) {
        // A trailing line without a final newline still counts.
        let tail = std::mem::take(&mut self.buffer);
        self.handle_line(&tail);
        if matches!(self.state, TranscodeState::Done) {
            return;
        }
        match self.state {
            TranscodeState::AwaitingFirstLine => {
                self.fail("backend closed the stream before sending any data")
            }
            _ => self.fail("backend closed the stream before completion"),
        }
    }
}

impl<S> Stream for SseTranscoder<S>
where
    S: Stream<Item = Result<Bytes, io::Error>> + Unpin,
{
    type Item = Result<Bytes, io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.as_mut().get_mut();
        loop {
            if let Some(frame) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(frame)));
            }
            if matches!(this.state, TranscodeState::Done) {
                return Poll::Ready(None);
            }
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.buffer.extend_from_slice(&bytes);
                    let deadline = Instant::now() + this.stall_timeout;
                    this.stall.as_mut().reset(deadline);
                    this.drain_lines();
                }
                Poll::Ready(Some(Err(err))) => {
                    this.fail(&format!("stream transport error: {err}"));
                }
                Poll::Ready(None) => {
                    this.on_upstream_end();
                }
                Poll::Pending => {
                    if this.stall.as_mut().poll(cx).is_ready() {
                        this.fail("backend stalled mid-stream");
                        continue;
                    }
                    return Poll::Pending;
                }
            }
        }
    }
}

impl<S> Drop for SseTranscoder<S> {
    fn drop(&mut self) {
        if let Some(mut log) = self.log.take() {
            log.complete("cancelled", self.prompt_tokens, self.completion_tokens);
        }
    }
}
