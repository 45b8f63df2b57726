//! SSE decoding for the OpenAI-compatible streaming chat API.
//!
//! [`SseDecoder`] is a pure byte-level state machine: it never assumes that a
//! network read ends on a line (or even a UTF-8 character) boundary. The async
//! [`pump`] drives it from a response body into a bounded channel.

use std::fmt::Display;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use oikos_tool_runtime::provider::CompletionError;
use oikos_tool_runtime::stream::{StreamDelta, ToolCallDelta};

const DATA_PREFIX: &[u8] = b"data: ";
const DONE_SENTINEL: &[u8] = b"[DONE]";

#[derive(Deserialize)]
struct Chunk {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Deserialize)]
struct WireToolCallDelta {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireFunctionDelta>,
}

#[derive(Deserialize)]
struct WireFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Incremental decoder from raw SSE bytes to [`StreamDelta`]s.
///
/// Bytes are buffered until a `\n` completes a line, so the output is the
/// same however the input is split into reads.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the `[DONE]` sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Append one read and decode every line it completes.
    ///
    /// Once the sentinel is seen, the rest of the buffer and all later input
    /// are discarded.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamDelta> {
        let mut out = Vec::new();
        if self.done {
            return out;
        }
        self.buffer.extend_from_slice(chunk);

        let mut consumed = 0;
        while let Some(pos) = self.buffer[consumed..].iter().position(|&b| b == b'\n') {
            let line = &self.buffer[consumed..consumed + pos];
            consumed += pos + 1;
            if decode_line(line, &mut out) {
                self.done = true;
                self.buffer.clear();
                return out;
            }
        }
        self.buffer.drain(..consumed);
        out
    }

    /// The body ended. An unterminated trailing line is not decoded.
    pub fn finish(&mut self) {
        if !self.buffer.is_empty() {
            trace!(bytes = self.buffer.len(), "discarding unterminated SSE line");
            self.buffer.clear();
        }
    }
}

/// Decode one line into `out`. Returns `true` on the `[DONE]` sentinel.
fn decode_line(line: &[u8], out: &mut Vec<StreamDelta>) -> bool {
    let line = line.trim_ascii();
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return false;
    };
    if payload == DONE_SENTINEL {
        out.push(StreamDelta::Done);
        return true;
    }

    let chunk: Chunk = match serde_json::from_slice(payload) {
        Ok(chunk) => chunk,
        Err(e) => {
            trace!(error = %e, "dropping malformed SSE data line");
            return false;
        }
    };
    let Some(delta) = chunk.choices.into_iter().next().and_then(|c| c.delta) else {
        return false;
    };

    if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
        out.push(StreamDelta::Content(content));
    }
    for call in delta.tool_calls.unwrap_or_default() {
        let (name, arguments) = match call.function {
            Some(f) => (f.name, f.arguments.unwrap_or_default()),
            None => (None, String::new()),
        };
        out.push(StreamDelta::ToolCallDelta(ToolCallDelta {
            index: call.index,
            id: call.id,
            name,
            arguments_fragment: arguments,
        }));
    }
    false
}

/// Drive a response body through the decoder into `tx` until the sentinel,
/// the end of the body, a read error or an idle timeout.
///
/// Stops as soon as the receiver is dropped, including while waiting on the
/// network; the body (and its connection) is dropped on every exit path.
pub(super) async fn pump<S, E>(
    body: S,
    tx: mpsc::Sender<Result<StreamDelta, CompletionError>>,
    idle_timeout: Duration,
) where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let mut body = std::pin::pin!(body);
    let mut decoder = SseDecoder::new();

    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                debug!("stream consumer went away, closing response");
                return;
            }
            next = tokio::time::timeout(idle_timeout, body.next()) => next,
        };

        let chunk = match next {
            Ok(Some(Ok(chunk))) => chunk,
            Ok(Some(Err(e))) => {
                warn!(error = %e, "completion stream read failed");
                let _ = tx.send(Err(CompletionError::Stream(e.to_string()))).await;
                return;
            }
            Ok(None) => {
                decoder.finish();
                debug!("completion stream ended without sentinel");
                return;
            }
            Err(_) => {
                warn!(?idle_timeout, "completion stream idle timeout");
                let _ = tx
                    .send(Err(CompletionError::Stream(format!(
                        "no data received for {}s",
                        idle_timeout.as_secs()
                    ))))
                    .await;
                return;
            }
        };

        for delta in decoder.feed(&chunk) {
            if tx.send(Ok(delta)).await.is_err() {
                debug!("stream consumer went away, closing response");
                return;
            }
        }
        if decoder.is_done() {
            return;
        }
    }
}
