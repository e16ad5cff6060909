//! Streaming chat transport.
//!
//! `/api/chat` with `stream: true` answers with newline-delimited JSON; each
//! line is one [`ChatResponse`] chunk. The pump runs on its own task and
//! reports through an unbounded channel, so a consumer can fall behind (or be
//! dropped) without stalling the transport. End-of-stream and failure are
//! distinct events rather than in-band sentinel text.

use std::time::{Duration, Instant};

use futures_util::StreamExt;
use memchr::memchr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::{ChatMessage, ChatMetrics, ChatRequest, ChatResponse, ClientError, SamplingOptions};
use crate::utils::url::api_url;

#[derive(Debug)]
pub enum StreamEvent {
    /// One fragment of generated text, in transport order.
    Chunk(String),
    /// The stream failed; an `End` event always follows.
    Error(ClientError),
    /// The stream is finished. Carries the server's evaluation counters when
    /// the final `done` chunk arrived intact.
    End(Option<ChatMetrics>),
}

pub struct StreamParams {
    pub http: reqwest::Client,
    pub base_url: String,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub options: SamplingOptions,
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

/// Spawn a streaming chat call and return the event receiver.
///
/// Cancelling the token aborts the pump; no further events are delivered and
/// the receiver's channel closes. A finite stream always terminates with
/// exactly one `End` event otherwise.
pub fn spawn_chat_stream(params: StreamParams) -> mpsc::UnboundedReceiver<StreamEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let cancel = params.cancel.clone();
        tokio::select! {
            _ = pump_stream(params, &tx) => {}
            _ = cancel.cancelled() => {}
        }
    });
    rx
}

async fn pump_stream(params: StreamParams, tx: &mpsc::UnboundedSender<StreamEvent>) {
    let StreamParams {
        http,
        base_url,
        model,
        messages,
        options,
        timeout,
        cancel: _,
    } = params;

    let request = ChatRequest {
        model,
        messages,
        stream: true,
        options,
    };

    let started = Instant::now();
    let response = match http
        .post(api_url(&base_url, "api/chat"))
        .timeout(timeout)
        .json(&request)
        .send()
        .await
    {
        Ok(response) => response,
        Err(source) => {
            let _ = tx.send(StreamEvent::Error(ClientError::Transport(source)));
            let _ = tx.send(StreamEvent::End(None));
            return;
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let _ = tx.send(StreamEvent::Error(ClientError::Status { status, body }));
        let _ = tx.send(StreamEvent::End(None));
        return;
    }

    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk_bytes = match chunk {
            Ok(bytes) => bytes,
            Err(source) => {
                let _ = tx.send(StreamEvent::Error(ClientError::Transport(source.into())));
                let _ = tx.send(StreamEvent::End(None));
                return;
            }
        };

        buffer.extend_from_slice(&chunk_bytes);
        if matches!(drain_lines(&mut buffer, tx, started), LineStep::Finished) {
            return;
        }
    }

    // Servers may end the body without a trailing newline; the remainder is
    // still one chunk.
    if matches!(flush_remainder(&buffer, tx, started), LineStep::Finished) {
        return;
    }

    // Transport closed without a done chunk; still a normal termination for
    // the consumer, just without metrics.
    let _ = tx.send(StreamEvent::End(None));
}

fn drain_lines(
    buffer: &mut Vec<u8>,
    tx: &mpsc::UnboundedSender<StreamEvent>,
    started: Instant,
) -> LineStep {
    while let Some(newline_pos) = memchr(b'\n', buffer) {
        let outcome = match std::str::from_utf8(&buffer[..newline_pos]) {
            Ok(line) => process_chunk_line(line, tx, started),
            Err(source) => {
                tracing::debug!(%source, "skipping invalid UTF-8 line in chat stream");
                LineStep::Continue
            }
        };
        buffer.drain(..=newline_pos);
        if matches!(outcome, LineStep::Finished) {
            return LineStep::Finished;
        }
    }
    LineStep::Continue
}

fn flush_remainder(
    buffer: &[u8],
    tx: &mpsc::UnboundedSender<StreamEvent>,
    started: Instant,
) -> LineStep {
    match std::str::from_utf8(buffer) {
        Ok(line) => process_chunk_line(line, tx, started),
        Err(source) => {
            tracing::debug!(%source, "skipping invalid UTF-8 remainder in chat stream");
            LineStep::Continue
        }
    }
}

/// Outcome of feeding one NDJSON line into the event channel.
enum LineStep {
    Continue,
    Finished,
}

fn process_chunk_line(
    line: &str,
    tx: &mpsc::UnboundedSender<StreamEvent>,
    started: Instant,
) -> LineStep {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineStep::Continue;
    }

    let chunk = match serde_json::from_str::<ChatResponse>(trimmed) {
        Ok(chunk) => chunk,
        Err(source) => {
            let _ = tx.send(StreamEvent::Error(ClientError::Malformed(format!(
                "invalid stream chunk: {source}"
            ))));
            let _ = tx.send(StreamEvent::End(None));
            return LineStep::Finished;
        }
    };

    if let Some(message) = chunk.error.clone() {
        let _ = tx.send(StreamEvent::Error(ClientError::Api(message)));
        let _ = tx.send(StreamEvent::End(None));
        return LineStep::Finished;
    }

    if let Some(message) = &chunk.message {
        if !message.content.is_empty() {
            let _ = tx.send(StreamEvent::Chunk(message.content.clone()));
        }
    }

    if chunk.done {
        let metrics = ChatMetrics::from_response(&chunk, started.elapsed());
        let _ = tx.send(StreamEvent::End(Some(metrics)));
        LineStep::Finished
    } else {
        LineStep::Continue
    }
}
