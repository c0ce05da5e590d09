//! # ntfy Stream Listener
//!
//! Holds a long-lived `GET {host}/{topic}/json` open and hands every
//! message to a [`MessageSink`].
//!
//! ## Wire Format
//!
//! The body is newline-delimited JSON, one event per line:
//!
//! ```text
//! {"id":"a1","time":1700000000,"event":"open","topic":"kitchen"}
//! {"id":"b2","time":1700000005,"event":"message","topic":"kitchen","message":"Lunch Time!"}
//! {"id":"c3","time":1700000050,"event":"keepalive","topic":"kitchen"}
//! ```
//!
//! Only the `message` field matters. Events without one are skipped;
//! lines that are not JSON objects are logged and skipped.
//!
//! ## State Machine
//!
//! ```text
//!            ┌────────────── delay elapsed ───────────────┐
//!            ▼                                            │
//!      Connecting ──2xx──► Streaming ──EOF / error──► Backoff
//!            │                 │                          │
//!            └─non-2xx / error─┼──────────────────────────┘
//!                              │
//!        cancel (any state) ───┴──────────────────────► Stopped
//! ```
//!
//! Retries are unbounded with a fixed delay.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::sink::MessageSink;
use crate::error::ReceiptError;
use crate::render::text::truncate_message;

/// Longest accepted line in bytes; longer lines are discarded.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Listener state, observable through [`StreamListener::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Connecting,
    Streaming,
    Backoff,
    Stopped,
}

/// What one stream line turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// A message, already truncated
    Message(String),
    /// A valid event without a message (`open`, `keepalive`, empty
    /// `message`, blank line)
    Ignored,
    /// Not a JSON object, or too long
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Decode one stream line.
///
/// ```
/// use ntfy_printer::listener::{LineOutcome, decode_line};
///
/// assert_eq!(
///     decode_line(r#"{"event":"message","message":"Lunch Time!"}"#, 300),
///     LineOutcome::Message("Lunch Time!".to_string())
/// );
/// assert_eq!(decode_line(r#"{"event":"keepalive"}"#, 300), LineOutcome::Ignored);
/// assert!(matches!(decode_line("not-json", 300), LineOutcome::Malformed(_)));
/// ```
pub fn decode_line(line: &str, max_message_length: usize) -> LineOutcome {
    let line = line.trim();
    if line.is_empty() {
        return LineOutcome::Ignored;
    }
    if line.len() > MAX_LINE_BYTES {
        return LineOutcome::Malformed(format!("line of {} bytes exceeds limit", line.len()));
    }

    match parse_event(line) {
        Ok(Some(message)) if !message.is_empty() => {
            LineOutcome::Message(truncate_message(&message, max_message_length))
        }
        Ok(_) => LineOutcome::Ignored,
        Err(e) => LineOutcome::Malformed(e.to_string()),
    }
}

/// Parse one JSON event and return its `message` field, if any.
pub fn parse_event(line: &str) -> Result<Option<String>, ReceiptError> {
    let event: StreamEvent = serde_json::from_str(line)
        .map_err(|e| ReceiptError::Decode(format!("Invalid stream event: {}", e)))?;
    if event.message.is_none() {
        debug!(
            event = event.event.as_deref().unwrap_or("unknown"),
            "Skipping event without message"
        );
    }
    Ok(event.message)
}

/// Build the JSON stream URL for a topic.
///
/// ```
/// use ntfy_printer::listener::stream_url;
///
/// assert_eq!(stream_url("https://ntfy.sh/", "kitchen"), "https://ntfy.sh/kitchen/json");
/// ```
pub fn stream_url(host: &str, topic: &str) -> String {
    format!(
        "{}/{}/json",
        host.trim_end_matches('/'),
        topic.trim_matches('/')
    )
}

/// A complete line pulled out of the byte stream.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Line(String),
    Oversized(usize),
}

/// Splits a chunked byte stream into lines without holding more than
/// `max` bytes of any one line.
#[derive(Debug)]
struct LineBuffer {
    buf: Vec<u8>,
    max: usize,
    overflow: Option<usize>,
}

impl LineBuffer {
    fn new(max: usize) -> Self {
        Self {
            buf: Vec::new(),
            max,
            overflow: None,
        }
    }

    fn push(&mut self, mut chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(pos) = chunk.iter().position(|&b| b == b'\n') {
            self.extend(&chunk[..pos]);
            frames.push(self.take());
            chunk = &chunk[pos + 1..];
        }
        self.extend(chunk);
        frames
    }

    fn extend(&mut self, bytes: &[u8]) {
        if let Some(dropped) = self.overflow.as_mut() {
            *dropped += bytes.len();
            return;
        }
        self.buf.extend_from_slice(bytes);
        if self.buf.len() > self.max {
            self.overflow = Some(self.buf.len());
            self.buf = Vec::new();
        }
    }

    fn take(&mut self) -> Frame {
        match self.overflow.take() {
            Some(dropped) => Frame::Oversized(dropped),
            None => {
                let line = String::from_utf8_lossy(&self.buf).into_owned();
                self.buf.clear();
                Frame::Line(line)
            }
        }
    }
}

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Full stream URL, see [`stream_url`]
    pub url: String,
    /// Fixed delay between reconnect attempts
    pub reconnect_delay: Duration,
    /// TCP/TLS connect timeout (the body itself has no read timeout)
    pub connect_timeout: Duration,
    /// Messages longer than this are truncated
    pub max_message_length: usize,
}

impl ListenerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            max_message_length: 300,
        }
    }
}

enum StreamEnd {
    Closed,
    Cancelled,
}

pub struct StreamListener {
    config: ListenerConfig,
    client: reqwest::Client,
    sink: Arc<dyn MessageSink>,
    state: watch::Sender<ListenerState>,
}

impl StreamListener {
    pub fn new(config: ListenerConfig, sink: Arc<dyn MessageSink>) -> Result<Self, ReceiptError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ntfy-printer/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ReceiptError::Transport(format!("HTTP client error: {}", e)))?;
        let (state, _) = watch::channel(ListenerState::Connecting);

        Ok(Self {
            config,
            client,
            sink,
            state,
        })
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    /// Consume the stream until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!(url = %self.config.url, "Stream listener started");
        loop {
            self.set_state(ListenerState::Connecting);
            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                r = self.open() => r,
            };

            match connected {
                Ok(response) => {
                    self.set_state(ListenerState::Streaming);
                    info!(url = %self.config.url, "Connected to stream");
                    match self.consume(response, &cancel).await {
                        Ok(StreamEnd::Cancelled) => break,
                        Ok(StreamEnd::Closed) => info!("Stream closed by server"),
                        Err(e) => warn!(error = %e, "Stream interrupted"),
                    }
                }
                Err(e) => warn!(error = %e, "Stream connection failed"),
            }

            self.set_state(ListenerState::Backoff);
            info!(
                delay_secs = self.config.reconnect_delay.as_secs_f64(),
                "Reconnecting after delay"
            );
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }
        self.set_state(ListenerState::Stopped);
        info!("Stream listener stopped");
    }

    fn set_state(&self, state: ListenerState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "Listener state");
        }
    }

    async fn open(&self) -> Result<reqwest::Response, ReceiptError> {
        let response = self
            .client
            .get(&self.config.url)
            .send()
            .await
            .map_err(|e| ReceiptError::Transport(format!("Failed to connect: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReceiptError::Transport(format!(
                "Unexpected HTTP status {}",
                status
            )));
        }
        Ok(response)
    }

    async fn consume(
        &self,
        mut response: reqwest::Response,
        cancel: &CancellationToken,
    ) -> Result<StreamEnd, ReceiptError> {
        let mut lines = LineBuffer::new(MAX_LINE_BYTES);
        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
                c = response.chunk() => c.map_err(|e| {
                    ReceiptError::Transport(format!("Failed to read stream: {}", e))
                })?,
            };
            let Some(chunk) = chunk else {
                return Ok(StreamEnd::Closed);
            };

            for frame in lines.push(&chunk) {
                if cancel.is_cancelled() {
                    return Ok(StreamEnd::Cancelled);
                }
                let outcome = match frame {
                    Frame::Line(line) => decode_line(&line, self.config.max_message_length),
                    Frame::Oversized(bytes) => {
                        LineOutcome::Malformed(format!("line of {} bytes exceeds limit", bytes))
                    }
                };
                match outcome {
                    LineOutcome::Message(message) => {
                        info!(chars = message.chars().count(), "Message received");
                        self.sink.deliver(&message).await;
                    }
                    LineOutcome::Ignored => {}
                    LineOutcome::Malformed(reason) => {
                        warn!(reason = %reason, "Skipping malformed stream line");
                    }
                }
            }
        }
    }
}
