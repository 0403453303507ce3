//! Incremental Server-Sent Events decoding
//!
//! Both ends of the relay speak SSE: the vendor streams completion chunks to
//! the proxy, and the proxy re-streams tokens to the client gateway. This
//! module holds the frame decoder they share.
//!
//! Network reads do not respect frame boundaries. [`SseDecoder`] buffers raw
//! bytes and only yields a frame once its terminating blank line has
//! arrived, so a frame (or a multi-byte UTF-8 character) split across two
//! reads is decoded exactly once.

use std::fmt::Display;
use std::pin::Pin;

use bytes::{Buf, Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{RelayError, Result};

/// Capacity of the channel between the reader task and the frame consumer.
const FRAME_CHANNEL_CAPACITY: usize = 64;

/// One decoded SSE event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` field, if present
    pub event: Option<String>,
    /// All `data:` lines of the frame joined with `\n`
    pub data: String,
}

/// Lazy sequence of decoded frames, ending in at most one transport error
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<SseFrame>> + Send>>;

/// Stateful SSE decoder fed with arbitrary byte chunks
///
/// # Examples
///
/// ```
/// use chatrelay::sse::SseDecoder;
///
/// let mut decoder = SseDecoder::new();
/// assert!(decoder.push(b"data: hel").is_empty());
/// let frames = decoder.push(b"lo\n\n");
/// assert_eq!(frames.len(), 1);
/// assert_eq!(frames[0].data, "hello");
/// ```
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    /// Bytes of `buffer` already searched for a frame terminator
    scanned: usize,
}

impl SseDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some((end, delimiter_len)) = find_frame_boundary(&self.buffer, self.scanned) {
            let block = self.buffer.split_to(end);
            self.buffer.advance(delimiter_len);
            self.scanned = 0;
            if let Some(frame) = parse_frame(&block) {
                frames.push(frame);
            }
        }
        self.scanned = self.buffer.len();
        frames
    }

    /// Flush a trailing frame that was never terminated by a blank line
    pub fn finish(&mut self) -> Option<SseFrame> {
        if self.buffer.is_empty() {
            return None;
        }
        let block = self.buffer.split();
        self.scanned = 0;
        parse_frame(&block)
    }

    /// Number of buffered bytes not yet part of a complete frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Locate the earliest blank-line frame terminator.
///
/// The first `scanned` bytes held no complete terminator; only a terminator
/// straddling that point (at most 3 bytes back) can start before it.
/// Returns the frame length and the length of the terminator itself.
fn find_frame_boundary(buffer: &[u8], scanned: usize) -> Option<(usize, usize)> {
    (scanned.saturating_sub(3)..buffer.len()).find_map(|i| {
        let rest = &buffer[i..];
        if rest.starts_with(b"\n\n") {
            Some((i, 2))
        } else if rest.starts_with(b"\r\n\r\n") {
            Some((i, 4))
        } else {
            None
        }
    })
}

/// Parse the field lines of a single frame.
///
/// Frames without any `data:` line (comments, bare `id:`/`retry:`) yield
/// `None`.
fn parse_frame(block: &[u8]) -> Option<SseFrame> {
    let text = String::from_utf8_lossy(block);

    let mut data_lines: Vec<&str> = Vec::new();
    let mut event = None;

    for line in text.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        } else if let Some(value) = line.strip_prefix("event:") {
            event = Some(value.trim().to_string());
        }
        // `id:`, `retry:` and `:` comment lines carry nothing we use.
    }

    if data_lines.is_empty() {
        return None;
    }

    Some(SseFrame {
        event,
        data: data_lines.join("\n"),
    })
}

/// Decode an HTTP body stream into a stream of SSE frames
///
/// A reader task drains `byte_stream` into a bounded channel. The task
/// stops when the body ends, when a read fails (forwarded as a single
/// [`RelayError::Transport`]), or when the returned stream is dropped,
/// which also drops the underlying connection.
pub fn frame_stream<S, E>(byte_stream: S) -> FrameStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
    tokio::spawn(pump_frames(byte_stream, tx));
    Box::pin(ReceiverStream::new(rx))
}

async fn pump_frames<S, E>(byte_stream: S, tx: mpsc::Sender<Result<SseFrame>>)
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send,
    E: Display,
{
    let mut decoder = SseDecoder::new();
    tokio::pin!(byte_stream);

    loop {
        let chunk_result = tokio::select! {
            _ = tx.closed() => {
                tracing::debug!("SSE consumer dropped; closing body stream");
                return;
            }
            next = byte_stream.next() => next,
        };
        let Some(chunk_result) = chunk_result else { break };

        let chunk = match chunk_result {
            Ok(chunk) => chunk,
            Err(e) => {
                let err = RelayError::Transport(format!("stream read failed: {}", e));
                let _ = tx.send(Err(err.into())).await;
                return;
            }
        };

        for frame in decoder.push(&chunk) {
            if tx.send(Ok(frame)).await.is_err() {
                tracing::debug!("SSE consumer dropped; closing body stream");
                return;
            }
        }
    }

    if let Some(frame) = decoder.finish() {
        let _ = tx.send(Ok(frame)).await;
    }
}
