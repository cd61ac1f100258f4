//! Incremental decoding of Server-Sent Events from byte chunks.

use crate::Error;
use futures_util::{Stream, StreamExt};
use memchr::memmem;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

/// Frame terminator used by the upstream generation services.
const FRAME_TERMINATOR: &[u8] = b"\n\n";

/// Default cap on unterminated bytes held by a decoder.
pub const DEFAULT_MAX_BUFFER: usize = 1_000_000;

/// One decoded SSE unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    /// Value of the `event:` line. Never empty.
    pub event_type: String,
    /// Trimmed remainders of every `data:` line, concatenated. Never empty.
    pub data: String,
}

impl StreamFrame {
    pub fn new(event_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: data.into(),
        }
    }
}

/// Push-based frame decoder.
///
/// Bytes are buffered until a blank-line terminator arrives, so frames and
/// multi-byte characters split across chunks are reassembled before decoding.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_buffer: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_buffer(DEFAULT_MAX_BUFFER)
    }

    pub fn with_max_buffer(max_buffer: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_buffer,
        }
    }

    /// Append a chunk and return every frame it completed, in arrival order.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<StreamFrame>, Error> {
        self.buffer.extend_from_slice(chunk);

        let finder = memmem::Finder::new(FRAME_TERMINATOR);
        let mut frames = Vec::new();
        let mut start = 0;

        while let Some(pos) = finder.find(&self.buffer[start..]) {
            let block_end = start + pos;
            let block = String::from_utf8_lossy(&self.buffer[start..block_end]);
            if let Some(frame) = parse_block(&block) {
                frames.push(frame);
            }
            start = block_end + FRAME_TERMINATOR.len();
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        if self.buffer.len() > self.max_buffer {
            self.buffer.clear();
            return Err(Error::streaming(format!(
                "SSE buffer exceeded maximum size of {} bytes",
                self.max_buffer
            )));
        }

        Ok(frames)
    }

    /// Number of bytes waiting for a terminator.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any unterminated tail. Returns how many bytes were discarded.
    pub fn finish(&mut self) -> usize {
        let leftover = self.buffer.len();
        if leftover > 0 {
            tracing::debug!(bytes = leftover, "discarding unterminated SSE tail");
        }
        self.buffer.clear();
        leftover
    }
}

/// Parse one terminated block. Blocks missing either an event name or data
/// yield nothing.
fn parse_block(block: &str) -> Option<StreamFrame> {
    let block = block.trim();
    if block.is_empty() {
        return None;
    }

    let mut event_type = String::new();
    let mut data = String::new();

    for line in block.split('\n') {
        if let Some(value) = line.strip_prefix("event:") {
            event_type = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("data:") {
            data.push_str(value.trim());
        }
    }

    if event_type.is_empty() || data.is_empty() {
        tracing::trace!(%event_type, "dropping incomplete SSE block");
        return None;
    }

    Some(StreamFrame { event_type, data })
}

/// Render a frame in the wire format the generation services emit.
///
/// String payloads are written verbatim; anything else is JSON-encoded.
pub fn encode_frame(event_type: &str, payload: &serde_json::Value) -> String {
    let data = match payload {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    };

    let mut out = format!("event: {event_type}\n");
    for line in data.split('\n') {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    out
}

/// A stream adapter that decodes SSE frames from a byte stream.
pub struct SseStream<S> {
    inner: S,
    decoder: FrameDecoder,
    frames: VecDeque<StreamFrame>,
}

impl<S> SseStream<S> {
    pub fn new(stream: S) -> Self {
        Self::with_decoder(stream, FrameDecoder::new())
    }

    pub fn with_decoder(stream: S, decoder: FrameDecoder) -> Self {
        Self {
            inner: stream,
            decoder,
            frames: VecDeque::new(),
        }
    }
}

impl<S, E> Stream for SseStream<S>
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: Into<Error>,
{
    type Item = Result<StreamFrame, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(frame) = self.frames.pop_front() {
                return Poll::Ready(Some(Ok(frame)));
            }

            let chunk = match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => return Poll::Ready(Some(Err(e.into()))),
                None => {
                    self.decoder.finish();
                    return Poll::Ready(None);
                }
            };

            let frames = match self.decoder.push(&chunk) {
                Ok(frames) => frames,
                Err(e) => return Poll::Ready(Some(Err(e))),
            };
            self.frames.extend(frames);
        }
    }
}

/// Extension trait to add SSE decoding to byte streams.
pub trait SseStreamExt: Stream {
    /// Decode this byte stream as SSE frames.
    fn sse_frames(self) -> SseStream<Self>
    where
        Self: Sized,
    {
        SseStream::new(self)
    }

    /// Decode with a custom cap on buffered, unterminated bytes.
    fn sse_frames_with_limit(self, max_buffer: usize) -> SseStream<Self>
    where
        Self: Sized,
    {
        SseStream::with_decoder(self, FrameDecoder::with_max_buffer(max_buffer))
    }
}

impl<S: Stream> SseStreamExt for S {}
