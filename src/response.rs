//! Byte-stream handle for an opened generation request.

use crate::sse_stream::{SseStream, SseStreamExt};
use crate::Error;
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};
use std::pin::Pin;

/// Boxed stream of body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// Body of an upstream generation response.
///
/// The stream is opened eagerly (status already checked) but read lazily, so
/// it can be decoded into frames by a session or handed to a relay unchanged.
pub struct Response {
    stream: ByteStream,
}

impl Response {
    /// Wrap any stream of byte chunks.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, Error>> + Send + 'static,
    {
        Self {
            stream: Box::pin(stream),
        }
    }

    /// Wrap a `reqwest` body stream.
    pub fn from_http(response: reqwest::Response) -> Self {
        Self::from_stream(response.bytes_stream().map(|chunk| chunk.map_err(Error::from)))
    }

    /// Raw body chunks, as received.
    pub fn into_stream(self) -> ByteStream {
        self.stream
    }

    /// Decode the body as SSE frames.
    pub fn frames(self, max_buffer: usize) -> SseStream<ByteStream> {
        self.stream.sse_frames_with_limit(max_buffer)
    }

    /// Read the whole body into memory.
    pub async fn bytes(self) -> Result<Bytes, Error> {
        let mut stream = self.stream;
        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(body))
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response").finish_non_exhaustive()
    }
}
