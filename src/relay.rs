//! Server-side relay: forward an upstream generation stream to a browser
//! byte-for-byte.

use crate::client::GenerationClient;
use crate::feature::GenerationFeature;
use crate::response::ByteStream;
use crate::sse_stream::encode_frame;
use crate::Error;
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, StreamExt};
use serde_json::json;

/// Response headers for a relayed event stream.
pub const SSE_HEADERS: &[(&str, &str)] = &[
    ("Content-Type", "text/event-stream; charset=utf-8"),
    ("Cache-Control", "no-cache"),
    ("Connection", "keep-alive"),
    ("X-Accel-Buffering", "no"),
];

/// Opens upstream generation streams on behalf of a downstream client.
#[derive(Debug, Clone)]
pub struct Relay {
    client: GenerationClient,
}

impl Relay {
    pub fn new(client: GenerationClient) -> Self {
        Self { client }
    }

    /// Open the upstream stream for `request`.
    ///
    /// Only validation errors are returned; they happen before any response
    /// has been started. Upstream failures are reported in-band as a final
    /// `error` frame so the downstream reader sees them like any other event.
    pub async fn open<F: GenerationFeature>(&self, request: &F) -> Result<ByteStream, Error> {
        request.validate()?;

        match self.client.open_stream(request).await {
            Ok(response) => {
                tracing::debug!(resource = F::RESOURCE, "relaying generation stream");
                Ok(passthrough(response.into_stream()))
            }
            Err(e) => {
                tracing::error!(resource = F::RESOURCE, error = %e, "upstream stream failed to open");
                Ok(Box::pin(stream::once(async move { Ok::<_, Error>(error_frame(&e)) })))
            }
        }
    }
}

/// Forward chunks unchanged; a read error ends the stream with an `error`
/// frame instead of an error item.
///
/// If the upstream broke off inside a frame, the partial block is closed with
/// a blank line first so the `error` frame is decoded on its own.
pub fn passthrough(upstream: ByteStream) -> ByteStream {
    let state = Passthrough {
        upstream,
        at_boundary: true,
    };
    Box::pin(stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        match state.upstream.next().await {
            Some(Ok(chunk)) => {
                if !chunk.is_empty() {
                    state.at_boundary = chunk.ends_with(b"\n\n");
                }
                Some((Ok::<_, Error>(chunk), Some(state)))
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "upstream stream broke off");
                let frame = error_frame(&e);
                let frame = if state.at_boundary {
                    frame
                } else {
                    let mut closed = BytesMut::with_capacity(frame.len() + 2);
                    closed.extend_from_slice(b"\n\n");
                    closed.extend_from_slice(&frame);
                    closed.freeze()
                };
                Some((Ok(frame), None))
            }
            None => None,
        }
    }))
}

struct Passthrough {
    upstream: ByteStream,
    /// Whether everything forwarded so far ends on a frame boundary.
    at_boundary: bool,
}

/// `error` frame describing a relay failure.
pub fn error_frame(error: &Error) -> Bytes {
    let payload = match error {
        Error::Connection { status, message } => json!({
            "message": format!("AI service error: {status}"),
            "body": message,
        }),
        other => json!({ "message": other.to_string() }),
    };
    Bytes::from(encode_frame("error", &payload))
}
