//! Streaming generation core for lesson plans, quizzes and rubrics.
//!
//! The generation API answers a multipart POST with a Server-Sent-Events
//! stream. This library decodes that stream into frames, routes each frame
//! into a per-feature accumulator, recomputes a debounced view of the partial
//! result, and drives one session per request through
//! `connecting → streaming → finalizing → completed | failed | cancelled`.
//! A relay forwards the same streams unchanged for server-side use, and a job
//! runner tracks sessions started in the background.

pub mod accumulator;
pub mod client;
pub mod dispatch;
pub mod error;
pub mod feature;
pub mod features;
pub mod jobs;
pub mod relay;
pub mod response;
pub mod session;
pub mod sse_stream;
pub mod types;

// Re-export core types for easy usage
pub use accumulator::{Accumulator, DebouncedProjector};
pub use client::GenerationClient;
pub use dispatch::{Dispatch, Failure, Route, RoutingProfile};
pub use error::Error;
pub use feature::{GenerationFeature, ResultStore};
pub use features::{LessonPlanKind, LessonPlanRequest, QuizRequest, RubricRequest};
pub use jobs::{JobRunner, JobStatus, JobStore};
pub use relay::{Relay, SSE_HEADERS};
pub use response::{ByteStream, Response};
pub use session::{SessionController, SessionState, StreamSession};
pub use sse_stream::{FrameDecoder, SseStreamExt, StreamFrame};
pub use types::*;
