use crate::accumulator::Accumulator;
use crate::dispatch::RoutingProfile;
use crate::Error;
use reqwest::multipart::Form;
use serde_json::Value;
use std::fmt::Debug;

/// One kind of streamed generation (lesson plan, quiz, rubric).
///
/// Implemented by the request form of each feature, so a session can build
/// the upstream request, route its events and project its result without
/// knowing which feature it runs.
pub trait GenerationFeature: Send + Sync + 'static {
    /// Derived view recomputed by the debounced projector.
    type View: Clone + Debug + Send + Sync + 'static;

    /// API resource segment, e.g. `rubrics`.
    const RESOURCE: &'static str;

    /// Event routing table for this feature's upstream.
    fn profile() -> &'static RoutingProfile;

    /// Reject the request locally, before any network call.
    fn validate(&self) -> Result<(), Error>;

    /// Path of the streaming endpoint, relative to the API base URL.
    fn stream_path(&self) -> String {
        format!("{}/stream", Self::RESOURCE)
    }

    /// Multipart body of the streaming request.
    fn multipart(&self) -> Result<Form, Error>;

    /// Project the accumulated result into the feature's view.
    fn project(&self, accumulated: &Accumulator) -> Self::View;

    /// Record persisted after completion; `None` skips the save.
    fn save_record(&self, accumulated: &Accumulator, artifact_token: Option<&str>) -> Option<Value>;
}

/// Persistence collaborator for completed generations.
#[async_trait::async_trait]
pub trait ResultStore: Send + Sync + 'static {
    /// Save a completed result. Returns the server-assigned id, if any.
    async fn save(&self, resource: &str, record: &Value) -> Result<Option<String>, Error>;
}
