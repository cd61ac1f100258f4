//! Session lifecycle types shared by the controller and its observers.

use serde::Serialize;
use std::fmt;

/// Lifecycle of one generation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Connecting,
    Streaming,
    Finalizing,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    /// Whether the session can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }

    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionStatus::Connecting | SessionStatus::Streaming | SessionStatus::Finalizing
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Streaming => "streaming",
            SessionStatus::Finalizing => "finalizing",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// What observers of a session see after every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot<V> {
    pub id: String,
    pub status: SessionStatus,
    pub progress_step: Option<String>,
    pub artifact_token: Option<String>,
    pub failure: Option<String>,
    /// Updates applied to the accumulated result so far.
    pub merges: usize,
    /// Latest debounced projection, if one has been computed.
    pub view: Option<V>,
}

impl<V> SessionSnapshot<V> {
    pub fn idle(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: SessionStatus::Idle,
            progress_step: None,
            artifact_token: None,
            failure: None,
            merges: 0,
            view: None,
        }
    }
}

/// Result of a session that reached `completed`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome<V> {
    /// Server-assigned id when the result was saved, the temporary id otherwise.
    pub id: String,
    pub artifact_token: Option<String>,
    pub progress_step: Option<String>,
    /// Final projection, flushed on completion.
    pub view: V,
    /// Raw accumulated result.
    pub accumulated: serde_json::Value,
    /// Whether the best-effort save succeeded.
    pub saved: bool,
}
