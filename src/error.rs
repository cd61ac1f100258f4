use thiserror::Error;

/// Errors that can occur when running a generation stream.
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Upstream connection failed ({status}): {message}")]
    Connection { status: u16, message: String },

    #[error("Malformed frame: {0}")]
    Protocol(String),

    #[error("Generation failed: {0}")]
    Upstream(String),

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Saving result failed: {0}")]
    Persistence(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Streaming error: {0}")]
    Streaming(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn connection(status: u16, message: impl Into<String>) -> Self {
        Error::Connection {
            status,
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Error::Upstream(message.into())
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Error::Persistence(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn streaming(message: impl Into<String>) -> Self {
        Error::Streaming(message.into())
    }

    /// Whether this error ends a session silently (user cancellation).
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
