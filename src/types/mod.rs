//! Core types used throughout the library.

pub mod config;
pub mod form;
pub mod lesson;
pub mod quiz;
pub mod rubric;
pub mod session;

// Re-export commonly used types
pub use config::*;
pub use form::Attachment;
pub use lesson::*;
pub use quiz::*;
pub use rubric::*;
pub use session::*;
