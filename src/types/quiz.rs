use serde::Serialize;
use serde_json::Value;

/// Quiz as presented while questions stream in.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct QuizView {
    pub name: String,
    pub subject: String,
    pub grade: Option<String>,
    pub difficulty: String,
    /// Questions as generated; their shape varies by question type.
    pub questions: Vec<Value>,
    pub question_count: usize,
    /// Download path reported by the final event, when present.
    pub download_url: Option<String>,
}
