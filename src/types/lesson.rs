use serde::{Deserialize, Serialize};

/// One rendered block of a lesson plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonSection {
    /// Upstream event that produced the block, e.g. `start_activity`.
    pub kind: String,
    pub html: String,
}

/// Lesson plan as presented while it streams.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct LessonPlanView {
    pub lesson_title: String,
    pub subject: String,
    pub grade: String,
    pub sections: Vec<LessonSection>,
    /// Sections joined in arrival order.
    pub html: String,
}
