//! The three streamed generation features.

pub mod lesson_plan;
pub mod quiz;
pub mod rubric;

pub use lesson_plan::{LessonPlanKind, LessonPlanRequest, LESSON_PLAN_PROFILE};
pub use quiz::{QuizRequest, QUIZ_PROFILE};
pub use rubric::{RubricRequest, RUBRIC_PROFILE};

use crate::accumulator::Accumulator;

/// Non-empty string field of the accumulated result, else the fallback.
pub(crate) fn text_or(accumulated: &Accumulator, field: &str, fallback: &str) -> String {
    accumulated
        .get_str(field)
        .filter(|value| !value.is_empty())
        .unwrap_or(fallback)
        .to_string()
}
