use crate::accumulator::Accumulator;
use crate::dispatch::{Route, RoutingProfile};
use crate::feature::GenerationFeature;
use crate::features::text_or;
use crate::types::form::{require, text_if_present};
use crate::types::{Attachment, LessonPlanView, LessonSection};
use crate::Error;
use reqwest::multipart::Form;
use serde_json::{json, Value};

/// Model requested when the form leaves it blank.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Routing for the lesson-plan service. Every content event carries an
/// `{html}` block that is appended to `sections` in arrival order.
pub static LESSON_PLAN_PROFILE: RoutingProfile = RoutingProfile {
    domain: "lesson_plan",
    plain_string_events: &[],
    routes: &[
        ("status", Route::Status),
        ("meta", Route::Merge),
        ("objectives", Route::Section("sections")),
        ("resources", Route::Section("sections")),
        ("start_activity", Route::Section("sections")),
        ("knowledge_formation_activity", Route::Section("sections")),
        ("practice_activity", Route::Section("sections")),
        ("extend_activity", Route::Section("sections")),
        ("add_para", Route::Section("sections")),
        ("add_items", Route::Section("sections")),
        ("add_table", Route::Section("sections")),
        ("final", Route::Terminal { pointer: None, merge: false, token_required: true }),
        ("error", Route::Error),
    ],
    primary_list: "sections",
};

/// Lesson-plan template, selecting the upstream generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LessonPlanKind {
    #[default]
    K12,
    Kindergarten,
    /// Free-form document driven by the prompt.
    Custom,
}

impl LessonPlanKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LessonPlanKind::K12 => "k12",
            LessonPlanKind::Kindergarten => "kindergarten",
            LessonPlanKind::Custom => "custom",
        }
    }
}

/// Request to generate a lesson plan.
#[derive(Debug, Clone, Default)]
pub struct LessonPlanRequest {
    pub title: String,
    pub grade: String,
    pub subject: String,
    pub method: String,
    pub duration: String,
    pub objectives: String,
    pub prompt: String,
    pub model: String,
    pub kind: LessonPlanKind,
    pub file: Option<Attachment>,
}

impl LessonPlanRequest {
    pub fn new(title: impl Into<String>, grade: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            grade: grade.into(),
            subject: subject.into(),
            ..Self::default()
        }
    }

    pub fn custom(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            kind: LessonPlanKind::Custom,
            ..Self::default()
        }
    }

    fn sections(accumulated: &Accumulator) -> Vec<LessonSection> {
        accumulated
            .list("sections")
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect()
    }
}

impl GenerationFeature for LessonPlanRequest {
    type View = LessonPlanView;

    const RESOURCE: &'static str = "lesson-plans";

    fn profile() -> &'static RoutingProfile {
        &LESSON_PLAN_PROFILE
    }

    fn validate(&self) -> Result<(), Error> {
        match self.kind {
            LessonPlanKind::Custom => {
                if self.prompt.trim().is_empty() && self.file.is_none() {
                    return Err(Error::validation("a prompt or a source file is required"));
                }
                Ok(())
            }
            LessonPlanKind::K12 | LessonPlanKind::Kindergarten => {
                require(&self.title, "lesson title is required")?;
                require(&self.grade, "grade is required")?;
                require(&self.subject, "subject is required")
            }
        }
    }

    fn stream_path(&self) -> String {
        format!("{}/stream?type={}", Self::RESOURCE, self.kind.as_str())
    }

    fn multipart(&self) -> Result<Form, Error> {
        let model = if self.model.trim().is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            self.model.clone()
        };

        let mut form = Form::new()
            .text("title", self.title.clone())
            .text("grade", self.grade.clone())
            .text("subject", self.subject.clone())
            .text("method", self.method.clone())
            .text("duration", self.duration.clone())
            .text("objectives", self.objectives.clone());
        form = text_if_present(form, "prompt", &self.prompt);
        form = form
            .text("model", model)
            .text("type", self.kind.as_str());
        if let Some(file) = &self.file {
            form = form.part("file", file.to_part()?);
        }
        Ok(form)
    }

    fn project(&self, accumulated: &Accumulator) -> LessonPlanView {
        let sections = Self::sections(accumulated);
        let html = sections
            .iter()
            .map(|section| section.html.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        LessonPlanView {
            lesson_title: text_or(accumulated, "lesson_title", &self.title),
            subject: text_or(accumulated, "subject", &self.subject),
            grade: text_or(accumulated, "grade", &self.grade),
            sections,
            html,
        }
    }

    fn save_record(&self, accumulated: &Accumulator, artifact_token: Option<&str>) -> Option<Value> {
        let sections = accumulated.list("sections");
        if sections.is_empty() {
            return None;
        }

        Some(json!({
            "title": text_or(accumulated, "lesson_title", &self.title),
            "grade": self.grade,
            "subject": self.subject,
            "method": self.method,
            "duration": self.duration,
            "objectives": self.objectives,
            "type": self.kind.as_str(),
            "sections": sections,
            "downloadToken": artifact_token,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Dispatch;
    use crate::sse_stream::StreamFrame;

    #[test]
    fn test_validation_depends_on_kind() {
        assert!(LessonPlanRequest::new("Phân số", "Lớp 4", "Toán").validate().is_ok());
        assert!(LessonPlanRequest::new("Phân số", "", "Toán").validate().is_err());
        assert!(LessonPlanRequest::custom("Soạn tài liệu ôn tập").validate().is_ok());
        assert!(LessonPlanRequest::custom("  ").validate().is_err());
    }

    #[test]
    fn test_stream_path_selects_generator() {
        let mut request = LessonPlanRequest::new("Phân số", "Lớp 4", "Toán");
        assert_eq!(request.stream_path(), "lesson-plans/stream?type=k12");
        request.kind = LessonPlanKind::Kindergarten;
        assert_eq!(request.stream_path(), "lesson-plans/stream?type=kindergarten");
    }

    #[test]
    fn test_sections_accumulate_in_order() {
        let mut acc = Accumulator::new();
        for (event, html) in [
            ("objectives", "<ul><li>Hiểu phân số</li></ul>"),
            ("start_activity", "<p>Khởi động</p>"),
        ] {
            let data = json!({ "html": html }).to_string();
            match LESSON_PLAN_PROFILE.dispatch(&StreamFrame::new(event, data)).unwrap() {
                Dispatch::Append { field, value } => acc.append(&field, value),
                other => panic!("unexpected action {other:?}"),
            }
        }
        let meta = LESSON_PLAN_PROFILE
            .dispatch(&StreamFrame::new(
                "meta",
                r#"{"subject":"Toán","grade":"4","lesson_title":"Phân số"}"#,
            ))
            .unwrap();
        if let Dispatch::Extend(map) = meta {
            acc.extend(map);
        }

        let view = LessonPlanRequest::new("", "", "").project(&acc);
        assert_eq!(view.lesson_title, "Phân số");
        assert_eq!(view.grade, "4");
        assert_eq!(view.sections.len(), 2);
        assert_eq!(view.sections[1].kind, "start_activity");
        assert_eq!(view.html, "<ul><li>Hiểu phân số</li></ul>\n<p>Khởi động</p>");
    }

    #[test]
    fn test_unlisted_events_are_ignored() {
        let frame = StreamFrame::new("activities", r#"{"html":"<p>x</p>"}"#);
        assert!(LESSON_PLAN_PROFILE.dispatch(&frame).is_none());
        let frame = StreamFrame::new("done", r#"{"ok":true}"#);
        assert!(LESSON_PLAN_PROFILE.dispatch(&frame).is_none());
    }
}
