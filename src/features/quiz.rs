use crate::accumulator::Accumulator;
use crate::dispatch::{Route, RoutingProfile};
use crate::feature::GenerationFeature;
use crate::features::text_or;
use crate::types::form::text_if_present;
use crate::types::{Attachment, QuizView};
use crate::Error;
use reqwest::multipart::Form;
use serde_json::{json, Value};

/// Routing for the quiz service. Questions arrive one per `generating` event;
/// `Done` carries the whole quiz under `detail`. The service renders the
/// document on a separate export call, so a download path is rarely present.
pub static QUIZ_PROFILE: RoutingProfile = RoutingProfile {
    domain: "quiz",
    plain_string_events: &[],
    routes: &[
        ("status", Route::Status),
        ("generating", Route::Append { field: "questions", pointer: Some("/detail") }),
        ("Done", Route::Terminal { pointer: Some("/detail"), merge: true, token_required: false }),
        ("error", Route::Error),
    ],
    primary_list: "questions",
};

/// Source documents the quiz service accepts.
const ACCEPTED_EXTENSIONS: &[&str] = &["pdf", "docx"];

/// Request to generate a quiz from a document or pasted text.
#[derive(Debug, Clone)]
pub struct QuizRequest {
    pub file: Option<Attachment>,
    pub text_content: String,
    pub name: String,
    pub subject: String,
    pub grade: Option<u32>,
    pub topic: String,
    pub num_questions: u32,
    /// Minutes.
    pub time_limit: u32,
    pub difficulty: String,
    pub percentage: u32,
}

impl Default for QuizRequest {
    fn default() -> Self {
        Self {
            file: None,
            text_content: String::new(),
            name: String::new(),
            subject: String::new(),
            grade: None,
            topic: String::new(),
            num_questions: 10,
            time_limit: 45,
            difficulty: "Medium".to_string(),
            percentage: 70,
        }
    }
}

impl QuizRequest {
    pub fn from_text(text_content: impl Into<String>) -> Self {
        Self {
            text_content: text_content.into(),
            ..Self::default()
        }
    }

    pub fn from_file(file: Attachment) -> Self {
        Self {
            file: Some(file),
            ..Self::default()
        }
    }
}

impl GenerationFeature for QuizRequest {
    type View = QuizView;

    const RESOURCE: &'static str = "quizzes";

    fn profile() -> &'static RoutingProfile {
        &QUIZ_PROFILE
    }

    fn validate(&self) -> Result<(), Error> {
        match &self.file {
            None if self.text_content.trim().is_empty() => Err(Error::validation(
                "a source file or text content is required",
            )),
            Some(file) => match file.extension() {
                Some(ext) if ACCEPTED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
                _ => Err(Error::validation("only .pdf or .docx files are supported")),
            },
            None => Ok(()),
        }
    }

    fn multipart(&self) -> Result<Form, Error> {
        let mut form = Form::new();
        if let Some(file) = &self.file {
            form = form.part("file", file.to_part()?);
        }
        form = text_if_present(form, "text_content", &self.text_content);
        form = form
            .text("num_questions", self.num_questions.to_string())
            .text("time_limit", self.time_limit.to_string())
            .text("difficulty", self.difficulty.clone())
            .text("percentage", self.percentage.to_string());
        form = text_if_present(form, "name", &self.name);
        form = text_if_present(form, "subject", &self.subject);
        if let Some(grade) = self.grade {
            form = form.text("grade", grade.to_string());
        }
        form = text_if_present(form, "topic", &self.topic);
        Ok(form)
    }

    fn project(&self, accumulated: &Accumulator) -> QuizView {
        let questions = accumulated.list("questions").to_vec();
        let grade = match accumulated.get("grade") {
            Some(Value::String(grade)) if !grade.is_empty() => Some(grade.clone()),
            Some(Value::Number(grade)) => Some(grade.to_string()),
            _ => self.grade.map(|grade| grade.to_string()),
        };

        QuizView {
            name: text_or(accumulated, "name", &self.name),
            subject: text_or(accumulated, "subject", &self.subject),
            grade,
            difficulty: text_or(accumulated, "difficulty", &self.difficulty),
            question_count: questions.len(),
            questions,
            download_url: accumulated.get_str("download_url").map(str::to_string),
        }
    }

    fn save_record(&self, accumulated: &Accumulator, artifact_token: Option<&str>) -> Option<Value> {
        let questions = accumulated.list("questions");
        if questions.is_empty() {
            return None;
        }

        let view = self.project(accumulated);
        Some(json!({
            "name": view.name,
            "subject": view.subject,
            "grade": view.grade,
            "difficulty": view.difficulty,
            "numQuestions": self.num_questions,
            "timeLimit": self.time_limit,
            "questions": questions,
            "downloadToken": artifact_token,
        }))
    }
}
