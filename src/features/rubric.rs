use crate::accumulator::Accumulator;
use crate::dispatch::{Route, RoutingProfile};
use crate::feature::GenerationFeature;
use crate::features::text_or;
use crate::types::form::{require, text_if_present};
use crate::types::{
    rubric_progress, rubric_table, Attachment, CriterionSummary, RubricCriterion, RubricView,
};
use crate::Error;
use reqwest::multipart::Form;
use serde_json::{json, Value};

/// Routing for the rubric service. Scalar events arrive as bare strings and
/// land under the keys the rubric view reads (`rubric_title`, `subject`,
/// `grade`, `assessment_type`).
pub static RUBRIC_PROFILE: RoutingProfile = RoutingProfile {
    domain: "rubric",
    plain_string_events: &[
        "rubric_rubric_title",
        "rubric_subject",
        "rubric_grade_level",
        "rubric_assessment_type",
    ],
    routes: &[
        ("status", Route::Status),
        ("error", Route::Error),
        ("rubric_rubric_title", Route::Scalar("rubric_title")),
        ("rubric_subject", Route::Scalar("subject")),
        ("rubric_grade_level", Route::Scalar("grade")),
        ("rubric_assessment_type", Route::Scalar("assessment_type")),
        ("rubric_criteria", Route::List("criteria")),
        ("rubric_scale", Route::Scalar("scale")),
        ("rubric_json", Route::Merge),
        ("rubric_download_url", Route::Terminal { pointer: None, merge: false, token_required: true }),
        ("download_url", Route::Terminal { pointer: None, merge: false, token_required: true }),
    ],
    primary_list: "criteria",
};

/// Request to generate a grading rubric.
#[derive(Debug, Clone, Default)]
pub struct RubricRequest {
    pub title: String,
    pub subject: String,
    pub grade: String,
    pub assessment_type: String,
    pub number_of_criteria: u32,
    pub description: String,
    pub attachment: Option<Attachment>,
}

impl RubricRequest {
    pub fn new(title: impl Into<String>, subject: impl Into<String>, number_of_criteria: u32) -> Self {
        Self {
            title: title.into(),
            subject: subject.into(),
            number_of_criteria,
            ..Self::default()
        }
    }

    /// Criteria parsed from the accumulated list; malformed entries are skipped.
    pub fn criteria(accumulated: &Accumulator) -> Vec<RubricCriterion> {
        accumulated
            .list("criteria")
            .iter()
            .filter_map(|item| match serde_json::from_value(item.clone()) {
                Ok(criterion) => Some(criterion),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping malformed rubric criterion");
                    None
                }
            })
            .collect()
    }
}

impl GenerationFeature for RubricRequest {
    type View = RubricView;

    const RESOURCE: &'static str = "rubrics";

    fn profile() -> &'static RoutingProfile {
        &RUBRIC_PROFILE
    }

    fn validate(&self) -> Result<(), Error> {
        require(&self.title, "rubric title is required")?;
        require(&self.subject, "subject is required")?;
        if self.number_of_criteria == 0 {
            return Err(Error::validation("number of criteria is required"));
        }
        Ok(())
    }

    fn multipart(&self) -> Result<Form, Error> {
        let mut form = Form::new();
        form = text_if_present(form, "rubric_title", &self.title);
        form = text_if_present(form, "subject", &self.subject);
        form = text_if_present(form, "grade_level", &self.grade);
        form = text_if_present(form, "assessment_type", &self.assessment_type);
        form = form.text("number_of_criteria", self.number_of_criteria.to_string());
        form = text_if_present(form, "user_prompt", &self.description);
        if let Some(attachment) = &self.attachment {
            form = form.part("files", attachment.to_part()?);
        }
        Ok(form)
    }

    fn project(&self, accumulated: &Accumulator) -> RubricView {
        let criteria = Self::criteria(accumulated);

        RubricView {
            name: text_or(accumulated, "rubric_title", &self.title),
            subject: text_or(accumulated, "subject", &self.subject),
            grade: text_or(accumulated, "grade", &self.grade),
            assessment_type: text_or(accumulated, "assessment_type", &self.assessment_type),
            criteria: criteria
                .iter()
                .map(|criterion| CriterionSummary {
                    name: criterion.name.clone(),
                    weight: criterion.weight_percent,
                    description: criterion.description.clone().unwrap_or_default(),
                })
                .collect(),
            table: rubric_table(&criteria),
            progress: rubric_progress(criteria.len(), self.number_of_criteria as usize),
        }
    }

    fn save_record(&self, accumulated: &Accumulator, artifact_token: Option<&str>) -> Option<Value> {
        let criteria = accumulated.list("criteria");
        if criteria.is_empty() {
            return None;
        }

        Some(json!({
            "title": self.title,
            "subject": self.subject,
            "grade": self.grade,
            "assessmentType": self.assessment_type,
            "criteria": criteria,
            "description": self.description,
            "downloadToken": artifact_token,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Dispatch;
    use crate::sse_stream::StreamFrame;

    fn request() -> RubricRequest {
        RubricRequest {
            grade: "Lớp 10".to_string(),
            assessment_type: "Thuyết trình".to_string(),
            ..RubricRequest::new("Thuyết trình nhóm", "Ngữ văn", 2)
        }
    }

    #[test]
    fn test_validation() {
        assert!(request().validate().is_ok());
        assert!(RubricRequest::new("", "Ngữ văn", 2).validate().is_err());
        assert!(RubricRequest::new("Title", " ", 2).validate().is_err());
        assert!(RubricRequest::new("Title", "Ngữ văn", 0).validate().is_err());
    }

    #[test]
    fn test_scalar_field_mapping() {
        let cases = [
            ("rubric_rubric_title", "rubric_title"),
            ("rubric_subject", "subject"),
            ("rubric_grade_level", "grade"),
            ("rubric_assessment_type", "assessment_type"),
        ];
        for (event, field) in cases {
            let action = RUBRIC_PROFILE.dispatch(&StreamFrame::new(event, "Giá trị")).unwrap();
            assert_eq!(
                action,
                Dispatch::Set {
                    field: field.to_string(),
                    value: Value::String("Giá trị".to_string()),
                }
            );
        }
    }

    #[test]
    fn test_projection_falls_back_to_form() {
        let mut acc = Accumulator::new();
        acc.merge("rubric_title", json!("Rubric thuyết trình"));
        acc.merge(
            "criteria",
            json!([
                {"name": "Nội dung", "weight_percent": 60, "levels": [
                    {"label": "Tốt", "score_range": "8-10", "description": "Đầy đủ"}
                ]},
                {"name": "Trình bày", "weight_percent": 40, "description": "Giọng nói", "levels": []},
                "not a criterion"
            ]),
        );

        let view = request().project(&acc);
        assert_eq!(view.name, "Rubric thuyết trình");
        assert_eq!(view.subject, "Ngữ văn");
        assert_eq!(view.grade, "Lớp 10");
        assert_eq!(view.criteria.len(), 2);
        assert_eq!(view.criteria[1].description, "Giọng nói");
        assert_eq!(view.table[0].descriptions, vec!["Đầy đủ", "N/A"]);
        assert_eq!(view.progress, 90);
    }

    #[test]
    fn test_projection_keeps_loosely_typed_criteria() {
        let mut acc = Accumulator::new();
        acc.merge(
            "criteria",
            json!([
                {"name": "Nội dung", "weight_percent": "50", "levels": [
                    {"label": "Tốt", "score_range": "8-10", "description": "Đầy đủ"},
                    {"label": "Đạt", "score_range": "5-7", "description": "Cơ bản"}
                ]},
                {"name": "Trình bày", "weight_percent": 50, "levels": [
                    {"label": "Tốt", "score_range": null, "description": "Mạch lạc"}
                ]}
            ]),
        );

        let view = request().project(&acc);
        assert_eq!(view.criteria.len(), acc.count("criteria"));
        assert_eq!(view.criteria[0].weight, 50.0);
        assert_eq!(view.table.len(), 2);
        assert_eq!(view.table[0].descriptions, vec!["Đầy đủ", "Mạch lạc"]);
        assert_eq!(view.table[1].descriptions, vec!["Cơ bản", "N/A"]);
    }

    #[test]
    fn test_save_record() {
        let mut acc = Accumulator::new();
        assert!(request().save_record(&acc, Some("tok")).is_none());

        acc.merge("criteria", json!([{"name": "Nội dung", "weight_percent": 100, "levels": []}]));
        let record = request().save_record(&acc, Some("tok")).unwrap();
        assert_eq!(record["downloadToken"], "tok");
        assert_eq!(record["assessmentType"], "Thuyết trình");
        assert_eq!(record["criteria"].as_array().unwrap().len(), 1);
    }
}
