use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Marker used in the rubric table when a criterion lacks a level.
pub const MISSING_LEVEL: &str = "N/A";

/// One performance level of a rubric criterion.
///
/// Model output varies in shape, so every field accepts null and scalars of
/// the wrong type instead of rejecting the whole criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricLevel {
    #[serde(default, deserialize_with = "lenient_text")]
    pub label: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub score_range: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: String,
}

/// One criterion as streamed by the rubric service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricCriterion {
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub weight_percent: f64,
    #[serde(default, deserialize_with = "lenient_optional_text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_levels")]
    pub levels: Vec<RubricLevel>,
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(scalar_text(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn lenient_optional_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(scalar_text(Value::deserialize(deserializer)?))
}

/// Numbers and numeric strings such as `"50"` or `"50%"`; anything else is 0.
fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let number = match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    };
    Ok(number.unwrap_or(0.0))
}

/// Non-object entries are dropped; a non-array value is no levels.
fn lenient_levels<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<RubricLevel>, D::Error> {
    let levels = match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    };
    Ok(levels)
}

/// Criterion summary shown next to the table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriterionSummary {
    pub name: String,
    pub weight: f64,
    pub description: String,
}

/// One row of the pivoted scoring table: a level across all criteria.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RubricTableRow {
    pub level: String,
    pub points: u32,
    /// One description per criterion, in criterion order.
    pub descriptions: Vec<String>,
}

/// Denormalized rubric as presented while it streams.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct RubricView {
    pub name: String,
    pub subject: String,
    pub grade: String,
    pub assessment_type: String,
    pub criteria: Vec<CriterionSummary>,
    pub table: Vec<RubricTableRow>,
    /// Rough completion percentage.
    pub progress: u8,
}

/// Pivot criteria into rows keyed by the first criterion's level labels.
pub fn rubric_table(criteria: &[RubricCriterion]) -> Vec<RubricTableRow> {
    let Some(first) = criteria.first() else {
        return Vec::new();
    };

    first
        .levels
        .iter()
        .map(|level| RubricTableRow {
            level: level.label.clone(),
            points: top_score(&level.score_range),
            descriptions: criteria
                .iter()
                .map(|criterion| {
                    criterion
                        .levels
                        .iter()
                        .find(|l| l.label == level.label)
                        .map(|l| l.description.clone())
                        .filter(|d| !d.is_empty())
                        .unwrap_or_else(|| MISSING_LEVEL.to_string())
                })
                .collect(),
        })
        .collect()
}

/// Upper bound of a score range such as `"7-9"`; 0 when not numeric.
fn top_score(score_range: &str) -> u32 {
    score_range
        .rsplit('-')
        .next()
        .and_then(|tail| {
            let digits: String = tail
                .trim()
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            digits.parse().ok()
        })
        .unwrap_or(0)
}

/// Criteria count assumed when the form gives none.
pub const DEFAULT_CRITERIA_TARGET: usize = 5;

/// `min(100, floor(received / target * 80) + 10)`; a zero target counts as
/// the default.
pub fn rubric_progress(received: usize, target: usize) -> u8 {
    let target = if target == 0 { DEFAULT_CRITERIA_TARGET } else { target };
    let progress = (received * 80 / target) + 10;
    progress.min(100) as u8
}
