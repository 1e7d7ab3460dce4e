use crate::error::ParserError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const MIN_TITLE_CHARS: usize = 5;
const MIN_DESCRIPTION_CHARS: usize = 10;
const MIN_DETAILS_CHARS: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SubtaskStatus {
    #[default]
    Pending,
    InProgress,
    Review,
    Done,
    Deferred,
    Cancelled,
}

impl std::fmt::Display for SubtaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubtaskStatus::Pending => write!(f, "pending"),
            SubtaskStatus::InProgress => write!(f, "in-progress"),
            SubtaskStatus::Review => write!(f, "review"),
            SubtaskStatus::Done => write!(f, "done"),
            SubtaskStatus::Deferred => write!(f, "deferred"),
            SubtaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: u32,

    pub title: String,

    pub description: String,

    /// Ids of other subtasks in the same batch
    #[serde(default)]
    pub dependencies: Vec<u32>,

    pub details: String,

    #[serde(default)]
    pub status: SubtaskStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_strategy: Option<String>,
}

/// Ordered subtasks produced by one generation call
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct SubtaskBatch {
    pub subtasks: Vec<Subtask>,
}

impl SubtaskBatch {
    pub fn len(&self) -> usize {
        self.subtasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subtasks.is_empty()
    }

    pub fn ids(&self) -> Vec<u32> {
        self.subtasks.iter().map(|s| s.id).collect()
    }
}

/// A schema-valid subtask exactly as the model declared it, before correction
#[derive(Debug, Clone, PartialEq)]
pub struct RawSubtask {
    pub id: i64,
    pub title: String,
    pub description: String,
    /// `None` when the model omitted the field or sent null
    pub dependencies: Option<Vec<i64>>,
    pub details: String,
    pub status: Option<String>,
    pub test_strategy: Option<String>,
}

fn violation(index: usize, reason: impl Into<String>) -> ParserError {
    ParserError::SchemaViolation {
        index,
        reason: reason.into(),
    }
}

fn required_text(
    obj: &serde_json::Map<String, Value>,
    index: usize,
    field: &str,
    min_chars: usize,
) -> Result<String, ParserError> {
    let text = obj
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| violation(index, format!("'{}' must be a string", field)))?;
    if text.chars().count() < min_chars {
        return Err(violation(
            index,
            format!("'{}' must be at least {} characters", field, min_chars),
        ));
    }
    Ok(text.to_string())
}

/// Check one element of the candidate array against the subtask schema
pub fn validate_subtask(index: usize, value: &Value) -> Result<RawSubtask, ParserError> {
    let obj = value
        .as_object()
        .ok_or_else(|| violation(index, "expected an object"))?;

    let id = obj
        .get("id")
        .and_then(Value::as_i64)
        .filter(|id| *id > 0)
        .ok_or_else(|| violation(index, "'id' must be a positive integer"))?;

    let title = required_text(obj, index, "title", MIN_TITLE_CHARS)?;
    let description = required_text(obj, index, "description", MIN_DESCRIPTION_CHARS)?;
    let details = required_text(obj, index, "details", MIN_DETAILS_CHARS)?;

    let dependencies = match obj.get("dependencies") {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .map(|d| {
                    d.as_i64()
                        .ok_or_else(|| violation(index, "'dependencies' must contain integers"))
                })
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Some(_) => return Err(violation(index, "'dependencies' must be an array")),
    };

    let test_strategy = match obj.get("testStrategy") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(violation(index, "'testStrategy' must be a string")),
    };

    let status = obj.get("status").and_then(Value::as_str).map(str::to_string);

    Ok(RawSubtask {
        id,
        title,
        description,
        dependencies,
        details,
        status,
        test_strategy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> Value {
        json!({
            "id": 1,
            "title": "Set up DB",
            "description": "Configure Postgres instance",
            "dependencies": [],
            "details": "Install postgres, create schema",
            "status": "done",
            "testStrategy": "Connect with psql"
        })
    }

    #[test]
    fn test_valid_subtask() {
        let raw = validate_subtask(0, &valid()).unwrap();
        assert_eq!(raw.id, 1);
        assert_eq!(raw.dependencies, Some(vec![]));
        assert_eq!(raw.status.as_deref(), Some("done"));
        assert_eq!(raw.test_strategy.as_deref(), Some("Connect with psql"));
    }

    #[test]
    fn test_missing_dependencies_allowed() {
        let mut v = valid();
        v.as_object_mut().unwrap().remove("dependencies");
        assert_eq!(validate_subtask(0, &v).unwrap().dependencies, None);
        v["dependencies"] = Value::Null;
        assert_eq!(validate_subtask(0, &v).unwrap().dependencies, None);
    }

    #[test]
    fn test_rejections() {
        let cases: Vec<(&str, Value)> = vec![
            ("id", json!(0)),
            ("id", json!("1")),
            ("title", json!("Shrt")),
            ("description", json!("too short")),
            ("details", json!("not enough detail")),
            ("dependencies", json!("1,2")),
            ("dependencies", json!([1, "two"])),
            ("testStrategy", json!(5)),
        ];

        for (field, bad) in cases {
            let mut v = valid();
            v[field] = bad.clone();
            let err = validate_subtask(3, &v).unwrap_err();
            match err {
                ParserError::SchemaViolation { index, reason } => {
                    assert_eq!(index, 3);
                    assert!(reason.contains(field), "{} -> {}", field, reason);
                }
                other => panic!("unexpected error {:?}", other),
            }
        }
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(validate_subtask(0, &json!([1])).is_err());
    }

    #[test]
    fn test_status_serializes_kebab_case() {
        let s = serde_json::to_string(&SubtaskStatus::InProgress).unwrap();
        assert_eq!(s, "\"in-progress\"");
    }
}
