//! Recovers a subtask batch from raw model text.
//!
//! One textual repair runs first, then an ordered list of extraction
//! strategies is tried until one yields a candidate array. The candidate is
//! validated element by element (all or nothing) and then corrected.

use crate::error::ParserError;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

use super::correction::{correct, CorrectionReport};
use super::json::{balanced_object_at, strip_fence};
use super::subtask::{validate_subtask, RawSubtask, SubtaskBatch};

const PREVIEW_CHARS: usize = 200;

type Strategy = fn(&str) -> Option<Vec<Value>>;

const STRATEGIES: &[(&str, Strategy)] = &[
    ("subtasks_object", parse_subtasks_object),
    ("bare_array", parse_bare_array),
    ("embedded_object", parse_embedded_object),
];

fn dependency_gap_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""dependencies"\s*:\s*,"#).ok())
        .as_ref()
}

fn bare_array_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\[\s*\{").ok()).as_ref()
}

fn embedded_object_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\{\s*"subtasks"\s*:\s*\[[\s\S]*\]\s*\}"#).ok())
        .as_ref()
}

/// Fill in `"dependencies": ,` (value left out by the model) with an empty array
pub fn repair_text(raw: &str) -> String {
    match dependency_gap_re() {
        Some(re) => re.replace_all(raw, r#""dependencies": [],"#).into_owned(),
        None => raw.to_string(),
    }
}

fn subtasks_array(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Object(mut obj) => match obj.remove("subtasks") {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

/// Text left once the reply is trimmed, then the body of its code fence if
/// that differs
fn bodies(text: &str) -> impl Iterator<Item = &str> {
    let trimmed = text.trim();
    let fenced = strip_fence(text);
    std::iter::once(trimmed).chain((fenced != trimmed).then_some(fenced))
}

/// Whole text (or one code fence) is `{"subtasks": [...]}`
fn parse_subtasks_object(text: &str) -> Option<Vec<Value>> {
    bodies(text).find_map(|body| {
        serde_json::from_str::<Value>(body)
            .ok()
            .and_then(subtasks_array)
    })
}

/// Whole text (or one code fence) is a bare array of subtask objects
fn parse_bare_array(text: &str) -> Option<Vec<Value>> {
    let re = bare_array_re()?;
    bodies(text).find_map(|body| {
        if !re.is_match(body) {
            return None;
        }
        let wrapped = format!(r#"{{"subtasks": {}}}"#, body);
        serde_json::from_str(&wrapped).ok().and_then(subtasks_array)
    })
}

/// A `{"subtasks": [...]}` object buried in surrounding prose
fn parse_embedded_object(text: &str) -> Option<Vec<Value>> {
    let found = embedded_object_re()?.find(text)?;

    if let Some(items) = serde_json::from_str::<Value>(found.as_str())
        .ok()
        .and_then(subtasks_array)
    {
        return Some(items);
    }

    // Greedy match ran past the object; retry with the balanced span
    let candidate = balanced_object_at(text, found.start())?;
    subtasks_array(serde_json::from_str(candidate).ok()?)
}

fn preview(raw: &str) -> String {
    let mut shown: String = raw.chars().take(PREVIEW_CHARS).collect();
    if raw.chars().count() > PREVIEW_CHARS {
        shown.push_str("...");
    }
    shown
}

/// Run the repair and strategy cascade, returning the first candidate array
pub fn extract_candidates(raw: &str) -> Result<Vec<Value>, ParserError> {
    let repaired = repair_text(raw);

    for (name, strategy) in STRATEGIES {
        if let Some(items) = strategy(&repaired) {
            debug!("Recovered {} subtask candidates via {}", items.len(), name);
            return Ok(items);
        }
        debug!("Recovery strategy {} did not match", name);
    }

    Err(ParserError::MalformedOutput {
        preview: preview(raw),
    })
}

/// Extract, validate and correct one batch. Returns the batch together
/// with what the correction pass changed.
pub fn recover_batch(
    raw: &str,
    start_id: u32,
    expected_count: usize,
) -> Result<(SubtaskBatch, CorrectionReport), ParserError> {
    let candidates = extract_candidates(raw)?;

    let validated = candidates
        .iter()
        .enumerate()
        .map(|(index, value)| validate_subtask(index, value))
        .collect::<Result<Vec<RawSubtask>, _>>()?;

    Ok(correct(validated, start_id, expected_count))
}
