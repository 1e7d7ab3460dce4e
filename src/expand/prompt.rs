use crate::error::ExpandError;
use std::path::Path;
use tracing::debug;

use super::Task;

const EMBEDDED_SYSTEM_PROMPT: &str = include_str!("../../prompts/expand-system.md");

/// Load the system prompt from `path`, or the embedded one when unset or missing
pub fn load_system_prompt(path: Option<&Path>) -> Result<String, ExpandError> {
    let Some(path) = path else {
        return Ok(EMBEDDED_SYSTEM_PROMPT.to_string());
    };

    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(
                "Expand prompt '{}' not found, using embedded default",
                path.display()
            );
            Ok(EMBEDDED_SYSTEM_PROMPT.to_string())
        }
        Err(e) => Err(ExpandError::PromptFile {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

pub fn build_user_prompt(
    task: &Task,
    num_subtasks: usize,
    next_id: u32,
    additional_context: Option<&str>,
) -> String {
    let mut prompt = format!(
        "Break down this task into exactly {} specific subtasks:\n\n\
         Task ID: {}\n\
         Title: {}\n\
         Description: {}\n",
        num_subtasks, task.id, task.title, task.description
    );

    if !task.details.trim().is_empty() {
        prompt.push_str(&format!("Current details: {}\n", task.details));
    }
    if let Some(strategy) = task.test_strategy.as_deref() {
        prompt.push_str(&format!("Test strategy: {}\n", strategy));
    }

    if let Some(context) = additional_context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!("\nAdditional context:\n{}\n", context));
    }

    let last_id = next_id as usize + num_subtasks.saturating_sub(1);
    prompt.push_str(&format!(
        "\nNumber the subtasks sequentially starting from {} (ids {} to {}). \
         Dependencies may only reference ids in that range.",
        next_id, next_id, last_id
    ));

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task {
            id: 4,
            title: "Add login".to_string(),
            description: "Session-based authentication".to_string(),
            details: String::new(),
            test_strategy: None,
            subtasks: Vec::new(),
        }
    }

    #[test]
    fn test_user_prompt_numbering() {
        let prompt = build_user_prompt(&task(), 3, 5, Some("Use argon2"));
        assert!(prompt.contains("exactly 3 specific subtasks"));
        assert!(prompt.contains("starting from 5 (ids 5 to 7)"));
        assert!(prompt.contains("Use argon2"));
        assert!(!prompt.contains("Current details"));
    }

    #[test]
    fn test_blank_context_omitted() {
        let prompt = build_user_prompt(&task(), 2, 1, Some("   "));
        assert!(!prompt.contains("Additional context"));
    }

    #[test]
    fn test_prompt_fallback_to_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.md");
        let prompt = load_system_prompt(Some(&missing)).unwrap();
        assert!(prompt.contains("\"subtasks\""));

        let custom = dir.path().join("custom.md");
        std::fs::write(&custom, "custom prompt").unwrap();
        assert_eq!(load_system_prompt(Some(&custom)).unwrap(), "custom prompt");
    }
}
