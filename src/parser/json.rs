use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn fence_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*```(?:json|JSON)?[ \t]*\r?\n?([\s\S]*?)\r?\n?[ \t]*```[ \t]*\r?$").ok()
    })
    .as_ref()
}

/// Content of the first fenced code block, or the trimmed input when there is none.
/// Fences only count when they open and close on their own line, so inline
/// backticks inside JSON strings are left alone.
pub fn strip_fence(s: &str) -> &str {
    fence_re()
        .and_then(|re| re.captures(s))
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or_else(|| s.trim())
}

/// Slice holding the balanced `{...}` object that opens at byte `start`.
/// Braces inside JSON strings are ignored.
pub fn balanced_object_at(s: &str, start: usize) -> Option<&str> {
    if !s[start..].starts_with('{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&s[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Extract a JSON object from text that might contain prose or markdown code blocks
pub fn extract_json(s: &str) -> Option<Value> {
    let trimmed = s.trim();

    // First try: the whole string is valid JSON
    if trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return Some(value);
        }
    }

    // Second try: extract from markdown code block
    let fenced = strip_fence(s);
    if fenced != trimmed {
        if let Ok(value) = serde_json::from_str::<Value>(fenced) {
            if value.is_object() {
                return Some(value);
            }
        }
    }

    // Third try: first balanced object in the text
    let brace_start = s.find('{')?;
    let candidate = balanced_object_at(s, brace_start)?;
    serde_json::from_str::<Value>(candidate)
        .ok()
        .filter(Value::is_object)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_direct_json() {
        let value = extract_json(r#"  {"a": 1}  "#).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_extract_markdown_wrapped() {
        let md = r#"
Here is the result:

```json
{"subtasks": [{"id": 1}]}
```
"#;
        let value = extract_json(md).unwrap();
        assert!(value["subtasks"].is_array());
    }

    #[test]
    fn test_extract_embedded_with_braces_in_strings() {
        let text = r#"Result: {"title": "use {braces} carefully", "n": 2} trailing"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["n"], 2);
    }

    #[test]
    fn test_extract_none() {
        assert!(extract_json("no json here").is_none());
        assert!(extract_json("{ unterminated").is_none());
    }

    #[test]
    fn test_strip_fence_without_language() {
        assert_eq!(strip_fence("```\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(strip_fence("  plain  "), "plain");
    }

    #[test]
    fn test_strip_fence_ignores_inline_backticks() {
        let inline = r#"[{"details": "Run ```npm install pg``` then create the schema"}]"#;
        assert_eq!(strip_fence(inline), inline);

        let fenced = format!("Sure:\n```json\n{}\n```\nDone.", inline);
        assert_eq!(strip_fence(&fenced), inline);
    }

    #[test]
    fn test_balanced_object_requires_brace() {
        assert_eq!(balanced_object_at("x{}", 0), None);
        assert_eq!(balanced_object_at("x{}", 1), Some("{}"));
    }
}
