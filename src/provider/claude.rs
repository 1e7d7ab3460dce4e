use super::{command_for, BackendParams, BackendResponse, ModelBackend, Payload, TokenUsage};
use crate::error::ProviderError;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::timeout as tokio_timeout;

/// Runs the `claude` CLI in print mode; auth comes from the CLI's own login
pub struct ClaudeCliBackend {
    pub binary: PathBuf,
    pub timeout: Duration,
    pub working_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ClaudeOutput {
    #[serde(default)]
    result: String,
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    usage: Option<ClaudeUsage>,
}

#[derive(Debug, Default, Deserialize)]
struct ClaudeUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[async_trait]
impl ModelBackend for ClaudeCliBackend {
    fn name(&self) -> &'static str {
        "claude_cli"
    }

    async fn generate_text(&self, params: &BackendParams) -> Result<BackendResponse, ProviderError> {
        let mut cmd = command_for(&self.binary);
        cmd.current_dir(&self.working_dir);

        // Ensure subscription auth is used (not API key)
        cmd.env_remove("ANTHROPIC_API_KEY");

        cmd.arg("-p")
            .arg(params.user_prompt())
            .arg("--model")
            .arg(&params.model_id)
            .arg("--output-format")
            .arg("json");

        if let Some(system) = params.system_prompt() {
            cmd.arg("--system-prompt").arg(system);
        }

        let output = tokio_timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))?
            .map_err(ProviderError::Io)?;

        if !output.status.success() {
            return Err(ProviderError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        parse_claude_output(&String::from_utf8_lossy(&output.stdout))
    }
}

fn parse_claude_output(stdout: &str) -> Result<BackendResponse, ProviderError> {
    let parsed: ClaudeOutput = serde_json::from_str(stdout.trim()).map_err(|e| {
        ProviderError::InvalidResponse(format!("claude CLI output is not JSON: {}", e))
    })?;

    if parsed.is_error {
        return Err(ProviderError::Other {
            message: parsed.result,
            status: None,
        });
    }

    let usage = parsed.usage.unwrap_or_default();
    Ok(BackendResponse {
        payload: Payload::Text(parsed.result),
        usage: TokenUsage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_result_and_usage() {
        let stdout = r#"{"type":"result","is_error":false,"result":"[{\"id\":1}]","session_id":"abc","usage":{"input_tokens":120,"output_tokens":33}}"#;
        let response = parse_claude_output(stdout).unwrap();
        assert_eq!(response.usage.input_tokens, 120);
        assert_eq!(response.usage.output_tokens, 33);
        match response.payload {
            Payload::Text(t) => assert_eq!(t, "[{\"id\":1}]"),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_result() {
        let stdout = r#"{"is_error":true,"result":"API Error: 529 Overloaded"}"#;
        let err = parse_claude_output(stdout).unwrap_err();
        assert!(err.to_string().contains("Overloaded"));
    }

    #[test]
    fn test_missing_usage_defaults_to_zero() {
        let response = parse_claude_output(r#"{"result":"ok"}"#).unwrap();
        assert_eq!(response.usage, TokenUsage::default());
    }
}
