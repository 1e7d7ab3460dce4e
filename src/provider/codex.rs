use super::{command_for, BackendParams, BackendResponse, ModelBackend, Payload, TokenUsage};
use crate::error::ProviderError;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout as tokio_timeout;

pub struct CodexCliBackend {
    pub binary: PathBuf,
    pub timeout: Duration,
    pub working_dir: PathBuf,
}

#[async_trait]
impl ModelBackend for CodexCliBackend {
    fn name(&self) -> &'static str {
        "codex_cli"
    }

    async fn generate_text(&self, params: &BackendParams) -> Result<BackendResponse, ProviderError> {
        // Codex has no separate system prompt flag
        let full_prompt = match params.system_prompt() {
            Some(system) => format!("{}\n\n{}", system, params.user_prompt()),
            None => params.user_prompt(),
        };

        // Final assistant message is written here
        let out_file = NamedTempFile::new().map_err(ProviderError::Io)?;

        let mut cmd = command_for(&self.binary);
        cmd.arg("exec")
            .arg("--model")
            .arg(&params.model_id)
            .arg("--json")
            .arg("--output-last-message")
            .arg(out_file.path())
            // Read prompt from stdin
            .arg("-");

        cmd.current_dir(&self.working_dir);
        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let mut child = cmd.spawn().map_err(ProviderError::Io)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(full_prompt.as_bytes())
                .await
                .map_err(ProviderError::Io)?;
            stdin.shutdown().await.map_err(ProviderError::Io)?;
        }

        let output = tokio_timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))?
            .map_err(ProviderError::Io)?;

        if !output.status.success() {
            return Err(ProviderError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let text = tokio::fs::read_to_string(out_file.path())
            .await
            .map_err(ProviderError::Io)?;

        Ok(BackendResponse {
            payload: Payload::Text(text),
            usage: usage_from_events(&String::from_utf8_lossy(&output.stdout)),
        })
    }
}

/// Sum token usage reported in the JSONL event stream
fn usage_from_events(stdout: &str) -> TokenUsage {
    let mut usage = TokenUsage::default();
    for line in stdout.lines() {
        let Ok(event) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        if let Some(u) = event.get("usage") {
            usage.input_tokens += u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0);
            usage.output_tokens += u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0);
        }
    }
    usage
}
