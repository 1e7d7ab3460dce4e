mod claude;
mod codex;
#[cfg(test)]
pub mod mock;
mod openai;

pub use claude::ClaudeCliBackend;
pub use codex::CodexCliBackend;
pub use openai::OpenAiCompatBackend;

use crate::config::{BackendKind, Config, ProviderSettings};
use crate::error::ProviderError;
use crate::parser::extract_json;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    GenerateText,
    GenerateObject,
    StreamText,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceKind::GenerateText => write!(f, "generateText"),
            ServiceKind::GenerateObject => write!(f, "generateObject"),
            ServiceKind::StreamText => write!(f, "streamText"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Everything a backend needs for one call, already resolved for a single attempt
#[derive(Debug, Clone, Default)]
pub struct BackendParams {
    pub model_id: String,
    pub messages: Vec<Message>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub schema: Option<serde_json::Value>,
    pub object_name: Option<String>,
}

impl BackendParams {
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
    }

    pub fn user_prompt(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

pub enum Payload {
    Text(String),
    Object(serde_json::Value),
    Stream(TextStream),
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Payload::Object(value) => f.debug_tuple("Object").field(value).finish(),
            Payload::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Normalized response every backend adapter produces
#[derive(Debug)]
pub struct BackendResponse {
    pub payload: Payload,
    pub usage: TokenUsage,
}

#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate_text(&self, params: &BackendParams) -> Result<BackendResponse, ProviderError>;

    /// Asks for JSON in plain text and pulls the object out of the reply.
    /// Backends with native structured output override this.
    async fn generate_object(
        &self,
        params: &BackendParams,
    ) -> Result<BackendResponse, ProviderError> {
        let response = self.generate_text(&json_only_params(params)).await?;
        let object = match response.payload {
            Payload::Object(value) => value,
            Payload::Text(text) => extract_json(&text).ok_or_else(|| {
                ProviderError::InvalidResponse("no JSON object in model output".to_string())
            })?,
            Payload::Stream(_) => {
                return Err(ProviderError::InvalidResponse(
                    "expected text, got a stream".to_string(),
                ))
            }
        };
        Ok(BackendResponse {
            payload: Payload::Object(object),
            usage: response.usage,
        })
    }

    /// Single-chunk stream for backends that cannot stream
    async fn stream_text(&self, params: &BackendParams) -> Result<BackendResponse, ProviderError> {
        let response = self.generate_text(params).await?;
        let chunks: TextStream = match response.payload {
            Payload::Text(text) => {
                Box::pin(futures::stream::once(async move { Ok::<_, ProviderError>(text) }))
            }
            Payload::Stream(stream) => stream,
            Payload::Object(value) => {
                let text = value.to_string();
                Box::pin(futures::stream::once(async move { Ok::<_, ProviderError>(text) }))
            }
        };
        Ok(BackendResponse {
            payload: Payload::Stream(chunks),
            usage: response.usage,
        })
    }
}

fn json_only_params(params: &BackendParams) -> BackendParams {
    let mut instruction = String::from(
        "Respond ONLY with a single valid JSON object. Do not include any prose or markdown.",
    );
    if let Some(schema) = &params.schema {
        instruction.push_str("\nThe object must conform to this JSON Schema:\n");
        instruction.push_str(&schema.to_string());
    }

    let mut adjusted = params.clone();
    match adjusted
        .messages
        .iter_mut()
        .find(|m| m.role == MessageRole::System)
    {
        Some(system) => {
            system.content.push_str("\n\n");
            system.content.push_str(&instruction);
        }
        None => adjusted.messages.insert(0, Message::system(instruction)),
    }
    adjusted
}

/// Source of API keys, by environment variable name
pub trait CredentialSource: Send + Sync {
    fn lookup(&self, key_name: &str) -> Option<String>;
}

#[derive(Debug, Default)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn lookup(&self, key_name: &str) -> Option<String> {
        std::env::var(key_name).ok().filter(|v| !v.trim().is_empty())
    }
}

/// Maps provider ids to backends for a config snapshot
pub struct BackendRegistry {
    config: Arc<Config>,
    credentials: Arc<dyn CredentialSource>,
    registered: HashMap<String, Arc<dyn ModelBackend>>,
}

impl BackendRegistry {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            credentials: Arc::new(EnvCredentials),
            registered: HashMap::new(),
        }
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialSource>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Use a specific backend instance for a provider id
    #[cfg(test)]
    pub fn register(&mut self, provider: &str, backend: Arc<dyn ModelBackend>) {
        self.registered.insert(provider.to_string(), backend);
    }

    pub fn settings(&self, provider: &str) -> Option<ProviderSettings> {
        self.config.provider(provider)
    }

    pub fn backend(&self, provider: &str) -> Option<Arc<dyn ModelBackend>> {
        if let Some(backend) = self.registered.get(provider) {
            return Some(backend.clone());
        }
        self.settings(provider).map(|s| create_backend(&s))
    }

    pub fn is_credentialed(&self, provider: &str) -> bool {
        match self.settings(provider) {
            Some(settings) if settings.ambient => true,
            Some(settings) => settings
                .api_key_env
                .as_deref()
                .is_some_and(|env| self.credentials.lookup(env).is_some()),
            None => false,
        }
    }

    pub fn api_key(&self, provider: &str) -> Option<String> {
        let settings = self.settings(provider)?;
        settings
            .api_key_env
            .as_deref()
            .and_then(|env| self.credentials.lookup(env))
    }
}

/// Create a backend from provider settings
pub fn create_backend(settings: &ProviderSettings) -> Arc<dyn ModelBackend> {
    let timeout = Duration::from_secs(settings.timeout_sec);
    let working_dir = PathBuf::from(".");
    match settings.kind {
        BackendKind::OpenaiCompat => Arc::new(OpenAiCompatBackend::new(timeout)),
        BackendKind::ClaudeCli => Arc::new(ClaudeCliBackend {
            binary: settings
                .binary
                .clone()
                .unwrap_or_else(|| PathBuf::from("claude")),
            timeout,
            working_dir,
        }),
        BackendKind::CodexCli => Arc::new(CodexCliBackend {
            binary: settings
                .binary
                .clone()
                .unwrap_or_else(|| PathBuf::from("codex")),
            timeout,
            working_dir,
        }),
    }
}

/// Build a tokio command, using PATH lookup for bare binary names
pub(crate) fn command_for(binary: &std::path::Path) -> tokio::process::Command {
    let binary_str = binary.to_string_lossy();
    let mut cmd = if binary_str.contains('/') || binary_str.contains('\\') {
        tokio::process::Command::new(binary)
    } else {
        tokio::process::Command::new(binary_str.as_ref())
    };
    cmd.kill_on_drop(true);
    cmd
}
