use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use super::defaults::*;

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub models: ModelsConfig,

    /// Provider overrides; built-in providers are used for ids not listed here
    #[serde(default)]
    pub providers: HashMap<String, ProviderSettings>,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Cost table keyed by model id
    #[serde(default)]
    pub costs: HashMap<String, ModelCost>,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub prompts: PromptsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Main,
    Research,
    Fallback,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Main => write!(f, "main"),
            Role::Research => write!(f, "research"),
            Role::Fallback => write!(f, "fallback"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "main" => Ok(Role::Main),
            "research" => Ok(Role::Research),
            "fallback" => Ok(Role::Fallback),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ModelsConfig {
    #[serde(default = "default_main_model")]
    pub main: RoleModel,

    #[serde(default = "default_research_model")]
    pub research: RoleModel,

    #[serde(default)]
    pub fallback: RoleModel,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            main: default_main_model(),
            research: default_research_model(),
            fallback: RoleModel::default(),
        }
    }
}

/// Model assignment for one role. Either field may be absent, in which case
/// the role is not fully configured and never attempted.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct RoleModel {
    #[serde(default)]
    pub provider: Option<String>,

    #[serde(default)]
    pub model_id: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub temperature: Option<f32>,
}

impl RoleModel {
    pub fn new(provider: &str, model_id: &str) -> Self {
        Self {
            provider: Some(provider.to_string()),
            model_id: Some(model_id.to_string()),
            ..Self::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        filled(&self.provider) && filled(&self.model_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    OpenaiCompat,
    ClaudeCli,
    CodexCli,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::OpenaiCompat => write!(f, "openai_compat"),
            BackendKind::ClaudeCli => write!(f, "claude_cli"),
            BackendKind::CodexCli => write!(f, "codex_cli"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ProviderSettings {
    pub kind: BackendKind,

    #[serde(default)]
    pub base_url: Option<String>,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Uses platform/CLI credentials; never checked for an API key up front
    #[serde(default)]
    pub ambient: bool,

    #[serde(default)]
    pub binary: Option<PathBuf>,

    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default)]
    pub max_jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_jitter_ms: 0,
        }
    }
}

/// Cost per one million tokens
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct ModelCost {
    pub input: f64,

    pub output: f64,

    #[serde(default = "default_currency")]
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_user_id")]
    pub user_id: String,

    #[serde(default = "default_telemetry_path")]
    pub path: PathBuf,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            user_id: default_user_id(),
            path: default_telemetry_path(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct PromptsConfig {
    /// Overrides the embedded subtask-expansion system prompt
    #[serde(default)]
    pub expand_system: Option<PathBuf>,
}
