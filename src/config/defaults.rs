use super::types::{BackendKind, ModelCost, ProviderSettings, RoleModel};
use std::collections::HashMap;
use std::path::PathBuf;

pub fn default_version() -> u32 {
    1
}

pub fn default_main_model() -> RoleModel {
    RoleModel::new("claude-code", "sonnet")
}

pub fn default_research_model() -> RoleModel {
    RoleModel::new("perplexity", "sonar-pro")
}

pub fn default_timeout_sec() -> u64 {
    300
}

pub fn default_max_retries() -> u32 {
    2
}

pub fn default_base_delay_ms() -> u64 {
    1000
}

pub fn default_currency() -> String {
    "USD".to_string()
}

pub fn default_true() -> bool {
    true
}

pub fn default_user_id() -> String {
    "anonymous".to_string()
}

pub fn default_telemetry_path() -> PathBuf {
    PathBuf::from(".taskgen/usage.jsonl")
}

pub fn default_queue_capacity() -> usize {
    64
}

pub fn default_claude_binary() -> PathBuf {
    // Check common install location first
    if let Some(home) = std::env::var_os("HOME") {
        let local_path = PathBuf::from(home).join(".claude/local/claude");
        if local_path.exists() {
            return local_path;
        }
    }
    PathBuf::from("claude")
}

pub fn default_codex_binary() -> PathBuf {
    PathBuf::from("codex")
}

fn http_provider(base_url: &str, api_key_env: Option<&str>) -> ProviderSettings {
    ProviderSettings {
        kind: BackendKind::OpenaiCompat,
        base_url: Some(base_url.to_string()),
        api_key_env: api_key_env.map(str::to_string),
        ambient: api_key_env.is_none(),
        binary: None,
        timeout_sec: default_timeout_sec(),
    }
}

/// Providers known without any configuration
pub fn builtin_providers() -> HashMap<String, ProviderSettings> {
    let mut providers = HashMap::new();
    providers.insert(
        "openai".to_string(),
        http_provider("https://api.openai.com/v1", Some("OPENAI_API_KEY")),
    );
    providers.insert(
        "openrouter".to_string(),
        http_provider("https://openrouter.ai/api/v1", Some("OPENROUTER_API_KEY")),
    );
    providers.insert(
        "perplexity".to_string(),
        http_provider("https://api.perplexity.ai", Some("PERPLEXITY_API_KEY")),
    );
    providers.insert(
        "xai".to_string(),
        http_provider("https://api.x.ai/v1", Some("XAI_API_KEY")),
    );
    providers.insert(
        "groq".to_string(),
        http_provider("https://api.groq.com/openai/v1", Some("GROQ_API_KEY")),
    );
    providers.insert(
        "ollama".to_string(),
        http_provider("http://localhost:11434/v1", None),
    );
    providers.insert(
        "claude-code".to_string(),
        ProviderSettings {
            kind: BackendKind::ClaudeCli,
            base_url: None,
            api_key_env: None,
            ambient: true,
            binary: Some(default_claude_binary()),
            timeout_sec: default_timeout_sec(),
        },
    );
    providers.insert(
        "codex-cli".to_string(),
        ProviderSettings {
            kind: BackendKind::CodexCli,
            base_url: None,
            api_key_env: None,
            ambient: true,
            binary: Some(default_codex_binary()),
            timeout_sec: default_timeout_sec(),
        },
    );
    providers
}

fn usd(input: f64, output: f64) -> ModelCost {
    ModelCost {
        input,
        output,
        currency: default_currency(),
    }
}

/// Published per-1M-token prices for commonly configured models
pub fn builtin_costs() -> HashMap<String, ModelCost> {
    let mut costs = HashMap::new();
    costs.insert("gpt-4o".to_string(), usd(2.5, 10.0));
    costs.insert("gpt-4o-mini".to_string(), usd(0.15, 0.6));
    costs.insert("gpt-4.1".to_string(), usd(2.0, 8.0));
    costs.insert("sonar-pro".to_string(), usd(3.0, 15.0));
    costs.insert("sonar".to_string(), usd(1.0, 1.0));
    costs.insert("grok-3".to_string(), usd(3.0, 15.0));
    costs.insert("sonnet".to_string(), usd(0.0, 0.0));
    costs.insert("opus".to_string(), usd(0.0, 0.0));
    costs
}
