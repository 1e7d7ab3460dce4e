mod defaults;
mod types;

pub use types::*;

use crate::error::ConfigError;
use defaults::*;
use std::collections::HashMap;
use std::path::Path;

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            models: ModelsConfig::default(),
            providers: HashMap::new(),
            retry: RetryConfig::default(),
            costs: HashMap::new(),
            telemetry: TelemetryConfig::default(),
            prompts: PromptsConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load the config if the file exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("Config '{}' not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Validate the config
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.base_delay_ms == 0 {
            return Err(ConfigError::ZeroBaseDelay);
        }

        // Main must be usable; research and fallback are optional
        let main = &self.models.main;
        if main.provider.is_none() {
            return Err(ConfigError::IncompleteRole {
                role: Role::Main.to_string(),
                field: "provider",
            });
        }
        if main.model_id.is_none() {
            return Err(ConfigError::IncompleteRole {
                role: Role::Main.to_string(),
                field: "model_id",
            });
        }

        for role in [Role::Main, Role::Research, Role::Fallback] {
            if let Some(provider) = self.role_model(role).provider.as_deref() {
                if self.provider(provider).is_none() {
                    return Err(ConfigError::UnknownProvider {
                        role: role.to_string(),
                        provider: provider.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn role_model(&self, role: Role) -> &RoleModel {
        match role {
            Role::Main => &self.models.main,
            Role::Research => &self.models.research,
            Role::Fallback => &self.models.fallback,
        }
    }

    /// Provider settings, preferring configured entries over built-ins
    pub fn provider(&self, id: &str) -> Option<ProviderSettings> {
        self.providers
            .get(id)
            .cloned()
            .or_else(|| builtin_providers().remove(id))
    }

    pub fn cost(&self, model_id: &str) -> Option<ModelCost> {
        self.costs
            .get(model_id)
            .cloned()
            .or_else(|| builtin_costs().remove(model_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert!(!config.models.fallback.is_complete());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
models:
  main:
    provider: openai
    model_id: gpt-4o
  fallback:
    provider: openrouter
    model_id: anthropic/claude-3.5-sonnet
    max_tokens: 8000
retry:
  max_retries: 4
costs:
  gpt-4o:
    input: 5.0
    output: 15.0
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.models.main.provider.as_deref(), Some("openai"));
        assert_eq!(config.models.fallback.max_tokens, Some(8000));
        // research keeps its default when omitted
        assert_eq!(config.models.research.provider.as_deref(), Some("perplexity"));
        assert_eq!(config.retry.max_retries, 4);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.cost("gpt-4o").unwrap().input, 5.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut config = Config::default();
        config.models.fallback = RoleModel::new("nonexistent", "m");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownProvider { .. })
        ));
    }

    #[test]
    fn test_main_requires_model() {
        let mut config = Config::default();
        config.models.main.model_id = None;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IncompleteRole { field: "model_id", .. })
        ));
    }

    #[test]
    fn test_provider_override_wins() {
        let mut config = Config::default();
        let mut custom = config.provider("ollama").unwrap();
        custom.base_url = Some("http://gpu-box:11434/v1".to_string());
        config.providers.insert("ollama".to_string(), custom);
        assert_eq!(
            config.provider("ollama").unwrap().base_url.as_deref(),
            Some("http://gpu-box:11434/v1")
        );
        assert!(config.provider("claude-code").unwrap().ambient);
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("Research".parse::<Role>().unwrap(), Role::Research);
        assert!("primary".parse::<Role>().is_err());
    }
}
