use crate::config::{Config, Role};
use serde::Serialize;
use tracing::debug;

/// One (provider, model) pair to try for a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptSpec {
    pub role: Role,
    pub provider: String,
    pub model_id: String,
    /// Role-level override; the provider default is filled in at call time
    pub base_url: Option<String>,
}

fn attempt_for(config: &Config, role: Role) -> Option<AttemptSpec> {
    let model = config.role_model(role);
    if !model.is_complete() {
        debug!("Role {} is not fully configured, dropping it", role);
        return None;
    }
    Some(AttemptSpec {
        role,
        provider: model.provider.clone()?,
        model_id: model.model_id.clone()?,
        base_url: model.base_url.clone(),
    })
}

/// Ordered attempts for `requested`: the requested role, then the fallback
/// role if it is fully configured and its provider is neither the main nor
/// the research provider.
pub fn build_attempt_sequence(config: &Config, requested: Role) -> Vec<AttemptSpec> {
    let mut sequence: Vec<AttemptSpec> = attempt_for(config, requested).into_iter().collect();

    if requested == Role::Fallback {
        return sequence;
    }

    let Some(fallback) = attempt_for(config, Role::Fallback) else {
        return sequence;
    };

    // NOTE: a fallback on the same provider as main or research is never
    // appended, even with a different model. Kept as-is pending product input.
    let main_provider = config.models.main.provider.as_deref();
    let research_provider = config.models.research.provider.as_deref();
    let provider = Some(fallback.provider.as_str());
    if provider == main_provider || provider == research_provider {
        debug!(
            "Fallback provider {} duplicates main/research provider, not appending",
            fallback.provider
        );
        return sequence;
    }

    sequence.push(fallback);
    sequence
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoleModel;

    fn config(main: RoleModel, research: RoleModel, fallback: RoleModel) -> Config {
        let mut config = Config::default();
        config.models.main = main;
        config.models.research = research;
        config.models.fallback = fallback;
        config
    }

    #[test]
    fn test_main_without_fallback() {
        let c = config(
            RoleModel::new("openai", "gpt-4o"),
            RoleModel::new("perplexity", "sonar-pro"),
            RoleModel::default(),
        );
        let seq = build_attempt_sequence(&c, Role::Main);
        assert_eq!(seq.len(), 1);
        assert_eq!(seq[0].role, Role::Main);
        assert_eq!(seq[0].model_id, "gpt-4o");
    }

    #[test]
    fn test_distinct_fallback_appended() {
        let c = config(
            RoleModel::new("openai", "gpt-4o"),
            RoleModel::new("perplexity", "sonar-pro"),
            RoleModel::new("openrouter", "anthropic/claude-3.5-sonnet"),
        );
        let seq = build_attempt_sequence(&c, Role::Main);
        let roles: Vec<_> = seq.iter().map(|a| a.role).collect();
        assert_eq!(roles, vec![Role::Main, Role::Fallback]);

        let seq = build_attempt_sequence(&c, Role::Research);
        let roles: Vec<_> = seq.iter().map(|a| a.role).collect();
        assert_eq!(roles, vec![Role::Research, Role::Fallback]);
    }

    #[test]
    fn test_fallback_sharing_provider_is_suppressed() {
        // Same provider as research, different model: still not appended
        let c = config(
            RoleModel::new("openai", "gpt-4o"),
            RoleModel::new("perplexity", "sonar-pro"),
            RoleModel::new("perplexity", "sonar"),
        );
        assert_eq!(build_attempt_sequence(&c, Role::Main).len(), 1);

        let c = config(
            RoleModel::new("openai", "gpt-4o"),
            RoleModel::new("perplexity", "sonar-pro"),
            RoleModel::new("openai", "gpt-4o-mini"),
        );
        assert_eq!(build_attempt_sequence(&c, Role::Main).len(), 1);
    }

    #[test]
    fn test_incomplete_roles_dropped() {
        let mut fallback = RoleModel::new("openrouter", "x");
        fallback.model_id = None;
        let c = config(
            RoleModel::new("openai", "gpt-4o"),
            RoleModel::new("perplexity", "sonar-pro"),
            fallback,
        );
        assert_eq!(build_attempt_sequence(&c, Role::Main).len(), 1);

        let mut main = RoleModel::new("openai", "");
        main.model_id = Some("  ".to_string());
        let c = config(
            main,
            RoleModel::new("perplexity", "sonar-pro"),
            RoleModel::new("openrouter", "x"),
        );
        let seq = build_attempt_sequence(&c, Role::Main);
        assert_eq!(seq.len(), 1);
        assert_eq!(seq[0].role, Role::Fallback);
    }

    #[test]
    fn test_fallback_requested_alone() {
        let c = config(
            RoleModel::new("openai", "gpt-4o"),
            RoleModel::new("perplexity", "sonar-pro"),
            RoleModel::new("openrouter", "x"),
        );
        let seq = build_attempt_sequence(&c, Role::Fallback);
        assert_eq!(seq.len(), 1);
        assert_eq!(seq[0].provider, "openrouter");
    }

    #[test]
    fn test_role_base_url_carried() {
        let mut main = RoleModel::new("ollama", "llama3");
        main.base_url = Some("http://gpu:11434/v1".to_string());
        let c = config(main, RoleModel::default(), RoleModel::default());
        let seq = build_attempt_sequence(&c, Role::Main);
        assert_eq!(seq[0].base_url.as_deref(), Some("http://gpu:11434/v1"));
    }
}
