//! CLI handler for the `models` subcommand

use crate::cli::ModelsArgs;
use crate::config::Config;
use crate::provider::BackendRegistry;
use crate::runner::build_attempt_sequence;
use std::sync::Arc;

pub fn execute(args: ModelsArgs) -> anyhow::Result<()> {
    let config = Arc::new(Config::load_or_default(&args.config)?);
    let registry = BackendRegistry::new(config.clone());

    let sequence = build_attempt_sequence(&config, args.role);
    if sequence.is_empty() {
        println!("No fully configured model for role {}", args.role);
        return Ok(());
    }

    println!("Attempt order for role {}:", args.role);
    for (n, attempt) in sequence.iter().enumerate() {
        let status = match registry.settings(&attempt.provider) {
            None => "unknown provider".to_string(),
            Some(settings) if settings.ambient => format!("{}, ambient credentials", settings.kind),
            Some(settings) if registry.is_credentialed(&attempt.provider) => {
                format!("{}, key found", settings.kind)
            }
            Some(settings) => format!(
                "{}, missing {}",
                settings.kind,
                settings.api_key_env.as_deref().unwrap_or("API key")
            ),
        };
        println!(
            "  {}. {:<9} {}/{} ({})",
            n + 1,
            attempt.role.to_string(),
            attempt.provider,
            attempt.model_id,
            status
        );
    }

    Ok(())
}
