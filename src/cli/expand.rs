//! CLI handler for the `expand` subcommand

use crate::cli::{finish_runner, start_runner, ExpandArgs};
use crate::config::Config;
use crate::expand::{expand_task, ExpandOptions, Task};
use crate::runner::OutputChannel;
use anyhow::Context;
use std::sync::Arc;

pub async fn execute(args: ExpandArgs) -> anyhow::Result<()> {
    let config = Config::load_or_default(&args.config)?;
    config.validate()?;
    let config = Arc::new(config);

    let content = std::fs::read_to_string(&args.task_file)
        .with_context(|| format!("Failed to read task file {:?}", args.task_file))?;
    let task: Task = serde_json::from_str(&content)
        .with_context(|| format!("Invalid task JSON in {:?}", args.task_file))?;

    let (runner, worker) = start_runner(config);

    let options = ExpandOptions {
        num_subtasks: args.num,
        use_research: args.research,
        additional_context: args.context.clone(),
        force: args.force,
        structured: args.structured,
        output_channel: OutputChannel::Cli,
    };

    let result = expand_task(&runner, task, &options).await;

    finish_runner(runner, worker).await;

    let outcome = result?;
    let json = serde_json::to_string_pretty(&outcome.task)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, format!("{}\n", json))
                .with_context(|| format!("Failed to write {:?}", path))?;
            println!(
                "Added {} subtasks to task {} -> {}",
                outcome.batch.len(),
                outcome.task.id,
                path.display()
            );
        }
        None => println!("{}", json),
    }

    let usage = &outcome.telemetry;
    eprintln!(
        "{}/{}: {} input + {} output tokens, {:.6} {}",
        usage.provider_name,
        usage.model_used,
        usage.input_tokens,
        usage.output_tokens,
        usage.total_cost,
        usage.currency
    );

    if let Some((expected, actual)) = outcome.report.count_mismatch {
        eprintln!(
            "Warning: asked for {} subtasks, model produced {}",
            expected, actual
        );
    }

    Ok(())
}
