pub mod expand;
pub mod generate;
pub mod models;
pub mod parse;
pub mod schema;

use crate::config::{Config, Role};
use crate::provider::BackendRegistry;
use crate::runner::UnifiedRunner;
use crate::telemetry::{JsonlSink, TelemetryQueue, TelemetryWorker};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const TELEMETRY_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "taskgen")]
#[command(
    author,
    version,
    about = "Expand tasks into validated subtasks with role-based LLM fallback"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose/debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate subtasks for a task and merge them into it
    Expand(ExpandArgs),

    /// Run one prompt through the role chain and print the result
    Generate(GenerateArgs),

    /// Recover a subtask batch from raw model output (no model calls)
    Parse(ParseArgs),

    /// Show the attempt order and credential status for a role
    Models(ModelsArgs),

    /// Print JSON Schema for the config or the subtask batch
    Schema(SchemaArgs),
}

#[derive(Parser, Clone)]
pub struct ExpandArgs {
    /// JSON file holding the task to expand
    #[arg(long)]
    pub task_file: PathBuf,

    /// Number of subtasks to ask for
    #[arg(short, long, default_value_t = 3)]
    pub num: usize,

    /// Use the research role instead of main
    #[arg(long)]
    pub research: bool,

    /// Extra context appended to the prompt
    #[arg(long)]
    pub context: Option<String>,

    /// Replace existing subtasks instead of appending
    #[arg(long)]
    pub force: bool,

    /// Request a schema-constrained object rather than free text
    #[arg(long)]
    pub structured: bool,

    /// Write the updated task here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, default_value = "taskgen.yaml", env = "TASKGEN_CONFIG")]
    pub config: PathBuf,
}

#[derive(Parser, Clone)]
pub struct GenerateArgs {
    /// Prompt text ("-" for stdin)
    #[arg(value_name = "PROMPT")]
    pub prompt: String,

    /// Role whose attempt chain to run
    #[arg(long, default_value = "main")]
    pub role: Role,

    /// System prompt
    #[arg(long)]
    pub system: Option<String>,

    #[arg(long, value_enum, default_value_t = GenerateMode::Text)]
    pub mode: GenerateMode,

    /// Print one JSON document carrying the output and its usage record.
    /// The record is returned instead of being written to the usage log.
    #[arg(long)]
    pub json: bool,

    /// Path to config file
    #[arg(short, long, default_value = "taskgen.yaml", env = "TASKGEN_CONFIG")]
    pub config: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GenerateMode {
    Text,
    /// JSON object extracted from the reply
    Object,
    /// Print chunks as they arrive
    Stream,
}

#[derive(Parser, Clone)]
pub struct ParseArgs {
    /// File with raw model output ("-" for stdin)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// First id to assign
    #[arg(long, default_value_t = 1)]
    pub start_id: u32,

    /// Expected number of subtasks (defaults to however many were found)
    #[arg(long)]
    pub expected: Option<usize>,
}

#[derive(Parser, Clone)]
pub struct ModelsArgs {
    /// Role to resolve
    #[arg(long, default_value = "main")]
    pub role: Role,

    /// Path to config file
    #[arg(short, long, default_value = "taskgen.yaml", env = "TASKGEN_CONFIG")]
    pub config: PathBuf,
}

#[derive(Parser, Clone)]
pub struct SchemaArgs {
    #[arg(value_enum, default_value_t = SchemaTarget::Config)]
    pub target: SchemaTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchemaTarget {
    /// taskgen.yaml
    Config,
    /// {"subtasks": [...]} as produced by expand and parse
    Subtasks,
}

/// Build a runner for `config`, wiring the usage log and Ctrl-C cancellation
pub(crate) fn start_runner(config: Arc<Config>) -> (UnifiedRunner, Option<TelemetryWorker>) {
    let registry = BackendRegistry::new(config.clone());
    let mut runner = UnifiedRunner::new(config.clone(), registry);

    let worker = if config.telemetry.enabled {
        let sink = JsonlSink::new(&config.telemetry.path);
        debug!("Recording usage to {}", sink.path().display());
        let (queue, worker) =
            TelemetryQueue::spawn(Arc::new(sink), config.telemetry.queue_capacity);
        runner = runner.with_telemetry(queue);
        Some(worker)
    } else {
        None
    };

    // Ctrl-C aborts the in-flight call or backoff
    let cancel = runner.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling generation");
            cancel.cancel();
        }
    });

    (runner, worker)
}

/// Drop the runner so its queue closes, then let the worker drain
pub(crate) async fn finish_runner(runner: UnifiedRunner, worker: Option<TelemetryWorker>) {
    drop(runner);
    if let Some(worker) = worker {
        let written = worker.shutdown(TELEMETRY_FLUSH_TIMEOUT).await;
        debug!("Flushed {} usage record(s)", written);
    }
}
