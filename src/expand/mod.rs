//! Task expansion: asks the configured model for subtasks, salvages the
//! reply and merges the corrected batch into the task.

mod prompt;

pub use prompt::{build_user_prompt, load_system_prompt};

use crate::config::Role;
use crate::error::ExpandError;
use crate::parser::{recover_batch, CorrectionReport, Subtask, SubtaskBatch};
use crate::runner::{GenerationRequest, OutputChannel, UnifiedRunner};
use crate::telemetry::UsageTelemetry;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u32,

    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub details: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_strategy: Option<String>,

    #[serde(default)]
    pub subtasks: Vec<Subtask>,
}

#[derive(Debug, Clone)]
pub struct ExpandOptions {
    pub num_subtasks: usize,
    pub use_research: bool,
    pub additional_context: Option<String>,
    /// Replace existing subtasks instead of appending
    pub force: bool,
    /// Ask the backend for a schema-constrained object instead of free text
    pub structured: bool,
    pub output_channel: OutputChannel,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            num_subtasks: 3,
            use_research: false,
            additional_context: None,
            force: false,
            structured: false,
            output_channel: OutputChannel::Cli,
        }
    }
}

#[derive(Debug)]
pub struct ExpandOutcome {
    pub task: Task,
    pub batch: SubtaskBatch,
    pub report: CorrectionReport,
    pub telemetry: UsageTelemetry,
}

pub async fn expand_task(
    runner: &UnifiedRunner,
    mut task: Task,
    options: &ExpandOptions,
) -> Result<ExpandOutcome, ExpandError> {
    if options.force && !task.subtasks.is_empty() {
        info!(
            "Replacing {} existing subtasks of task {}",
            task.subtasks.len(),
            task.id
        );
        task.subtasks.clear();
    }

    let next_id = u32::try_from(task.subtasks.len())
        .unwrap_or(u32::MAX)
        .saturating_add(1);
    let role = if options.use_research {
        Role::Research
    } else {
        Role::Main
    };

    let system_prompt = load_system_prompt(runner.config().prompts.expand_system.as_deref())?;
    let user_prompt = build_user_prompt(
        &task,
        options.num_subtasks,
        next_id,
        options.additional_context.as_deref(),
    );

    let request = GenerationRequest::new(role, user_prompt)
        .system(system_prompt)
        .command("expand-task")
        .channel(options.output_channel);

    info!(
        "Expanding task {} into {} subtasks using the {} role",
        task.id, options.num_subtasks, role
    );

    let (text, telemetry) = if options.structured {
        let result = runner
            .generate_object_as::<SubtaskBatch>(&request)
            .await
            .ok_or_else(|| no_response(runner))?;
        // Declared ids and dependencies still go through correction
        let text = serde_json::to_string(&result.output)
            .map_err(|e| ExpandError::UnexpectedPayload(e.to_string()))?;
        (text, result.telemetry)
    } else {
        let result = runner
            .generate_text(&request)
            .await
            .ok_or_else(|| no_response(runner))?;
        let text = result
            .text()
            .map(str::to_string)
            .ok_or_else(|| ExpandError::UnexpectedPayload(format!("{:?}", result.output)))?;
        (text, result.telemetry)
    };

    let (batch, report) = recover_batch(&text, next_id, options.num_subtasks)?;
    if !report.is_clean() {
        warn!(
            "Corrected model output for task {}: {} renumbered, {} dependencies dropped",
            task.id,
            report.renumbered.len(),
            report.dropped_dependencies.len()
        );
    }

    if batch.is_empty() {
        warn!("Model returned no subtasks for task {}", task.id);
    } else {
        info!("Adding subtasks {:?} to task {}", batch.ids(), task.id);
    }
    task.subtasks.extend(batch.subtasks.iter().cloned());

    Ok(ExpandOutcome {
        task,
        batch,
        report,
        telemetry,
    })
}

fn no_response(runner: &UnifiedRunner) -> ExpandError {
    if runner.cancellation_token().is_cancelled() {
        ExpandError::Cancelled
    } else {
        ExpandError::NoProviderAvailable
    }
}
