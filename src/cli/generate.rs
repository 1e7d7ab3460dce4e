//! CLI handler for the `generate` subcommand

use crate::cli::{finish_runner, start_runner, GenerateArgs, GenerateMode};
use crate::config::{Config, Role};
use crate::provider::{Payload, TokenUsage};
use crate::runner::{GenerationRequest, GenerationResult, OutputChannel};
use crate::telemetry::UsageTelemetry;
use anyhow::Context;
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use std::io::{Read, Write};
use std::sync::Arc;

/// Printed with `--json`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a> {
    provider: &'a str,
    model_id: &'a str,
    role: Role,
    usage: TokenUsage,
    output: Value,
    telemetry: &'a UsageTelemetry,
}

pub async fn execute(args: GenerateArgs) -> anyhow::Result<()> {
    let config = Config::load_or_default(&args.config)?;
    config.validate()?;

    let prompt = if args.prompt == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        args.prompt.clone()
    };

    let channel = if args.json {
        OutputChannel::Mcp
    } else {
        OutputChannel::Cli
    };
    let mut request = GenerationRequest::new(args.role, prompt)
        .command("generate")
        .channel(channel);
    if let Some(system) = &args.system {
        request = request.system(system.clone());
    }

    let (runner, worker) = start_runner(Arc::new(config));
    let result = match args.mode {
        GenerateMode::Text => runner.generate_text(&request).await,
        GenerateMode::Object => runner.generate_object(&request).await,
        GenerateMode::Stream => runner.stream_text(&request).await,
    };
    let cancelled = runner.cancellation_token().is_cancelled();

    let Some(result) = result else {
        finish_runner(runner, worker).await;
        if cancelled {
            anyhow::bail!("Generation cancelled");
        }
        anyhow::bail!(
            "No model produced a response for role {}; check configured models and API keys",
            args.role
        );
    };

    let provider = result.provider.clone();
    let model_id = result.model_id.clone();
    let role = result.role;
    let usage = result.usage;
    let telemetry = result.telemetry.clone();
    let output = render(result, !args.json).await;
    finish_runner(runner, worker).await;
    let output = output?;

    if args.json {
        let envelope = Envelope {
            provider: &provider,
            model_id: &model_id,
            role,
            usage,
            output,
            telemetry: &telemetry,
        };
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    } else {
        match &output {
            Value::String(_) if args.mode == GenerateMode::Stream => println!(),
            Value::String(text) => println!("{}", text),
            other => println!("{}", serde_json::to_string_pretty(other)?),
        }
        eprintln!(
            "{}/{}: {} input + {} output tokens, {:.6} {}",
            telemetry.provider_name,
            telemetry.model_used,
            telemetry.input_tokens,
            telemetry.output_tokens,
            telemetry.total_cost,
            telemetry.currency
        );
    }

    Ok(())
}

/// Turn the payload into a JSON value. Stream chunks are echoed to stdout
/// as they arrive when `echo` is set.
async fn render(result: GenerationResult, echo: bool) -> anyhow::Result<Value> {
    if let Some(value) = result.object() {
        return Ok(value.clone());
    }

    match result.output {
        Payload::Text(text) => Ok(Value::String(text)),
        Payload::Object(value) => Ok(value),
        Payload::Stream(mut stream) => {
            let mut collected = String::new();
            let mut stdout = std::io::stdout();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.context("Stream failed mid-response")?;
                if echo {
                    stdout.write_all(chunk.as_bytes())?;
                    stdout.flush()?;
                }
                collected.push_str(&chunk);
            }
            Ok(Value::String(collected))
        }
    }
}
