//! CLI handler for the `parse` subcommand
//!
//! Runs the recovery parser and correction pass over saved model output.

use crate::cli::ParseArgs;
use crate::parser::{extract_candidates, recover_batch, DropReason};
use anyhow::Context;
use std::io::Read;

pub fn execute(args: ParseArgs) -> anyhow::Result<()> {
    let raw = if args.file.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(&args.file)
            .with_context(|| format!("Failed to read {:?}", args.file))?
    };

    let expected = match args.expected {
        Some(n) => n,
        None => extract_candidates(&raw)?.len(),
    };

    let (batch, report) = recover_batch(&raw, args.start_id, expected)?;
    println!("{}", serde_json::to_string_pretty(&batch)?);

    for (declared, assigned) in &report.renumbered {
        eprintln!("renumbered {} -> {}", declared, assigned);
    }
    for drop in &report.dropped_dependencies {
        let reason = match drop.reason {
            DropReason::SelfReference => "self reference",
            DropReason::OutOfRange => "out of range",
        };
        eprintln!(
            "dropped dependency {} of subtask {} ({})",
            drop.dependency, drop.subtask_id, reason
        );
    }
    if report.dropped_subtasks > 0 {
        eprintln!(
            "dropped {} subtasks past the last assignable id",
            report.dropped_subtasks
        );
    }
    if let Some((expected, actual)) = report.count_mismatch {
        eprintln!("expected {} subtasks, got {}", expected, actual);
    }

    Ok(())
}
