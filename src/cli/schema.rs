use crate::cli::{SchemaArgs, SchemaTarget};
use crate::config::Config;
use crate::parser::SubtaskBatch;
use schemars::schema_for;

pub fn execute(args: SchemaArgs) -> anyhow::Result<()> {
    let schema = match args.target {
        SchemaTarget::Config => schema_for!(Config),
        SchemaTarget::Subtasks => schema_for!(SubtaskBatch),
    };
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
