//! Task load/save helpers with schema + invariant validation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;
use tracing::debug;

use crate::core::navigator::ConditionalNavigator;
use crate::core::types::NavigatorOptions;
use crate::task::Task;

/// Bundled JSON Schema for task definitions.
pub const TASK_SCHEMA_V1: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/task/v1.schema.json"
));

/// Parse a task definition and check it against the bundled schema.
///
/// Semantic invariants are checked when the navigator is built.
pub fn parse_task(raw: &str) -> Result<Task> {
    let value: Value = serde_json::from_str(raw).context("parse task json")?;
    validate_schema(&value)?;
    serde_json::from_value(value).context("deserialize task")
}

/// Load a task definition from disk (schema only).
pub fn load_task(path: &Path) -> Result<Task> {
    let raw = fs::read_to_string(path).with_context(|| format!("read task {}", path.display()))?;
    let task = parse_task(&raw).with_context(|| format!("load task {}", path.display()))?;
    debug!(path = %path.display(), task = %task.identifier, "task loaded");
    Ok(task)
}

/// Load a task definition and build its navigator (schema + invariants).
pub fn load_navigator(path: &Path, options: &NavigatorOptions) -> Result<ConditionalNavigator> {
    let task = load_task(path)?;
    ConditionalNavigator::new(task, options.clone())
        .with_context(|| format!("task invariants failed for {}", path.display()))
}

/// Write a task definition as pretty JSON with a trailing newline.
pub fn write_task(path: &Path, task: &Task) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(task).context("serialize task")?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write task {}", path.display()))
}

fn validate_schema(task: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(TASK_SCHEMA_V1).context("parse task schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(task) {
        let messages = compiled
            .iter_errors(task)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "task schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}
