// Serialized form of the task list slot

use crate::models::Task;
use eyre::{Context, Result};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Serialize the list as a JSON array, preserving order
pub fn encode_tasks(tasks: &[Task]) -> Result<String> {
    serde_json::to_string(tasks).context("Failed to serialize task list")
}

/// Parse a serialized list.
///
/// The whole value must be a JSON array of task records. Records repeating an
/// id already seen are dropped (first wins) so ids stay unique.
pub fn decode_tasks(raw: &str) -> Result<Vec<Task>> {
    let parsed: Vec<Task> = serde_json::from_str(raw).context("Failed to parse task list")?;

    let mut seen = HashSet::with_capacity(parsed.len());
    let mut tasks = Vec::with_capacity(parsed.len());
    for (index, task) in parsed.into_iter().enumerate() {
        if !seen.insert(task.id) {
            warn!(id = task.id, index, "Duplicate task id, skipping");
            continue;
        }
        tasks.push(task);
    }

    debug!(count = tasks.len(), "Decoded task list");
    Ok(tasks)
}

/// Decode a slot value the way the store does at startup: a missing or
/// malformed value is an empty list.
pub fn decode_or_empty(raw: Option<&str>) -> Vec<Task> {
    let Some(raw) = raw else {
        return Vec::new();
    };

    match decode_tasks(raw) {
        Ok(tasks) => tasks,
        Err(e) => {
            warn!(error = ?e, "Persisted task list is malformed, starting empty");
            Vec::new()
        }
    }
}
