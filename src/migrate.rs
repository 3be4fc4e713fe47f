//! Explicit upgrade of store documents written before `context` and friends
//! became required. The loader never fills these in on its own.

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::storage::write_atomically;

/// Context given to legacy rows that have none.
pub const LEGACY_CONTEXT: &str = "house";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub tasks_seen: usize,
    pub blocks_seen: usize,
    /// Fields written or dropped, across all rows.
    pub fields_filled: usize,
}

impl MigrationReport {
    pub fn changed(&self) -> bool {
        self.fields_filled > 0
    }
}

/// Fills missing defaults in a store document in place.
///
/// Tasks get `context`, `status` and `priority`; blocks get `context` and
/// `sync_status`. A block's legacy `metadata` bag is dropped; a `task_id` in
/// it that is a UUID is lifted into an empty `linked_task_id` first.
pub fn migrate_value(doc: &mut Value) -> MigrationReport {
    let mut report = MigrationReport::default();

    if let Some(tasks) = doc.get_mut("tasks").and_then(Value::as_array_mut) {
        for row in tasks.iter_mut().filter_map(Value::as_object_mut) {
            report.tasks_seen += 1;
            report.fields_filled += fill(row, "context", LEGACY_CONTEXT);
            report.fields_filled += fill(row, "status", "open");
            report.fields_filled += fill(row, "priority", "medium");
        }
    }

    if let Some(blocks) = doc.get_mut("focus_blocks").and_then(Value::as_array_mut) {
        for row in blocks.iter_mut().filter_map(Value::as_object_mut) {
            report.blocks_seen += 1;
            report.fields_filled += fill(row, "context", LEGACY_CONTEXT);
            report.fields_filled += fill(row, "sync_status", "local");
            report.fields_filled += lift_metadata_task_id(row);
        }
    }

    report
}

/// Runs [`migrate_value`] over the store file, rewriting it only when
/// something changed. A missing file is left alone.
pub fn migrate_file(path: &Path) -> Result<MigrationReport> {
    if !path.exists() {
        return Ok(MigrationReport::default());
    }
    let raw = fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(MigrationReport::default());
    }
    let mut doc: Value = serde_json::from_str(&raw)?;
    let report = migrate_value(&mut doc);
    if report.changed() {
        write_atomically(path, &serde_json::to_string_pretty(&doc)?)?;
        info!(path = %path.display(), filled = report.fields_filled, "store migrated");
    }
    Ok(report)
}

fn fill(row: &mut Map<String, Value>, key: &str, default: &str) -> usize {
    match row.get(key) {
        Some(v) if !v.is_null() => 0,
        _ => {
            row.insert(key.to_string(), Value::String(default.to_string()));
            1
        }
    }
}

/// Drops `metadata`, lifting a usable `task_id` out of it. Counts the drop
/// and the lift as one change.
fn lift_metadata_task_id(row: &mut Map<String, Value>) -> usize {
    let Some(metadata) = row.remove("metadata") else {
        return 0;
    };
    let task_id = metadata.get("task_id").and_then(Value::as_str);
    let unlinked = row.get("linked_task_id").map_or(true, Value::is_null);
    match task_id {
        Some(id) if unlinked && Uuid::parse_str(id).is_ok() => {
            row.insert("linked_task_id".to_string(), Value::String(id.to_string()));
        }
        Some(id) if unlinked => {
            warn!(block = ?row.get("id"), task_id = id, "legacy metadata.task_id is not a uuid, dropped");
        }
        _ => {}
    }
    1
}
