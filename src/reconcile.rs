//! Keeps `Task.scheduled_block_id` and `FocusBlock.linked_task_id` in step.
//!
//! The block is ground truth. Callers write the block first and reconcile
//! second, so an interrupted pair leaves the task stale rather than the
//! block. Every step here can be re-run safely.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::blocks::{self, SyncedBlock};
use crate::error::{Error, Result};
use crate::models::{FocusBlock, NewFocusBlock, Scope, Task, TaskPatch};
use crate::storage::Store;

/// Shortest duration a task gets from a block, in minutes.
pub const MIN_TASK_MINUTES: u32 = 15;

/// How a block's placement is projected onto its task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Floor for the synced `duration_minutes`.
    pub min_minutes: u32,
    /// Calendar the task's `do_date` is read in; the one "today" comes from.
    pub offset: FixedOffset,
}

impl SyncOptions {
    pub fn new(min_minutes: u32, offset: FixedOffset) -> Self {
        Self { min_minutes, offset }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::new(MIN_TASK_MINUTES, Utc.fix())
    }
}

/// Where and how a task is placed by [`schedule_task`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Defaults to the task's name.
    pub title: Option<String>,
    pub color: Option<String>,
}

impl Placement {
    pub fn new(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            end_time,
            title: None,
            color: None,
        }
    }
}

/// Advisory outcome of the task side of a block write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSync {
    #[serde(rename = "taskSyncError", skip_serializing_if = "Option::is_none")]
    pub task_sync_error: Option<String>,
}

impl BlockSync {
    pub fn is_ok(&self) -> bool {
        self.task_sync_error.is_none()
    }
}

/// Whole minutes between `start` and `end`, never below `floor`.
pub fn synced_duration_minutes(start: DateTime<Utc>, end: DateTime<Utc>, floor: u32) -> u32 {
    let minutes = (end - start).num_minutes().max(i64::from(floor));
    u32::try_from(minutes).unwrap_or(u32::MAX)
}

/// Pushes a block's placement onto its linked task: `do_date` becomes the
/// block's start date in `opts.offset`, `duration_minutes` its length floored
/// at `opts.min_minutes`, and `scheduled_block_id` the block.
///
/// Never fails the caller. Problems are returned as `task_sync_error`.
pub fn reconcile_block_update<S: Store + ?Sized>(
    store: &mut S,
    scope: &Scope,
    block: &FocusBlock,
    opts: SyncOptions,
) -> BlockSync {
    let Some(task_id) = block.linked_task_id else {
        return BlockSync::default();
    };
    match sync_task_from_block(store, scope, block, task_id, opts) {
        Ok(task) => {
            info!(task = %task.id, block = %block.id, do_date = ?task.do_date, "task synced from block");
            BlockSync::default()
        }
        Err(e) => {
            warn!(task = %task_id, block = %block.id, error = %e, "task sync failed");
            BlockSync {
                task_sync_error: Some(e.to_string()),
            }
        }
    }
}

fn sync_task_from_block<S: Store + ?Sized>(
    store: &mut S,
    scope: &Scope,
    block: &FocusBlock,
    task_id: Uuid,
    opts: SyncOptions,
) -> Result<Task> {
    let task = store
        .task(scope, task_id)?
        .ok_or_else(|| Error::task_not_found(task_id))?;
    ensure_schedulable(&task)?;

    let patch = TaskPatch {
        do_date: Some(Some(block.start_time.with_timezone(&opts.offset).date_naive())),
        duration_minutes: Some(Some(synced_duration_minutes(
            block.start_time,
            block.end_time,
            opts.min_minutes,
        ))),
        scheduled_block_id: Some(Some(block.id)),
        ..TaskPatch::default()
    };
    store.update_task(scope, task_id, &patch)
}

/// Returns the deleted block's task to the unscheduled state. Best-effort:
/// failures are logged and swallowed.
pub fn reconcile_block_delete<S: Store + ?Sized>(store: &mut S, scope: &Scope, block: &FocusBlock) {
    if let Some(task_id) = block.linked_task_id {
        unlink_task_best_effort(store, scope, task_id, block.id);
    }
}

pub(crate) fn unlink_task_best_effort<S: Store + ?Sized>(
    store: &mut S,
    scope: &Scope,
    task_id: Uuid,
    block_id: Uuid,
) {
    match unlink_task(store, scope, task_id, block_id) {
        Ok(true) => info!(task = %task_id, block = %block_id, "task unscheduled"),
        Ok(false) => debug!(task = %task_id, block = %block_id, "task already unlinked"),
        Err(e) => warn!(task = %task_id, block = %block_id, error = %e, "failed to unschedule task"),
    }
}

/// Clears `scheduled_block_id` unless the task has moved on to another block.
/// Returns whether a write happened.
fn unlink_task<S: Store + ?Sized>(store: &mut S, scope: &Scope, task_id: Uuid, block_id: Uuid) -> Result<bool> {
    let Some(task) = store.task(scope, task_id)? else {
        return Ok(false);
    };
    match task.scheduled_block_id {
        Some(current) if current == block_id => {
            let patch = TaskPatch {
                scheduled_block_id: Some(None),
                ..TaskPatch::default()
            };
            store.update_task(scope, task_id, &patch)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Places a task on the calendar: creates a block titled and tagged after the
/// task, linked to it, and reconciles the task. A task already sitting in
/// another block is moved; the old block loses its link.
pub fn schedule_task<S: Store + ?Sized>(
    store: &mut S,
    scope: &Scope,
    task_id: Uuid,
    placement: Placement,
    now: DateTime<Utc>,
    opts: SyncOptions,
) -> Result<SyncedBlock> {
    let task = linkable_task(&*store, scope, task_id)?;

    let input = NewFocusBlock {
        title: placement
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| task.name.clone()),
        context: task.context,
        start_time: placement.start_time,
        end_time: placement.end_time,
        recurrence_rule: None,
        linked_task_id: Some(task.id),
        color: placement.color,
    };
    let synced = blocks::create_block_synced(store, scope, input, now, opts)?;

    if let Some(old) = task.scheduled_block_id.filter(|old| *old != synced.block.id) {
        match store.block(scope, old) {
            Ok(Some(b)) if b.linked_task_id == Some(task.id) => {
                if let Err(e) = blocks::clear_link(store, scope, old, now) {
                    warn!(block = %old, error = %e, "failed to detach previous block");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(block = %old, error = %e, "failed to read previous block"),
        }
    }
    Ok(synced)
}

/// The task a block may be linked to: present in scope, open, and not a
/// recurring template. Anything else is a validation error.
pub(crate) fn linkable_task<S: Store + ?Sized>(store: &S, scope: &Scope, task_id: Uuid) -> Result<Task> {
    let task = store
        .task(scope, task_id)?
        .ok_or_else(|| Error::validation(format!("linked task {} does not exist", task_id)))?;
    ensure_schedulable(&task)?;
    if task.is_done() {
        return Err(Error::validation(format!("task '{}' is already done", task.name)));
    }
    Ok(task)
}

fn ensure_schedulable(task: &Task) -> Result<()> {
    if task.is_template() {
        return Err(Error::validation(format!(
            "'{}' is a recurring template; schedule one of its occurrences instead",
            task.name
        )));
    }
    Ok(())
}
