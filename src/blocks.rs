//! Focus block CRUD, scoped to one tenant and user.

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ScheduleConfig;
use crate::error::{Error, Result};
use crate::models::{FocusBlock, FocusBlockPatch, NewFocusBlock, Scope, SyncStatus};
use crate::recurrence::{expand_occurrences, RecurrenceRule};
use crate::reconcile::{self, BlockSync, SyncOptions};
use crate::storage::Store;

/// A block write together with the outcome of syncing its linked task.
#[derive(Debug, Clone, Serialize)]
pub struct SyncedBlock {
    pub block: FocusBlock,
    #[serde(flatten)]
    pub sync: BlockSync,
}

/// One concrete span of a possibly repeating block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockInstance {
    pub block_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// `[now - list_back_days, now + list_forward_days]`. Day counts that run
/// off the calendar are a configuration error.
pub fn default_window(now: DateTime<Utc>, config: &ScheduleConfig) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let from = Duration::try_days(config.list_back_days)
        .and_then(|back| now.checked_sub_signed(back))
        .ok_or_else(|| Error::Config(format!("schedule.list_back_days out of range: {}", config.list_back_days)))?;
    let to = Duration::try_days(config.list_forward_days)
        .and_then(|forward| now.checked_add_signed(forward))
        .ok_or_else(|| {
            Error::Config(format!("schedule.list_forward_days out of range: {}", config.list_forward_days))
        })?;
    Ok((from, to))
}

/// Blocks whose start falls in `window` (inclusive), ascending by start.
pub fn list_blocks<S: Store + ?Sized>(
    store: &S,
    scope: &Scope,
    window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    now: DateTime<Utc>,
    config: &ScheduleConfig,
) -> Result<Vec<FocusBlock>> {
    let (from, to) = match window {
        Some(window) => window,
        None => default_window(now, config)?,
    };
    let mut blocks: Vec<FocusBlock> = store
        .blocks(scope)?
        .into_iter()
        .filter(|b| b.start_time >= from && b.start_time <= to)
        .collect();
    blocks.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
    debug!(count = blocks.len(), from = %from, to = %to, "listed focus blocks");
    Ok(blocks)
}

pub fn get_block<S: Store + ?Sized>(store: &S, scope: &Scope, id: Uuid) -> Result<Option<FocusBlock>> {
    store.block(scope, id)
}

/// Creates a block. A linked task must exist in scope, be open, and not be a
/// template. Does not touch the task; see [`create_block_synced`].
pub fn create_block<S: Store + ?Sized>(
    store: &mut S,
    scope: &Scope,
    input: NewFocusBlock,
    now: DateTime<Utc>,
) -> Result<FocusBlock> {
    if let Some(rule) = &input.recurrence_rule {
        validate_rule(rule)?;
    }
    if let Some(task_id) = input.linked_task_id {
        reconcile::linkable_task(&*store, scope, task_id)?;
    }
    let block = FocusBlock {
        id: Uuid::new_v4(),
        tenant_id: scope.tenant_id.clone(),
        user_id: scope.user_id.clone(),
        title: input.title.trim().to_string(),
        context: input.context,
        start_time: input.start_time,
        end_time: input.end_time,
        recurrence_rule: input.recurrence_rule,
        linked_task_id: input.linked_task_id,
        color: input.color,
        sync_status: SyncStatus::Local,
        created_at: now,
        updated_at: now,
    };
    block.validate()?;
    store.insert_block(block.clone())?;
    info!(block = %block.id, start = %block.start_time, "focus block created");
    Ok(block)
}

/// Creates a block, then points its linked task at it.
pub fn create_block_synced<S: Store + ?Sized>(
    store: &mut S,
    scope: &Scope,
    input: NewFocusBlock,
    now: DateTime<Utc>,
    opts: SyncOptions,
) -> Result<SyncedBlock> {
    let block = create_block(store, scope, input, now)?;
    let sync = reconcile::reconcile_block_update(store, scope, &block, opts);
    Ok(SyncedBlock { block, sync })
}

/// Applies a partial update after validating the merged result. Linking to a
/// new task checks it the way [`create_block`] does.
pub fn update_block<S: Store + ?Sized>(
    store: &mut S,
    scope: &Scope,
    id: Uuid,
    patch: &FocusBlockPatch,
    now: DateTime<Utc>,
) -> Result<FocusBlock> {
    let current = store.block(scope, id)?.ok_or_else(|| Error::block_not_found(id))?;
    if let Some(Some(rule)) = &patch.recurrence_rule {
        validate_rule(rule)?;
    }
    if let Some(Some(task_id)) = patch.linked_task_id {
        if current.linked_task_id != Some(task_id) {
            reconcile::linkable_task(&*store, scope, task_id)?;
        }
    }
    let mut merged = current;
    patch.apply(&mut merged);
    merged.validate()?;

    let patch = FocusBlockPatch {
        updated_at: Some(now),
        ..patch.clone()
    };
    let updated = store.update_block(scope, id, &patch)?;
    info!(block = %id, "focus block updated");
    Ok(updated)
}

/// Updates a block, then reconciles its linked task.
///
/// The block write is the primary result. Task sync problems come back in
/// [`BlockSync::task_sync_error`]. A task that was unlinked by this patch has
/// its `scheduled_block_id` cleared, best-effort.
pub fn update_block_synced<S: Store + ?Sized>(
    store: &mut S,
    scope: &Scope,
    id: Uuid,
    patch: &FocusBlockPatch,
    now: DateTime<Utc>,
    opts: SyncOptions,
) -> Result<SyncedBlock> {
    let previous_task = store.block(scope, id)?.and_then(|b| b.linked_task_id);
    let block = update_block(store, scope, id, patch, now)?;

    if let Some(old) = previous_task.filter(|old| block.linked_task_id != Some(*old)) {
        reconcile::unlink_task_best_effort(store, scope, old, block.id);
    }
    let sync = reconcile::reconcile_block_update(store, scope, &block, opts);
    Ok(SyncedBlock { block, sync })
}

pub fn delete_block<S: Store + ?Sized>(store: &mut S, scope: &Scope, id: Uuid) -> Result<FocusBlock> {
    let block = store.delete_block(scope, id)?;
    info!(block = %id, "focus block deleted");
    Ok(block)
}

/// Deletes a block, then unlinks its task. The delete stands even if the
/// unlink fails.
pub fn delete_block_synced<S: Store + ?Sized>(store: &mut S, scope: &Scope, id: Uuid) -> Result<FocusBlock> {
    let block = delete_block(store, scope, id)?;
    reconcile::reconcile_block_delete(store, scope, &block);
    Ok(block)
}

/// Detaches the block from whatever task it represents, without touching the
/// task.
pub(crate) fn clear_link<S: Store + ?Sized>(
    store: &mut S,
    scope: &Scope,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<FocusBlock> {
    let patch = FocusBlockPatch {
        linked_task_id: Some(None),
        updated_at: Some(now),
        ..FocusBlockPatch::default()
    };
    store.update_block(scope, id, &patch)
}

/// Concrete spans of `block` starting inside `[from, to]`.
///
/// A repeating block keeps its wall-clock time of day (read in `offset`) and
/// its length on every occurrence date. A rule that does not parse yields
/// only the stored span.
pub fn expand_block_instances(
    block: &FocusBlock,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    offset: FixedOffset,
) -> Vec<BlockInstance> {
    let length = block.end_time - block.start_time;
    let in_window = |start: &DateTime<Utc>| *start >= from && *start <= to;

    let starts: Vec<DateTime<Utc>> = match &block.recurrence_rule {
        None => vec![block.start_time],
        Some(rule) => {
            let local_start = block.start_time.with_timezone(&offset);
            let time = local_start.time();
            let dates = expand_occurrences(
                rule,
                local_start.date_naive(),
                from.with_timezone(&offset).date_naive(),
                to.with_timezone(&offset).date_naive(),
            );
            if dates.is_empty() && RecurrenceRule::parse(rule).is_err() {
                vec![block.start_time]
            } else {
                dates
                    .into_iter()
                    .filter_map(|d| offset.from_local_datetime(&d.and_time(time)).single())
                    .map(|start| start.with_timezone(&Utc))
                    .collect()
            }
        }
    };

    starts
        .into_iter()
        .filter(in_window)
        .map(|start| BlockInstance {
            block_id: block.id,
            start_time: start,
            end_time: start + length,
        })
        .collect()
}

fn validate_rule(rule: &str) -> Result<()> {
    RecurrenceRule::parse(rule)
        .map(|_| ())
        .map_err(|e| Error::validation(format!("invalid recurrence rule '{}': {}", rule, e)))
}

