//! The "what matters right now" view.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CockpitConfig;
use crate::error::{Error, Result};
use crate::models::{Context, FocusBlock, Scope, Task};
use crate::storage::Store;
use crate::urgency::compute_urgency;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CockpitFilters {
    /// Narrows the task list to one context.
    pub context: Option<Context>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayCockpit {
    pub today: NaiveDate,
    pub generated_at: DateTime<Utc>,
    /// Most urgent first.
    pub tasks: Vec<Task>,
    /// Running now or starting within the horizon, earliest first.
    pub focus_blocks: Vec<FocusBlock>,
}

/// Whether a task belongs on today's list: not done, and committed, planned
/// or due on or before `today`, or not yet committed or planned at all.
/// Templates are judged like any other task.
pub fn qualifies_today(task: &Task, today: NaiveDate) -> bool {
    if task.is_done() {
        return false;
    }
    let on_or_before = |d: Option<NaiveDate>| d.is_some_and(|d| d <= today);
    on_or_before(task.committed_date)
        || on_or_before(task.do_date)
        || on_or_before(task.due_date)
        || (task.committed_date.is_none() && task.do_date.is_none())
}

/// Builds the cockpit snapshot. Nothing is cached.
pub fn today_cockpit<S: Store + ?Sized>(
    store: &S,
    scope: &Scope,
    now: DateTime<Utc>,
    today: NaiveDate,
    filters: &CockpitFilters,
    config: &CockpitConfig,
) -> Result<TodayCockpit> {
    let mut tasks: Vec<Task> = store
        .tasks(scope)?
        .into_iter()
        .filter(|t| qualifies_today(t, today))
        .filter(|t| filters.context.map_or(true, |c| t.context == c))
        .collect();
    tasks.sort_by(|a, b| {
        compute_urgency(b, today)
            .total_cmp(&compute_urgency(a, today))
            .then_with(|| a.name.cmp(&b.name))
    });

    let horizon = Duration::try_hours(config.horizon_hours)
        .and_then(|h| now.checked_add_signed(h))
        .ok_or_else(|| Error::Config(format!("cockpit.horizon_hours out of range: {}", config.horizon_hours)))?;
    let mut focus_blocks: Vec<FocusBlock> = store
        .blocks(scope)?
        .into_iter()
        .filter(|b| b.end_time >= now && b.start_time <= horizon)
        .collect();
    focus_blocks.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
    focus_blocks.truncate(config.max_blocks);

    debug!(tasks = tasks.len(), blocks = focus_blocks.len(), %today, "cockpit composed");
    Ok(TodayCockpit {
        today,
        generated_at: now,
        tasks,
        focus_blocks,
    })
}
