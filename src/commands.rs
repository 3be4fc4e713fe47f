use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use uuid::Uuid;

use crate::blocks::{self, BlockInstance, SyncedBlock};
use crate::clock::Clock;
use crate::cockpit::{today_cockpit, CockpitFilters, TodayCockpit};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::materialize::{materialize_all, materialize_occurrences, MaterializeReport};
use crate::migrate::{migrate_file, MigrationReport};
use crate::models::{Context, FocusBlock, FocusBlockPatch, NewFocusBlock, Priority, Scope, Task, TaskPatch, TaskStatus};
use crate::recurrence::RecurrenceRule;
use crate::reconcile::{self, Placement, SyncOptions};
use crate::storage::Store;
use crate::urgency::compute_urgency;

/// Everything a command needs: where data lives, who is asking, and what
/// time it is.
pub struct Session<S: Store> {
    pub store: S,
    pub scope: Scope,
    pub config: Config,
    pub clock: Box<dyn Clock>,
    /// Suppresses all printing.
    pub silent: bool,
}

impl<S: Store> Session<S> {
    pub fn new(store: S, scope: Scope, config: Config, clock: impl Clock + 'static) -> Self {
        Self {
            store,
            scope,
            config,
            clock: Box::new(clock),
            silent: false,
        }
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Block-to-task sync settings: the configured floor, in the clock's
    /// calendar.
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions::new(self.config.schedule.min_block_minutes, self.clock.offset())
    }
}

/// Optional task fields shared by `task add` and `task edit`.
#[derive(Debug, Clone, Default)]
pub struct TaskFields {
    pub description: Option<String>,
    pub context: Option<Context>,
    pub priority: Option<Priority>,
    pub do_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub committed_date: Option<NaiveDate>,
    pub duration_minutes: Option<u32>,
    pub recur: Option<String>,
}

impl TaskFields {
    fn to_patch(&self) -> TaskPatch {
        TaskPatch {
            description: self.description.clone().map(Some),
            context: self.context,
            priority: self.priority,
            do_date: self.do_date.map(Some),
            due_date: self.due_date.map(Some),
            committed_date: self.committed_date.map(Some),
            duration_minutes: self.duration_minutes.map(Some),
            recurrence_rule: self.recur.clone().map(Some),
            ..TaskPatch::default()
        }
    }
}

/// Optional block fields for `block edit`.
#[derive(Debug, Clone, Default)]
pub struct BlockFields {
    pub title: Option<String>,
    pub context: Option<Context>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub color: Option<String>,
    pub recur: Option<String>,
    /// Link the block to this task (id or prefix).
    pub task: Option<String>,
    /// Drop the block's task link.
    pub unlink: bool,
}

/// Parses `YYYY-MM-DDTHH:MM[:SS]` in local time, or a full RFC 3339 timestamp.
pub fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(|| format!("'{}' does not exist in the local timezone", s));
        }
    }
    Err(format!("invalid timestamp '{}'. Use YYYY-MM-DDTHH:MM or RFC 3339.", s))
}

/// Resolves a full task id or a unique prefix of one.
pub fn resolve_task_id<S: Store + ?Sized>(store: &S, scope: &Scope, key: &str) -> Result<Uuid> {
    let ids = store.tasks(scope)?.into_iter().map(|t| t.id);
    resolve_id("task", key, ids)
}

/// Resolves a full block id or a unique prefix of one.
pub fn resolve_block_id<S: Store + ?Sized>(store: &S, scope: &Scope, key: &str) -> Result<Uuid> {
    let ids = store.blocks(scope)?.into_iter().map(|b| b.id);
    resolve_id("focus block", key, ids)
}

fn resolve_id(kind: &str, key: &str, ids: impl Iterator<Item = Uuid>) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(key.trim()) {
        return Ok(id);
    }
    let prefix = key.trim().to_lowercase();
    if prefix.is_empty() {
        return Err(Error::validation(format!("empty {} id", kind)));
    }
    let matches: Vec<Uuid> = ids.filter(|id| id.to_string().starts_with(&prefix)).collect();
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => Err(Error::validation(format!("no {} matches '{}'", kind, prefix))),
        _ => Err(Error::validation(format!(
            "'{}' is ambiguous, {} {}s match",
            prefix,
            matches.len(),
            kind
        ))),
    }
}

fn short_id(id: Uuid) -> String {
    id.to_string()[..8].to_string()
}

fn date_cell(d: Option<NaiveDate>) -> String {
    d.map(|d| d.to_string()).unwrap_or_else(|| "-".into())
}

fn check_rule(rule: &str) -> Result<()> {
    RecurrenceRule::parse(rule)
        .map(|_| ())
        .map_err(|e| Error::validation(format!("invalid recurrence rule '{}': {}", rule, e)))
}

/// Adds a new task. With `--recur` the task becomes a recurring template.
pub fn cmd_task_add<S: Store>(s: &mut Session<S>, name: String, context: Context, fields: TaskFields) -> Result<Task> {
    if let Some(rule) = &fields.recur {
        check_rule(rule)?;
    }
    let mut task = Task::new(&s.scope, name.trim(), context, s.clock.now());
    fields.to_patch().apply(&mut task);
    task.validate()?;
    s.store.insert_task(task.clone())?;
    if !s.silent {
        let kind = if task.is_template() { "Recurring template" } else { "Task" };
        println!("{} added (id = {})", kind, short_id(task.id));
    }
    Ok(task)
}

/// Edits an existing task's details.
pub fn cmd_task_edit<S: Store>(s: &mut Session<S>, id: &str, name: Option<String>, fields: TaskFields) -> Result<Task> {
    let id = resolve_task_id(&s.store, &s.scope, id)?;
    let current = s.store.task(&s.scope, id)?.ok_or_else(|| Error::task_not_found(id))?;
    if let Some(rule) = &fields.recur {
        check_rule(rule)?;
    }
    let patch = TaskPatch {
        name: name.map(|n| n.trim().to_string()),
        ..fields.to_patch()
    };
    if patch == TaskPatch::default() {
        return Err(Error::validation("nothing to change"));
    }
    let mut merged = current;
    patch.apply(&mut merged);
    merged.validate()?;
    if merged.is_template() && merged.scheduled_block_id.is_some() {
        return Err(Error::validation("a scheduled task cannot become a recurring template"));
    }

    let task = s.store.update_task(&s.scope, id, &patch)?;
    if !s.silent { println!("Task {} updated.", short_id(id)); }
    Ok(task)
}

/// Marks a task as done.
pub fn cmd_task_complete<S: Store>(s: &mut Session<S>, id: &str) -> Result<Task> {
    let id = resolve_task_id(&s.store, &s.scope, id)?;
    let task = s.store.task(&s.scope, id)?.ok_or_else(|| Error::task_not_found(id))?;
    if task.is_template() {
        return Err(Error::validation(format!(
            "'{}' is a recurring template; complete one of its occurrences",
            task.name
        )));
    }
    let patch = TaskPatch {
        status: Some(TaskStatus::Done),
        completed_at: Some(Some(s.clock.now())),
        ..TaskPatch::default()
    };
    let task = s.store.update_task(&s.scope, id, &patch)?;
    if !s.silent { println!("Task {} marked as complete.", short_id(id)); }
    Ok(task)
}

/// Removes a task. A block still pointing at it loses its link.
pub fn cmd_task_remove<S: Store>(s: &mut Session<S>, id: &str) -> Result<Task> {
    let id = resolve_task_id(&s.store, &s.scope, id)?;
    let task = s.store.delete_task(&s.scope, id)?;
    if let Some(block_id) = task.scheduled_block_id {
        let linked = s.store.block(&s.scope, block_id).ok().flatten();
        if linked.is_some_and(|b| b.linked_task_id == Some(id)) {
            if let Err(e) = blocks::clear_link(&mut s.store, &s.scope, block_id, s.clock.now()) {
                if !s.silent { eprintln!("Warning: block {} still points at the removed task: {}", short_id(block_id), e); }
            }
        }
    }
    if !s.silent { println!("Task {} removed.", short_id(id)); }
    Ok(task)
}

/// Prints one task as JSON.
pub fn cmd_task_show<S: Store>(s: &Session<S>, id: &str) -> Result<Task> {
    let id = resolve_task_id(&s.store, &s.scope, id)?;
    let task = s.store.task(&s.scope, id)?.ok_or_else(|| Error::task_not_found(id))?;
    if !s.silent { println!("{}", serde_json::to_string_pretty(&task)?); }
    Ok(task)
}

/// Lists tasks in a formatted table, sorted by urgency.
///
/// By default, hides done tasks unless `all` is true.
pub fn cmd_task_list<S: Store>(s: &Session<S>, all: bool) -> Result<Vec<Task>> {
    let today = s.clock.today();
    let mut tasks = s.store.tasks(&s.scope)?;
    if !all {
        tasks.retain(|t| !t.is_done());
    }
    tasks.sort_by(|a, b| compute_urgency(b, today).total_cmp(&compute_urgency(a, today)));

    if s.silent {
        return Ok(tasks);
    }
    if tasks.is_empty() {
        println!("No tasks found.");
        return Ok(tasks);
    }
    println!("{}", task_table(&tasks, today));
    Ok(tasks)
}

fn task_table(tasks: &[Task], today: NaiveDate) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").add_attribute(Attribute::Bold),
            Cell::new("Name").add_attribute(Attribute::Bold),
            Cell::new("Context").add_attribute(Attribute::Bold),
            Cell::new("Do").add_attribute(Attribute::Bold),
            Cell::new("Due").add_attribute(Attribute::Bold),
            Cell::new("Committed").add_attribute(Attribute::Bold),
            Cell::new("Min").add_attribute(Attribute::Bold),
            Cell::new("Urg").add_attribute(Attribute::Bold),
            Cell::new("Kind").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
        ]);

    for t in tasks {
        let urgency = compute_urgency(t, today);
        let urgency_color = if t.is_done() {
            Color::Grey
        } else if urgency > 50.0 {
            Color::Red
        } else if urgency > 20.0 {
            Color::Yellow
        } else {
            Color::Green
        };
        let overdue = !t.is_done() && t.due_date.is_some_and(|d| d < today);
        let kind = if t.is_template() {
            "template"
        } else if t.is_occurrence() {
            "occurrence"
        } else {
            "-"
        };
        let (status, status_color) = if t.is_done() {
            ("Done", Color::Green)
        } else if t.scheduled_block_id.is_some() {
            ("Scheduled", Color::Cyan)
        } else {
            ("Open", Color::Yellow)
        };

        table.add_row(vec![
            Cell::new(short_id(t.id)),
            Cell::new(&t.name),
            Cell::new(t.context),
            Cell::new(date_cell(t.do_date)),
            Cell::new(date_cell(t.due_date)).fg(if overdue { Color::Red } else { Color::Reset }),
            Cell::new(date_cell(t.committed_date)),
            Cell::new(t.duration_minutes.map(|m| m.to_string()).unwrap_or_else(|| "-".into())),
            Cell::new(format!("{:.1}", urgency)).fg(urgency_color),
            Cell::new(kind),
            Cell::new(status).fg(status_color),
        ]);
    }
    table
}

/// Adds a focus block. With `task`, the block is a scheduling of that task
/// and takes its context; `context` is ignored.
pub fn cmd_block_add<S: Store>(
    s: &mut Session<S>,
    title: String,
    context: Option<Context>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    task: Option<String>,
    color: Option<String>,
    recur: Option<String>,
) -> Result<SyncedBlock> {
    let now = s.clock.now();
    let opts = s.sync_options();

    let synced = match task {
        Some(key) => {
            if recur.is_some() {
                return Err(Error::validation("a block scheduling a task cannot repeat"));
            }
            let task_id = resolve_task_id(&s.store, &s.scope, &key)?;
            let placement = Placement {
                title: Some(title),
                color,
                ..Placement::new(start, end)
            };
            reconcile::schedule_task(&mut s.store, &s.scope, task_id, placement, now, opts)?
        }
        None => {
            let context = context.ok_or_else(|| Error::validation("--context is required for a block without --task"))?;
            let input = NewFocusBlock {
                title,
                context,
                start_time: start,
                end_time: end,
                recurrence_rule: recur,
                linked_task_id: None,
                color,
            };
            blocks::create_block_synced(&mut s.store, &s.scope, input, now, opts)?
        }
    };

    if !s.silent {
        println!("Focus block added (id = {})", short_id(synced.block.id));
        if let Some(err) = &synced.sync.task_sync_error {
            eprintln!("Warning: task sync failed: {}", err);
        }
    }
    Ok(synced)
}

/// Lists blocks in a window (default: a week back, two weeks ahead). With
/// `expand`, repeating blocks show one row per occurrence.
pub fn cmd_block_list<S: Store>(
    s: &Session<S>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    expand: bool,
) -> Result<Vec<BlockInstance>> {
    let now = s.clock.now();
    let window = match (from, to) {
        (Some(from), Some(to)) => (from, to),
        _ => {
            let (default_from, default_to) = blocks::default_window(now, &s.config.schedule)?;
            (from.unwrap_or(default_from), to.unwrap_or(default_to))
        }
    };
    let offset = s.clock.offset();
    if window.0 > window.1 {
        return Err(Error::validation("--from must not be after --to"));
    }

    let (listed, mut instances): (Vec<FocusBlock>, Vec<BlockInstance>) = if expand {
        let all = s.store.blocks(&s.scope)?;
        let instances = all
            .iter()
            .flat_map(|b| blocks::expand_block_instances(b, window.0, window.1, offset))
            .collect();
        (all, instances)
    } else {
        let listed = blocks::list_blocks(&s.store, &s.scope, Some(window), now, &s.config.schedule)?;
        let instances = listed
            .iter()
            .map(|b| BlockInstance {
                block_id: b.id,
                start_time: b.start_time,
                end_time: b.end_time,
            })
            .collect();
        (listed, instances)
    };
    instances.sort_by_key(|i| (i.start_time, i.block_id));

    if s.silent {
        return Ok(instances);
    }
    if instances.is_empty() {
        println!("No focus blocks found.");
        return Ok(instances);
    }
    let by_id: HashMap<Uuid, &FocusBlock> = listed.iter().map(|b| (b.id, b)).collect();
    let rows: Vec<(&FocusBlock, BlockInstance)> = instances
        .iter()
        .filter_map(|i| by_id.get(&i.block_id).map(|b| (*b, *i)))
        .collect();
    println!("{}", block_table(&rows));
    Ok(instances)
}

fn block_table(rows: &[(&FocusBlock, BlockInstance)]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").add_attribute(Attribute::Bold),
            Cell::new("Title").add_attribute(Attribute::Bold),
            Cell::new("Context").add_attribute(Attribute::Bold),
            Cell::new("Start").add_attribute(Attribute::Bold),
            Cell::new("End").add_attribute(Attribute::Bold),
            Cell::new("Min").add_attribute(Attribute::Bold),
            Cell::new("Task").add_attribute(Attribute::Bold),
            Cell::new("Repeats").add_attribute(Attribute::Bold),
        ]);
    for (b, i) in rows {
        table.add_row(vec![
            Cell::new(short_id(b.id)),
            Cell::new(&b.title),
            Cell::new(b.context),
            Cell::new(i.start_time.with_timezone(&Local).format("%Y-%m-%d %H:%M")),
            Cell::new(i.end_time.with_timezone(&Local).format("%H:%M")),
            Cell::new(b.duration_minutes()),
            Cell::new(b.linked_task_id.map(short_id).unwrap_or_else(|| "-".into())),
            Cell::new(b.recurrence_rule.as_deref().unwrap_or("-")),
        ]);
    }
    table
}

/// Moves, resizes or retitles a block and re-syncs its task.
pub fn cmd_block_edit<S: Store>(s: &mut Session<S>, id: &str, fields: BlockFields) -> Result<SyncedBlock> {
    let id = resolve_block_id(&s.store, &s.scope, id)?;
    if fields.unlink && fields.task.is_some() {
        return Err(Error::validation("--task and --unlink cannot be combined"));
    }
    let linked_task_id = match (&fields.task, fields.unlink) {
        (Some(key), _) => Some(Some(resolve_task_id(&s.store, &s.scope, key)?)),
        (None, true) => Some(None),
        (None, false) => None,
    };
    let patch = FocusBlockPatch {
        title: fields.title,
        context: fields.context,
        start_time: fields.start,
        end_time: fields.end,
        recurrence_rule: fields.recur.map(Some),
        linked_task_id,
        color: fields.color.map(Some),
        ..FocusBlockPatch::default()
    };
    if patch.is_empty() {
        return Err(Error::validation("nothing to change"));
    }

    let opts = s.sync_options();
    let synced = blocks::update_block_synced(&mut s.store, &s.scope, id, &patch, s.clock.now(), opts)?;
    if !s.silent {
        println!("Focus block {} updated.", short_id(id));
        if let Some(err) = &synced.sync.task_sync_error {
            eprintln!("Warning: task sync failed: {}", err);
        }
    }
    Ok(synced)
}

/// Deletes a block and unschedules its task.
pub fn cmd_block_remove<S: Store>(s: &mut Session<S>, id: &str) -> Result<FocusBlock> {
    let id = resolve_block_id(&s.store, &s.scope, id)?;
    let block = blocks::delete_block_synced(&mut s.store, &s.scope, id)?;
    if !s.silent { println!("Focus block {} removed.", short_id(id)); }
    Ok(block)
}

/// Materializes occurrences for one template, or all of them.
///
/// The window defaults to today through `materialize_days` ahead.
pub fn cmd_materialize<S: Store>(
    s: &mut Session<S>,
    template: Option<String>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<MaterializeReport> {
    let now = s.clock.now();
    let from = from.unwrap_or_else(|| s.clock.today());
    let to = match to {
        Some(to) => to,
        None => {
            let days = s.config.schedule.materialize_days;
            Duration::try_days(days)
                .and_then(|span| from.checked_add_signed(span))
                .ok_or_else(|| Error::Config(format!("schedule.materialize_days out of range: {}", days)))?
        }
    };
    if from > to {
        return Err(Error::validation("--from must not be after --to"));
    }

    let report = match template {
        Some(key) => {
            let id = resolve_task_id(&s.store, &s.scope, &key)?;
            let tmpl = s.store.task(&s.scope, id)?.ok_or_else(|| Error::task_not_found(id))?;
            materialize_occurrences(&mut s.store, &s.scope, &tmpl, from, to, now)?
        }
        None => materialize_all(&mut s.store, &s.scope, from, to, now)?,
    };

    if !s.silent {
        println!(
            "Materialized {} to {}: {} created, {} already present, {} failed.",
            from,
            to,
            report.created,
            report.skipped,
            report.errors.len()
        );
        for e in &report.errors {
            eprintln!("  {} {}: {}", short_id(e.template_id), date_cell(e.date), e.message);
        }
    }
    Ok(report)
}

/// Prints the today cockpit, as tables or as JSON.
pub fn cmd_today<S: Store>(s: &Session<S>, context: Option<Context>, json: bool) -> Result<TodayCockpit> {
    let filters = CockpitFilters { context };
    let cockpit = today_cockpit(
        &s.store,
        &s.scope,
        s.clock.now(),
        s.clock.today(),
        &filters,
        &s.config.cockpit,
    )?;
    if s.silent {
        return Ok(cockpit);
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&cockpit)?);
        return Ok(cockpit);
    }

    println!("Today, {}", cockpit.today.format("%A %Y-%m-%d"));
    if cockpit.tasks.is_empty() {
        println!("Nothing due. Enjoy.");
    } else {
        println!("{}", task_table(&cockpit.tasks, cockpit.today));
    }
    if cockpit.focus_blocks.is_empty() {
        println!("No focus blocks in the next {}h.", s.config.cockpit.horizon_hours);
    } else {
        let rows: Vec<(&FocusBlock, BlockInstance)> = cockpit
            .focus_blocks
            .iter()
            .map(|b| {
                (b, BlockInstance {
                    block_id: b.id,
                    start_time: b.start_time,
                    end_time: b.end_time,
                })
            })
            .collect();
        println!("{}", block_table(&rows));
    }
    Ok(cockpit)
}

/// Fills legacy defaults in the store file.
pub fn cmd_migrate(path: &Path, silent: bool) -> Result<MigrationReport> {
    let report = migrate_file(path)?;
    if !silent {
        if report.changed() {
            println!(
                "Migrated {}: {} fields filled across {} tasks and {} blocks.",
                path.display(),
                report.fields_filled,
                report.tasks_seen,
                report.blocks_seen
            );
        } else {
            println!("{} is up to date.", path.display());
        }
    }
    Ok(report)
}
