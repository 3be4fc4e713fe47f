//! Turns recurring templates into concrete, dated occurrence tasks.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Scope, Task, TaskStatus};
use crate::recurrence::{anchor_date, expand_occurrences};
use crate::storage::Store;

/// One occurrence (or template) that could not be materialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterializeError {
    pub template_id: Uuid,
    /// `None` when the whole template failed.
    pub date: Option<NaiveDate>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MaterializeReport {
    pub created: usize,
    pub skipped: usize,
    pub errors: Vec<MaterializeError>,
    /// Occurrences with a `do_date` in the window, new and pre-existing,
    /// ordered by date.
    pub occurrences: Vec<Task>,
}

impl MaterializeReport {
    pub fn merge(&mut self, other: MaterializeReport) {
        self.created += other.created;
        self.skipped += other.skipped;
        self.errors.extend(other.errors);
        self.occurrences.extend(other.occurrences);
    }
}

/// Ensures an occurrence of `template` exists for every date its rule
/// produces in `[window_start, window_end]`.
///
/// Dates that already have an occurrence are skipped, so repeated calls over
/// overlapping windows never duplicate. A failed insert is recorded in
/// `errors` and the remaining dates are still attempted.
pub fn materialize_occurrences<S: Store + ?Sized>(
    store: &mut S,
    scope: &Scope,
    template: &Task,
    window_start: NaiveDate,
    window_end: NaiveDate,
    now: DateTime<Utc>,
) -> Result<MaterializeReport> {
    if template.parent_task_id.is_some() {
        return Err(Error::validation(format!(
            "task {} is an occurrence, not a recurring template",
            template.id
        )));
    }
    let Some(rule) = template.recurrence_rule.as_deref() else {
        return Err(Error::validation(format!("task {} has no recurrence rule", template.id)));
    };
    if !scope.owns_task(template) {
        return Err(Error::task_not_found(template.id));
    }

    let mut existing: HashMap<NaiveDate, Task> = HashMap::new();
    for task in store.tasks(scope)? {
        if task.parent_task_id != Some(template.id) {
            continue;
        }
        if let Some(date) = task.do_date {
            existing.entry(date).or_insert(task);
        }
    }

    let dates = expand_occurrences(rule, anchor_date(template), window_start, window_end);
    debug!(template = %template.id, dates = dates.len(), existing = existing.len(), "materializing");

    let mut report = MaterializeReport::default();
    for date in dates {
        if existing.contains_key(&date) {
            report.skipped += 1;
            continue;
        }
        let occurrence = occurrence_of(template, date, now);
        match store.insert_task(occurrence.clone()) {
            Ok(()) => {
                report.created += 1;
                report.occurrences.push(occurrence);
            }
            Err(e) => {
                warn!(template = %template.id, %date, error = %e, "failed to materialize occurrence");
                report.errors.push(MaterializeError {
                    template_id: template.id,
                    date: Some(date),
                    message: e.to_string(),
                });
            }
        }
    }

    report.occurrences.extend(
        existing
            .into_values()
            .filter(|t| t.do_date.is_some_and(|d| d >= window_start && d <= window_end)),
    );
    report.occurrences.sort_by_key(|t| t.do_date);

    if report.created > 0 {
        info!(
            template = %template.id,
            created = report.created,
            skipped = report.skipped,
            failed = report.errors.len(),
            "occurrences materialized"
        );
    }
    Ok(report)
}

/// Runs [`materialize_occurrences`] for every template in scope. A template
/// that fails as a whole is reported, not fatal.
pub fn materialize_all<S: Store + ?Sized>(
    store: &mut S,
    scope: &Scope,
    window_start: NaiveDate,
    window_end: NaiveDate,
    now: DateTime<Utc>,
) -> Result<MaterializeReport> {
    let templates: Vec<Task> = store.tasks(scope)?.into_iter().filter(Task::is_template).collect();
    let mut report = MaterializeReport::default();
    for template in &templates {
        match materialize_occurrences(store, scope, template, window_start, window_end, now) {
            Ok(r) => report.merge(r),
            Err(e) => {
                warn!(template = %template.id, error = %e, "template skipped");
                report.errors.push(MaterializeError {
                    template_id: template.id,
                    date: None,
                    message: e.to_string(),
                });
            }
        }
    }
    report.occurrences.sort_by_key(|t| t.do_date);
    Ok(report)
}

/// A fresh occurrence of `template` on `date`. Descriptive fields are copied
/// now; later template edits do not reach it.
pub fn occurrence_of(template: &Task, date: NaiveDate, now: DateTime<Utc>) -> Task {
    Task {
        id: Uuid::new_v4(),
        tenant_id: template.tenant_id.clone(),
        owner_id: template.owner_id.clone(),
        name: template.name.clone(),
        description: template.description.clone(),
        context: template.context,
        priority: template.priority,
        status: TaskStatus::Open,
        do_date: Some(date),
        due_date: None,
        committed_date: None,
        duration_minutes: template.duration_minutes,
        scheduled_block_id: None,
        recurrence_rule: None,
        parent_task_id: Some(template.id),
        created_at: now,
        completed_at: None,
    }
}
