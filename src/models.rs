use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The authenticated `(tenant, user)` pair every operation is filtered by.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub tenant_id: String,
    pub user_id: String,
}

impl Scope {
    pub fn new(tenant_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
        }
    }

    pub fn owns_task(&self, task: &Task) -> bool {
        task.tenant_id == self.tenant_id && task.owner_id == self.user_id
    }

    pub fn owns_block(&self, block: &FocusBlock) -> bool {
        block.tenant_id == self.tenant_id && block.user_id == self.user_id
    }
}

/// Area of life a task or block belongs to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Context {
    House,
    Work,
    Personal,
    DeepFocus,
    Family,
    Health,
    Admin,
}

impl Context {
    pub const ALL: [Context; 7] = [
        Context::House,
        Context::Work,
        Context::Personal,
        Context::DeepFocus,
        Context::Family,
        Context::Health,
        Context::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Context::House => "house",
            Context::Work => "work",
            Context::Personal => "personal",
            Context::DeepFocus => "deep-focus",
            Context::Family => "family",
            Context::Health => "health",
            Context::Admin => "admin",
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Context {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        Context::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| format!("unknown context '{}'", s))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// Multiplier applied to the urgency score.
    pub fn weight(&self) -> f64 {
        match self {
            Priority::Low => 0.75,
            Priority::Medium => 1.0,
            Priority::High => 1.5,
            Priority::Urgent => 2.0,
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        };
        f.write_str(s)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Open,
    Done,
}

/// Represents a single task, template or materialized occurrence.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Task {
    /// Unique identifier for the task.
    pub id: Uuid,
    pub tenant_id: String,
    pub owner_id: String,
    /// The name of the task.
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Required at the model boundary. Legacy rows get it from `migrate`.
    pub context: Context,
    pub priority: Priority,
    pub status: TaskStatus,
    /// Planned day.
    #[serde(default)]
    pub do_date: Option<NaiveDate>,
    /// Hard deadline.
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// "I will do this today".
    #[serde(default)]
    pub committed_date: Option<NaiveDate>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    /// Weak reference to the focus block this task is placed in. May dangle.
    #[serde(default)]
    pub scheduled_block_id: Option<Uuid>,
    /// Recurrence rule. Only ever set on templates.
    #[serde(default)]
    pub recurrence_rule: Option<String>,
    /// Template this occurrence was materialized from.
    #[serde(default)]
    pub parent_task_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Builds an open, unscheduled task owned by `scope`.
    pub fn new(scope: &Scope, name: impl Into<String>, context: Context, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: scope.tenant_id.clone(),
            owner_id: scope.user_id.clone(),
            name: name.into(),
            description: None,
            context,
            priority: Priority::default(),
            status: TaskStatus::Open,
            do_date: None,
            due_date: None,
            committed_date: None,
            duration_minutes: None,
            scheduled_block_id: None,
            recurrence_rule: None,
            parent_task_id: None,
            created_at: now,
            completed_at: None,
        }
    }

    /// A recurring definition: no parent, has a rule.
    pub fn is_template(&self) -> bool {
        self.parent_task_id.is_none() && self.recurrence_rule.is_some()
    }

    pub fn is_occurrence(&self) -> bool {
        self.parent_task_id.is_some()
    }

    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }

    /// Rejects the recursive-recurrence shape and blank names.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.name.trim().is_empty() {
            return Err(crate::error::Error::validation("task name must not be empty"));
        }
        if self.parent_task_id.is_some() && self.recurrence_rule.is_some() {
            return Err(crate::error::Error::validation(
                "an occurrence cannot carry its own recurrence rule",
            ));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Local,
    Pending,
    Synced,
    Error,
}

/// A scheduled span of time on a calendar.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FocusBlock {
    pub id: Uuid,
    pub tenant_id: String,
    pub user_id: String,
    pub title: String,
    pub context: Context,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Blocks repeat independently of task recurrence.
    #[serde(default)]
    pub recurrence_rule: Option<String>,
    /// Task this block represents, if any.
    #[serde(default)]
    pub linked_task_id: Option<Uuid>,
    #[serde(default)]
    pub color: Option<String>,
    pub sync_status: SyncStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FocusBlock {
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.title.trim().is_empty() {
            return Err(crate::error::Error::validation("block title must not be empty"));
        }
        if self.end_time <= self.start_time {
            return Err(crate::error::Error::validation(format!(
                "block end {} must be after start {}",
                self.end_time.to_rfc3339(),
                self.start_time.to_rfc3339()
            )));
        }
        Ok(())
    }
}

/// Input for creating a focus block.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NewFocusBlock {
    pub title: String,
    pub context: Context,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub recurrence_rule: Option<String>,
    #[serde(default)]
    pub linked_task_id: Option<Uuid>,
    #[serde(default)]
    pub color: Option<String>,
}

/// Partial update for a focus block.
///
/// Has no `id`, `tenant_id` or `user_id` field, so those keys in an incoming
/// payload are dropped during deserialization.
/// Nullable fields use `Some(None)` to clear.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct FocusBlockPatch {
    pub title: Option<String>,
    pub context: Option<Context>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(with = "double_option", skip_serializing_if = "Option::is_none")]
    pub recurrence_rule: Option<Option<String>>,
    #[serde(with = "double_option", skip_serializing_if = "Option::is_none")]
    pub linked_task_id: Option<Option<Uuid>>,
    #[serde(with = "double_option", skip_serializing_if = "Option::is_none")]
    pub color: Option<Option<String>>,
    pub sync_status: Option<SyncStatus>,
    /// Set by the engine, never read from a payload.
    #[serde(skip)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl FocusBlockPatch {
    /// True when the patch changes no user-editable field.
    pub fn is_empty(&self) -> bool {
        FocusBlockPatch { updated_at: None, ..self.clone() } == FocusBlockPatch::default()
    }

    pub fn apply(&self, block: &mut FocusBlock) {
        if let Some(t) = &self.title { block.title = t.clone(); }
        if let Some(c) = self.context { block.context = c; }
        if let Some(s) = self.start_time { block.start_time = s; }
        if let Some(e) = self.end_time { block.end_time = e; }
        if let Some(r) = &self.recurrence_rule { block.recurrence_rule = r.clone(); }
        if let Some(t) = self.linked_task_id { block.linked_task_id = t; }
        if let Some(c) = &self.color { block.color = c.clone(); }
        if let Some(s) = self.sync_status { block.sync_status = s; }
        if let Some(t) = self.updated_at { block.updated_at = t; }
    }
}

/// Partial update for a task. Nullable fields use `Some(None)` to clear.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct TaskPatch {
    pub name: Option<String>,
    #[serde(with = "double_option", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    pub context: Option<Context>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    #[serde(with = "double_option", skip_serializing_if = "Option::is_none")]
    pub do_date: Option<Option<NaiveDate>>,
    #[serde(with = "double_option", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(with = "double_option", skip_serializing_if = "Option::is_none")]
    pub committed_date: Option<Option<NaiveDate>>,
    #[serde(with = "double_option", skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<Option<u32>>,
    #[serde(with = "double_option", skip_serializing_if = "Option::is_none")]
    pub scheduled_block_id: Option<Option<Uuid>>,
    #[serde(with = "double_option", skip_serializing_if = "Option::is_none")]
    pub recurrence_rule: Option<Option<String>>,
    #[serde(with = "double_option", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Option<DateTime<Utc>>>,
}

impl TaskPatch {
    pub fn apply(&self, task: &mut Task) {
        if let Some(n) = &self.name { task.name = n.clone(); }
        if let Some(d) = &self.description { task.description = d.clone(); }
        if let Some(c) = self.context { task.context = c; }
        if let Some(p) = self.priority { task.priority = p; }
        if let Some(s) = self.status { task.status = s; }
        if let Some(d) = self.do_date { task.do_date = d; }
        if let Some(d) = self.due_date { task.due_date = d; }
        if let Some(d) = self.committed_date { task.committed_date = d; }
        if let Some(m) = self.duration_minutes { task.duration_minutes = m; }
        if let Some(b) = self.scheduled_block_id { task.scheduled_block_id = b; }
        if let Some(r) = &self.recurrence_rule { task.recurrence_rule = r.clone(); }
        if let Some(c) = self.completed_at { task.completed_at = c; }
    }
}

/// Serde helper distinguishing an absent key from an explicit `null`.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
