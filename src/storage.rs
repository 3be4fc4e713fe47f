use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{FocusBlock, FocusBlockPatch, Scope, Task, TaskPatch};

/// Persistence collaborator for the scheduling core.
///
/// Every call is filtered by the caller's [`Scope`]; rows belonging to
/// another tenant or user are invisible. Reads of a missing row return
/// `None`, writes to a missing row return [`Error::NotFound`]. Patches only
/// touch the fields they set.
pub trait Store {
    fn tasks(&self, scope: &Scope) -> Result<Vec<Task>>;

    fn task(&self, scope: &Scope, id: Uuid) -> Result<Option<Task>> {
        Ok(self.tasks(scope)?.into_iter().find(|t| t.id == id))
    }

    fn insert_task(&mut self, task: Task) -> Result<()>;

    fn update_task(&mut self, scope: &Scope, id: Uuid, patch: &TaskPatch) -> Result<Task>;

    fn delete_task(&mut self, scope: &Scope, id: Uuid) -> Result<Task>;

    fn blocks(&self, scope: &Scope) -> Result<Vec<FocusBlock>>;

    fn block(&self, scope: &Scope, id: Uuid) -> Result<Option<FocusBlock>> {
        Ok(self.blocks(scope)?.into_iter().find(|b| b.id == id))
    }

    fn insert_block(&mut self, block: FocusBlock) -> Result<()>;

    fn update_block(&mut self, scope: &Scope, id: Uuid, patch: &FocusBlockPatch) -> Result<FocusBlock>;

    fn delete_block(&mut self, scope: &Scope, id: Uuid) -> Result<FocusBlock>;
}

/// In-memory store. Also the document layout of [`JsonStore`].
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MemoryStore {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub focus_blocks: Vec<FocusBlock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn tasks(&self, scope: &Scope) -> Result<Vec<Task>> {
        Ok(self.tasks.iter().filter(|t| scope.owns_task(t)).cloned().collect())
    }

    fn insert_task(&mut self, task: Task) -> Result<()> {
        if self.tasks.iter().any(|t| t.id == task.id) {
            return Err(Error::Storage(format!("task {} already exists", task.id)));
        }
        self.tasks.push(task);
        Ok(())
    }

    fn update_task(&mut self, scope: &Scope, id: Uuid, patch: &TaskPatch) -> Result<Task> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id && scope.owns_task(t))
            .ok_or_else(|| Error::task_not_found(id))?;
        patch.apply(task);
        Ok(task.clone())
    }

    fn delete_task(&mut self, scope: &Scope, id: Uuid) -> Result<Task> {
        let idx = self
            .tasks
            .iter()
            .position(|t| t.id == id && scope.owns_task(t))
            .ok_or_else(|| Error::task_not_found(id))?;
        Ok(self.tasks.remove(idx))
    }

    fn blocks(&self, scope: &Scope) -> Result<Vec<FocusBlock>> {
        Ok(self
            .focus_blocks
            .iter()
            .filter(|b| scope.owns_block(b))
            .cloned()
            .collect())
    }

    fn insert_block(&mut self, block: FocusBlock) -> Result<()> {
        if self.focus_blocks.iter().any(|b| b.id == block.id) {
            return Err(Error::Storage(format!("focus block {} already exists", block.id)));
        }
        self.focus_blocks.push(block);
        Ok(())
    }

    fn update_block(&mut self, scope: &Scope, id: Uuid, patch: &FocusBlockPatch) -> Result<FocusBlock> {
        let block = self
            .focus_blocks
            .iter_mut()
            .find(|b| b.id == id && scope.owns_block(b))
            .ok_or_else(|| Error::block_not_found(id))?;
        patch.apply(block);
        Ok(block.clone())
    }

    fn delete_block(&mut self, scope: &Scope, id: Uuid) -> Result<FocusBlock> {
        let idx = self
            .focus_blocks
            .iter()
            .position(|b| b.id == id && scope.owns_block(b))
            .ok_or_else(|| Error::block_not_found(id))?;
        Ok(self.focus_blocks.remove(idx))
    }
}

/// Returns the default path of the store file (`focusdeck.json`).
///
/// The path is determined in the following order:
/// 1. `FOCUSDECK_DB` environment variable.
/// 2. `~/.local/share/focusdeck/focusdeck.json` (on Linux).
/// 3. `./focusdeck.json` (fallback).
pub fn default_db_path() -> PathBuf {
    std::env::var("FOCUSDECK_DB").map(PathBuf::from).unwrap_or_else(|_| {
        let mut p = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        p.push("focusdeck");
        p.push("focusdeck.json");
        p
    })
}

/// Single-file JSON store.
///
/// Each operation loads the whole document, applies the change and writes it
/// back through a temporary file. A missing file reads as an empty store.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the document. Rows missing required fields are rejected; run
    /// `focusdeck migrate` on data written by older versions.
    pub fn load(&self) -> Result<MemoryStore> {
        if !self.path.exists() {
            return Ok(MemoryStore::default());
        }
        let s = fs::read_to_string(&self.path)?;
        if s.trim().is_empty() {
            return Ok(MemoryStore::default());
        }
        serde_json::from_str(&s).map_err(|e| {
            Error::Storage(format!(
                "cannot read {}: {} (run `focusdeck migrate` if this file predates required fields)",
                self.path.display(),
                e
            ))
        })
    }

    pub fn save(&self, db: &MemoryStore) -> Result<()> {
        write_atomically(&self.path, &serde_json::to_string_pretty(db)?)
    }

    fn modify<R>(&mut self, f: impl FnOnce(&mut MemoryStore) -> Result<R>) -> Result<R> {
        let mut db = self.load()?;
        let out = f(&mut db)?;
        self.save(&db)?;
        debug!(path = %self.path.display(), "store written");
        Ok(out)
    }
}

/// Writes `contents` next to `path` and renames it into place.
pub(crate) fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl Store for JsonStore {
    fn tasks(&self, scope: &Scope) -> Result<Vec<Task>> {
        self.load()?.tasks(scope)
    }

    fn insert_task(&mut self, task: Task) -> Result<()> {
        self.modify(|db| db.insert_task(task))
    }

    fn update_task(&mut self, scope: &Scope, id: Uuid, patch: &TaskPatch) -> Result<Task> {
        self.modify(|db| db.update_task(scope, id, patch))
    }

    fn delete_task(&mut self, scope: &Scope, id: Uuid) -> Result<Task> {
        self.modify(|db| db.delete_task(scope, id))
    }

    fn blocks(&self, scope: &Scope) -> Result<Vec<FocusBlock>> {
        self.load()?.blocks(scope)
    }

    fn insert_block(&mut self, block: FocusBlock) -> Result<()> {
        self.modify(|db| db.insert_block(block))
    }

    fn update_block(&mut self, scope: &Scope, id: Uuid, patch: &FocusBlockPatch) -> Result<FocusBlock> {
        self.modify(|db| db.update_block(scope, id, patch))
    }

    fn delete_block(&mut self, scope: &Scope, id: Uuid) -> Result<FocusBlock> {
        self.modify(|db| db.delete_block(scope, id))
    }
}
