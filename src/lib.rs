//! # focusdeck
//!
//! Scheduling core of a multi-tenant operations dashboard: recurring tasks,
//! focus blocks on a calendar, and the "today" cockpit that ties them
//! together. A CLI (`focusdeck`) drives it over a JSON file store.
//!
//! ## Features
//!
//! *   **Recurrence**: RRULE-style rules (`FREQ=WEEKLY;BYDAY=MO,WE,FR`) or the
//!     shorthands `daily`, `weekly`, `monthly`, `yearly`.
//! *   **Materialization**: recurring templates become dated occurrence
//!     tasks, idempotently, one per date.
//! *   **Focus blocks**: time spans on the calendar, optionally representing a
//!     task. Moving a block re-plans its task; deleting it unschedules it.
//! *   **Today cockpit**: committed, planned, due and backlog work plus the
//!     blocks of the next 24 hours.
//!
//! ## Usage
//!
//! ```bash
//! # A recurring template and two weeks of occurrences
//! focusdeck task add "Water plants" --context house --recur "FREQ=WEEKLY;BYDAY=MO,TH" --do 2025-06-02
//! focusdeck materialize
//!
//! # Put a task on the calendar
//! focusdeck block add "Taxes" --start 2025-06-03T09:00 --end 2025-06-03T11:00 --task 3f2a
//!
//! # What now?
//! focusdeck today
//! ```
//!
//! ## Data Storage
//!
//! Everything lives in one JSON file in your local data directory
//! (`~/.local/share/focusdeck/focusdeck.json` on Linux), overridable with the
//! `FOCUSDECK_DB` environment variable or `[storage] data_file` in
//! `~/.config/focusdeck/config.toml`.

pub mod blocks;
pub mod clock;
pub mod cockpit;
pub mod commands;
pub mod config;
pub mod error;
pub mod materialize;
pub mod migrate;
pub mod models;
pub mod recurrence;
pub mod reconcile;
pub mod storage;
pub mod urgency;

pub use error::{Error, Result};
