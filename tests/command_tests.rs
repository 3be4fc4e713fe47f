use chrono::{FixedOffset, NaiveDate, TimeZone, Utc};
use focusdeck::clock::FixedClock;
use focusdeck::commands::*;
use focusdeck::config::Config;
use focusdeck::error::Error;
use focusdeck::models::{Context, Priority, Scope, TaskStatus};
use focusdeck::storage::{JsonStore, Store};
use std::path::PathBuf;

fn with_test_db<F>(f: F)
where
    F: FnOnce(Session<JsonStore>, PathBuf),
{
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("focusdeck.json");
    let clock = FixedClock::at(Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap());
    let session = Session::new(
        JsonStore::open(&db_path),
        Scope::new("acme", "alex"),
        Config::default(),
        clock,
    )
    .silent();
    f(session, db_path);
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

#[test]
fn test_add_and_list() {
    with_test_db(|mut s, _path| {
        let fields = TaskFields { due_date: Some(d(2025, 6, 10)), duration_minutes: Some(60), ..TaskFields::default() };
        cmd_task_add(&mut s, "Test Task".into(), Context::Work, fields).unwrap();

        let tasks = cmd_task_list(&s, false).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "Test Task");
        assert_eq!(tasks[0].context, Context::Work);
        assert_eq!(tasks[0].due_date, Some(d(2025, 6, 10)));
    });
}

#[test]
fn test_add_rejects_bad_rule() {
    with_test_db(|mut s, _path| {
        let fields = TaskFields { recur: Some("FREQ=NEVER".into()), ..TaskFields::default() };
        assert!(cmd_task_add(&mut s, "Broken".into(), Context::House, fields).is_err());
        assert!(cmd_task_list(&s, true).unwrap().is_empty());
    });
}

#[test]
fn test_complete_task() {
    with_test_db(|mut s, _path| {
        let task = cmd_task_add(&mut s, "Task to Complete".into(), Context::Personal, TaskFields::default()).unwrap();
        let prefix = task.id.to_string()[..8].to_string();
        cmd_task_complete(&mut s, &prefix).unwrap();

        let tasks = cmd_task_list(&s, true).unwrap();
        assert_eq!(tasks[0].status, TaskStatus::Done);
        assert!(tasks[0].completed_at.is_some());
        assert!(cmd_task_list(&s, false).unwrap().is_empty());
    });
}

#[test]
fn test_complete_template_rejected() {
    with_test_db(|mut s, _path| {
        let fields = TaskFields { recur: Some("daily".into()), ..TaskFields::default() };
        let tmpl = cmd_task_add(&mut s, "Standup".into(), Context::Work, fields).unwrap();
        assert!(cmd_task_complete(&mut s, &tmpl.id.to_string()).is_err());
    });
}

#[test]
fn test_edit_task() {
    with_test_db(|mut s, _path| {
        let task = cmd_task_add(&mut s, "Original".into(), Context::Work, TaskFields::default()).unwrap();
        let fields = TaskFields { priority: Some(Priority::Urgent), context: Some(Context::Admin), ..TaskFields::default() };
        let edited = cmd_task_edit(&mut s, &task.id.to_string(), Some("Renamed".into()), fields).unwrap();

        assert_eq!(edited.name, "Renamed");
        assert_eq!(edited.priority, Priority::Urgent);
        assert_eq!(edited.context, Context::Admin);
        assert!(cmd_task_edit(&mut s, &task.id.to_string(), None, TaskFields::default()).is_err());
    });
}

#[test]
fn test_remove_task_unlinks_block() {
    with_test_db(|mut s, _path| {
        let task = cmd_task_add(&mut s, "Scheduled".into(), Context::Work, TaskFields::default()).unwrap();
        let start = parse_timestamp("2025-06-03T09:00:00Z").unwrap();
        let end = parse_timestamp("2025-06-03T10:00:00Z").unwrap();
        let synced = cmd_block_add(&mut s, "Slot".into(), None, start, end, Some(task.id.to_string()), None, None).unwrap();

        cmd_task_remove(&mut s, &task.id.to_string()).unwrap();
        let block = s.store.block(&s.scope, synced.block.id).unwrap().unwrap();
        assert_eq!(block.linked_task_id, None);
    });
}

#[test]
fn test_block_add_edit_remove_keeps_task_in_step() {
    with_test_db(|mut s, _path| {
        let task = cmd_task_add(&mut s, "Write report".into(), Context::Work, TaskFields::default()).unwrap();
        let start = parse_timestamp("2025-06-03T09:00:00Z").unwrap();
        let end = parse_timestamp("2025-06-03T09:05:00Z").unwrap();
        let synced = cmd_block_add(&mut s, "Report".into(), None, start, end, Some(task.id.to_string()[..6].to_string()), Some("#00aaff".into()), None).unwrap();

        assert_eq!(synced.block.color.as_deref(), Some("#00aaff"));
        assert_eq!(synced.block.updated_at, synced.block.created_at);
        let t = s.store.task(&s.scope, task.id).unwrap().unwrap();
        assert_eq!(t.duration_minutes, Some(15));
        assert_eq!(t.do_date, Some(d(2025, 6, 3)));

        let fields = BlockFields {
            start: Some(parse_timestamp("2025-06-05T14:00:00Z").unwrap()),
            end: Some(parse_timestamp("2025-06-05T15:00:00Z").unwrap()),
            ..BlockFields::default()
        };
        cmd_block_edit(&mut s, &synced.block.id.to_string(), fields).unwrap();
        let t = s.store.task(&s.scope, task.id).unwrap().unwrap();
        assert_eq!(t.do_date, Some(d(2025, 6, 5)));
        assert_eq!(t.duration_minutes, Some(60));

        cmd_block_remove(&mut s, &synced.block.id.to_string()).unwrap();
        let t = s.store.task(&s.scope, task.id).unwrap().unwrap();
        assert_eq!(t.scheduled_block_id, None);
    });
}

#[test]
fn test_unlinked_block_color_set_on_create() {
    with_test_db(|mut s, _path| {
        let start = parse_timestamp("2025-06-03T09:00:00Z").unwrap();
        let end = parse_timestamp("2025-06-03T10:00:00Z").unwrap();
        let synced = cmd_block_add(&mut s, "Reading".into(), Some(Context::Personal), start, end, None, Some("#336699".into()), None).unwrap();
        let stored = s.store.block(&s.scope, synced.block.id).unwrap().unwrap();
        assert_eq!(stored.color.as_deref(), Some("#336699"));
        assert_eq!(stored, synced.block);
    });
}

#[test]
fn test_block_add_rejects_done_task() {
    with_test_db(|mut s, _path| {
        let task = cmd_task_add(&mut s, "Finished".into(), Context::Work, TaskFields::default()).unwrap();
        cmd_task_complete(&mut s, &task.id.to_string()).unwrap();
        let start = parse_timestamp("2025-06-03T09:00:00Z").unwrap();
        let end = parse_timestamp("2025-06-03T10:00:00Z").unwrap();
        let err = cmd_block_add(&mut s, "Again".into(), None, start, end, Some(task.id.to_string()), None, None).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(s.store.blocks(&s.scope).unwrap().is_empty());
    });
}

#[test]
fn test_do_date_uses_clock_calendar() {
    with_test_db(|mut s, _path| {
        let auckland = FixedOffset::east_opt(12 * 3600).unwrap();
        // 2025-06-02 20:00 in Auckland.
        s.clock = Box::new(FixedClock::at(Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap()).with_offset(auckland));
        let task = cmd_task_add(&mut s, "Evening run".into(), Context::Health, TaskFields::default()).unwrap();

        // 2025-06-03 07:00 in Auckland, still the 2nd in UTC.
        let start = parse_timestamp("2025-06-02T19:00:00Z").unwrap();
        let end = parse_timestamp("2025-06-02T20:00:00Z").unwrap();
        cmd_block_add(&mut s, "Run".into(), None, start, end, Some(task.id.to_string()), None, None).unwrap();
        let t = s.store.task(&s.scope, task.id).unwrap().unwrap();
        assert_eq!(t.do_date, Some(d(2025, 6, 3)));

        // Tomorrow in Auckland, so not on today's list yet.
        let cockpit = cmd_today(&s, None, false).unwrap();
        assert_eq!(cockpit.today, d(2025, 6, 2));
        assert!(cockpit.tasks.iter().all(|t| t.id != task.id));
    });
}

#[test]
fn test_block_without_task_needs_context() {
    with_test_db(|mut s, _path| {
        let start = parse_timestamp("2025-06-03T09:00:00Z").unwrap();
        let end = parse_timestamp("2025-06-03T10:00:00Z").unwrap();
        assert!(cmd_block_add(&mut s, "Loose".into(), None, start, end, None, None, None).is_err());
        assert!(cmd_block_add(&mut s, "Loose".into(), Some(Context::DeepFocus), start, end, None, None, None).is_ok());
    });
}

#[test]
fn test_block_list_expands_repeats() {
    with_test_db(|mut s, _path| {
        let start = parse_timestamp("2025-06-02T07:00:00Z").unwrap();
        let end = parse_timestamp("2025-06-02T08:00:00Z").unwrap();
        cmd_block_add(&mut s, "Gym".into(), Some(Context::Health), start, end, None, None, Some("daily".into())).unwrap();

        let from = parse_timestamp("2025-06-02T00:00:00Z").unwrap();
        let to = parse_timestamp("2025-06-04T23:59:00Z").unwrap();
        assert_eq!(cmd_block_list(&s, Some(from), Some(to), false).unwrap().len(), 1);
        assert_eq!(cmd_block_list(&s, Some(from), Some(to), true).unwrap().len(), 3);
    });
}

#[test]
fn test_materialize_command_is_idempotent() {
    with_test_db(|mut s, _path| {
        let fields = TaskFields { recur: Some("FREQ=WEEKLY;BYDAY=MO,WE,FR".into()), do_date: Some(d(2025, 6, 2)), ..TaskFields::default() };
        cmd_task_add(&mut s, "Water plants".into(), Context::House, fields).unwrap();

        let first = cmd_materialize(&mut s, None, Some(d(2025, 6, 2)), Some(d(2025, 6, 8))).unwrap();
        assert_eq!(first.created, 3);
        let again = cmd_materialize(&mut s, None, None, None).unwrap();
        assert_eq!(again.skipped, 3);
        assert!(again.created > 0);
    });
}

#[test]
fn test_materialize_horizon_out_of_range() {
    with_test_db(|mut s, _path| {
        s.config.schedule.materialize_days = i64::MAX;
        assert!(matches!(cmd_materialize(&mut s, None, None, None), Err(Error::Config(_))));
        s.config.schedule.materialize_days = 1_000_000_000;
        assert!(matches!(cmd_materialize(&mut s, None, None, None), Err(Error::Config(_))));
        // An explicit end date does not need the horizon.
        assert!(cmd_materialize(&mut s, None, Some(d(2025, 6, 2)), Some(d(2025, 6, 3))).is_ok());
    });
}

#[test]
fn test_block_list_window_out_of_range() {
    with_test_db(|mut s, _path| {
        s.config.schedule.list_forward_days = i64::MAX;
        assert!(matches!(cmd_block_list(&s, None, None, false), Err(Error::Config(_))));
        let from = parse_timestamp("2025-06-01T00:00:00Z").unwrap();
        let to = parse_timestamp("2025-06-30T00:00:00Z").unwrap();
        assert!(cmd_block_list(&s, Some(from), Some(to), false).is_ok());
    });
}

#[test]
fn test_today_command() {
    with_test_db(|mut s, _path| {
        let committed = TaskFields { committed_date: Some(d(2025, 6, 1)), ..TaskFields::default() };
        cmd_task_add(&mut s, "Yesterday's promise".into(), Context::Family, committed).unwrap();
        let later = TaskFields { do_date: Some(d(2025, 6, 20)), ..TaskFields::default() };
        cmd_task_add(&mut s, "Later".into(), Context::Family, later).unwrap();

        let cockpit = cmd_today(&s, None, false).unwrap();
        let names: Vec<_> = cockpit.tasks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Yesterday's promise"]);
        assert!(cmd_today(&s, Some(Context::Work), true).unwrap().tasks.is_empty());
    });
}

#[test]
fn test_ambiguous_and_unknown_prefix() {
    with_test_db(|mut s, _path| {
        for i in 0..20 {
            cmd_task_add(&mut s, format!("Task {}", i), Context::Work, TaskFields::default()).unwrap();
        }
        assert!(resolve_task_id(&s.store, &s.scope, "").is_err());
        assert!(resolve_task_id(&s.store, &s.scope, "zz").is_err());
        let first = s.store.tasks(&s.scope).unwrap()[0].id;
        assert_eq!(resolve_task_id(&s.store, &s.scope, &first.to_string()).unwrap(), first);
    });
}

#[test]
fn test_migrate_command() {
    with_test_db(|_s, path| {
        std::fs::write(&path, r#"{"tasks": [], "focus_blocks": []}"#).unwrap();
        assert!(!cmd_migrate(&path, true).unwrap().changed());
    });
}

#[test]
fn test_parse_timestamp_forms() {
    assert!(parse_timestamp("2025-06-03T09:00:00Z").is_ok());
    assert!(parse_timestamp("2025-06-03T09:00:00+02:00").is_ok());
    assert!(parse_timestamp("2025-06-03T09:00").is_ok());
    assert!(parse_timestamp("2025-06-03 09:00").is_ok());
    assert!(parse_timestamp("tomorrow").is_err());
}
