use chrono::{Datelike, NaiveDate, Weekday};
use focusdeck::recurrence::{expand_occurrences, parse_calendar_date, Frequency, RecurrenceRule, RuleError};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

#[test]
fn test_weekly_byday_in_one_week() {
    let dates = expand_occurrences("FREQ=WEEKLY;BYDAY=MO,WE,FR", d(2025, 6, 2), d(2025, 6, 2), d(2025, 6, 8));
    assert_eq!(dates, vec![d(2025, 6, 2), d(2025, 6, 4), d(2025, 6, 6)]);
}

#[test]
fn test_unparseable_rule_yields_nothing() {
    assert!(expand_occurrences("NOT_A_RULE", d(2025, 6, 2), d(2025, 6, 1), d(2025, 7, 1)).is_empty());
    assert!(expand_occurrences("", d(2025, 6, 2), d(2025, 6, 1), d(2025, 7, 1)).is_empty());
    assert!(expand_occurrences("FREQ=FORTNIGHTLY", d(2025, 6, 2), d(2025, 6, 1), d(2025, 7, 1)).is_empty());
}

#[test]
fn test_window_start_after_end_is_empty() {
    assert!(expand_occurrences("daily", d(2025, 6, 1), d(2025, 6, 10), d(2025, 6, 5)).is_empty());
}

#[test]
fn test_results_sorted_and_inside_window() {
    let start = d(2025, 3, 10);
    let end = d(2025, 5, 20);
    let dates = expand_occurrences("FREQ=WEEKLY;BYDAY=FR,MO;INTERVAL=2", d(2025, 1, 6), start, end);
    assert!(!dates.is_empty());
    assert!(dates.windows(2).all(|w| w[0] < w[1]));
    assert!(dates.iter().all(|x| *x >= start && *x <= end));
    assert!(dates.iter().all(|x| matches!(x.weekday(), Weekday::Mon | Weekday::Fri)));
}

#[test]
fn test_shorthands() {
    assert_eq!(RecurrenceRule::parse("daily").unwrap().frequency, Frequency::Daily);
    assert_eq!(RecurrenceRule::parse("Weekly").unwrap().frequency, Frequency::Weekly);
    assert_eq!(RecurrenceRule::parse("monthly").unwrap().frequency, Frequency::Monthly);
    assert_eq!(RecurrenceRule::parse("yearly").unwrap().frequency, Frequency::Yearly);

    let dates = expand_occurrences("daily", d(2025, 6, 1), d(2025, 6, 1), d(2025, 6, 3));
    assert_eq!(dates, vec![d(2025, 6, 1), d(2025, 6, 2), d(2025, 6, 3)]);
}

#[test]
fn test_rrule_prefix_and_multiline() {
    let block = "DTSTART:20250602T090000Z\nRRULE:FREQ=DAILY;COUNT=2";
    let dates = expand_occurrences(block, d(2025, 6, 2), d(2025, 6, 1), d(2025, 6, 30));
    assert_eq!(dates, vec![d(2025, 6, 2), d(2025, 6, 3)]);

    let prefixed = expand_occurrences("RRULE:FREQ=DAILY;COUNT=1", d(2025, 6, 2), d(2025, 6, 1), d(2025, 6, 30));
    assert_eq!(prefixed, vec![d(2025, 6, 2)]);
}

#[test]
fn test_count_is_counted_from_anchor() {
    // Three occurrences total, two of which fall before the window.
    let dates = expand_occurrences("FREQ=DAILY;COUNT=3", d(2025, 6, 1), d(2025, 6, 3), d(2025, 6, 30));
    assert_eq!(dates, vec![d(2025, 6, 3)]);
}

#[test]
fn test_until_is_inclusive() {
    let dates = expand_occurrences("FREQ=DAILY;UNTIL=20250604", d(2025, 6, 1), d(2025, 6, 1), d(2025, 6, 30));
    assert_eq!(dates.last(), Some(&d(2025, 6, 4)));
    assert_eq!(dates.len(), 4);

    let dashed = expand_occurrences("FREQ=DAILY;UNTIL=2025-06-02T23:59:59Z", d(2025, 6, 1), d(2025, 6, 1), d(2025, 6, 30));
    assert_eq!(dashed, vec![d(2025, 6, 1), d(2025, 6, 2)]);
}

#[test]
fn test_count_with_until_rejected() {
    assert_eq!(
        RecurrenceRule::parse("FREQ=DAILY;COUNT=3;UNTIL=20250601"),
        Err(RuleError::CountWithUntil)
    );
}

#[test]
fn test_month_day_31_skips_short_months() {
    let dates = expand_occurrences("FREQ=MONTHLY;BYMONTHDAY=31", d(2025, 1, 31), d(2025, 1, 1), d(2025, 5, 31));
    assert_eq!(dates, vec![d(2025, 1, 31), d(2025, 3, 31), d(2025, 5, 31)]);
}

#[test]
fn test_monthly_without_byday_uses_anchor_day() {
    let dates = expand_occurrences("monthly", d(2025, 1, 30), d(2025, 1, 1), d(2025, 4, 30));
    assert_eq!(dates, vec![d(2025, 1, 30), d(2025, 3, 30), d(2025, 4, 30)]);
}

#[test]
fn test_last_friday_of_month() {
    let dates = expand_occurrences("FREQ=MONTHLY;BYDAY=-1FR", d(2025, 1, 1), d(2025, 1, 1), d(2025, 3, 31));
    assert_eq!(dates, vec![d(2025, 1, 31), d(2025, 2, 28), d(2025, 3, 28)]);
}

#[test]
fn test_second_tuesday_of_month() {
    let dates = expand_occurrences("FREQ=MONTHLY;BYDAY=2TU", d(2025, 1, 1), d(2025, 1, 1), d(2025, 2, 28));
    assert_eq!(dates, vec![d(2025, 1, 14), d(2025, 2, 11)]);
}

#[test]
fn test_ordinal_rejected_for_weekly() {
    assert!(matches!(
        RecurrenceRule::parse("FREQ=WEEKLY;BYDAY=1MO"),
        Err(RuleError::InvalidValue { .. })
    ));
}

#[test]
fn test_yearly_bymonth() {
    let dates = expand_occurrences("FREQ=YEARLY;BYMONTH=3;BYMONTHDAY=15", d(2024, 1, 1), d(2024, 1, 1), d(2026, 12, 31));
    assert_eq!(dates, vec![d(2024, 3, 15), d(2025, 3, 15), d(2026, 3, 15)]);
}

#[test]
fn test_dates_before_anchor_never_emitted() {
    let dates = expand_occurrences("FREQ=WEEKLY;BYDAY=MO,FR", d(2025, 6, 4), d(2025, 6, 1), d(2025, 6, 10));
    assert_eq!(dates, vec![d(2025, 6, 6), d(2025, 6, 9)]);
}

#[test]
fn test_far_window_without_count() {
    let dates = expand_occurrences("FREQ=DAILY;INTERVAL=3", d(2000, 1, 1), d(2030, 1, 1), d(2030, 1, 10));
    assert!(!dates.is_empty());
    assert!(dates.iter().all(|x| (*x - d(2000, 1, 1)).num_days() % 3 == 0));
}

#[test]
fn test_expansion_stops_at_period_limit() {
    // 20 000 daily periods from 2025-01-01 end on 2079-10-04.
    let dates = expand_occurrences("FREQ=DAILY", d(2025, 1, 1), d(2025, 1, 1), d(2100, 12, 31));
    assert_eq!(dates.len(), 20_000);
    assert_eq!(dates.last().copied(), Some(d(2025, 1, 1) + chrono::Duration::days(19_999)));

    // COUNT walks from the anchor, so a window past the limit sees nothing.
    let counted = expand_occurrences("FREQ=DAILY;COUNT=100000", d(1900, 1, 1), d(2000, 1, 1), d(2000, 1, 10));
    assert!(counted.is_empty());
}

#[test]
fn test_unsupported_frequency_and_unknown_key() {
    assert!(matches!(
        RecurrenceRule::parse("FREQ=HOURLY"),
        Err(RuleError::UnsupportedFrequency(_))
    ));
    assert!(matches!(
        RecurrenceRule::parse("FREQ=DAILY;BYSETPOS=1"),
        Err(RuleError::UnknownKey(_))
    ));
    assert_eq!(RecurrenceRule::parse("INTERVAL=2"), Err(RuleError::MissingFrequency));
}

#[test]
fn test_parse_calendar_date_forms() {
    assert_eq!(parse_calendar_date("2025-06-02"), Some(d(2025, 6, 2)));
    assert_eq!(parse_calendar_date("20250602T090000Z"), Some(d(2025, 6, 2)));
    assert_eq!(parse_calendar_date("2025-06-02T09:00:00+02:00"), Some(d(2025, 6, 2)));
    assert_eq!(parse_calendar_date("June"), None);
}
