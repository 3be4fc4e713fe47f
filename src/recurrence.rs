//! Recurrence rule evaluation.
//!
//! Rules are a date-granular subset of the RFC 5545 `RRULE` value:
//! `FREQ` (DAILY, WEEKLY, MONTHLY, YEARLY), `INTERVAL`, `COUNT`, `UNTIL`,
//! `BYDAY` (with signed ordinals for monthly and yearly rules), `BYMONTHDAY`,
//! `BYMONTH` and `WKST`. The shorthands `daily`, `weekly`, `monthly` and
//! `yearly` are accepted as well.
//!
//! Everything here is pure: no clock, no timezone. Dates are calendar days.

use std::str::FromStr;

use chrono::{Datelike, Duration, Months, NaiveDate, Weekday};
use tracing::{debug, warn};

use crate::models::Task;

/// Upper bound on periods walked for one expansion. Keeps unsatisfiable rules
/// (e.g. `FREQ=YEARLY;BYMONTH=2;BYMONTHDAY=30`) from looping forever.
const MAX_PERIODS: u32 = 20_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("recurrence rule is empty")]
    Empty,
    #[error("malformed rule part '{0}', expected KEY=VALUE")]
    MalformedPart(String),
    #[error("unsupported rule key '{0}'")]
    UnknownKey(String),
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
    #[error("rule has no FREQ")]
    MissingFrequency,
    #[error("frequency '{0}' is not supported, use DAILY, WEEKLY, MONTHLY or YEARLY")]
    UnsupportedFrequency(String),
    #[error("COUNT and UNTIL cannot be combined")]
    CountWithUntil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// One `BYDAY` entry: a weekday, optionally the n-th (or n-th from the end)
/// of its month or year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekdaySpec {
    pub weekday: Weekday,
    pub ordinal: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    pub interval: u32,
    pub count: Option<u32>,
    /// Inclusive.
    pub until: Option<NaiveDate>,
    pub by_day: Vec<WeekdaySpec>,
    pub by_month_day: Vec<i32>,
    pub by_month: Vec<u32>,
    pub week_start: Weekday,
}

impl RecurrenceRule {
    pub fn every(frequency: Frequency) -> Self {
        Self {
            frequency,
            interval: 1,
            count: None,
            until: None,
            by_day: Vec::new(),
            by_month_day: Vec::new(),
            by_month: Vec::new(),
            week_start: Weekday::Mon,
        }
    }

    /// Strict parse. Use [`expand_occurrences`] for the fail-soft path.
    pub fn parse(input: &str) -> Result<Self, RuleError> {
        let body = rule_body(input);
        if body.is_empty() {
            return Err(RuleError::Empty);
        }

        match body.to_ascii_lowercase().as_str() {
            "daily" => return Ok(Self::every(Frequency::Daily)),
            "weekly" => return Ok(Self::every(Frequency::Weekly)),
            "monthly" => return Ok(Self::every(Frequency::Monthly)),
            "yearly" | "annually" => return Ok(Self::every(Frequency::Yearly)),
            _ => {}
        }

        let mut frequency = None;
        let mut rule = Self::every(Frequency::Daily);

        for part in body.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| RuleError::MalformedPart(part.to_string()))?;
            let key = key.trim().to_ascii_uppercase();
            let value = value.trim();
            match key.as_str() {
                "FREQ" => frequency = Some(parse_frequency(value)?),
                "INTERVAL" => rule.interval = parse_positive(&key, value)?,
                "COUNT" => rule.count = Some(parse_positive(&key, value)?),
                "UNTIL" => {
                    rule.until = Some(parse_calendar_date(value).ok_or_else(|| invalid(&key, value))?)
                }
                "BYDAY" => {
                    rule.by_day = split_list(value)
                        .map(|v| parse_weekday_spec(v).ok_or_else(|| invalid(&key, v)))
                        .collect::<Result<_, _>>()?
                }
                "BYMONTHDAY" => {
                    rule.by_month_day = split_list(value)
                        .map(|v| match v.parse::<i32>() {
                            Ok(n) if n != 0 && (-31..=31).contains(&n) => Ok(n),
                            _ => Err(invalid(&key, v)),
                        })
                        .collect::<Result<_, _>>()?
                }
                "BYMONTH" => {
                    rule.by_month = split_list(value)
                        .map(|v| match v.parse::<u32>() {
                            Ok(n) if (1..=12).contains(&n) => Ok(n),
                            _ => Err(invalid(&key, v)),
                        })
                        .collect::<Result<_, _>>()?
                }
                "WKST" => rule.week_start = parse_weekday(value).ok_or_else(|| invalid(&key, value))?,
                _ => return Err(RuleError::UnknownKey(key)),
            }
        }

        rule.frequency = frequency.ok_or(RuleError::MissingFrequency)?;
        if rule.count.is_some() && rule.until.is_some() {
            return Err(RuleError::CountWithUntil);
        }
        if matches!(rule.frequency, Frequency::Daily | Frequency::Weekly) {
            if let Some(spec) = rule.by_day.iter().find(|s| s.ordinal.is_some()) {
                let ordinal = spec.ordinal.unwrap_or_default();
                return Err(invalid("BYDAY", &format!("{}{:?}", ordinal, spec.weekday)));
            }
        }
        Ok(rule)
    }

    /// Occurrence dates in `[window_start, window_end]`, ascending.
    ///
    /// Only dates on or after `anchor` that match the rule count; `COUNT` is
    /// counted from the anchor.
    pub fn occurrences(&self, anchor: NaiveDate, window_start: NaiveDate, window_end: NaiveDate) -> Vec<NaiveDate> {
        let mut out = Vec::new();
        if window_start > window_end {
            return out;
        }
        let last = match self.until {
            Some(until) => until.min(window_end),
            None => window_end,
        };
        if last < anchor {
            return out;
        }

        let first_period = if self.count.is_some() {
            0
        } else {
            self.skip_periods(anchor, window_start)
        };

        let mut emitted = 0u32;
        let mut capped = true;
        for n in first_period..first_period.saturating_add(MAX_PERIODS) {
            let Some(start) = self.period_start(anchor, n) else {
                capped = false;
                break;
            };
            if start > last {
                capped = false;
                break;
            }
            for date in self.dates_in_period(anchor, start) {
                if date < anchor {
                    continue;
                }
                if date > last {
                    return out;
                }
                if let Some(count) = self.count {
                    if emitted >= count {
                        return out;
                    }
                }
                emitted += 1;
                if date >= window_start {
                    out.push(date);
                }
            }
        }
        if capped {
            warn!(
                frequency = ?self.frequency,
                periods = MAX_PERIODS,
                found = out.len(),
                %window_end,
                "recurrence expansion stopped at the period limit; later dates are missing"
            );
        } else {
            debug!(frequency = ?self.frequency, found = out.len(), "expanded recurrence");
        }
        out
    }

    /// Number of whole periods that end before `window_start`. Safe to jump
    /// over when no `COUNT` has to be tallied.
    fn skip_periods(&self, anchor: NaiveDate, window_start: NaiveDate) -> u32 {
        if window_start <= anchor {
            return 0;
        }
        let interval = i64::from(self.interval.max(1));
        let periods = match self.frequency {
            Frequency::Daily => (window_start - anchor).num_days() / interval,
            Frequency::Weekly => (window_start - week_start_of(anchor, self.week_start)).num_days() / (7 * interval),
            Frequency::Monthly => {
                let months = (i64::from(window_start.year()) - i64::from(anchor.year())) * 12
                    + i64::from(window_start.month()) - i64::from(anchor.month());
                months / interval
            }
            Frequency::Yearly => (i64::from(window_start.year()) - i64::from(anchor.year())) / interval,
        };
        u32::try_from(periods.saturating_sub(1).max(0)).unwrap_or(u32::MAX - MAX_PERIODS)
    }

    fn period_start(&self, anchor: NaiveDate, n: u32) -> Option<NaiveDate> {
        let steps = n.checked_mul(self.interval.max(1))?;
        match self.frequency {
            Frequency::Daily => anchor.checked_add_signed(Duration::days(i64::from(steps))),
            Frequency::Weekly => week_start_of(anchor, self.week_start)
                .checked_add_signed(Duration::weeks(i64::from(steps))),
            Frequency::Monthly => first_of_month(anchor).checked_add_months(Months::new(steps)),
            Frequency::Yearly => {
                let year = anchor.year().checked_add(i32::try_from(steps).ok()?)?;
                NaiveDate::from_ymd_opt(year, 1, 1)
            }
        }
    }

    /// Matching dates inside the period beginning at `start`, ascending.
    fn dates_in_period(&self, anchor: NaiveDate, start: NaiveDate) -> Vec<NaiveDate> {
        let mut dates = match self.frequency {
            Frequency::Daily => {
                let matches_day = self.by_day.is_empty()
                    || self.by_day.iter().any(|s| s.weekday == start.weekday());
                if matches_day && self.month_day_matches(start) {
                    vec![start]
                } else {
                    Vec::new()
                }
            }
            Frequency::Weekly => {
                let weekdays: Vec<Weekday> = if self.by_day.is_empty() {
                    vec![anchor.weekday()]
                } else {
                    self.by_day.iter().map(|s| s.weekday).collect()
                };
                weekdays
                    .into_iter()
                    .filter_map(|w| start.checked_add_signed(Duration::days(days_after(self.week_start, w))))
                    .filter(|d| self.month_day_matches(*d))
                    .collect()
            }
            Frequency::Monthly => self.dates_in_month(anchor, start.year(), start.month()),
            Frequency::Yearly => self.dates_in_year(anchor, start.year()),
        };
        if !self.by_month.is_empty() {
            dates.retain(|d| self.by_month.contains(&d.month()));
        }
        dates.sort_unstable();
        dates.dedup();
        dates
    }

    fn dates_in_year(&self, anchor: NaiveDate, year: i32) -> Vec<NaiveDate> {
        if !self.by_month.is_empty() {
            return self
                .by_month
                .iter()
                .flat_map(|&m| self.dates_in_month(anchor, year, m))
                .collect();
        }
        if !self.by_day.is_empty() && self.by_month_day.is_empty() {
            // Ordinals count within the year when no BYMONTH narrows it.
            let (Some(first), Some(last)) = (
                NaiveDate::from_ymd_opt(year, 1, 1),
                NaiveDate::from_ymd_opt(year, 12, 31),
            ) else {
                return Vec::new();
            };
            return weekday_dates(first, last, &self.by_day);
        }
        if !self.by_month_day.is_empty() {
            return (1..=12).flat_map(|m| self.dates_in_month(anchor, year, m)).collect();
        }
        NaiveDate::from_ymd_opt(year, anchor.month(), anchor.day())
            .into_iter()
            .collect()
    }

    fn dates_in_month(&self, anchor: NaiveDate, year: i32, month: u32) -> Vec<NaiveDate> {
        let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
            return Vec::new();
        };
        let last = last_of_month(first);

        if !self.by_month_day.is_empty() {
            let mut days: Vec<NaiveDate> = self
                .by_month_day
                .iter()
                .filter_map(|&d| resolve_month_day(first, last, d))
                .collect();
            if !self.by_day.is_empty() {
                let allowed = weekday_dates(first, last, &self.by_day);
                days.retain(|d| allowed.contains(d));
            }
            return days;
        }
        if !self.by_day.is_empty() {
            return weekday_dates(first, last, &self.by_day);
        }
        // Months without the anchor's day are skipped, not clamped.
        NaiveDate::from_ymd_opt(year, month, anchor.day()).into_iter().collect()
    }

    fn month_day_matches(&self, date: NaiveDate) -> bool {
        if self.by_month_day.is_empty() {
            return true;
        }
        let first = first_of_month(date);
        let last = last_of_month(first);
        self.by_month_day
            .iter()
            .any(|&d| resolve_month_day(first, last, d) == Some(date))
    }
}

impl FromStr for RecurrenceRule {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecurrenceRule::parse(s)
    }
}

/// Occurrence dates of `rule` in `[window_start, window_end]`, ascending.
///
/// A rule that does not parse is logged and yields no occurrences.
pub fn expand_occurrences(
    rule: &str,
    anchor: NaiveDate,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> Vec<NaiveDate> {
    match RecurrenceRule::parse(rule) {
        Ok(parsed) => parsed.occurrences(anchor, window_start, window_end),
        Err(e) => {
            warn!(rule, error = %e, "ignoring unparseable recurrence rule");
            Vec::new()
        }
    }
}

/// The date a task's recurrence counts from: `do_date`, then `due_date`,
/// then the day it was created.
pub fn anchor_date(task: &Task) -> NaiveDate {
    task.do_date
        .or(task.due_date)
        .unwrap_or_else(|| task.created_at.date_naive())
}

/// Reads a calendar date from `YYYY-MM-DD`, `YYYYMMDD`, or the date part of a
/// longer timestamp string. No timezone is applied.
pub fn parse_calendar_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Some(head) = s.get(..10) {
        if let Ok(d) = NaiveDate::parse_from_str(head, "%Y-%m-%d") {
            return Some(d);
        }
    }
    let head = s.get(..8)?;
    if !head.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(head, "%Y%m%d").ok()
}

fn rule_body(input: &str) -> &str {
    let line = input
        .lines()
        .map(str::trim)
        .find(|l| l.get(..6).is_some_and(|p| p.eq_ignore_ascii_case("RRULE:")))
        .unwrap_or_else(|| input.trim());
    match line.get(..6) {
        Some(prefix) if prefix.eq_ignore_ascii_case("RRULE:") => line[6..].trim(),
        _ => line,
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|v| !v.is_empty())
}

fn invalid(key: &str, value: &str) -> RuleError {
    RuleError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_frequency(value: &str) -> Result<Frequency, RuleError> {
    match value.to_ascii_uppercase().as_str() {
        "DAILY" => Ok(Frequency::Daily),
        "WEEKLY" => Ok(Frequency::Weekly),
        "MONTHLY" => Ok(Frequency::Monthly),
        "YEARLY" => Ok(Frequency::Yearly),
        "HOURLY" | "MINUTELY" | "SECONDLY" => Err(RuleError::UnsupportedFrequency(value.to_string())),
        _ => Err(invalid("FREQ", value)),
    }
}

fn parse_positive(key: &str, value: &str) -> Result<u32, RuleError> {
    match value.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(invalid(key, value)),
    }
}

fn parse_weekday(code: &str) -> Option<Weekday> {
    match code.to_ascii_uppercase().as_str() {
        "MO" => Some(Weekday::Mon),
        "TU" => Some(Weekday::Tue),
        "WE" => Some(Weekday::Wed),
        "TH" => Some(Weekday::Thu),
        "FR" => Some(Weekday::Fri),
        "SA" => Some(Weekday::Sat),
        "SU" => Some(Weekday::Sun),
        _ => None,
    }
}

fn parse_weekday_spec(value: &str) -> Option<WeekdaySpec> {
    let split = value.len().checked_sub(2)?;
    let (ordinal, code) = (value.get(..split)?, value.get(split..)?);
    let weekday = parse_weekday(code)?;
    if ordinal.is_empty() {
        return Some(WeekdaySpec { weekday, ordinal: None });
    }
    let n: i32 = ordinal.trim_start_matches('+').parse().ok()?;
    if n == 0 || !(-53..=53).contains(&n) {
        return None;
    }
    Some(WeekdaySpec { weekday, ordinal: Some(n) })
}

fn days_after(week_start: Weekday, weekday: Weekday) -> i64 {
    i64::from((weekday.num_days_from_monday() + 7 - week_start.num_days_from_monday()) % 7)
}

fn week_start_of(date: NaiveDate, week_start: Weekday) -> NaiveDate {
    date - Duration::days(days_after(week_start, date.weekday()))
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn last_of_month(first: NaiveDate) -> NaiveDate {
    first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(first)
}

fn resolve_month_day(first: NaiveDate, last: NaiveDate, day: i32) -> Option<NaiveDate> {
    let len = i32::try_from(last.day()).ok()?;
    let resolved = if day > 0 { day } else { len + day + 1 };
    if resolved < 1 || resolved > len {
        return None;
    }
    first.with_day(u32::try_from(resolved).ok()?)
}

/// Dates in `[first, last]` matching any of `specs`, with ordinals counted
/// inside that span.
fn weekday_dates(first: NaiveDate, last: NaiveDate, specs: &[WeekdaySpec]) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    for spec in specs {
        let offset = (spec.weekday.num_days_from_monday() + 7 - first.weekday().num_days_from_monday()) % 7;
        let matching: Vec<NaiveDate> = first
            .iter_days()
            .skip(offset as usize)
            .step_by(7)
            .take_while(|d| *d <= last)
            .collect();
        match spec.ordinal {
            None => out.extend(matching),
            Some(n) if n > 0 => out.extend(matching.get((n - 1) as usize).copied()),
            Some(n) => {
                let back = n.unsigned_abs() as usize;
                if back <= matching.len() {
                    out.push(matching[matching.len() - back]);
                }
            }
        }
    }
    out.sort_unstable();
    out.dedup();
    out
}
