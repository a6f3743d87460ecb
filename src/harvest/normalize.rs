// src/harvest/normalize.rs
//! # Record Normalizer
//!
//! Turns one window's raw rows into candidate records. The calendar
//! page only labels the first row of each date group and each time
//! group, so a running context carries the date and time-of-day forward
//! across rows. Everything here is pure; the harvest loop decides what
//! each outcome means for the cursor.
//!
//! A broken row never aborts the window. It becomes an [`Anomaly`] and
//! the context keeps whatever it had, so later rows still normalize.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::harvest::planner::Window;
use crate::harvest::types::{
    Anomaly, AnomalyReason, CalendarRecord, EventTime, RawRow, RowOutcome,
};

/// Running state scoped to one window. Only the date and the time carry
/// across rows; every other cell is read fresh per row.
#[derive(Debug, Clone, Copy)]
struct RowContext {
    date: NaiveDate,
    time: EventTime,
}

impl RowContext {
    /// Before the first date label shows up, undated rows belong to the
    /// window's first day at midnight.
    fn seed(window: &Window) -> Self {
        Self {
            date: window.anchor_date(),
            time: EventTime::At(NaiveTime::MIN),
        }
    }

    /// Best-effort instant for ledger entries when a row cannot be
    /// fully resolved. Pending rows get the 00:00:01 sentinel.
    fn best_effort(&self, tz: Tz) -> Option<DateTime<Tz>> {
        let time = match self.time {
            EventTime::At(t) => t,
            EventTime::AllDay => all_day_time(),
            EventTime::Pending => pending_time(),
        };
        tz.from_local_datetime(&self.date.and_time(time)).earliest()
    }
}

/// Normalize one window's rows in page order. Output order mirrors
/// input order and every row yields exactly one outcome.
pub fn normalize_window(window: &Window, rows: &[RawRow]) -> Vec<RowOutcome> {
    let tz = window.timezone();
    let mut ctx = RowContext::seed(window);
    rows.iter().map(|row| normalize_row(tz, &mut ctx, row)).collect()
}

fn normalize_row(tz: Tz, ctx: &mut RowContext, row: &RawRow) -> RowOutcome {
    if row.has_missing_cells() {
        return anomaly(tz, ctx, AnomalyReason::Malformed, row);
    }

    let date_label = row.date.as_deref().unwrap_or_default().trim();
    if !date_label.is_empty() {
        match resolve_date_label(date_label, ctx.date) {
            Some(date) => {
                ctx.date = date;
                // A fresh date group starts at midnight until the page
                // provides a time.
                ctx.time = EventTime::At(NaiveTime::MIN);
            }
            None => return anomaly(tz, ctx, AnomalyReason::Malformed, row),
        }
    }

    let time_label = row.time.as_deref().unwrap_or_default().trim();
    if !time_label.is_empty() {
        match resolve_time_label(time_label) {
            Some(time) => ctx.time = time,
            None => return anomaly(tz, ctx, AnomalyReason::Malformed, row),
        }
    }

    let time = match ctx.time {
        EventTime::At(t) => t,
        EventTime::AllDay => all_day_time(),
        EventTime::Pending => return anomaly(tz, ctx, AnomalyReason::Pending, row),
    };
    let timestamp = match tz.from_local_datetime(&ctx.date.and_time(time)).earliest() {
        Some(ts) => ts,
        // A wall-clock reading inside a DST gap: the page and the zone
        // disagree, so the row goes to the ledger instead of a guess.
        None => return anomaly(tz, ctx, AnomalyReason::Malformed, row),
    };

    let cell = |value: &Option<String>| value.as_deref().unwrap_or_default().trim().to_string();
    RowOutcome::Record(CalendarRecord {
        timestamp,
        currency: cell(&row.currency),
        impact: cell(&row.impact),
        event: cell(&row.event),
        actual: cell(&row.actual),
        forecast: cell(&row.forecast),
        previous: cell(&row.previous),
    })
}

fn anomaly(tz: Tz, ctx: &RowContext, reason: AnomalyReason, row: &RawRow) -> RowOutcome {
    RowOutcome::Anomaly(Anomaly {
        timestamp: ctx.best_effort(tz),
        reason,
        row: row.clone(),
    })
}

/// End-of-day marker stored for all-day events.
fn all_day_time() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).expect("23:59:59 is a valid time")
}

/// Ledger sentinel for rows whose time the source has not published.
fn pending_time() -> NaiveTime {
    NaiveTime::from_hms_opt(0, 0, 1).expect("00:00:01 is a valid time")
}

/// Parse a date label like `SunDec 31`, `MonJan 1` or `Jan 1` against
/// the running date. Labels carry no year; it comes from the running
/// date, bumped by one when the label jumps backwards across New Year
/// (the page lists rows chronologically, so `Dec 31` followed by
/// `Jan 1` can only mean the next year).
fn resolve_date_label(label: &str, running: NaiveDate) -> Option<NaiveDate> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^(?:[A-Za-z]{3})?([A-Za-z]{3})(\d{1,2})$").expect("date label regex")
    });

    let compact: String = label.chars().filter(|c| !c.is_whitespace()).collect();
    let caps = re.captures(&compact)?;
    let month = &caps[1];
    let day = &caps[2];
    let with_year =
        |year: i32| NaiveDate::parse_from_str(&format!("{year} {month} {day}"), "%Y %b %d").ok();

    let candidate = with_year(running.year())?;
    if candidate < running {
        with_year(running.year() + 1)
    } else {
        Some(candidate)
    }
}

/// Resolve a time cell: a literal `h:mmam`/`h:mmpm` reading or one of
/// the two token forms the source uses for non-literal times.
fn resolve_time_label(label: &str) -> Option<EventTime> {
    let lower = label.to_ascii_lowercase();
    if lower.contains("day") {
        return Some(EventTime::AllDay);
    }
    if lower.contains("data") {
        return Some(EventTime::Pending);
    }

    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^(\d{1,2}):(\d{2})\s*(am|pm)$").expect("time label regex")
    });
    let caps = re.captures(&lower)?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    if !(1..=12).contains(&hour) {
        return None;
    }
    let hour = hour % 12 + if &caps[3] == "pm" { 12 } else { 0 };
    NaiveTime::from_hms_opt(hour, minute, 0).map(EventTime::At)
}
