// src/harvest/planner.rs
//! # Window Planner
//!
//! Pure mapping from `(cursor, now)` to the next crawl window. No I/O
//! lives here; everything is a function of its arguments, which is what
//! makes backfill behavior testable with a fixed clock.
//!
//! Policy: fetch the largest unit that is already complete. A month
//! window when the cursor sits on a month boundary and that month has
//! fully elapsed, a week window on a Sunday boundary, otherwise single
//! days. Today is fetchable while still in progress so same-day events
//! land as they finalize.

use chrono::{DateTime, Datelike, Days, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Weekday};
use chrono_tz::Tz;

/// Fetch unit size. The string form exists only at the fetch boundary
/// (see [`Window::id`]); internal logic stays on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Month,
    Week,
    Day,
}

impl Granularity {
    fn key(self) -> &'static str {
        match self {
            Granularity::Month => "month",
            Granularity::Week => "week",
            Granularity::Day => "day",
        }
    }
}

/// One planned fetch unit: a granularity anchored at a local midnight
/// in the source timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    granularity: Granularity,
    start: DateTime<Tz>,
}

impl Window {
    /// Callers normally obtain windows from [`next_window`]; this exists
    /// for manual one-off fetches and tests. `start` should be a local
    /// midnight on the unit's natural boundary.
    pub fn new(granularity: Granularity, start: DateTime<Tz>) -> Self {
        Self { granularity, start }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn start(&self) -> DateTime<Tz> {
        self.start
    }

    pub fn timezone(&self) -> Tz {
        self.start.timezone()
    }

    /// The date rows inherit at the top of the window until the page
    /// provides its first date label.
    pub fn anchor_date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    /// Exclusive end boundary: local midnight opening the following
    /// unit. Also the cursor target once the window is fully processed.
    /// Weeks are 7 calendar days, which across a DST shift is not 168
    /// absolute hours.
    pub fn end(&self) -> DateTime<Tz> {
        let date = self.start.date_naive();
        let next = match self.granularity {
            Granularity::Month => first_of_next_month(date),
            Granularity::Week => date + Days::new(7),
            Granularity::Day => date + Days::new(1),
        };
        local_midnight(self.timezone(), next)
    }

    /// Fetch key in the source's query notation: `month=jan.2007`,
    /// `week=jan7.2007`, `day=jan1.2007`. Month names are lowercase and
    /// day numbers are unpadded.
    pub fn id(&self) -> String {
        let date = self.start.date_naive();
        let month = date.format("%b").to_string().to_ascii_lowercase();
        match self.granularity {
            Granularity::Month => format!("{}={}.{}", self.granularity.key(), month, date.year()),
            Granularity::Week | Granularity::Day => format!(
                "{}={}{}.{}",
                self.granularity.key(),
                month,
                date.day(),
                date.year()
            ),
        }
    }
}

/// Next window to fetch for `cursor`, or `None` when the calendar is
/// caught up (normal termination, not an error).
///
/// Rules, in priority order:
/// 1. cursor on the first local midnight of a fully elapsed month: that
///    month.
/// 2. cursor on a Sunday local midnight whose week is fully elapsed:
///    that week, unless the week contains the first day of a month that
///    has itself fully elapsed; then narrow to a day so the new month
///    stays fetchable as one month window.
/// 3. cursor on any day that is fully elapsed, or on today: that day.
/// 4. otherwise exhausted.
pub fn next_window(cursor: DateTime<Tz>, now: DateTime<Tz>) -> Option<Window> {
    let tz = cursor.timezone();
    let date = cursor.date_naive();
    let start = local_midnight(tz, date);
    let on_boundary = cursor == start;

    if on_boundary && date.day() == 1 && boundary_passed(tz, first_of_next_month(date), now) {
        return Some(Window::new(Granularity::Month, start));
    }

    if on_boundary && date.weekday() == Weekday::Sun && boundary_passed(tz, date + Days::new(7), now) {
        for offset in 0..7 {
            let day = date + Days::new(offset);
            if day.day() == 1 && boundary_passed(tz, first_of_next_month(day), now) {
                return Some(Window::new(Granularity::Day, start));
            }
        }
        return Some(Window::new(Granularity::Week, start));
    }

    if boundary_passed(tz, date + Days::new(1), now) || date == now.date_naive() {
        return Some(Window::new(Granularity::Day, start));
    }

    None
}

/// A unit ending at `boundary`'s local midnight is complete once that
/// midnight is at or before `now`.
fn boundary_passed(tz: Tz, boundary: NaiveDate, now: DateTime<Tz>) -> bool {
    local_midnight(tz, boundary) <= now
}

fn first_of_next_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).expect("first of month is always a valid date")
}

/// Local midnight of `date` in `tz`. US Eastern shifts clocks at 02:00,
/// so midnight is unambiguous there; the fallback loop covers zones
/// whose transitions touch midnight (a skipped midnight resolves to the
/// first existing instant of the day).
pub(crate) fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Tz> {
    let mut local = date.and_time(NaiveTime::MIN);
    for _ in 0..3 {
        match tz.from_local_datetime(&local) {
            LocalResult::Single(dt) => return dt,
            LocalResult::Ambiguous(earliest, _) => return earliest,
            LocalResult::None => local = local + Duration::hours(1),
        }
    }
    tz.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;

    fn eastern(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Tz> {
        New_York
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
    }

    #[test]
    fn complete_month_planned_as_month_window() {
        let w = next_window(eastern(2020, 1, 1, 0, 0), eastern(2020, 3, 15, 10, 0)).unwrap();
        assert_eq!(w.granularity(), Granularity::Month);
        assert_eq!(w.id(), "month=jan.2020");
        assert_eq!(w.end(), eastern(2020, 2, 1, 0, 0));
    }

    #[test]
    fn month_complete_exactly_at_boundary() {
        // now == the next month's midnight counts as complete.
        let w = next_window(eastern(2020, 1, 1, 0, 0), eastern(2020, 2, 1, 0, 0)).unwrap();
        assert_eq!(w.id(), "month=jan.2020");
    }

    #[test]
    fn incomplete_month_falls_through_to_week() {
        // 2020-03-01 is a Sunday; March has not elapsed by mid-March, so
        // the month rule must not fire, but the first week has.
        let w = next_window(eastern(2020, 3, 1, 0, 0), eastern(2020, 3, 15, 10, 0)).unwrap();
        assert_eq!(w.granularity(), Granularity::Week);
        assert_eq!(w.id(), "week=mar1.2020");
        assert_eq!(w.end(), eastern(2020, 3, 8, 0, 0));
    }

    #[test]
    fn non_sunday_cursor_plans_days() {
        // 2007-01-01 is a Monday: neither the month nor a week can start
        // here once January is still in progress.
        let w = next_window(eastern(2007, 1, 1, 0, 0), eastern(2007, 1, 8, 12, 0)).unwrap();
        assert_eq!(w.granularity(), Granularity::Day);
        assert_eq!(w.id(), "day=jan1.2007");
    }

    #[test]
    fn sunday_cursor_with_elapsed_week_plans_week() {
        let w = next_window(eastern(2007, 1, 7, 0, 0), eastern(2007, 1, 15, 8, 0)).unwrap();
        assert_eq!(w.granularity(), Granularity::Week);
        assert_eq!(w.id(), "week=jan7.2007");
        assert_eq!(w.anchor_date(), NaiveDate::from_ymd_opt(2007, 1, 7).unwrap());
    }

    #[test]
    fn week_containing_complete_month_start_narrows_to_day() {
        // 2007-04-29 is a Sunday and its week contains May 1. Once May
        // has fully elapsed the planner walks up to the month boundary
        // day by day instead of splitting May across a week window.
        let w = next_window(eastern(2007, 4, 29, 0, 0), eastern(2007, 6, 2, 0, 0)).unwrap();
        assert_eq!(w.granularity(), Granularity::Day);
        assert_eq!(w.id(), "day=apr29.2007");
    }

    #[test]
    fn week_keeps_width_while_contained_month_is_incomplete() {
        let w = next_window(eastern(2007, 4, 29, 0, 0), eastern(2007, 5, 10, 0, 0)).unwrap();
        assert_eq!(w.granularity(), Granularity::Week);
        assert_eq!(w.id(), "week=apr29.2007");
    }

    #[test]
    fn today_is_fetchable_while_in_progress() {
        let w = next_window(eastern(2007, 1, 8, 0, 0), eastern(2007, 1, 8, 12, 0)).unwrap();
        assert_eq!(w.granularity(), Granularity::Day);
        assert_eq!(w.id(), "day=jan8.2007");
    }

    #[test]
    fn future_cursor_is_exhausted() {
        assert_eq!(next_window(eastern(2007, 1, 9, 0, 0), eastern(2007, 1, 8, 12, 0)), None);
    }

    #[test]
    fn midday_cursor_never_widens() {
        // Off-boundary cursors only ever plan the cursor's own day, even
        // on the first of a long-elapsed month.
        let w = next_window(eastern(2007, 3, 1, 8, 30), eastern(2007, 4, 15, 0, 0)).unwrap();
        assert_eq!(w.granularity(), Granularity::Day);
        assert_eq!(w.id(), "day=mar1.2007");
        assert_eq!(w.start(), eastern(2007, 3, 1, 0, 0));
    }

    #[test]
    fn week_end_spans_dst_shift() {
        // US DST began 2007-03-11; the week is still 7 calendar days.
        let w = next_window(eastern(2007, 3, 11, 0, 0), eastern(2007, 3, 20, 0, 0)).unwrap();
        assert_eq!(w.granularity(), Granularity::Week);
        assert_eq!(w.id(), "week=mar11.2007");
        assert_eq!(w.end(), eastern(2007, 3, 18, 0, 0));
    }

    #[test]
    fn ids_use_unpadded_days_and_lowercase_months() {
        let day = Window::new(Granularity::Day, eastern(2007, 12, 3, 0, 0));
        assert_eq!(day.id(), "day=dec3.2007");
        let week = Window::new(Granularity::Week, eastern(2007, 12, 30, 0, 0));
        assert_eq!(week.id(), "week=dec30.2007");
    }

    #[test]
    fn month_end_rolls_over_december() {
        let w = Window::new(Granularity::Month, eastern(2006, 12, 1, 0, 0));
        assert_eq!(w.end(), eastern(2007, 1, 1, 0, 0));
    }
}
