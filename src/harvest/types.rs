// src/harvest/types.rs
use anyhow::Result;
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;

use crate::harvest::planner::Window;

/// One table row as it came off a calendar page: a bag of named text
/// cells. `None` means the cell was missing from the markup entirely;
/// `Some("")` means the cell was present but blank (which is meaningful
/// for the date and time columns).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    pub date: Option<String>,
    pub time: Option<String>,
    pub currency: Option<String>,
    pub impact: Option<String>,
    pub event: Option<String>,
    pub actual: Option<String>,
    pub forecast: Option<String>,
    pub previous: Option<String>,
}

impl RawRow {
    /// True when any cell is absent from the markup. A blank string is a
    /// present cell and does not count.
    pub fn has_missing_cells(&self) -> bool {
        [
            &self.date,
            &self.time,
            &self.currency,
            &self.impact,
            &self.event,
            &self.actual,
            &self.forecast,
            &self.previous,
        ]
        .iter()
        .any(|cell| cell.is_none())
    }
}

/// Resolved time-of-day state for one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTime {
    /// Literal clock reading from the page; seconds are always zero.
    At(NaiveTime),
    /// The event spans its whole day and is final only once that day is
    /// past. Serialized as 23:59:59 in the catalog.
    AllDay,
    /// The source has not published a time yet. Never reaches the
    /// catalog; deferred to the ledger instead.
    Pending,
}

/// A fully resolved calendar event, ready for the filter stage.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarRecord {
    pub timestamp: DateTime<Tz>,
    pub currency: String,
    pub impact: String,
    pub event: String,
    pub actual: String,
    pub forecast: String,
    pub previous: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyReason {
    /// The source has not finalized the row yet; expect it to reappear
    /// on overlapping refetches until a real time is published.
    Pending,
    /// Structurally broken row fragment.
    Malformed,
}

impl AnomalyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            AnomalyReason::Pending => "pending",
            AnomalyReason::Malformed => "malformed",
        }
    }
}

/// A row that could not be cleanly ingested, with whatever context was
/// recovered before it failed.
#[derive(Debug, Clone, PartialEq)]
pub struct Anomaly {
    /// Best-effort instant, if the running context got that far.
    pub timestamp: Option<DateTime<Tz>>,
    pub reason: AnomalyReason,
    /// Snapshot of the raw cells for the ledger.
    pub row: RawRow,
}

/// Per-row result of normalization, in input order.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Record(CalendarRecord),
    Anomaly(Anomaly),
}

/// Fetch collaborator: returns the raw rows for one window, in the
/// order the source lists them (chronological). Transport errors are
/// propagated untouched; retry policy belongs to the caller.
#[async_trait::async_trait]
pub trait CalendarSource: Send + Sync {
    async fn fetch_window(&self, window: &Window) -> Result<Vec<RawRow>>;
    fn name(&self) -> &'static str;
}

/// Clock collaborator, injectable so completeness checks and the live
/// edge are testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Tz>;
}

/// Wall clock expressed in the source timezone.
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }
}
