// src/harvest/mod.rs
//! # Harvest loop
//!
//! Drives the planner, the source and the normalizer until the catalog
//! is caught up. Windows are processed strictly one at a time in
//! chronological order; both the resume cursor and in-window year
//! attribution depend on that ordering.

pub mod normalize;
pub mod planner;
pub mod providers;
pub mod types;

use anyhow::{Context, Result};
use chrono::DateTime;
use chrono_tz::Tz;
use tracing::{debug, info};

use crate::catalog::{AnomalyLedger, CatalogWriter};
use crate::harvest::planner::next_window;
use crate::harvest::types::{AnomalyReason, CalendarSource, Clock, RowOutcome};

/// Counters and final state for one harvest run.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestReport {
    pub windows: usize,
    pub accepted: u64,
    pub deferred: u64,
    pub malformed: u64,
    /// Where the next run resumes from.
    pub cursor: DateTime<Tz>,
    /// True when the run stopped at a record that is not final yet
    /// rather than by exhausting the planner.
    pub reached_live_edge: bool,
}

/// Run the ingestion loop from `cursor` until the planner is exhausted
/// or the live edge is reached.
///
/// Records at or before the entry cursor of the current window are
/// already in the catalog from an earlier run and are skipped; a record
/// at or after `now` is not final, and since rows arrive in
/// chronological order nothing later in the window can be final either,
/// so the run stops there. The cursor then stays on the last accepted
/// record so the gap up to the live edge is refetched next time.
pub async fn run(
    source: &dyn CalendarSource,
    clock: &dyn Clock,
    catalog: &mut CatalogWriter,
    ledger: &mut AnomalyLedger,
    mut cursor: DateTime<Tz>,
) -> Result<HarvestReport> {
    let mut report = HarvestReport {
        windows: 0,
        accepted: 0,
        deferred: 0,
        malformed: 0,
        cursor,
        reached_live_edge: false,
    };

    while let Some(window) = next_window(cursor, clock.now()) {
        let id = window.id();
        debug!(target: "harvest", window = %id, source = source.name(), "fetching window");
        let rows = source
            .fetch_window(&window)
            .await
            .with_context(|| format!("fetching window {id}"))?;

        let mut accepted = 0u64;
        let mut deferred = 0u64;
        let mut malformed = 0u64;
        let mut last_accepted: Option<DateTime<Tz>> = None;

        for outcome in normalize::normalize_window(&window, &rows) {
            match outcome {
                RowOutcome::Record(record) => {
                    if record.timestamp <= cursor {
                        // Already cataloged by an earlier run.
                        continue;
                    }
                    if record.timestamp >= clock.now() {
                        report.reached_live_edge = true;
                        break;
                    }
                    catalog.append(&record)?;
                    last_accepted = Some(record.timestamp);
                    accepted += 1;
                }
                RowOutcome::Anomaly(anomaly) => {
                    match anomaly.reason {
                        AnomalyReason::Pending => deferred += 1,
                        AnomalyReason::Malformed => malformed += 1,
                    }
                    ledger.append(&anomaly)?;
                }
            }
        }

        report.windows += 1;
        report.accepted += accepted;
        report.deferred += deferred;
        report.malformed += malformed;
        info!(
            target: "harvest",
            window = %id,
            rows = rows.len(),
            accepted,
            deferred,
            malformed,
            "window processed"
        );

        if report.reached_live_edge {
            if let Some(ts) = last_accepted {
                cursor = ts;
            }
            break;
        }
        cursor = window.end();
    }

    report.cursor = cursor;
    info!(
        target: "harvest",
        windows = report.windows,
        accepted = report.accepted,
        deferred = report.deferred,
        malformed = report.malformed,
        live_edge = report.reached_live_edge,
        "harvest run finished"
    );
    Ok(report)
}
