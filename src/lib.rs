// src/lib.rs
// Public library surface for the harvester binary and integration tests.

pub mod audit;
pub mod catalog;
pub mod config;
pub mod harvest;

// ---- Re-exports for a stable public API ----
pub use crate::catalog::{epoch, resolve_cursor, AnomalyLedger, CatalogWriter};
pub use crate::config::HarvestConfig;
pub use crate::harvest::planner::{next_window, Granularity, Window};
pub use crate::harvest::providers::ForexFactorySource;
pub use crate::harvest::types::{
    Anomaly, AnomalyReason, CalendarRecord, CalendarSource, Clock, EventTime, RawRow, RowOutcome,
    SystemClock,
};
pub use crate::harvest::{run, HarvestReport};
