// src/audit.rs
//! Duplicate audit for the catalog: flags rows sharing a timestamp,
//! event name and currency so double ingestion shows up early. Reads
//! only; the catalog is never modified here.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

/// Non-economic rows (bank holidays and the like) legitimately repeat
/// and are excluded from the audit.
const EXEMPT_IMPACT: &str = "Non-Economic";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateEntry {
    pub timestamp: String,
    pub event: String,
    pub currency: String,
    pub count: u64,
}

#[derive(Debug, Default)]
pub struct AuditReport {
    pub records: u64,
    pub duplicates: Vec<DuplicateEntry>,
}

/// Scan the whole catalog and report every (timestamp, event, currency)
/// group that appears more than once, ordered by timestamp then event.
pub fn scan(path: &Path) -> Result<AuditReport> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening catalog {}", path.display()))?;

    let mut counts: HashMap<(String, String, String), u64> = HashMap::new();
    let mut records = 0u64;
    for result in reader.records() {
        let row = result.context("reading catalog row")?;
        records += 1;
        if row.get(2).unwrap_or_default() == EXEMPT_IMPACT {
            continue;
        }
        let key = (
            row.get(0).unwrap_or_default().to_string(),
            row.get(3).unwrap_or_default().to_string(),
            row.get(1).unwrap_or_default().to_string(),
        );
        *counts.entry(key).or_insert(0) += 1;
    }

    let mut duplicates: Vec<DuplicateEntry> = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|((timestamp, event, currency), count)| DuplicateEntry {
            timestamp,
            event,
            currency,
            count,
        })
        .collect();
    duplicates.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.event.cmp(&b.event))
    });
    Ok(AuditReport { records, duplicates })
}
