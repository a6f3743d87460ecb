// src/catalog.rs
//! # Catalog store
//!
//! Append-only CSV catalog of accepted records, the companion anomaly
//! ledger, and the resume cursor derived from the catalog tail.
//!
//! The catalog is the only durable state. Every line starts with a
//! fixed-width local timestamp (`2007-01-01 14:30:00-05:00`, 25 bytes),
//! so resuming never parses the whole file: the resolver reads a tail
//! chunk, walks lines backwards and takes the newest one that parses.
//! Unparsable bytes after it are a crash artifact and get truncated
//! away, which makes resolution idempotent.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate};
use chrono_tz::Tz;
use tracing::warn;

use crate::harvest::planner::local_midnight;
use crate::harvest::types::{Anomaly, CalendarRecord};

/// Leading timestamp field of every catalog and ledger line. The offset
/// suffix is always `±HH:MM`, so the field is exactly 25 bytes wide.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";
const TIMESTAMP_WIDTH: usize = 25;

/// First tail read; doubled until it contains a parsable line or covers
/// the whole file.
const TAIL_CHUNK: u64 = 4096;

/// The source serves nothing before 2007; fresh stores resume from the
/// first local midnight of that year.
pub fn epoch(tz: Tz) -> DateTime<Tz> {
    local_midnight(tz, NaiveDate::from_ymd_opt(2007, 1, 1).expect("epoch date"))
}

/// Resume point for a store: the instant of the newest record in the
/// catalog, or the epoch when the catalog is missing or empty.
///
/// A partially written final line is removed so the next append starts
/// on a clean boundary. Running this twice in a row is a no-op the
/// second time.
pub fn resolve_cursor(path: &Path, tz: Tz) -> Result<DateTime<Tz>> {
    if !path.exists() {
        return Ok(epoch(tz));
    }
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .with_context(|| format!("opening catalog {}", path.display()))?;
    let len = file
        .metadata()
        .with_context(|| format!("reading catalog metadata {}", path.display()))?
        .len();
    if len == 0 {
        return Ok(epoch(tz));
    }

    let mut chunk = TAIL_CHUNK;
    loop {
        let start = len.saturating_sub(chunk);
        file.seek(SeekFrom::Start(start)).context("seeking catalog tail")?;
        let mut buf = Vec::with_capacity((len - start) as usize);
        file.read_to_end(&mut buf).context("reading catalog tail")?;

        let newlines: Vec<usize> = buf
            .iter()
            .enumerate()
            .filter(|(_, &b)| b == b'\n')
            .map(|(i, _)| i)
            .collect();

        // Only lines that begin inside the buffer are candidates; when
        // the read starts mid-file the first fragment may be a line
        // whose head lies before `start`.
        let first_line_start = if start == 0 {
            Some(0)
        } else {
            newlines.first().map(|&n| n + 1)
        };
        if let Some(lo) = first_line_start {
            let mut line_start = lo;
            let mut lines = Vec::new();
            for &nl in &newlines {
                if nl >= lo {
                    lines.push((line_start, nl));
                    line_start = nl + 1;
                }
            }
            // Newest first.
            for &(s, nl) in lines.iter().rev() {
                if let Some(ts) = parse_line_timestamp(&buf[s..nl], tz) {
                    let keep = start + nl as u64 + 1;
                    if keep < len {
                        file.set_len(keep).context("truncating corrupt catalog tail")?;
                        warn!(
                            target: "catalog",
                            path = %path.display(),
                            dropped_bytes = len - keep,
                            "dropped unparsable catalog tail"
                        );
                    }
                    return Ok(ts);
                }
            }
        }

        if start == 0 {
            // Nothing in the whole file parses. Treat it as empty
            // rather than appending after garbage.
            file.set_len(0).context("truncating unparsable catalog")?;
            warn!(
                target: "catalog",
                path = %path.display(),
                dropped_bytes = len,
                "catalog had no parsable records, restarting from the epoch"
            );
            return Ok(epoch(tz));
        }
        chunk *= 2;
    }
}

/// Parse the fixed-width timestamp prefix of one line. No CSV parsing
/// happens here; the prefix is sliced by byte offset.
fn parse_line_timestamp(line: &[u8], tz: Tz) -> Option<DateTime<Tz>> {
    let line = match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    };
    let prefix = line.get(..TIMESTAMP_WIDTH)?;
    let prefix = std::str::from_utf8(prefix).ok()?;
    DateTime::parse_from_str(prefix, TIMESTAMP_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&tz))
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {} for append", path.display()))
}

/// Append-only writer for the record catalog.
///
/// Timestamps are rendered in a fixed output offset regardless of the
/// source zone's DST state, so the file stays lexically sortable and
/// the resolver's fixed-width assumption holds.
pub struct CatalogWriter {
    writer: csv::Writer<File>,
    output_offset: FixedOffset,
}

impl CatalogWriter {
    pub fn open(path: &Path, output_offset: FixedOffset) -> Result<Self> {
        Ok(Self {
            writer: csv::Writer::from_writer(open_append(path)?),
            output_offset,
        })
    }

    /// Append one record and flush. A crash can cost at most one
    /// partial line, which the resolver heals on the next run.
    pub fn append(&mut self, record: &CalendarRecord) -> Result<()> {
        let ts = record
            .timestamp
            .with_timezone(&self.output_offset)
            .format(TIMESTAMP_FORMAT)
            .to_string();
        self.writer
            .write_record([
                ts.as_str(),
                record.currency.as_str(),
                record.impact.as_str(),
                record.event.as_str(),
                record.actual.as_str(),
                record.forecast.as_str(),
                record.previous.as_str(),
            ])
            .context("appending catalog record")?;
        self.writer.flush().context("flushing catalog")?;
        Ok(())
    }
}

/// Append-only writer for the anomaly ledger. Same timestamp discipline
/// as the catalog; the timestamp column is blank when not even a
/// best-effort instant was recovered.
pub struct AnomalyLedger {
    writer: csv::Writer<File>,
    output_offset: FixedOffset,
}

impl AnomalyLedger {
    pub fn open(path: &Path, output_offset: FixedOffset) -> Result<Self> {
        Ok(Self {
            writer: csv::Writer::from_writer(open_append(path)?),
            output_offset,
        })
    }

    pub fn append(&mut self, anomaly: &Anomaly) -> Result<()> {
        let ts = anomaly
            .timestamp
            .map(|t| {
                t.with_timezone(&self.output_offset)
                    .format(TIMESTAMP_FORMAT)
                    .to_string()
            })
            .unwrap_or_default();
        let row = &anomaly.row;
        self.writer
            .write_record([
                ts.as_str(),
                row.date.as_deref().unwrap_or_default(),
                row.time.as_deref().unwrap_or_default(),
                row.event.as_deref().unwrap_or_default(),
                anomaly.reason.as_str(),
            ])
            .context("appending to anomaly ledger")?;
        self.writer.flush().context("flushing anomaly ledger")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;
    use std::io::Write;

    fn offset() -> FixedOffset {
        FixedOffset::east_opt(-5 * 3600).unwrap()
    }

    fn record(ts: DateTime<Tz>, event: &str) -> CalendarRecord {
        CalendarRecord {
            timestamp: ts,
            currency: "USD".to_string(),
            impact: "Medium Impact Expected".to_string(),
            event: event.to_string(),
            actual: "1.0%".to_string(),
            forecast: String::new(),
            previous: "0.9%".to_string(),
        }
    }

    #[test]
    fn missing_catalog_resolves_to_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let cursor = resolve_cursor(&dir.path().join("none.csv"), New_York).unwrap();
        assert_eq!(cursor, New_York.with_ymd_and_hms(2007, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn cursor_round_trips_through_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.csv");
        let ts = New_York.with_ymd_and_hms(2007, 1, 1, 14, 30, 0).unwrap();

        let mut writer = CatalogWriter::open(&path, offset()).unwrap();
        writer.append(&record(ts, "Test Event")).unwrap();
        drop(writer);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("2007-01-01 14:30:00-05:00,"), "unexpected line: {content}");
        assert_eq!(resolve_cursor(&path, New_York).unwrap(), ts);
    }

    #[test]
    fn timestamp_prefix_is_exactly_25_bytes() {
        let rendered = New_York
            .with_ymd_and_hms(2007, 7, 4, 9, 0, 0)
            .unwrap()
            .with_timezone(&offset())
            .format(TIMESTAMP_FORMAT)
            .to_string();
        assert_eq!(rendered.len(), TIMESTAMP_WIDTH);
    }

    #[test]
    fn partial_final_line_is_truncated_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.csv");
        let ts = New_York.with_ymd_and_hms(2007, 3, 9, 8, 30, 0).unwrap();

        let mut writer = CatalogWriter::open(&path, offset()).unwrap();
        writer.append(&record(ts, "Non-Farm Employment Change")).unwrap();
        drop(writer);
        let clean = std::fs::read(&path).unwrap();

        let mut raw = OpenOptions::new().append(true).open(&path).unwrap();
        raw.write_all(b"2007-03-09 10:0").unwrap();
        drop(raw);

        assert_eq!(resolve_cursor(&path, New_York).unwrap(), ts);
        assert_eq!(std::fs::read(&path).unwrap(), clean);

        // Second resolution finds a clean file and changes nothing.
        assert_eq!(resolve_cursor(&path, New_York).unwrap(), ts);
        assert_eq!(std::fs::read(&path).unwrap(), clean);
    }

    #[test]
    fn fully_unparsable_catalog_restarts_from_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.csv");
        std::fs::write(&path, "not,a,record\nalso not one\n").unwrap();

        let cursor = resolve_cursor(&path, New_York).unwrap();
        assert_eq!(cursor, epoch(New_York));
        assert_eq!(std::fs::read(&path).unwrap().len(), 0);
    }

    #[test]
    fn resolver_reads_back_past_a_long_garbage_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.csv");
        let ts = New_York.with_ymd_and_hms(2007, 5, 1, 10, 0, 0).unwrap();

        let mut writer = CatalogWriter::open(&path, offset()).unwrap();
        writer.append(&record(ts, "Survivor")).unwrap();
        drop(writer);
        let clean = std::fs::read(&path).unwrap();

        // Garbage larger than the first tail chunk forces a re-read.
        let mut raw = OpenOptions::new().append(true).open(&path).unwrap();
        for _ in 0..400 {
            raw.write_all(b"xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx\n").unwrap();
        }
        drop(raw);

        assert_eq!(resolve_cursor(&path, New_York).unwrap(), ts);
        assert_eq!(std::fs::read(&path).unwrap(), clean);
    }

    #[test]
    fn ledger_appends_reason_and_raw_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.csv");
        let mut ledger = AnomalyLedger::open(&path, offset()).unwrap();
        ledger
            .append(&Anomaly {
                timestamp: Some(New_York.with_ymd_and_hms(2007, 1, 3, 0, 0, 1).unwrap()),
                reason: crate::harvest::types::AnomalyReason::Pending,
                row: crate::harvest::types::RawRow {
                    date: Some("WedJan 3".to_string()),
                    time: Some("Data".to_string()),
                    event: Some("Unscheduled".to_string()),
                    ..Default::default()
                },
            })
            .unwrap();
        drop(ledger);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content.trim_end(),
            "2007-01-03 00:00:01-05:00,WedJan 3,Data,Unscheduled,pending"
        );
    }
}
