// src/harvest/providers/forex_factory.rs
//! ForexFactory calendar provider.
//!
//! Fetches one calendar page per window and extracts the eight cells of
//! each event row verbatim. No interpretation happens here; blank and
//! missing cells are passed through for the normalizer to judge.

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::harvest::planner::Window;
use crate::harvest::types::{CalendarSource, RawRow};

/// Calendar page source. `Http` issues `GET /calendar.php?<window-id>`
/// against the configured base URL; `Fixture` serves one embedded page
/// for every window (offline runs and tests).
pub struct ForexFactorySource {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        base_url: String,
        client: reqwest::Client,
    },
}

impl ForexFactorySource {
    pub fn from_fixture(page: &str) -> Self {
        Self {
            mode: Mode::Fixture(page.to_string()),
        }
    }

    pub fn from_base_url(base_url: impl Into<String>) -> Self {
        Self {
            mode: Mode::Http {
                base_url: base_url.into(),
                client: reqwest::Client::new(),
            },
        }
    }
}

#[async_trait]
impl CalendarSource for ForexFactorySource {
    async fn fetch_window(&self, window: &Window) -> Result<Vec<RawRow>> {
        let body = match &self.mode {
            Mode::Fixture(page) => page.clone(),
            Mode::Http { base_url, client } => {
                let url = format!("{}/calendar.php?{}", base_url.trim_end_matches('/'), window.id());
                debug!(target: "harvest", url = %url, "requesting calendar page");
                let response = client
                    .get(&url)
                    .send()
                    .await
                    .with_context(|| format!("GET {url}"))?;
                response
                    .error_for_status()
                    .with_context(|| format!("GET {url}"))?
                    .text()
                    .await
                    .context("reading calendar page body")?
            }
        };
        Ok(extract_rows(&body))
    }

    fn name(&self) -> &'static str {
        "forexfactory"
    }
}

/// Extract every event row into a [`RawRow`]. Event rows carry both
/// `calendar__row` and `calendar_row`; day-breaker and spacer rows have
/// only the former and are structural chrome, not events. A cell absent
/// from the markup maps to `None`; a present but empty cell maps to
/// `Some("")`. Inner whitespace (the date cells wrap across lines) is
/// collapsed to single spaces.
pub fn extract_rows(page: &str) -> Vec<RawRow> {
    let row_selector = match Selector::parse("tr.calendar__row.calendar_row") {
        Ok(sel) => sel,
        Err(_) => return Vec::new(),
    };
    let document = Html::parse_document(page);
    document
        .select(&row_selector)
        .map(|row| RawRow {
            date: cell_text(&row, "date"),
            time: cell_text(&row, "time"),
            currency: cell_text(&row, "currency"),
            impact: impact_title(&row),
            event: cell_text(&row, "event"),
            actual: cell_text(&row, "actual"),
            forecast: cell_text(&row, "forecast"),
            previous: cell_text(&row, "previous"),
        })
        .collect()
}

fn cell_text(row: &ElementRef<'_>, field: &str) -> Option<String> {
    let selector = Selector::parse(&format!("td.calendar__cell.calendar__{field}")).ok()?;
    let cell = row.select(&selector).next()?;
    Some(collapse_whitespace(&cell.text().collect::<String>()))
}

/// Impact is encoded as an icon; the human-readable class lives in the
/// `title` attribute of the span inside the cell.
fn impact_title(row: &ElementRef<'_>) -> Option<String> {
    let selector = Selector::parse("td.calendar__cell.calendar__impact span[title]").ok()?;
    let span = row.select(&selector).next()?;
    span.value().attr("title").map(collapse_whitespace)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
