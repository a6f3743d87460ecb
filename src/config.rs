// src/config.rs
//! Harvester configuration: loaded from `$HARVEST_CONFIG_PATH`, then
//! `config/harvest.toml`, then built-in defaults. TOML is the native
//! format; JSON is accepted for generated configs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::FixedOffset;
use chrono_tz::Tz;
use serde::Deserialize;

const ENV_PATH: &str = "HARVEST_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/harvest.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Main record store.
    pub catalog_path: PathBuf,
    /// Anomaly ledger.
    pub ledger_path: PathBuf,
    /// IANA name of the zone calendar pages are rendered in.
    pub timezone: String,
    /// Fixed offset (whole hours east of UTC) catalog timestamps are
    /// written in, independent of the source zone's DST state.
    pub output_offset_hours: i32,
    pub base_url: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("forex_factory_catalog.csv"),
            ledger_path: PathBuf::from("errors.csv"),
            timezone: "America/New_York".to_string(),
            output_offset_hours: -5,
            base_url: "https://www.forexfactory.com".to_string(),
        }
    }
}

impl HarvestConfig {
    /// Load using the resolution chain. A set but dangling
    /// `$HARVEST_CONFIG_PATH` is an error rather than a silent
    /// fallback.
    pub fn load_default() -> Result<Self> {
        if let Ok(env_path) = std::env::var(ENV_PATH) {
            let path = PathBuf::from(&env_path);
            if !path.exists() {
                return Err(anyhow!("{ENV_PATH} points to a missing file: {env_path}"));
            }
            return Self::load_from(&path);
        }
        let default = Path::new(DEFAULT_PATH);
        if default.exists() {
            return Self::load_from(default);
        }
        Ok(Self::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if ext == "json" {
            return serde_json::from_str(&content)
                .with_context(|| format!("parsing JSON config {}", path.display()));
        }
        toml::from_str(&content).with_context(|| format!("parsing TOML config {}", path.display()))
    }

    /// Source reference timezone, parsed from the IANA name.
    pub fn source_tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("invalid timezone {:?}: {e}", self.timezone))
    }

    /// Fixed offset for rendering catalog timestamps.
    pub fn output_offset(&self) -> Result<FixedOffset> {
        self.output_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| anyhow!("output offset out of range: {}h", self.output_offset_hours))
    }
}
