//! Load configuration.
//!
//! `LoadConfig` enumerates every option of a load call. It can be built in
//! code with [`LoadConfig::new`] and plain field assignment, or read from a
//! TOML file:
//!
//! ```toml
//! instrument = "sept"
//! start = "2021/04/15"
//! end = "2021/04/16"
//! spacecraft = "a"
//! sept_species = "e"
//! sept_viewing = "asun"
//! resample = "10min"
//! ```

use crate::domain::{Instrument, MagCoord, Spacecraft, Species, Viewing};
use crate::resample::Frequency;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Default CDAWeb HAPI server.
pub const DEFAULT_HAPI_SERVER: &str = "https://cdaweb.gsfc.nasa.gov/hapi";

/// Default root of the Kiel SEPT level 2 archive.
pub const DEFAULT_SEPT_BASE: &str = "http://www2.physik.uni-kiel.de/STEREO/data/sept/level2";

/// Default number of parallel downloads.
pub const DEFAULT_MAX_CONN: usize = 5;

/// Invalid or unrecognized load options. Reported before any I/O happens.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown instrument '{0}' (expected one of HET, LET, MAG, MAGB, SEPT)")]
    UnknownInstrument(String),

    #[error("unknown spacecraft '{0}' (expected 'ahead' or 'behind')")]
    UnknownSpacecraft(String),

    #[error("unknown coordinate system '{0}' (expected 'RTN' or 'SC')")]
    UnknownCoordinateSystem(String),

    #[error("unknown species '{0}' (expected 'e' or 'p')")]
    UnknownSpecies(String),

    #[error("unknown viewing direction '{0}' (expected sun, asun, north or south)")]
    UnknownViewing(String),

    #[error("unknown timestamp position '{0}' (expected 'center' or 'start')")]
    UnknownTimestampPosition(String),

    #[error("'{0}' is not a valid resample frequency (try '1min', '10s', '1h')")]
    InvalidFrequency(String),

    #[error("invalid date '{0}' (expected YYYY-MM-DD or YYYY/MM/DD)")]
    InvalidDate(String),

    #[error("end date {end} is before start date {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("max_conn must be at least 1")]
    InvalidMaxConn,

    #[error("read config file: {0}")]
    Read(String),

    #[error("parse config TOML: {0}")]
    Parse(String),
}

/// Where the timestamp of a resampled row sits inside its bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampPosition {
    /// Bucket start + half the frequency.
    #[default]
    Center,
    /// Bucket start.
    Start,
}

impl FromStr for TimestampPosition {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "center" | "centre" => Ok(TimestampPosition::Center),
            "start" => Ok(TimestampPosition::Start),
            _ => Err(ConfigError::UnknownTimestampPosition(s.to_string())),
        }
    }
}

impl fmt::Display for TimestampPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampPosition::Center => f.write_str("center"),
            TimestampPosition::Start => f.write_str("start"),
        }
    }
}

/// Remote endpoints. Overridable so tests and mirrors can point elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(default = "default_hapi_server")]
    pub hapi_server: String,
    #[serde(default = "default_sept_base")]
    pub sept_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            hapi_server: default_hapi_server(),
            sept_base: default_sept_base(),
        }
    }
}

fn default_hapi_server() -> String {
    DEFAULT_HAPI_SERVER.to_string()
}

fn default_sept_base() -> String {
    DEFAULT_SEPT_BASE.to_string()
}

fn default_max_conn() -> usize {
    DEFAULT_MAX_CONN
}

/// Every option of a load call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadConfig {
    pub instrument: Instrument,

    /// First day to load (inclusive).
    #[serde(deserialize_with = "deserialize_date")]
    pub start: NaiveDate,

    /// Last day to load (inclusive).
    #[serde(deserialize_with = "deserialize_date")]
    pub end: NaiveDate,

    #[serde(default)]
    pub spacecraft: Spacecraft,

    /// Only used by MAG and MAGB.
    #[serde(default)]
    pub mag_coord: MagCoord,

    /// Only used by SEPT.
    #[serde(default)]
    pub sept_species: Species,

    /// Only used by SEPT.
    #[serde(default)]
    pub sept_viewing: Viewing,

    /// Local storage root. Defaults to `./data`.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub resample: Option<Frequency>,

    #[serde(default)]
    pub pos_timestamp: TimestampPosition,

    /// Upper bound on concurrent downloads.
    #[serde(default = "default_max_conn")]
    pub max_conn: usize,

    /// SEPT only: keep the time-bookkeeping and integration-time columns.
    #[serde(default)]
    pub all_columns: bool,

    #[serde(default)]
    pub endpoints: Endpoints,
}

impl LoadConfig {
    /// Config with every optional field at its default.
    pub fn new(instrument: Instrument, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            instrument,
            start,
            end,
            spacecraft: Spacecraft::default(),
            mag_coord: MagCoord::default(),
            sept_species: Species::default(),
            sept_viewing: Viewing::default(),
            path: None,
            resample: None,
            pos_timestamp: TimestampPosition::default(),
            max_conn: DEFAULT_MAX_CONN,
            all_columns: false,
            endpoints: Endpoints::default(),
        }
    }

    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.end < self.start {
            return Err(ConfigError::InvalidDateRange {
                start: self.start,
                end: self.end,
            });
        }
        if self.max_conn == 0 {
            return Err(ConfigError::InvalidMaxConn);
        }
        Ok(())
    }

    /// Resolved local storage root.
    pub fn storage_root(&self) -> PathBuf {
        match &self.path {
            Some(p) => p.clone(),
            None => std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("data"),
        }
    }

    /// Every day from `start` to `end`, inclusive.
    pub fn days(&self) -> Vec<NaiveDate> {
        self.start.iter_days().take_while(|d| *d <= self.end).collect()
    }
}

/// Parse `YYYY-MM-DD`, `YYYY/MM/DD` or `YYYYMMDD`.
pub fn parse_date(s: &str) -> Result<NaiveDate, ConfigError> {
    let s = s.trim();
    ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .ok_or_else(|| ConfigError::InvalidDate(s.to_string()))
}

fn deserialize_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_date(&s).map_err(serde::de::Error::custom)
}
