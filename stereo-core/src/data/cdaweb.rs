//! CDAWeb archive source (HET, LET, MAG, MAGB) via the HAPI service.
//!
//! The archive serves its CDF products re-rendered as CSV:
//! - `{server}/info?id={dataset}` lists the parameters (JSON)
//! - `{server}/data?id={dataset}&time.min=..&time.max=..&parameters=..&format=csv`
//!   returns one row per record, time first
//!
//! Requests are made per day so each day maps to one stored file:
//! `{root}/{DATASET}/{DATASET}_{YYYYMMDD}.csv`.

use super::cache::LocalStore;
use super::download::{download_all, DownloadRequest};
use super::provider::{Fetcher, ParseError};
use crate::loader::LoadError;
use crate::table::{parse_timestamp, DataColumn, TimeTable};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// HAPI status code for a successful request.
const HAPI_OK: u32 = 1200;

/// One parameter of an archive dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub name: String,
    /// HAPI type: `double`, `integer`, `string` or `isotime`.
    pub kind: String,
    pub units: Option<String>,
    /// Array dimensions; empty for scalars.
    pub size: Vec<usize>,
    pub fill: Option<f64>,
}

impl ParameterInfo {
    pub fn is_numeric(&self) -> bool {
        matches!(self.kind.as_str(), "double" | "integer")
    }

    /// Number of CSV columns this parameter occupies.
    pub fn width(&self) -> usize {
        self.size.iter().product::<usize>().max(1)
    }

    /// Table column names: `name` for scalars, `name_0..name_{n-1}` otherwise.
    pub fn column_names(&self) -> Vec<String> {
        if self.size.is_empty() {
            vec![self.name.clone()]
        } else {
            (0..self.width()).map(|i| format!("{}_{i}", self.name)).collect()
        }
    }

    fn is_fill(&self, value: f64) -> bool {
        self.fill.is_some_and(|fill| value == fill)
    }
}

#[derive(Deserialize)]
struct RawInfo {
    status: Option<RawStatus>,
    #[serde(default)]
    parameters: Vec<RawParameter>,
}

#[derive(Deserialize)]
struct RawStatus {
    code: u32,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct RawParameter {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    units: Option<serde_json::Value>,
    #[serde(default)]
    size: Option<Vec<usize>>,
    #[serde(default)]
    fill: Option<String>,
}

impl RawParameter {
    fn into_info(self) -> ParameterInfo {
        let units = match self.units {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .find_map(|v| v.as_str().map(str::to_string)),
            _ => None,
        };
        ParameterInfo {
            name: self.name,
            kind: self.kind,
            units,
            size: self.size.unwrap_or_default(),
            fill: self.fill.and_then(|f| f.trim().parse().ok()),
        }
    }
}

/// Result of a catalogue request that reached the server.
#[derive(Debug)]
pub enum InfoResponse {
    Parameters(Vec<ParameterInfo>),
    /// The server answered but does not know the dataset.
    Unknown(String),
}

/// Decode a HAPI `info` response.
pub fn parse_info(json: &str) -> Result<InfoResponse, ParseError> {
    let raw: RawInfo =
        serde_json::from_str(json).map_err(|e| ParseError::ArchiveInfo(e.to_string()))?;

    if let Some(status) = raw.status {
        if status.code != HAPI_OK {
            return Ok(InfoResponse::Unknown(format!(
                "{} {}",
                status.code, status.message
            )));
        }
    }

    if raw.parameters.is_empty() {
        return Err(ParseError::ArchiveInfo("no parameters listed".into()));
    }
    Ok(InfoResponse::Parameters(
        raw.parameters.into_iter().map(RawParameter::into_info).collect(),
    ))
}

pub fn info_url(server: &str, dataset: &str) -> String {
    format!("{}/info?id={dataset}", server.trim_end_matches('/'))
}

/// Data request for one whole UTC day.
pub fn data_url(server: &str, dataset: &str, day: NaiveDate, parameters: &[ParameterInfo]) -> String {
    let next = day.checked_add_days(Days::new(1)).unwrap_or(day);
    let names: Vec<&str> = parameters.iter().map(|p| p.name.as_str()).collect();
    format!(
        "{}/data?id={dataset}&time.min={}T00:00:00Z&time.max={}T00:00:00Z&parameters={}&format=csv",
        server.trim_end_matches('/'),
        day.format("%Y-%m-%d"),
        next.format("%Y-%m-%d"),
        names.join(",")
    )
}

pub fn day_file_name(dataset: &str, day: NaiveDate) -> String {
    format!("{dataset}_{}.csv", day.format("%Y%m%d"))
}

fn info_file_name(dataset: &str) -> String {
    format!("{dataset}_info.json")
}

/// Parse a HAPI CSV response for `parameters` (time column excluded).
///
/// Empty fields and fill values become NaN.
pub fn parse_hapi_csv(
    text: &str,
    parameters: &[ParameterInfo],
    source_name: &str,
) -> Result<TimeTable, ParseError> {
    let names: Vec<String> = parameters.iter().flat_map(|p| p.column_names()).collect();
    let expected = names.len() + 1;

    let mut times = Vec::new();
    let mut values: Vec<Vec<f64>> = vec![Vec::new(); names.len()];

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    for result in reader.records() {
        let record = result.map_err(|e| ParseError::ArchiveCsv {
            source_name: source_name.to_string(),
            line: e.position().map_or(0, |p| p.line() as usize),
            reason: e.to_string(),
        })?;
        let line = record.position().map_or(0, |p| p.line() as usize);
        let fail = |reason: String| ParseError::ArchiveCsv {
            source_name: source_name.to_string(),
            line,
            reason,
        };

        if record.len() != expected {
            return Err(fail(format!(
                "expected {expected} fields, found {}",
                record.len()
            )));
        }

        let stamp = &record[0];
        let ms = parse_timestamp(stamp).ok_or_else(|| fail(format!("invalid time '{stamp}'")))?;
        times.push(ms);

        let mut field = 1;
        let mut col = 0;
        for param in parameters {
            for _ in 0..param.width() {
                let raw = &record[field];
                let v = if raw.is_empty() {
                    f64::NAN
                } else {
                    let v: f64 = raw
                        .parse()
                        .map_err(|_| fail(format!("'{raw}' in '{}' is not a number", names[col])))?;
                    if param.is_fill(v) {
                        f64::NAN
                    } else {
                        v
                    }
                };
                values[col].push(v);
                field += 1;
                col += 1;
            }
        }
    }

    let columns = names
        .into_iter()
        .zip(values)
        .map(|(name, values)| DataColumn::new(name, values))
        .collect();
    TimeTable::new(times, columns).map_err(|e| ParseError::ArchiveCsv {
        source_name: source_name.to_string(),
        line: 0,
        reason: e.to_string(),
    })
}

/// Table plus what went into it.
#[derive(Debug)]
pub struct ArchiveLoad {
    pub table: TimeTable,
    pub files: Vec<PathBuf>,
    pub parameters: Vec<ParameterInfo>,
}

impl ArchiveLoad {
    fn empty() -> Self {
        Self {
            table: TimeTable::empty(),
            files: Vec::new(),
            parameters: Vec::new(),
        }
    }
}

/// Load `dataset` for every day in `days`.
///
/// The parameter catalogue is stored next to the data so later loads work
/// offline. An unreachable server or unknown dataset yields an empty result.
pub fn load(
    fetcher: &dyn Fetcher,
    store: &LocalStore,
    server: &str,
    dataset: &str,
    days: &[NaiveDate],
    max_conn: usize,
) -> Result<ArchiveLoad, LoadError> {
    let dir = store.dataset_dir(dataset);
    store.ensure_dir(&dir)?;

    let Some(all_parameters) = resolve_parameters(fetcher, store, &dir, server, dataset)? else {
        return Ok(ArchiveLoad::empty());
    };
    let parameters: Vec<ParameterInfo> = all_parameters
        .into_iter()
        .filter(ParameterInfo::is_numeric)
        .collect();
    if parameters.is_empty() {
        warn!(dataset, "dataset has no numeric parameters");
        return Ok(ArchiveLoad::empty());
    }

    let requests: Vec<DownloadRequest> = days
        .iter()
        .map(|&day| DownloadRequest {
            url: data_url(server, dataset, day, &parameters),
            dir: dir.clone(),
            file_name: day_file_name(dataset, day),
        })
        .collect();

    let summary = download_all(fetcher, store, &requests, max_conn)?;
    let files = summary.available();

    info!(
        dataset,
        days = days.len(),
        files = files.len(),
        downloaded = summary.fetched_count(),
        failed = summary.failed_count(),
        "archive files resolved"
    );

    let mut tables = Vec::with_capacity(files.len());
    for path in &files {
        tables.push(read_day_file(store, path, &parameters)?);
    }

    Ok(ArchiveLoad {
        table: TimeTable::concat(tables),
        files,
        parameters,
    })
}

fn resolve_parameters(
    fetcher: &dyn Fetcher,
    store: &LocalStore,
    dir: &Path,
    server: &str,
    dataset: &str,
) -> Result<Option<Vec<ParameterInfo>>, LoadError> {
    let file_name = info_file_name(dataset);

    if let Some(path) = store.lookup(dir, &file_name) {
        let json = std::fs::read_to_string(&path).map_err(|e| LoadError::Io {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        match parse_info(&json) {
            Ok(InfoResponse::Parameters(params)) => {
                debug!(dataset, "using stored parameter catalogue");
                return Ok(Some(params));
            }
            Ok(InfoResponse::Unknown(_)) => {}
            Err(e) => store.discard(&path, &e.to_string())?,
        }
    }

    let url = info_url(server, dataset);
    let body = match fetcher.get(&url) {
        Ok(Some(body)) => body,
        Ok(None) => {
            warn!(dataset, url = %url, "dataset not found on archive");
            return Ok(None);
        }
        Err(e) => {
            warn!(dataset, url = %url, error = %e, "archive catalogue unavailable");
            return Ok(None);
        }
    };

    match parse_info(&String::from_utf8_lossy(&body))? {
        InfoResponse::Parameters(params) => {
            let (_, entry) = store.write_atomic(dir, &file_name, &body, &url)?;
            store.record(dir, vec![entry])?;
            Ok(Some(params))
        }
        InfoResponse::Unknown(status) => {
            warn!(dataset, status = %status, "archive rejected dataset");
            Ok(None)
        }
    }
}

/// Decode one stored day file. A file that does not decode is quarantined
/// before the error is returned, so a later load fetches it again.
fn read_day_file(
    store: &LocalStore,
    path: &Path,
    parameters: &[ParameterInfo],
) -> Result<TimeTable, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    match parse_hapi_csv(&text, parameters, &name) {
        Ok(table) => Ok(table),
        Err(e) => {
            store.discard(path, &e.to_string())?;
            Err(e.into())
        }
    }
}
