//! SEPT level 2 source (Kiel university ASCII files).
//!
//! One file per spacecraft, species, viewing direction and day:
//! `sept_{sc}_{species}_{view}_{year}_{doy}_1min_l2_v{NN}.dat`, published
//! under `{base}/{sc}/1min/{year}/`. The version suffix changes between
//! reprocessings, so remote names are discovered from the yearly index page.
//!
//! File format: whitespace-delimited, `#` comments, columns
//! `julian_date year frac_doy hour min sec ch_{bin}.. err_ch_{bin}.. integration_time`.

use super::cache::LocalStore;
use super::download::{download_all, DownloadRequest};
use super::provider::{Fetcher, ParseError};
use crate::channels::ChannelTable;
use crate::config::LoadConfig;
use crate::domain::{Spacecraft, Species, Viewing};
use crate::loader::LoadError;
use crate::table::{DataColumn, TableError, TimeTable};
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Bad-data marker in SEPT files.
pub const SEPT_FILL_VALUE: f64 = -9999.9;

/// Version assumed when the index page cannot be read.
pub const SEPT_DEFAULT_VERSION: u32 = 3;

/// Julian date of the Unix epoch.
const JD_UNIX_EPOCH: f64 = 2_440_587.5;

const TIME_COLUMNS: [&str; 6] = ["julian_date", "year", "frac_doy", "hour", "min", "sec"];
const INTEGRATION_TIME: &str = "integration_time";

/// File name up to (and including) the underscore before `1min`.
pub fn file_prefix(
    spacecraft: Spacecraft,
    species: Species,
    viewing: Viewing,
    day: NaiveDate,
) -> String {
    format!(
        "sept_{}_{}_{}_{}_{:03}_",
        spacecraft.as_str(),
        species.as_str(),
        viewing.as_str(),
        day.year(),
        day.ordinal()
    )
}

/// Full file name for a given product version.
pub fn file_name(
    spacecraft: Spacecraft,
    species: Species,
    viewing: Viewing,
    day: NaiveDate,
    version: u32,
) -> String {
    format!(
        "{}1min_l2_v{version:02}.dat",
        file_prefix(spacecraft, species, viewing, day)
    )
}

/// `{base}/{sc}/1min/{year}/`
pub fn index_url(base: &str, spacecraft: Spacecraft, year: i32) -> String {
    format!(
        "{}/{}/1min/{year}/",
        base.trim_end_matches('/'),
        spacecraft.as_str()
    )
}

fn file_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"sept_[a-z]+_[a-z]+_[a-z]+_\d{4}_\d{3}_1min_l2_v(\d+)\.dat").ok()
        })
        .as_ref()
}

/// Product version encoded in a SEPT file name.
pub fn file_version(name: &str) -> Option<u32> {
    file_pattern()?
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// All SEPT file names linked from an index page, deduplicated.
pub fn index_file_names(html: &str) -> Vec<String> {
    let Some(pattern) = file_pattern() else {
        return Vec::new();
    };
    let mut names: Vec<String> = pattern
        .find_iter(html)
        .map(|m| m.as_str().to_string())
        .collect();
    names.sort();
    names.dedup();
    names
}

/// The highest-version name starting with `prefix`.
pub fn pick_latest<'a, I>(names: I, prefix: &str) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .filter(|n| n.starts_with(prefix))
        .filter_map(|n| file_version(n).map(|v| (v, n)))
        .max_by_key(|(v, _)| *v)
        .map(|(_, n)| n.to_string())
}

fn column_names(channels: &ChannelTable) -> Vec<String> {
    let mut names: Vec<String> = TIME_COLUMNS.iter().map(|s| s.to_string()).collect();
    names.extend(channels.channels().iter().map(|c| c.column_name()));
    names.extend(channels.channels().iter().map(|c| c.error_column_name()));
    names.push(INTEGRATION_TIME.to_string());
    names
}

fn empty_table(channels: &ChannelTable) -> Result<TimeTable, TableError> {
    let columns = column_names(channels)
        .into_iter()
        .map(|name| DataColumn::new(name, Vec::new()))
        .collect();
    TimeTable::new(Vec::new(), columns)
}

/// Julian date to milliseconds since the Unix epoch.
pub fn julian_to_millis(jd: f64) -> i64 {
    ((jd - JD_UNIX_EPOCH) * 86_400_000.0).round() as i64
}

/// Parse the contents of one SEPT file.
///
/// Returns every column of the file; bad-data markers become NaN. The time
/// axis comes from the Julian date column.
pub fn parse_sept(
    text: &str,
    channels: &ChannelTable,
    source_name: &str,
) -> Result<TimeTable, ParseError> {
    let names = column_names(channels);
    let mut times = Vec::new();
    let mut values: Vec<Vec<f64>> = vec![Vec::new(); names.len()];

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != names.len() {
            return Err(ParseError::Sept {
                file: source_name.to_string(),
                line: idx + 1,
                reason: format!("expected {} columns, found {}", names.len(), fields.len()),
            });
        }

        let row = fields
            .iter()
            .zip(&names)
            .map(|(field, name)| {
                field.parse::<f64>().map_err(|_| ParseError::Sept {
                    file: source_name.to_string(),
                    line: idx + 1,
                    reason: format!("column '{name}': '{field}' is not a number"),
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;

        times.push(julian_to_millis(row[0]));
        for (out, v) in values.iter_mut().zip(row) {
            out.push(v);
        }
    }

    let columns = names
        .into_iter()
        .zip(values)
        .map(|(name, values)| DataColumn::new(name, values))
        .collect();
    let mut table = TimeTable::new(times, columns).map_err(|e| ParseError::Sept {
        file: source_name.to_string(),
        line: 0,
        reason: e.to_string(),
    })?;
    table.mask_value(SEPT_FILL_VALUE);
    Ok(table)
}

/// Keep only flux and uncertainty columns.
fn drop_bookkeeping_columns(table: &mut TimeTable) {
    table.retain_columns(|name| name.starts_with("ch_") || name.starts_with("err_ch_"));
}

/// Load SEPT data for the configured day range.
///
/// Days without a published file are skipped. An unreachable server yields
/// an empty table.
pub fn load(
    fetcher: &dyn Fetcher,
    store: &LocalStore,
    config: &LoadConfig,
) -> Result<(TimeTable, ChannelTable), LoadError> {
    let channels = ChannelTable::sept(config.sept_species);
    let dir = store.root().to_path_buf();

    let mut local: Vec<(NaiveDate, PathBuf)> = Vec::new();
    let mut requests: Vec<(NaiveDate, DownloadRequest)> = Vec::new();
    let mut indexes: HashMap<i32, Option<Vec<String>>> = HashMap::new();

    for day in config.days() {
        let prefix = file_prefix(
            config.spacecraft,
            config.sept_species,
            config.sept_viewing,
            day,
        );

        if let Some(path) = find_local(store, &dir, &prefix) {
            local.push((day, path));
            continue;
        }

        let index = indexes.entry(day.year()).or_insert_with(|| {
            fetch_index(
                fetcher,
                &config.endpoints.sept_base,
                config.spacecraft,
                day.year(),
            )
        });

        let name = match index {
            Some(names) => match pick_latest(names.iter().map(String::as_str), &prefix) {
                Some(name) => name,
                None => {
                    debug!(%day, "no SEPT file listed for day");
                    continue;
                }
            },
            // Index unavailable: fall back to the conventional version
            None => file_name(
                config.spacecraft,
                config.sept_species,
                config.sept_viewing,
                day,
                SEPT_DEFAULT_VERSION,
            ),
        };

        let url = format!(
            "{}{name}",
            index_url(&config.endpoints.sept_base, config.spacecraft, day.year())
        );
        requests.push((
            day,
            DownloadRequest {
                url,
                dir: dir.clone(),
                file_name: name,
            },
        ));
    }

    let batch: Vec<DownloadRequest> = requests.iter().map(|(_, r)| r.clone()).collect();
    let summary = download_all(fetcher, store, &batch, config.max_conn)?;
    for ((day, _), outcome) in requests.iter().zip(&summary.outcomes) {
        if let Some(path) = outcome.path() {
            local.push((*day, path.clone()));
        }
    }
    local.sort();

    info!(
        spacecraft = %config.spacecraft,
        species = %config.sept_species,
        viewing = %config.sept_viewing,
        files = local.len(),
        downloaded = summary.fetched_count(),
        failed = summary.failed_count(),
        "SEPT files resolved"
    );

    let mut tables = Vec::with_capacity(local.len());
    for (_, path) in &local {
        tables.push(read_sept_file(store, path, &channels)?);
    }

    // No files still yields the channel columns, just without rows
    let mut table = if tables.is_empty() {
        empty_table(&channels)?
    } else {
        TimeTable::concat(tables)
    };
    if !config.all_columns {
        drop_bookkeeping_columns(&mut table);
    }
    Ok((table, channels))
}

fn find_local(store: &LocalStore, dir: &Path, prefix: &str) -> Option<PathBuf> {
    let candidates = store.find(dir, prefix, ".dat");
    let best = pick_latest(
        candidates
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str())),
        prefix,
    )?;
    store.lookup(dir, &best)
}

fn fetch_index(
    fetcher: &dyn Fetcher,
    base: &str,
    spacecraft: Spacecraft,
    year: i32,
) -> Option<Vec<String>> {
    let url = index_url(base, spacecraft, year);
    match fetcher.get(&url) {
        Ok(Some(body)) => {
            let names = index_file_names(&String::from_utf8_lossy(&body));
            debug!(url = %url, files = names.len(), "SEPT index");
            Some(names)
        }
        Ok(None) => {
            warn!(url = %url, "SEPT index page not found");
            Some(Vec::new())
        }
        Err(e) => {
            warn!(url = %url, error = %e, "SEPT index page unavailable");
            None
        }
    }
}

/// Unparseable files are quarantined so the next load downloads them again.
fn read_sept_file(
    store: &LocalStore,
    path: &Path,
    channels: &ChannelTable,
) -> Result<TimeTable, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    match parse_sept(&text, channels, &name) {
        Ok(table) => Ok(table),
        Err(e) => {
            store.discard(path, &e.to_string())?;
            Err(e.into())
        }
    }
}
