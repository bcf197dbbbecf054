//! Time-indexed measurement table.
//!
//! A `TimeTable` holds a UTC time axis (milliseconds since the Unix epoch)
//! and any number of named `f64` columns of the same length. Missing or bad
//! measurements are `NaN`.
//!
//! Tables coming out of the loaders are canonical: sorted ascending by time
//! with duplicate timestamps removed (first occurrence kept).

use chrono::{DateTime, NaiveDateTime, Utc};
use polars::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors from table construction and I/O.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("column '{name}' has {actual} values but the time axis has {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("column '{0}' not found")]
    MissingColumn(String),

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("dataframe error: {0}")]
    Polars(String),

    #[error("csv error: {0}")]
    Csv(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// A named column of measurements.
#[derive(Debug, Clone, PartialEq)]
pub struct DataColumn {
    pub name: String,
    pub values: Vec<f64>,
}

impl DataColumn {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Time axis plus measurement columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeTable {
    times: Vec<i64>,
    columns: Vec<DataColumn>,
}

impl TimeTable {
    /// Build a table, checking that every column matches the time axis.
    pub fn new(times: Vec<i64>, columns: Vec<DataColumn>) -> Result<Self, TableError> {
        let mut seen = HashSet::new();
        for column in &columns {
            if column.values.len() != times.len() {
                return Err(TableError::LengthMismatch {
                    name: column.name.clone(),
                    expected: times.len(),
                    actual: column.values.len(),
                });
            }
            if !seen.insert(column.name.as_str()) {
                return Err(TableError::DuplicateColumn(column.name.clone()));
            }
        }
        Ok(Self { times, columns })
    }

    /// A table with no rows and no columns.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Time axis in milliseconds since the Unix epoch (UTC).
    pub fn times(&self) -> &[i64] {
        &self.times
    }

    pub fn columns(&self) -> &[DataColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Values of a column by name.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Append a column.
    pub fn push_column(&mut self, column: DataColumn) -> Result<(), TableError> {
        if column.values.len() != self.times.len() {
            return Err(TableError::LengthMismatch {
                name: column.name,
                expected: self.times.len(),
                actual: column.values.len(),
            });
        }
        if self.column(&column.name).is_some() {
            return Err(TableError::DuplicateColumn(column.name));
        }
        self.columns.push(column);
        Ok(())
    }

    /// New table with only the named columns, in the given order.
    pub fn select(&self, names: &[&str]) -> Result<Self, TableError> {
        let columns = names
            .iter()
            .map(|name| {
                self.columns
                    .iter()
                    .find(|c| c.name == *name)
                    .cloned()
                    .ok_or_else(|| TableError::MissingColumn(name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            times: self.times.clone(),
            columns,
        })
    }

    /// Drop columns for which `keep` returns false.
    pub fn retain_columns(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.columns.retain(|c| keep(&c.name));
    }

    /// Concatenate tables row-wise and canonicalize the result.
    ///
    /// Columns are matched by name. A column missing from one of the inputs
    /// is filled with `NaN` for that input's rows.
    pub fn concat(tables: Vec<TimeTable>) -> TimeTable {
        let mut names: Vec<String> = Vec::new();
        for table in &tables {
            for column in &table.columns {
                if !names.contains(&column.name) {
                    names.push(column.name.clone());
                }
            }
        }

        let total: usize = tables.iter().map(|t| t.len()).sum();
        let mut times = Vec::with_capacity(total);
        let mut values: Vec<Vec<f64>> = vec![Vec::with_capacity(total); names.len()];

        for table in &tables {
            times.extend_from_slice(&table.times);
            for (name, out) in names.iter().zip(values.iter_mut()) {
                match table.column(name) {
                    Some(v) => out.extend_from_slice(v),
                    None => out.extend(std::iter::repeat(f64::NAN).take(table.len())),
                }
            }
        }

        let columns = names
            .into_iter()
            .zip(values)
            .map(|(name, values)| DataColumn { name, values })
            .collect();

        let mut table = TimeTable { times, columns };
        table.canonicalize();
        table
    }

    /// Sort rows by time and drop duplicate timestamps, keeping the first.
    pub fn canonicalize(&mut self) {
        let mut order: Vec<usize> = (0..self.times.len()).collect();
        order.sort_by_key(|&i| self.times[i]);

        let mut keep = Vec::with_capacity(order.len());
        let mut last = None;
        for i in order {
            if last != Some(self.times[i]) {
                keep.push(i);
                last = Some(self.times[i]);
            }
        }

        if keep.len() == self.times.len() && keep.iter().enumerate().all(|(a, &b)| a == b) {
            return;
        }

        self.times = keep.iter().map(|&i| self.times[i]).collect();
        for column in &mut self.columns {
            column.values = keep.iter().map(|&i| column.values[i]).collect();
        }
    }

    /// True if the time axis is strictly increasing.
    pub fn is_canonical(&self) -> bool {
        self.times.windows(2).all(|w| w[0] < w[1])
    }

    /// Replace every occurrence of `sentinel` with `NaN`.
    pub fn mask_value(&mut self, sentinel: f64) {
        for column in &mut self.columns {
            for v in &mut column.values {
                if *v == sentinel {
                    *v = f64::NAN;
                }
            }
        }
    }

    /// Convert to a Polars DataFrame with a `time` column of `Datetime(ms)`.
    pub fn to_dataframe(&self) -> Result<DataFrame, TableError> {
        let mut columns = Vec::with_capacity(self.columns.len() + 1);
        columns.push(
            Column::new("time".into(), self.times.clone())
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
                .map_err(|e| TableError::Polars(format!("time cast: {e}")))?,
        );
        for column in &self.columns {
            columns.push(Column::new(
                column.name.as_str().into(),
                column.values.clone(),
            ));
        }
        DataFrame::new(columns).map_err(|e| TableError::Polars(format!("dataframe creation: {e}")))
    }

    /// Write the table to a Parquet file.
    pub fn write_parquet(&self, path: &Path) -> Result<(), TableError> {
        let mut df = self.to_dataframe()?;
        let file = fs::File::create(path)
            .map_err(|e| TableError::Io(format!("create {}: {e}", path.display())))?;
        ParquetWriter::new(file)
            .finish(&mut df)
            .map_err(|e| TableError::Polars(format!("write parquet: {e}")))?;
        Ok(())
    }

    /// Write the table as CSV: a `time` column in ISO 8601, then the data
    /// columns. `NaN` is written as an empty field.
    pub fn write_csv(&self, path: &Path) -> Result<(), TableError> {
        let mut writer = csv::Writer::from_path(path)
            .map_err(|e| TableError::Csv(format!("create {}: {e}", path.display())))?;

        let mut header = vec!["time".to_string()];
        header.extend(self.columns.iter().map(|c| c.name.clone()));
        writer
            .write_record(&header)
            .map_err(|e| TableError::Csv(e.to_string()))?;

        for (row, &ms) in self.times.iter().enumerate() {
            let mut record = Vec::with_capacity(self.columns.len() + 1);
            record.push(format_millis(ms));
            for column in &self.columns {
                let v = column.values[row];
                record.push(if v.is_nan() { String::new() } else { v.to_string() });
            }
            writer
                .write_record(&record)
                .map_err(|e| TableError::Csv(e.to_string()))?;
        }

        writer.flush().map_err(|e| TableError::Io(e.to_string()))?;
        Ok(())
    }

    /// Read a CSV file previously written by [`TimeTable::write_csv`].
    pub fn read_csv(path: &Path) -> Result<Self, TableError> {
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| TableError::Csv(format!("open {}: {e}", path.display())))?;

        let headers = reader
            .headers()
            .map_err(|e| TableError::Csv(e.to_string()))?
            .clone();
        let names: Vec<String> = headers.iter().skip(1).map(String::from).collect();

        let mut times = Vec::new();
        let mut values: Vec<Vec<f64>> = vec![Vec::new(); names.len()];

        for record in reader.records() {
            let record = record.map_err(|e| TableError::Csv(e.to_string()))?;
            let raw_time = record.get(0).unwrap_or_default();
            let ms = parse_timestamp(raw_time)
                .ok_or_else(|| TableError::InvalidTimestamp(raw_time.to_string()))?;
            times.push(ms);
            for (i, out) in values.iter_mut().enumerate() {
                let field = record.get(i + 1).unwrap_or_default().trim();
                out.push(field.parse::<f64>().unwrap_or(f64::NAN));
            }
        }

        let columns = names
            .into_iter()
            .zip(values)
            .map(|(name, values)| DataColumn { name, values })
            .collect();
        let mut table = Self::new(times, columns)?;
        table.canonicalize();
        Ok(table)
    }
}

/// Milliseconds since the epoch to a naive UTC datetime.
pub fn millis_to_datetime(ms: i64) -> Option<NaiveDateTime> {
    DateTime::<Utc>::from_timestamp_millis(ms).map(|dt| dt.naive_utc())
}

/// Naive UTC datetime to milliseconds since the epoch.
pub fn datetime_to_millis(dt: NaiveDateTime) -> i64 {
    dt.and_utc().timestamp_millis()
}

/// `2021-04-15T00:00:30.000Z`
pub fn format_millis(ms: i64) -> String {
    match millis_to_datetime(ms) {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        None => ms.to_string(),
    }
}

/// Parse an ISO 8601 timestamp (calendar or ordinal date, optional `Z`)
/// into milliseconds since the epoch.
pub fn parse_timestamp(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    let naive = s.strip_suffix('Z').unwrap_or(s);
    [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%jT%H:%M:%S%.f",
        "%Y-%jT%H:%M:%S",
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(naive, fmt).ok())
    .map(datetime_to_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(times: Vec<i64>, a: Vec<f64>) -> TimeTable {
        TimeTable::new(times, vec![DataColumn::new("a", a)]).unwrap()
    }

    #[test]
    fn new_rejects_length_mismatch() {
        let err = TimeTable::new(vec![1, 2], vec![DataColumn::new("a", vec![1.0])]).unwrap_err();
        assert!(matches!(err, TableError::LengthMismatch { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn new_rejects_duplicate_columns() {
        let err = TimeTable::new(
            vec![1],
            vec![DataColumn::new("a", vec![1.0]), DataColumn::new("a", vec![2.0])],
        )
        .unwrap_err();
        assert!(matches!(err, TableError::DuplicateColumn(_)));
    }

    #[test]
    fn canonicalize_sorts_and_dedupes() {
        let mut t = table(vec![3, 1, 2, 1], vec![30.0, 10.0, 20.0, 11.0]);
        t.canonicalize();
        assert_eq!(t.times(), &[1, 2, 3]);
        // First occurrence of the duplicate timestamp wins
        assert_eq!(t.column("a").unwrap(), &[10.0, 20.0, 30.0]);
        assert!(t.is_canonical());
    }

    #[test]
    fn concat_matches_columns_by_name() {
        let first = table(vec![10, 20], vec![1.0, 2.0]);
        let second = TimeTable::new(
            vec![5, 30],
            vec![DataColumn::new("b", vec![7.0, 8.0]), DataColumn::new("a", vec![0.5, 3.0])],
        )
        .unwrap();

        let out = TimeTable::concat(vec![first, second]);
        assert_eq!(out.times(), &[5, 10, 20, 30]);
        assert_eq!(out.column_names(), vec!["a", "b"]);
        assert_eq!(out.column("a").unwrap(), &[0.5, 1.0, 2.0, 3.0]);

        let b = out.column("b").unwrap();
        assert_eq!(b[0], 7.0);
        assert!(b[1].is_nan());
        assert!(b[2].is_nan());
        assert_eq!(b[3], 8.0);
    }

    #[test]
    fn concat_of_nothing_is_empty() {
        let out = TimeTable::concat(Vec::new());
        assert!(out.is_empty());
        assert!(out.columns().is_empty());
    }

    #[test]
    fn mask_value_replaces_sentinel() {
        let mut t = table(vec![1, 2], vec![-9999.9, 4.0]);
        t.mask_value(-9999.9);
        let a = t.column("a").unwrap();
        assert!(a[0].is_nan());
        assert_eq!(a[1], 4.0);
    }

    #[test]
    fn select_keeps_order_and_reports_missing() {
        let t = TimeTable::new(
            vec![1],
            vec![DataColumn::new("a", vec![1.0]), DataColumn::new("b", vec![2.0])],
        )
        .unwrap();
        let s = t.select(&["b", "a"]).unwrap();
        assert_eq!(s.column_names(), vec!["b", "a"]);
        assert!(matches!(t.select(&["c"]), Err(TableError::MissingColumn(_))));
    }

    #[test]
    fn timestamp_formats() {
        let ms = parse_timestamp("2021-04-15T00:00:30.000Z").unwrap();
        assert_eq!(format_millis(ms), "2021-04-15T00:00:30.000Z");
        assert_eq!(parse_timestamp("2021-105T00:00:30Z"), Some(ms));
        assert_eq!(parse_timestamp("2021-04-15T00:00:30"), Some(ms));
        assert_eq!(parse_timestamp("2021-04-15T00:00:30+00:00"), Some(ms));
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn dataframe_has_time_column() {
        let t = table(vec![0, 60_000], vec![1.0, 2.0]);
        let df = t.to_dataframe().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 2);
        assert_eq!(
            df.column("time").unwrap().dtype(),
            &DataType::Datetime(TimeUnit::Milliseconds, None)
        );
    }

    #[test]
    fn csv_roundtrip_preserves_nan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");
        let t = table(vec![0, 60_000], vec![f64::NAN, 2.5]);

        t.write_csv(&path).unwrap();
        let back = TimeTable::read_csv(&path).unwrap();

        assert_eq!(back.times(), t.times());
        let a = back.column("a").unwrap();
        assert!(a[0].is_nan());
        assert_eq!(a[1], 2.5);
    }

    #[test]
    fn parquet_write_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.parquet");
        table(vec![0, 60_000], vec![1.0, 2.0])
            .write_parquet(&path)
            .unwrap();
        assert!(path.metadata().unwrap().len() > 0);
    }
}
