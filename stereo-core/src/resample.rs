//! Fixed-interval down-sampling by averaging.
//!
//! Buckets are aligned to midnight (UTC) of the first row's day, so a
//! `10min` frequency always produces buckets starting at :00, :10, :20, ...
//! Each output value is the mean of the non-NaN inputs in the bucket.
//! Buckets without rows are not emitted.

use crate::config::{ConfigError, TimestampPosition};
use crate::table::{DataColumn, TimeTable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MS_PER_DAY: i64 = 86_400_000;

/// A resampling interval, parsed from strings like `30s`, `1min`, `1h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Frequency {
    millis: i64,
}

impl Frequency {
    pub fn as_millis(&self) -> i64 {
        self.millis
    }
}

impl FromStr for Frequency {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidFrequency(s.to_string());
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (count, unit) = trimmed.split_at(split);

        // "min" alone means one minute
        let count: i64 = if count.is_empty() {
            1
        } else {
            count.parse().map_err(|_| invalid())?
        };

        let unit_ms = match unit.trim() {
            "ms" | "L" => 1,
            "s" | "S" | "sec" => 1_000,
            "min" | "T" | "m" => 60_000,
            "h" | "H" => 3_600_000,
            "d" | "D" => MS_PER_DAY,
            _ => return Err(invalid()),
        };

        count
            .checked_mul(unit_ms)
            .filter(|ms| *ms > 0)
            .map(|millis| Frequency { millis })
            .ok_or_else(invalid)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.millis;
        if ms % MS_PER_DAY == 0 {
            write!(f, "{}D", ms / MS_PER_DAY)
        } else if ms % 3_600_000 == 0 {
            write!(f, "{}h", ms / 3_600_000)
        } else if ms % 60_000 == 0 {
            write!(f, "{}min", ms / 60_000)
        } else if ms % 1_000 == 0 {
            write!(f, "{}s", ms / 1_000)
        } else {
            write!(f, "{ms}ms")
        }
    }
}

impl TryFrom<String> for Frequency {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Frequency> for String {
    fn from(value: Frequency) -> Self {
        value.to_string()
    }
}

/// Running mean that ignores NaN.
#[derive(Clone, Copy, Default)]
struct NanMean {
    sum: f64,
    count: u32,
}

impl NanMean {
    fn push(&mut self, v: f64) {
        if !v.is_nan() {
            self.sum += v;
            self.count += 1;
        }
    }

    fn value(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Down-sample `table` to `frequency`.
///
/// The input must be canonical (sorted by time); loader output always is.
pub fn resample(table: &TimeTable, frequency: Frequency, position: TimestampPosition) -> TimeTable {
    let Some(&first) = table.times().first() else {
        return table.clone();
    };

    let every = frequency.as_millis();
    let origin = first.div_euclid(MS_PER_DAY) * MS_PER_DAY;
    let offset = match position {
        TimestampPosition::Center => every / 2,
        TimestampPosition::Start => 0,
    };

    let n_cols = table.columns().len();
    let mut times: Vec<i64> = Vec::new();
    let mut accumulators: Vec<Vec<NanMean>> = vec![Vec::new(); n_cols];
    let mut current_bucket: Option<i64> = None;

    for (row, &t) in table.times().iter().enumerate() {
        let bucket = origin + (t - origin).div_euclid(every) * every;
        if current_bucket != Some(bucket) {
            current_bucket = Some(bucket);
            times.push(bucket + offset);
            for acc in &mut accumulators {
                acc.push(NanMean::default());
            }
        }
        for (acc, column) in accumulators.iter_mut().zip(table.columns()) {
            if let Some(last) = acc.last_mut() {
                last.push(column.values[row]);
            }
        }
    }

    let columns = table
        .columns()
        .iter()
        .zip(accumulators)
        .map(|(column, acc)| {
            DataColumn::new(column.name.clone(), acc.iter().map(NanMean::value).collect())
        })
        .collect();

    // Same column names and equal lengths by construction
    TimeTable::new(times, columns).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::parse_timestamp;

    fn ts(s: &str) -> i64 {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn frequency_parse() {
        assert_eq!("1min".parse::<Frequency>().unwrap().as_millis(), 60_000);
        assert_eq!("10min".parse::<Frequency>().unwrap().as_millis(), 600_000);
        assert_eq!("15T".parse::<Frequency>().unwrap().as_millis(), 900_000);
        assert_eq!("30s".parse::<Frequency>().unwrap().as_millis(), 30_000);
        assert_eq!("1h".parse::<Frequency>().unwrap().as_millis(), 3_600_000);
        assert_eq!("1D".parse::<Frequency>().unwrap().as_millis(), MS_PER_DAY);
        assert_eq!("500ms".parse::<Frequency>().unwrap().as_millis(), 500);
        assert_eq!("min".parse::<Frequency>().unwrap().as_millis(), 60_000);
    }

    #[test]
    fn frequency_rejects_garbage() {
        for bad in ["", "0min", "10 parsecs", "-5s", "1.5h", "abc"] {
            assert!(
                matches!(bad.parse::<Frequency>(), Err(ConfigError::InvalidFrequency(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn frequency_display_roundtrip() {
        for s in ["10min", "30s", "1h", "1D", "250ms"] {
            let f: Frequency = s.parse().unwrap();
            assert_eq!(f.to_string(), s);
        }
    }

    #[test]
    fn averages_within_buckets() {
        let table = TimeTable::new(
            vec![
                ts("2021-04-15T00:00:00Z"),
                ts("2021-04-15T00:01:00Z"),
                ts("2021-04-15T00:10:00Z"),
                ts("2021-04-15T00:12:00Z"),
            ],
            vec![DataColumn::new("a", vec![1.0, 3.0, 10.0, f64::NAN])],
        )
        .unwrap();

        let out = resample(&table, "10min".parse().unwrap(), TimestampPosition::Start);
        assert_eq!(
            out.times(),
            &[ts("2021-04-15T00:00:00Z"), ts("2021-04-15T00:10:00Z")]
        );
        assert_eq!(out.column("a").unwrap(), &[2.0, 10.0]);
    }

    #[test]
    fn center_position_shifts_by_half() {
        let table = TimeTable::new(
            vec![ts("2021-04-15T00:03:00Z")],
            vec![DataColumn::new("a", vec![5.0])],
        )
        .unwrap();

        let out = resample(&table, "10min".parse().unwrap(), TimestampPosition::Center);
        assert_eq!(out.times(), &[ts("2021-04-15T00:05:00Z")]);
    }

    #[test]
    fn all_nan_bucket_stays_nan() {
        let table = TimeTable::new(
            vec![ts("2021-04-15T00:00:00Z"), ts("2021-04-15T00:00:30Z")],
            vec![DataColumn::new("a", vec![f64::NAN, f64::NAN])],
        )
        .unwrap();

        let out = resample(&table, "1min".parse().unwrap(), TimestampPosition::Start);
        assert_eq!(out.len(), 1);
        assert!(out.column("a").unwrap()[0].is_nan());
    }

    #[test]
    fn gaps_do_not_produce_rows() {
        let table = TimeTable::new(
            vec![ts("2021-04-15T00:00:00Z"), ts("2021-04-15T05:00:00Z")],
            vec![DataColumn::new("a", vec![1.0, 2.0])],
        )
        .unwrap();

        let out = resample(&table, "1min".parse().unwrap(), TimestampPosition::Start);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn buckets_align_to_first_day_midnight() {
        // 7 minutes does not divide an hour; origin is still 00:00 of the day
        let table = TimeTable::new(
            vec![ts("2021-04-15T00:15:00Z")],
            vec![DataColumn::new("a", vec![1.0])],
        )
        .unwrap();

        let out = resample(&table, "7min".parse().unwrap(), TimestampPosition::Start);
        assert_eq!(out.times(), &[ts("2021-04-15T00:14:00Z")]);
    }

    #[test]
    fn empty_table_passes_through() {
        let out = resample(&TimeTable::empty(), "1min".parse().unwrap(), TimestampPosition::Center);
        assert!(out.is_empty());
    }
}
