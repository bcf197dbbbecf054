//! Energy channel metadata and channel averaging.
//!
//! Channel *numbers* (bins) do not start at zero: the lowest SEPT channels
//! are excluded from the level 2 product, so the first flux column is `ch_2`.
//! [`ChannelTable::position`] maps a channel number to its index.

use crate::domain::Species;
use crate::table::TimeTable;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from channel lookups and averaging.
#[derive(Debug, Error, PartialEq)]
pub enum ChannelError {
    #[error("channel range [{0}, {1}] is inverted")]
    InvertedRange(u32, u32),

    #[error("channel {0} is not part of this instrument's channel table")]
    UnknownChannel(u32),

    #[error("data table has no column '{0}'")]
    MissingColumn(String),

    #[error("invalid channel label '{0}'")]
    InvalidLabel(String),
}

/// One energy channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Channel number as used in column names (`ch_{bin}`).
    pub bin: u32,
    /// Lower energy bound in keV.
    pub low_kev: f64,
    /// Upper energy bound in keV.
    pub high_kev: f64,
    /// Energy width in MeV.
    pub de_mev: f64,
    /// Mean energy in keV.
    pub mean_kev: f64,
}

impl ChannelInfo {
    /// `"45.0 - 55.0 keV"`
    pub fn label(&self) -> String {
        energy_label(self.low_kev, self.high_kev)
    }

    /// Name of the flux column for this channel.
    pub fn column_name(&self) -> String {
        format!("ch_{}", self.bin)
    }

    /// Name of the uncertainty column for this channel.
    pub fn error_column_name(&self) -> String {
        format!("err_ch_{}", self.bin)
    }
}

/// Channel metadata, ordered by channel number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelTable {
    channels: Vec<ChannelInfo>,
}

impl ChannelTable {
    pub fn new(mut channels: Vec<ChannelInfo>) -> Self {
        channels.sort_by_key(|c| c.bin);
        Self { channels }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channels(&self) -> &[ChannelInfo] {
        &self.channels
    }

    pub fn bins(&self) -> Vec<u32> {
        self.channels.iter().map(|c| c.bin).collect()
    }

    /// Index of a channel number in this table.
    pub fn position(&self, bin: u32) -> Option<usize> {
        self.channels.iter().position(|c| c.bin == bin)
    }

    pub fn get(&self, bin: u32) -> Option<&ChannelInfo> {
        self.position(bin).map(|i| &self.channels[i])
    }

    /// SEPT level 2 channels for a species.
    pub fn sept(species: Species) -> Self {
        match species {
            Species::Electrons => sept_electron_channels(),
            Species::Ions => sept_ion_channels(),
        }
    }
}

/// `"{low:.1} - {high:.1} keV"`
pub fn energy_label(low_kev: f64, high_kev: f64) -> String {
    format!("{low_kev:.1} - {high_kev:.1} keV")
}

/// Parse a channel label such as `"84.1-92.7 keV"` or `"875.8- 982.8 keV"`.
pub fn parse_energy_label(label: &str) -> Result<(f64, f64), ChannelError> {
    let invalid = || ChannelError::InvalidLabel(label.to_string());
    let body = label.trim().trim_end_matches("keV").trim();
    let (low, high) = body.split_once('-').ok_or_else(invalid)?;
    let low: f64 = low.trim().parse().map_err(|_| invalid())?;
    let high: f64 = high.trim().parse().map_err(|_| invalid())?;
    Ok((low, high))
}

/// Average the flux columns of channels `range[0]..=range[1]`.
///
/// Returns the per-row unweighted mean and a label spanning the lowest lower
/// bound to the highest upper bound of the selected channels. A NaN in any
/// selected column makes that row's mean NaN. For a single channel the raw
/// column and that channel's own label come back unchanged.
pub fn combine_channels(
    table: &TimeTable,
    channels: &ChannelTable,
    range: [u32; 2],
) -> Result<(Vec<f64>, String), ChannelError> {
    let [first, last] = range;
    if first > last {
        return Err(ChannelError::InvertedRange(first, last));
    }

    let start = channels
        .position(first)
        .ok_or(ChannelError::UnknownChannel(first))?;
    let end = channels
        .position(last)
        .ok_or(ChannelError::UnknownChannel(last))?;
    let selected = &channels.channels()[start..=end];

    let columns = selected
        .iter()
        .map(|c| {
            let name = c.column_name();
            table
                .column(&name)
                .ok_or(ChannelError::MissingColumn(name))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let low = selected
        .iter()
        .map(|c| c.low_kev)
        .fold(f64::INFINITY, f64::min);
    let high = selected
        .iter()
        .map(|c| c.high_kev)
        .fold(f64::NEG_INFINITY, f64::max);
    let label = energy_label(low, high);

    if columns.len() == 1 {
        return Ok((columns[0].to_vec(), label));
    }

    let n = columns.len() as f64;
    let averaged = (0..table.len())
        .map(|row| columns.iter().map(|col| col[row]).sum::<f64>() / n)
        .collect();

    Ok((averaged, label))
}

// ── SEPT channel tables ─────────────────────────────────────────────

const SEPT_ELECTRON_LABELS: [&str; 15] = [
    "45.0-55.0 keV",
    "55.0-65.0 keV",
    "65.0-75.0 keV",
    "75.0-85.0 keV",
    "85.0-105.0 keV",
    "105.0-125.0 keV",
    "125.0-145.0 keV",
    "145.0-165.0 keV",
    "165.0-195.0 keV",
    "195.0-225.0 keV",
    "225.0-255.0 keV",
    "255.0-295.0 keV",
    "295.0-335.0 keV",
    "335.0-375.0 keV",
    "375.0-425.0 keV",
];

const SEPT_ELECTRON_DE: [f64; 15] = [
    0.0100, 0.0100, 0.0100, 0.0100, 0.0200, 0.0200, 0.0200, 0.0200, 0.0300, 0.0300, 0.0300,
    0.0400, 0.0400, 0.0400, 0.0500,
];

const SEPT_ION_LABELS: [&str; 30] = [
    "84.1-92.7 keV",
    "92.7-101.3 keV",
    "101.3-110.0 keV",
    "110.0-118.6 keV",
    "118.6-137.0 keV",
    "137.0-155.8 keV",
    "155.8-174.6 keV",
    "174.6-192.6 keV",
    "192.6-219.5 keV",
    "219.5-246.4 keV",
    "246.4-273.4 keV",
    "273.4-312.0 keV",
    "312.0-350.7 keV",
    "350.7-389.5 keV",
    "389.5-438.1 keV",
    "438.1-496.4 keV",
    "496.4-554.8 keV",
    "554.8-622.9 keV",
    "622.9-700.7 keV",
    "700.7-788.3 keV",
    "788.3-875.8 keV",
    "875.8-982.8 keV",
    "982.8-1111.9 keV",
    "1111.9-1250.8 keV",
    "1250.8-1399.7 keV",
    "1399.7-1578.4 keV",
    "1578.4-1767.0 keV",
    "1767.0-1985.3 keV",
    "1985.3-2223.6 keV",
    "2223.6-6500.0 keV",
];

const SEPT_ION_DE: [f64; 30] = [
    0.0086, 0.0086, 0.0087, 0.0086, 0.0184, 0.0188, 0.0188, 0.018, 0.0269, 0.0269, 0.027,
    0.0386, 0.0387, 0.0388, 0.0486, 0.0583, 0.0584, 0.0681, 0.0778, 0.0876, 0.0875, 0.107,
    0.1291, 0.1389, 0.1489, 0.1787, 0.1886, 0.2183, 0.2383, 4.2764,
];

const SEPT_ION_MEAN_E: [f64; 30] = [
    88.30, 96.90, 105.56, 114.22, 127.47, 146.10, 164.93, 183.38, 205.61, 232.56, 259.55,
    292.06, 330.78, 369.59, 413.09, 466.34, 524.79, 587.86, 660.66, 743.21, 830.90, 927.76,
    1045.36, 1179.31, 1323.16, 1486.37, 1670.04, 1872.97, 2101.07, 3801.76,
];

/// First channel number present in SEPT level 2 files.
pub const SEPT_FIRST_BIN: u32 = 2;

fn build_sept_table(labels: &[&str], de: &[f64], mean_e: Option<&[f64]>) -> ChannelTable {
    let channels = labels
        .iter()
        .enumerate()
        .filter_map(|(i, label)| {
            // The label constants above are well-formed
            let (low, high) = parse_energy_label(label).ok()?;
            Some(ChannelInfo {
                bin: SEPT_FIRST_BIN + i as u32,
                low_kev: low,
                high_kev: high,
                de_mev: de[i],
                mean_kev: mean_e.map_or_else(|| (low * high).sqrt(), |m| m[i]),
            })
        })
        .collect();
    ChannelTable::new(channels)
}

fn sept_electron_channels() -> ChannelTable {
    build_sept_table(&SEPT_ELECTRON_LABELS, &SEPT_ELECTRON_DE, None)
}

fn sept_ion_channels() -> ChannelTable {
    build_sept_table(&SEPT_ION_LABELS, &SEPT_ION_DE, Some(&SEPT_ION_MEAN_E))
}
