//! Instrument, spacecraft and per-instrument selectors.
//!
//! All selectors parse case-insensitively and accept the short aliases
//! researchers type by habit (`a`/`sta` for Ahead, `e` for electrons, ...).
//! Serde goes through the same parser so TOML configs accept the aliases too.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! string_serde {
    ($ty:ty) => {
        impl TryFrom<String> for $ty {
            type Error = ConfigError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.as_str().to_string()
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// STEREO instruments this crate can load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Instrument {
    /// IMPACT High Energy Telescope, level 1.
    Het,
    /// IMPACT Low Energy Telescope, level 1.
    Let,
    /// IMPACT magnetometer, 1-minute vectors.
    Mag,
    /// IMPACT magnetometer, burst mode (~0.03 s).
    Magb,
    /// IMPACT Solar Electron and Proton Telescope, level 2 (Kiel ASCII files).
    Sept,
}

impl Instrument {
    pub fn as_str(&self) -> &'static str {
        match self {
            Instrument::Het => "HET",
            Instrument::Let => "LET",
            Instrument::Mag => "MAG",
            Instrument::Magb => "MAGB",
            Instrument::Sept => "SEPT",
        }
    }

    /// CDAWeb dataset identifier, e.g. `STA_L1_HET` or `STB_L1_MAG_RTN`.
    ///
    /// `None` for SEPT, which is not served by the archive.
    pub fn dataset_id(&self, spacecraft: Spacecraft, coord: MagCoord) -> Option<String> {
        let sc = spacecraft.archive_prefix();
        match self {
            Instrument::Sept => None,
            Instrument::Mag | Instrument::Magb => Some(format!(
                "{sc}_L1_{}_{}",
                self.as_str(),
                coord.as_str()
            )),
            Instrument::Het | Instrument::Let => Some(format!("{sc}_L1_{}", self.as_str())),
        }
    }
}

impl FromStr for Instrument {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HET" => Ok(Instrument::Het),
            "LET" => Ok(Instrument::Let),
            "MAG" => Ok(Instrument::Mag),
            "MAGB" => Ok(Instrument::Magb),
            "SEPT" => Ok(Instrument::Sept),
            _ => Err(ConfigError::UnknownInstrument(s.to_string())),
        }
    }
}

string_serde!(Instrument);

/// One of the two STEREO spacecraft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Spacecraft {
    #[default]
    Ahead,
    Behind,
}

impl Spacecraft {
    pub fn as_str(&self) -> &'static str {
        match self {
            Spacecraft::Ahead => "ahead",
            Spacecraft::Behind => "behind",
        }
    }

    /// `STA` / `STB`, the prefix of archive dataset identifiers.
    pub fn archive_prefix(&self) -> &'static str {
        match self {
            Spacecraft::Ahead => "STA",
            Spacecraft::Behind => "STB",
        }
    }
}

impl FromStr for Spacecraft {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ahead" | "a" | "sta" => Ok(Spacecraft::Ahead),
            "behind" | "b" | "stb" => Ok(Spacecraft::Behind),
            _ => Err(ConfigError::UnknownSpacecraft(s.to_string())),
        }
    }
}

string_serde!(Spacecraft);

/// Coordinate system of the magnetometer products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MagCoord {
    /// Radial-tangential-normal.
    #[default]
    Rtn,
    /// Spacecraft coordinates.
    Sc,
}

impl MagCoord {
    pub fn as_str(&self) -> &'static str {
        match self {
            MagCoord::Rtn => "RTN",
            MagCoord::Sc => "SC",
        }
    }
}

impl FromStr for MagCoord {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RTN" => Ok(MagCoord::Rtn),
            "SC" => Ok(MagCoord::Sc),
            _ => Err(ConfigError::UnknownCoordinateSystem(s.to_string())),
        }
    }
}

string_serde!(MagCoord);

/// Particle species measured by SEPT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Species {
    #[default]
    Electrons,
    Ions,
}

impl Species {
    /// Token used in SEPT file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Species::Electrons => "ele",
            Species::Ions => "ion",
        }
    }
}

impl FromStr for Species {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "e" | "ele" | "electron" | "electrons" => Ok(Species::Electrons),
            "p" | "h" | "i" | "ion" | "ions" | "proton" | "protons" => Ok(Species::Ions),
            _ => Err(ConfigError::UnknownSpecies(s.to_string())),
        }
    }
}

string_serde!(Species);

/// SEPT viewing direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Viewing {
    #[default]
    Sun,
    Asun,
    North,
    South,
}

impl Viewing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Viewing::Sun => "sun",
            Viewing::Asun => "asun",
            Viewing::North => "north",
            Viewing::South => "south",
        }
    }
}

impl FromStr for Viewing {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sun" => Ok(Viewing::Sun),
            "asun" => Ok(Viewing::Asun),
            "north" => Ok(Viewing::North),
            "south" => Ok(Viewing::South),
            _ => Err(ConfigError::UnknownViewing(s.to_string())),
        }
    }
}

string_serde!(Viewing);
