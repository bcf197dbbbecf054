//! STEREO core: instrument data loading, tables, resampling and channel helpers.
//!
//! This crate contains:
//! - Domain types (instrument, spacecraft, species, viewing direction)
//! - `LoadConfig`, the explicit set of load options (TOML-loadable)
//! - `TimeTable`, the common time-indexed representation
//! - Archive (CDAWeb HAPI) and SEPT (Kiel ASCII) acquisition behind a `Fetcher`
//! - A local file store with BLAKE3-checked manifests
//! - Resampling and energy-channel averaging

pub mod channels;
pub mod config;
pub mod data;
pub mod domain;
pub mod loader;
pub mod resample;
pub mod table;

pub use channels::{combine_channels, ChannelError, ChannelInfo, ChannelTable};
pub use config::{ConfigError, LoadConfig, TimestampPosition};
pub use domain::{Instrument, MagCoord, Spacecraft, Species, Viewing};
pub use loader::{load, LoadError, LoadOutput, Loader, Metadata};
pub use resample::{resample, Frequency};
pub use table::{DataColumn, TimeTable};
