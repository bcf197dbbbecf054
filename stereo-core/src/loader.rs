//! Instrument dispatch: the single entry point for loading STEREO data.
//!
//! ```text
//! validate config → create storage root → per-instrument acquisition
//!   → canonical table → optional resample → (table, metadata)
//! ```

use crate::channels::ChannelTable;
use crate::config::{ConfigError, LoadConfig};
use crate::data::cache::{LocalStore, StoreError};
use crate::data::cdaweb::{self, ParameterInfo};
use crate::data::http::HttpFetcher;
use crate::data::provider::{FetchError, Fetcher, ParseError};
use crate::data::sept;
use crate::domain::Instrument;
use crate::resample::resample;
use crate::table::{TableError, TimeTable};
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

/// Everything that can fail in a load call.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("failed to read {path}: {reason}")]
    Io { path: PathBuf, reason: String },
}

/// Instrument-specific metadata returned with the table.
#[derive(Debug, Clone, PartialEq)]
pub enum Metadata {
    /// SEPT energy channels.
    Channels(ChannelTable),
    /// Archive dataset, the local files read and the decoded parameters.
    Archive {
        dataset: String,
        files: Vec<PathBuf>,
        parameters: Vec<ParameterInfo>,
    },
}

impl Metadata {
    pub fn channels(&self) -> Option<&ChannelTable> {
        match self {
            Metadata::Channels(c) => Some(c),
            Metadata::Archive { .. } => None,
        }
    }
}

/// Result of a load call.
#[derive(Debug, Clone)]
pub struct LoadOutput {
    pub table: TimeTable,
    pub metadata: Metadata,
}

/// Loads instrument data through a `Fetcher`.
pub struct Loader<F: Fetcher> {
    fetcher: F,
}

impl<F: Fetcher> Loader<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    /// Load data for `config`.
    ///
    /// Config problems fail before any I/O. Remote failures degrade to an
    /// empty table.
    pub fn load(&self, config: &LoadConfig) -> Result<LoadOutput, LoadError> {
        config.validate()?;

        let store = LocalStore::new(config.storage_root());
        store.ensure_dir(store.root())?;

        let (table, metadata) = match config.instrument {
            Instrument::Sept => {
                let (table, channels) = sept::load(&self.fetcher, &store, config)?;
                (table, Metadata::Channels(channels))
            }
            Instrument::Het | Instrument::Let | Instrument::Mag | Instrument::Magb => {
                let dataset = config
                    .instrument
                    .dataset_id(config.spacecraft, config.mag_coord)
                    .ok_or_else(|| {
                        ConfigError::UnknownInstrument(config.instrument.to_string())
                    })?;
                let loaded = cdaweb::load(
                    &self.fetcher,
                    &store,
                    &config.endpoints.hapi_server,
                    &dataset,
                    &config.days(),
                    config.max_conn,
                )?;
                (
                    loaded.table,
                    Metadata::Archive {
                        dataset,
                        files: loaded.files,
                        parameters: loaded.parameters,
                    },
                )
            }
        };

        let table = match config.resample {
            Some(frequency) if !table.is_empty() => {
                resample(&table, frequency, config.pos_timestamp)
            }
            _ => table,
        };

        info!(
            instrument = %config.instrument,
            spacecraft = %config.spacecraft,
            start = %config.start,
            end = %config.end,
            fetcher = self.fetcher.name(),
            rows = table.len(),
            columns = table.columns().len(),
            "load complete"
        );

        Ok(LoadOutput { table, metadata })
    }
}

/// Load data over HTTP from the configured endpoints.
pub fn load(config: &LoadConfig) -> Result<LoadOutput, LoadError> {
    Loader::new(HttpFetcher::new()?).load(config)
}
