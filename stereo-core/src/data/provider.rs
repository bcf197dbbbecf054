//! Fetch capability and structured error types.
//!
//! The `Fetcher` trait abstracts over how remote resources are retrieved so
//! the loaders can run against the real archives or an in-memory mock.

use thiserror::Error;

/// Remote retrieval failures. The loaders treat all of these as "no data"
/// for the affected interval.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("failed to read response body from {url}: {reason}")]
    Body { url: String, reason: String },

    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

/// Malformed content in a file that was retrieved successfully.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{file}:{line}: {reason}")]
    Sept {
        file: String,
        line: usize,
        reason: String,
    },

    #[error("{source_name}:{line}: {reason}")]
    ArchiveCsv {
        source_name: String,
        line: usize,
        reason: String,
    },

    #[error("archive parameter catalogue: {0}")]
    ArchiveInfo(String),
}

/// Retrieves remote resources.
///
/// Implementations must be shareable across the download worker pool.
pub trait Fetcher: Send + Sync {
    /// Human-readable name of this fetcher.
    fn name(&self) -> &str;

    /// GET `url`. `Ok(None)` means the resource does not exist (HTTP 404).
    fn get(&self, url: &str) -> Result<Option<Vec<u8>>, FetchError>;
}

impl<F: Fetcher + ?Sized> Fetcher for &F {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn get(&self, url: &str) -> Result<Option<Vec<u8>>, FetchError> {
        (**self).get(url)
    }
}

impl<F: Fetcher + ?Sized> Fetcher for Box<F> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn get(&self, url: &str) -> Result<Option<Vec<u8>>, FetchError> {
        (**self).get(url)
    }
}
