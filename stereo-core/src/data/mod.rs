//! Remote acquisition and local storage

pub mod cache;
pub mod cdaweb;
pub mod download;
pub mod http;
pub mod provider;
pub mod sept;

pub use cache::{DirStatus, LocalStore, Manifest, ManifestEntry, StoreError};
pub use cdaweb::{ArchiveLoad, ParameterInfo};
pub use download::{download_all, DownloadOutcome, DownloadRequest, DownloadSummary};
pub use http::HttpFetcher;
pub use provider::{FetchError, Fetcher, ParseError};
