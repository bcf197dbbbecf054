//! Download orchestrator. Fetches a batch of files with bounded parallelism.
//!
//! Requests run on a dedicated rayon pool sized to `max_conn`, so at most
//! that many HTTP requests are in flight. Files already present in the
//! local store are not fetched again. Manifest entries for new files are
//! recorded once the whole batch is done.

use super::cache::{LocalStore, ManifestEntry, StoreError};
use super::provider::{FetchError, Fetcher};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

/// One file to fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub url: String,
    /// Directory the file is stored in.
    pub dir: PathBuf,
    pub file_name: String,
}

/// What happened to one request.
#[derive(Debug)]
pub enum DownloadOutcome {
    /// Served from the local store.
    Cached(PathBuf),
    /// Downloaded and stored.
    Fetched(PathBuf),
    /// The server has no such file, or returned an empty body.
    Missing,
    /// Network or storage failure.
    Failed(String),
}

impl DownloadOutcome {
    /// Local path, if the file is available.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            DownloadOutcome::Cached(p) | DownloadOutcome::Fetched(p) => Some(p),
            DownloadOutcome::Missing | DownloadOutcome::Failed(_) => None,
        }
    }
}

/// Summary of a batch download.
#[derive(Debug)]
pub struct DownloadSummary {
    /// One outcome per request, in request order.
    pub outcomes: Vec<DownloadOutcome>,
}

impl DownloadSummary {
    pub fn available(&self) -> Vec<PathBuf> {
        self.outcomes.iter().filter_map(|o| o.path().cloned()).collect()
    }

    pub fn fetched_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, DownloadOutcome::Fetched(_)))
            .count()
    }

    pub fn cached_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, DownloadOutcome::Cached(_)))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, DownloadOutcome::Failed(_)))
            .count()
    }
}

/// Fetch every request, at most `max_conn` at a time.
pub fn download_all(
    fetcher: &dyn Fetcher,
    store: &LocalStore,
    requests: &[DownloadRequest],
    max_conn: usize,
) -> Result<DownloadSummary, StoreError> {
    let run = || -> Vec<(DownloadOutcome, Option<ManifestEntry>)> {
        requests
            .par_iter()
            .map(|req| download_single(fetcher, store, req))
            .collect()
    };

    let results = match rayon::ThreadPoolBuilder::new()
        .num_threads(max_conn.max(1))
        .build()
    {
        Ok(pool) => pool.install(run),
        Err(e) => {
            warn!(error = %e, "could not build download pool, fetching sequentially");
            requests
                .iter()
                .map(|req| download_single(fetcher, store, req))
                .collect()
        }
    };

    // Manifest writes happen here, single-threaded, grouped by directory
    let mut by_dir: BTreeMap<PathBuf, Vec<ManifestEntry>> = BTreeMap::new();
    let mut outcomes = Vec::with_capacity(results.len());
    for (req, (outcome, entry)) in requests.iter().zip(results) {
        if let Some(entry) = entry {
            by_dir.entry(req.dir.clone()).or_default().push(entry);
        }
        outcomes.push(outcome);
    }
    for (dir, entries) in by_dir {
        store.record(&dir, entries)?;
    }

    Ok(DownloadSummary { outcomes })
}

/// Resolve one request: local store → fetch → store.
fn download_single(
    fetcher: &dyn Fetcher,
    store: &LocalStore,
    req: &DownloadRequest,
) -> (DownloadOutcome, Option<ManifestEntry>) {
    if let Some(path) = store.lookup(&req.dir, &req.file_name) {
        return (DownloadOutcome::Cached(path), None);
    }

    match fetcher.get(&req.url) {
        Ok(Some(bytes)) if !bytes.is_empty() => {
            match store.write_atomic(&req.dir, &req.file_name, &bytes, &req.url) {
                Ok((path, entry)) => {
                    debug!(url = %req.url, path = %path.display(), "stored");
                    (DownloadOutcome::Fetched(path), Some(entry))
                }
                Err(e) => {
                    warn!(url = %req.url, error = %e, "could not store download");
                    (DownloadOutcome::Failed(e.to_string()), None)
                }
            }
        }
        Ok(_) => {
            debug!(url = %req.url, "no file on server");
            (DownloadOutcome::Missing, None)
        }
        Err(e) => {
            log_fetch_failure(&req.url, &e);
            (DownloadOutcome::Failed(e.to_string()), None)
        }
    }
}

fn log_fetch_failure(url: &str, error: &FetchError) {
    warn!(url, error = %error, "download failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Counts requests and tracks the peak number in flight.
    struct CountingFetcher {
        files: HashMap<String, Vec<u8>>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: Mutex<usize>,
    }

    impl CountingFetcher {
        fn new(files: &[(&str, &str)]) -> Self {
            Self {
                files: files
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
                    .collect(),
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: Mutex::new(0),
            }
        }
    }

    impl Fetcher for CountingFetcher {
        fn name(&self) -> &str {
            "counting"
        }

        fn get(&self, url: &str) -> Result<Option<Vec<u8>>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            {
                let mut peak = self.peak.lock().unwrap();
                *peak = (*peak).max(now);
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if url.contains("offline") {
                return Err(FetchError::NetworkUnreachable(url.to_string()));
            }
            Ok(self.files.get(url).cloned())
        }
    }

    fn request(dir: &std::path::Path, name: &str) -> DownloadRequest {
        DownloadRequest {
            url: format!("http://host/{name}"),
            dir: dir.to_path_buf(),
            file_name: name.to_string(),
        }
    }

    #[test]
    fn outcomes_follow_request_order() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalStore::new(tmp.path());
        let fetcher = CountingFetcher::new(&[("http://host/a", "1"), ("http://host/c", "3")]);
        let requests = vec![
            request(tmp.path(), "a"),
            request(tmp.path(), "b"),
            request(tmp.path(), "c"),
        ];

        let summary = download_all(&fetcher, &store, &requests, 2).unwrap();
        assert!(matches!(summary.outcomes[0], DownloadOutcome::Fetched(_)));
        assert!(matches!(summary.outcomes[1], DownloadOutcome::Missing));
        assert!(matches!(summary.outcomes[2], DownloadOutcome::Fetched(_)));
        assert_eq!(summary.available().len(), 2);
        assert_eq!(store.read_manifest(tmp.path()).unwrap().files.len(), 2);
    }

    #[test]
    fn second_run_is_served_locally() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalStore::new(tmp.path());
        let fetcher = CountingFetcher::new(&[("http://host/a", "1")]);
        let requests = vec![request(tmp.path(), "a")];

        download_all(&fetcher, &store, &requests, 1).unwrap();
        let summary = download_all(&fetcher, &store, &requests, 1).unwrap();

        assert_eq!(summary.cached_count(), 1);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn tampered_file_is_fetched_again() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalStore::new(tmp.path());
        let fetcher = CountingFetcher::new(&[("http://host/a", "original")]);
        let requests = vec![request(tmp.path(), "a")];

        download_all(&fetcher, &store, &requests, 1).unwrap();
        std::fs::write(tmp.path().join("a"), b"tampered").unwrap();

        let summary = download_all(&fetcher, &store, &requests, 1).unwrap();
        assert!(matches!(summary.outcomes[0], DownloadOutcome::Fetched(_)));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(std::fs::read(tmp.path().join("a")).unwrap(), b"original");
        assert!(tmp.path().join("a.quarantined").exists());
    }

    #[test]
    fn failures_are_reported_not_raised() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalStore::new(tmp.path());
        let fetcher = CountingFetcher::new(&[]);
        let requests = vec![DownloadRequest {
            url: "http://offline/a".into(),
            dir: tmp.path().to_path_buf(),
            file_name: "a".into(),
        }];

        let summary = download_all(&fetcher, &store, &requests, 3).unwrap();
        assert_eq!(summary.failed_count(), 1);
        assert!(summary.available().is_empty());
    }

    #[test]
    fn parallelism_is_bounded_by_max_conn() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalStore::new(tmp.path());
        let names: Vec<String> = (0..12).map(|i| format!("f{i}")).collect();
        let files: Vec<(String, String)> = names
            .iter()
            .map(|n| (format!("http://host/{n}"), n.clone()))
            .collect();
        let file_refs: Vec<(&str, &str)> =
            files.iter().map(|(u, b)| (u.as_str(), b.as_str())).collect();
        let fetcher = CountingFetcher::new(&file_refs);
        let requests: Vec<_> = names.iter().map(|n| request(tmp.path(), n)).collect();

        let summary = download_all(&fetcher, &store, &requests, 2).unwrap();
        assert_eq!(summary.fetched_count(), 12);
        assert!(*fetcher.peak.lock().unwrap() <= 2);
    }
}
