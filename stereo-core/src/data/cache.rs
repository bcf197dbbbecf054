//! Local file store for downloaded science files.
//!
//! Layout:
//! - SEPT daily files sit directly in the storage root, named as on the
//!   Kiel server.
//! - Archive files sit in `{root}/{DATASET}/{DATASET}_{YYYYMMDD}.csv`.
//!
//! Every directory the store writes to carries a `manifest.json` sidecar
//! recording, per file, its size, BLAKE3 hash, source URL and fetch time.
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place)
//! - Integrity check on reuse: a file whose hash no longer matches its
//!   manifest entry is quarantined (`{name}.quarantined`) and fetched again
//! - Files without a manifest entry (placed by hand) are trusted as-is
//! - Files that fail to decode are quarantined by the caller via
//!   [`LocalStore::discard`]

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Local storage failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create directory {path}: {reason}")]
    CreateDir { path: PathBuf, reason: String },

    #[error("failed to write {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("manifest error in {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },
}

/// One downloaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file_name: String,
    pub size: u64,
    pub blake3: String,
    pub source_url: String,
    pub fetched_at: NaiveDateTime,
}

/// Per-directory manifest sidecar.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub files: BTreeMap<String, ManifestEntry>,
}

/// Summary of one storage directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirStatus {
    /// Directory name relative to the root (`"."` for the root itself).
    pub name: String,
    pub file_count: usize,
    pub total_bytes: u64,
    pub tracked_files: usize,
    pub quarantined_files: usize,
}

/// The local store.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for an archive dataset: `{root}/{dataset}`.
    pub fn dataset_dir(&self, dataset: &str) -> PathBuf {
        self.root.join(dataset)
    }

    /// Create a directory (and parents) if missing.
    pub fn ensure_dir(&self, dir: &Path) -> Result<(), StoreError> {
        fs::create_dir_all(dir).map_err(|e| StoreError::CreateDir {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Path of a usable local copy of `file_name` in `dir`, if any.
    ///
    /// Files tracked in the manifest are verified against their hash; a
    /// mismatch quarantines the file and reports it as absent.
    pub fn lookup(&self, dir: &Path, file_name: &str) -> Option<PathBuf> {
        let path = dir.join(file_name);
        if !path.is_file() {
            return None;
        }

        let manifest = self.read_manifest(dir).unwrap_or_default();
        let Some(entry) = manifest.files.get(file_name) else {
            debug!(path = %path.display(), "using untracked local file");
            return Some(path);
        };

        match hash_file(&path) {
            Ok(hash) if hash == entry.blake3 => {
                debug!(path = %path.display(), "cache hit");
                Some(path)
            }
            Ok(_) => {
                self.quarantine(&path, "hash mismatch");
                None
            }
            Err(e) => {
                self.quarantine(&path, &e.to_string());
                None
            }
        }
    }

    /// Local files in `dir` whose names start with `prefix` and end with
    /// `suffix`, sorted by name.
    pub fn find(&self, dir: &Path, prefix: &str, suffix: &str) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut found: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(prefix) && n.ends_with(suffix))
            })
            .collect();
        found.sort();
        found
    }

    /// Write `bytes` to `dir/file_name` atomically and return its manifest entry.
    ///
    /// The manifest itself is not touched; callers batch entries through
    /// [`LocalStore::record`] once all parallel downloads have finished.
    pub fn write_atomic(
        &self,
        dir: &Path,
        file_name: &str,
        bytes: &[u8],
        source_url: &str,
    ) -> Result<(PathBuf, ManifestEntry), StoreError> {
        self.ensure_dir(dir)?;
        let path = dir.join(file_name);
        let tmp_path = dir.join(format!("{file_name}.tmp"));

        fs::write(&tmp_path, bytes).map_err(|e| StoreError::Write {
            path: tmp_path.clone(),
            reason: e.to_string(),
        })?;

        fs::rename(&tmp_path, &path).map_err(|e| {
            // Clean up temp file on rename failure
            let _ = fs::remove_file(&tmp_path);
            StoreError::Write {
                path: path.clone(),
                reason: format!("atomic rename failed: {e}"),
            }
        })?;

        let entry = ManifestEntry {
            file_name: file_name.to_string(),
            size: bytes.len() as u64,
            blake3: blake3::hash(bytes).to_hex().to_string(),
            source_url: source_url.to_string(),
            fetched_at: chrono::Utc::now().naive_utc(),
        };
        Ok((path, entry))
    }

    /// Merge entries into the directory's manifest.
    pub fn record(&self, dir: &Path, entries: Vec<ManifestEntry>) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut manifest = self.read_manifest(dir).unwrap_or_default();
        for entry in entries {
            manifest.files.insert(entry.file_name.clone(), entry);
        }
        self.write_manifest(dir, &manifest)
    }

    /// Quarantine a stored file whose contents turned out to be unusable and
    /// forget its manifest entry, so the next load fetches it again.
    pub fn discard(&self, path: &Path, reason: &str) -> Result<(), StoreError> {
        self.quarantine(path, reason);

        let (Some(dir), Some(file_name)) = (path.parent(), path.file_name()) else {
            return Ok(());
        };
        let mut manifest = self.read_manifest(dir).unwrap_or_default();
        if manifest
            .files
            .remove(file_name.to_string_lossy().as_ref())
            .is_none()
        {
            return Ok(());
        }
        self.write_manifest(dir, &manifest)
    }

    fn write_manifest(&self, dir: &Path, manifest: &Manifest) -> Result<(), StoreError> {
        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(manifest).map_err(|e| StoreError::Manifest {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let tmp_path = dir.join(format!("{MANIFEST_FILE}.tmp"));
        fs::write(&tmp_path, json).map_err(|e| StoreError::Write {
            path: tmp_path.clone(),
            reason: e.to_string(),
        })?;
        fs::rename(&tmp_path, &path).map_err(|e| StoreError::Write {
            path,
            reason: format!("atomic rename failed: {e}"),
        })
    }

    /// Read the manifest of `dir`. A missing manifest is an empty one.
    pub fn read_manifest(&self, dir: &Path) -> Result<Manifest, StoreError> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(Manifest::default());
        }
        let content = fs::read_to_string(&path).map_err(|e| StoreError::Read {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| StoreError::Manifest {
            path,
            reason: e.to_string(),
        })
    }

    /// Per-directory summary of the store: the root plus each subdirectory.
    pub fn status(&self) -> Result<Vec<DirStatus>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut dirs = vec![(".".to_string(), self.root.clone())];
        let entries = fs::read_dir(&self.root).map_err(|e| StoreError::Read {
            path: self.root.clone(),
            reason: e.to_string(),
        })?;
        let mut subdirs: Vec<(String, PathBuf)> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .map(|e| (e.file_name().to_string_lossy().to_string(), e.path()))
            .collect();
        subdirs.sort();
        dirs.extend(subdirs);

        let mut statuses = Vec::new();
        for (name, dir) in dirs {
            let status = self.dir_status(name, &dir)?;
            if status.file_count > 0 || status.quarantined_files > 0 {
                statuses.push(status);
            }
        }
        Ok(statuses)
    }

    fn dir_status(&self, name: String, dir: &Path) -> Result<DirStatus, StoreError> {
        let manifest = self.read_manifest(dir).unwrap_or_default();
        let entries = fs::read_dir(dir).map_err(|e| StoreError::Read {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut status = DirStatus {
            name,
            file_count: 0,
            total_bytes: 0,
            tracked_files: 0,
            quarantined_files: 0,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().to_string();
            if file_name == MANIFEST_FILE || file_name.ends_with(".tmp") {
                continue;
            }
            if file_name.ends_with(".quarantined") {
                status.quarantined_files += 1;
                continue;
            }
            status.file_count += 1;
            status.total_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            if manifest.files.contains_key(&file_name) {
                status.tracked_files += 1;
            }
        }
        Ok(status)
    }

    fn quarantine(&self, path: &Path, reason: &str) {
        let mut quarantined = path.as_os_str().to_owned();
        quarantined.push(".quarantined");
        warn!(
            path = %path.display(),
            reason,
            "quarantining corrupt local file"
        );
        let _ = fs::rename(path, PathBuf::from(quarantined));
    }
}

fn hash_file(path: &Path) -> Result<String, StoreError> {
    let bytes = fs::read(path).map_err(|e| StoreError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}
