//! File snapshot persistence
//!
//! Stores one snapshot as a JSON document at a configured path using the
//! write-temp, fsync, rename pattern.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::Span;

use crate::config::Config;
use crate::error::{KvError, Result};

use super::{Snapshot, SnapshotPersistence};

/// Random bytes in a temporary file suffix (hex-encoded, so 16 chars)
const TEMP_SUFFIX_BYTES: usize = 8;

/// Atomic, concurrency-safe snapshot storage in a single file
///
/// ## Concurrency:
/// - `lock`: saves are exclusive, loads are shared with each other
/// - `rng`: temp-name source, injectable so collisions are reproducible
pub struct FileSnapshotPersistence {
    /// Target snapshot file
    path: PathBuf,

    /// Serializes saves against each other and against loads
    lock: RwLock<()>,

    /// Source of temp-file suffixes
    rng: Mutex<Box<dyn RngCore + Send>>,

    /// Span events from this backend are recorded in
    span: Span,
}

impl FileSnapshotPersistence {
    /// Create a backend for `path` with an entropy-seeded suffix source
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_rng(path, StdRng::from_entropy())
    }

    /// Create a backend for `path` drawing temp suffixes from `rng`
    pub fn with_rng(path: impl Into<PathBuf>, rng: impl RngCore + Send + 'static) -> Self {
        let path = path.into();
        let span = tracing::debug_span!("snapshot_file", path = %path.display());
        Self {
            path,
            lock: RwLock::new(()),
            rng: Mutex::new(Box::new(rng)),
            span,
        }
    }

    /// Create a backend from the configured snapshot path
    pub fn from_config(config: &Config) -> Result<Self> {
        match &config.snapshot_path {
            Some(path) if !path.as_os_str().is_empty() => Ok(Self::new(path.clone())),
            _ => Err(KvError::PersistenceNotConfigured),
        }
    }

    /// Record this backend's events under `span` instead of the default
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Get the snapshot file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// `<path>.tmp.<16 hex chars>` in the target's directory
    fn temp_path(&self) -> PathBuf {
        let mut bytes = [0u8; TEMP_SUFFIX_BYTES];
        self.rng.lock().fill_bytes(&mut bytes);

        let suffix: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".tmp.{}", suffix));
        PathBuf::from(name)
    }

    /// Parent directory to create, if the path has one
    fn parent_dir(&self) -> Option<&Path> {
        self.path.parent().filter(|p| !p.as_os_str().is_empty())
    }

    /// Write `bytes` to a fresh temp file and rename it onto the target.
    /// Caller holds the write lock.
    fn write_atomic(&self, bytes: &[u8]) -> Result<()> {
        if let Some(dir) = self.parent_dir() {
            fs::create_dir_all(dir)?;
        }

        let temp = self.temp_path();

        // create_new: a colliding name is an error, never an overwrite
        let file = OpenOptions::new().write(true).create_new(true).open(&temp)?;

        if let Err(e) = write_then_rename(file, &temp, &self.path, bytes) {
            if temp.exists() {
                let _ = fs::remove_file(&temp);
            }
            return Err(e.into());
        }

        self.sync_parent_dir()?;
        Ok(())
    }

    /// fsync the directory so the rename itself is durable
    #[cfg(unix)]
    fn sync_parent_dir(&self) -> io::Result<()> {
        let dir = self.parent_dir().unwrap_or_else(|| Path::new("."));
        File::open(dir)?.sync_all()
    }

    #[cfg(not(unix))]
    fn sync_parent_dir(&self) -> io::Result<()> {
        Ok(())
    }
}

fn write_then_rename(mut file: File, temp: &Path, target: &Path, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(temp, target)
}

impl SnapshotPersistence for FileSnapshotPersistence {
    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let _enter = self.span.enter();

        // Validate and serialize before touching the filesystem or the lock
        snapshot
            .validate()
            .map_err(|e| KvError::persistence("save", e))?;
        let bytes = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| KvError::persistence("save", e.into()))?;

        let _guard = self.lock.write();
        self.write_atomic(&bytes)
            .map_err(|e| KvError::persistence("save", e))?;

        tracing::debug!(entries = snapshot.len(), bytes = bytes.len(), "snapshot written");
        Ok(())
    }

    fn load(&self) -> Result<Snapshot> {
        let _enter = self.span.enter();
        let _guard = self.lock.read();

        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(KvError::persistence("load", KvError::NoSnapshotFound));
            }
            Err(e) => return Err(KvError::persistence("load", e.into())),
        };

        if bytes.is_empty() {
            return Err(KvError::persistence(
                "load",
                KvError::SnapshotCorrupted("file is empty".to_string()),
            ));
        }

        let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|e| {
            KvError::persistence("load", KvError::SnapshotCorrupted(e.to_string()))
        })?;

        snapshot.validate().map_err(|e| {
            KvError::persistence("load", KvError::SnapshotCorrupted(e.to_string()))
        })?;

        tracing::debug!(entries = snapshot.len(), "snapshot read");
        Ok(snapshot)
    }
}
