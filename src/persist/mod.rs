//! Durable state storage shared by the budget ledger and the fallback queue.
//!
//! Both stores follow the same protocol: JSON on the local filesystem,
//! replaced atomically (write-temp-then-rename) so a crash mid-write never
//! leaves a half-written file, and guarded by a lock file so two overlapping
//! invocations cannot interleave their read-modify-write cycles.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// How long a lock file may sit on disk before it is considered abandoned
/// by a crashed process and eligible for takeover.
const STALE_LOCK_AFTER: Duration = Duration::from_secs(600);

/// How long `FileLock::acquire` waits for a live lock to be released.
const LOCK_WAIT: Duration = Duration::from_secs(5);

/// Interval between lock acquisition attempts.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors from the persistence layer.
///
/// `Corrupt` is deliberately distinct from `Io`: an unreadable store means
/// the spend and dedup guarantees cannot be trusted, and callers must fail
/// the run rather than guess at state.
#[derive(Error, Debug)]
pub enum StoreError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The persisted file exists but does not parse.
    #[error("corrupt store file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Serialization of in-memory state failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Another process holds the store lock and did not release it in time.
    #[error("store locked by another process: {path}")]
    Locked { path: PathBuf },
}

/// Result type for persistence operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Load JSON state from `path`.
///
/// Returns `Ok(None)` when the file does not exist (first run). A file that
/// exists but fails to parse yields [`StoreError::Corrupt`] so the caller
/// can fail closed instead of starting from a zeroed state.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let value = serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;
            Ok(Some(value))
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(StoreError::Io(err)),
    }
}

/// Write JSON state to `path` with atomic-replace semantics.
///
/// The value is serialized to `<path>.tmp`, fsynced, then renamed over the
/// target so readers observe either the old or the new file, never a torn
/// write.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(value)?;
    let temp_path = temp_path_for(path);

    let mut file = fs::File::create(&temp_path)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;

    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Exclusive lock guarding a store's read-modify-write cycle.
///
/// Implemented as a `create_new` lock file next to the store. Holding the
/// returned guard means no other glowpost process is mutating the store;
/// the file is removed on drop. Locks older than [`STALE_LOCK_AFTER`] are
/// treated as abandoned by a crashed process and taken over.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Acquire the lock at `path`, waiting up to [`LOCK_WAIT`] for a live
    /// holder to release it.
    pub fn acquire(path: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::acquire_with(path, LOCK_WAIT, STALE_LOCK_AFTER)
    }

    /// Acquire with explicit wait and staleness windows.
    pub fn acquire_with(
        path: impl Into<PathBuf>,
        wait: Duration,
        stale_after: Duration,
    ) -> StoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let deadline = Instant::now() + wait;
        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    // Contents are diagnostic only; exclusivity comes from create_new.
                    let _ = writeln!(file, "pid={}", std::process::id());
                    return Ok(Self { path });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    if Self::is_stale(&path, stale_after) {
                        match fs::remove_file(&path) {
                            Ok(()) => continue,
                            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                            Err(e) => return Err(StoreError::Io(e)),
                        }
                    }
                    if Instant::now() >= deadline {
                        return Err(StoreError::Locked { path });
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(err) => return Err(StoreError::Io(err)),
            }
        }
    }

    fn is_stale(path: &Path, stale_after: Duration) -> bool {
        let Ok(metadata) = fs::metadata(path) else {
            return false;
        };
        let Ok(modified) = metadata.modified() else {
            return false;
        };
        modified
            .elapsed()
            .map(|age| age >= stale_after)
            .unwrap_or(false)
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let temp_dir = TempDir::new().expect("temp dir");
        let loaded: Option<Sample> =
            load_json(&temp_dir.path().join("absent.json")).expect("load");
        assert!(loaded.is_none());
    }

    #[test]
    fn test_atomic_write_round_trip() {
        let temp_dir = TempDir::new().expect("temp dir");
        let path = temp_dir.path().join("state.json");
        let value = Sample {
            name: "glow".to_string(),
            count: 3,
        };

        atomic_write_json(&path, &value).expect("write");
        let loaded: Option<Sample> = load_json(&path).expect("load");

        assert_eq!(loaded, Some(value));
        assert!(!temp_path_for(&path).exists(), "temp file must not linger");
    }

    #[test]
    fn test_corrupt_file_is_fatal_not_empty() {
        let temp_dir = TempDir::new().expect("temp dir");
        let path = temp_dir.path().join("state.json");
        fs::write(&path, "{not json").expect("write");

        let result: StoreResult<Option<Sample>> = load_json(&path);
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_lock_is_exclusive() {
        let temp_dir = TempDir::new().expect("temp dir");
        let lock_path = temp_dir.path().join("store.lock");

        let _held = FileLock::acquire_with(&lock_path, Duration::ZERO, STALE_LOCK_AFTER)
            .expect("first acquire");
        let second =
            FileLock::acquire_with(&lock_path, Duration::ZERO, STALE_LOCK_AFTER);

        assert!(matches!(second, Err(StoreError::Locked { .. })));
    }

    #[test]
    fn test_lock_released_on_drop() {
        let temp_dir = TempDir::new().expect("temp dir");
        let lock_path = temp_dir.path().join("store.lock");

        {
            let _held = FileLock::acquire(&lock_path).expect("acquire");
            assert!(lock_path.exists());
        }
        assert!(!lock_path.exists(), "lock file must be removed on drop");

        let _again = FileLock::acquire_with(&lock_path, Duration::ZERO, STALE_LOCK_AFTER)
            .expect("reacquire after drop");
    }

    #[test]
    fn test_stale_lock_is_taken_over() {
        let temp_dir = TempDir::new().expect("temp dir");
        let lock_path = temp_dir.path().join("store.lock");
        fs::write(&lock_path, "pid=0").expect("simulate crashed holder");

        // With a zero staleness window the leftover file is immediately stale.
        let taken = FileLock::acquire_with(&lock_path, Duration::ZERO, Duration::ZERO)
            .expect("take over stale lock");
        drop(taken);
        assert!(!lock_path.exists());
    }
}
