//! Temp-file lifecycle: per-chunk deletion, document sweeps, orphan sweeps.
//!
//! All platform-specific deletion behaviour lives in the private `platform`
//! module, one implementation per target selected at compile time. Everything
//! else here is portable.
//!
//! Deletion never fails a run. A file that stays locked after every retry is
//! logged at `warn` and left for the next orphan sweep.

use crate::pipeline::loader::{document_prefix, TEMP_PREFIX};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Default attempts for per-chunk deletion.
pub const DEFAULT_ATTEMPTS: u32 = 5;
/// Default pause between deletion attempts.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

#[cfg(unix)]
mod platform {
    use std::io;
    use std::path::Path;

    pub fn remove_file(path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    /// Unlinking an open file succeeds on unix, so only EBUSY is worth retrying.
    pub fn is_transient(err: &io::Error) -> bool {
        err.raw_os_error() == Some(16)
    }
}

#[cfg(windows)]
mod platform {
    use std::io;
    use std::path::Path;

    const ERROR_SHARING_VIOLATION: i32 = 32;
    const ERROR_LOCK_VIOLATION: i32 = 33;

    pub fn remove_file(path: &Path) -> io::Result<()> {
        // a read-only attribute left by an external tool blocks deletion
        if let Ok(meta) = std::fs::metadata(path) {
            let mut perms = meta.permissions();
            if perms.readonly() {
                #[allow(clippy::permissions_set_readonly_false)]
                perms.set_readonly(false);
                let _ = std::fs::set_permissions(path, perms);
            }
        }
        std::fs::remove_file(path)
    }

    /// Another process (a killed worker's handle, an indexer, antivirus) still holds the file.
    pub fn is_transient(err: &io::Error) -> bool {
        matches!(
            err.raw_os_error(),
            Some(ERROR_SHARING_VIOLATION) | Some(ERROR_LOCK_VIOLATION)
        ) || err.kind() == io::ErrorKind::PermissionDenied
    }
}

/// Delete `path`, retrying transient failures up to `attempts` times.
///
/// Returns `true` when the file is gone (including when it never existed).
pub fn remove_with_retry(path: &Path, attempts: u32, interval: Duration) -> bool {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        match platform::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), attempt, "temp file removed");
                return true;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => return true,
            Err(e) if platform::is_transient(&e) && attempt < attempts => {
                debug!(path = %path.display(), attempt, error = %e, "temp file locked, retrying");
                std::thread::sleep(interval);
            }
            Err(e) => {
                warn!(path = %path.display(), attempt, error = %e, "temp file could not be removed");
                return false;
            }
        }
    }
    false
}

/// Deletes its file when dropped, whatever happened in between.
///
/// Workers hold one per chunk so the chunk file is removed on success,
/// error and panic-unwind alike.
#[derive(Debug)]
pub struct TempFileGuard {
    path: PathBuf,
    attempts: u32,
    interval: Duration,
}

impl TempFileGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            attempts: DEFAULT_ATTEMPTS,
            interval: DEFAULT_INTERVAL,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        remove_with_retry(&self.path, self.attempts, self.interval);
    }
}

/// Outcome of a sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    /// Paths still present after the last attempt.
    pub remaining: Vec<PathBuf>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// Remove every temp file and the asset staging directory of one document run.
///
/// The whole directory listing is retried `attempts` times with `interval`
/// between passes, because forcibly killed workers may release their file
/// handles only after the sweep starts.
pub fn sweep_document(temp_dir: &Path, doc_token: &str, attempts: u32, interval: Duration) -> SweepReport {
    let prefix = document_prefix(doc_token);
    let attempts = attempts.max(1);
    let mut remaining = Vec::new();
    let mut removed = 0;
    for attempt in 1..=attempts {
        remaining.clear();
        for path in matching(temp_dir, |name| name.starts_with(&prefix)) {
            if remove_entry(&path) {
                removed += 1;
            } else {
                remaining.push(path);
            }
        }
        if remaining.is_empty() {
            break;
        }
        if attempt < attempts {
            debug!(left = remaining.len(), attempt, "document sweep retrying");
            std::thread::sleep(interval);
        }
    }
    if remaining.is_empty() {
        debug!(doc_token, removed, "document sweep complete");
    } else {
        warn!(doc_token, left = remaining.len(), "document sweep left files behind");
    }
    SweepReport { removed, remaining }
}

/// Async wrapper over [`sweep_document`] on the blocking pool.
pub async fn sweep_document_async(temp_dir: PathBuf, doc_token: String, attempts: u32, interval: Duration) -> SweepReport {
    tokio::task::spawn_blocking(move || sweep_document(&temp_dir, &doc_token, attempts, interval))
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "document sweep task panicked");
            SweepReport::default()
        })
}

/// Remove temp files older than `max_age` left behind by earlier crashed runs.
///
/// The age floor keeps concurrent runs sharing the temp root safe.
pub fn sweep_orphans(temp_dir: &Path, max_age: Duration) -> SweepReport {
    let now = SystemTime::now();
    let mut report = SweepReport::default();
    for path in matching(temp_dir, |name| name.starts_with(TEMP_PREFIX)) {
        let old_enough = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| now.duration_since(t).ok())
            .is_some_and(|age| age >= max_age);
        if !old_enough {
            continue;
        }
        if remove_entry(&path) {
            report.removed += 1;
        } else {
            report.remaining.push(path);
        }
    }
    if report.removed > 0 {
        info!(removed = report.removed, dir = %temp_dir.display(), "orphaned temp files removed");
    }
    report
}

fn matching(dir: &Path, accept: impl Fn(&str) -> bool) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter(|e| e.file_name().to_str().is_some_and(&accept))
        .map(|e| e.path())
        .collect()
}

fn remove_entry(path: &Path) -> bool {
    if path.is_dir() {
        match std::fs::remove_dir_all(path) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "temp directory not removed yet");
                false
            }
        }
    } else {
        remove_with_retry(path, 1, Duration::ZERO)
    }
}
