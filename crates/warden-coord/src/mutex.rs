use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, warn};

use crate::errors::CoordError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Advisory cross-process mutex backed by a sentinel file.
///
/// Creation of the sentinel is the atomic operation (`create_new`). A
/// sentinel whose mtime is older than the staleness threshold is assumed to
/// belong to a crashed process and is stolen. This is best-effort exclusion
/// for short critical sections around coordination-file rewrites, not a
/// kernel mutex.
#[derive(Clone, Debug)]
pub struct FileMutex {
    path: PathBuf,
    stale: Duration,
}

impl FileMutex {
    pub fn new(path: PathBuf, stale: Duration) -> Self {
        Self { path, stale }
    }

    /// Acquire the mutex, polling until `wait` elapses.
    pub fn acquire(&self, wait: Duration) -> Result<FileMutexGuard, CoordError> {
        let start = Instant::now();
        loop {
            match fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&self.path)
            {
                Ok(mut file) => {
                    let _ = file.write_all(std::process::id().to_string().as_bytes());
                    return Ok(FileMutexGuard {
                        path: self.path.clone(),
                        released: false,
                    });
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if self.steal_if_stale() {
                        continue;
                    }
                    if start.elapsed() >= wait {
                        return Err(CoordError::MutexTimeout {
                            path: self.path.display().to_string(),
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(err) => {
                    if start.elapsed() >= wait {
                        return Err(CoordError::io(&self.path, err));
                    }
                    thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }

    fn steal_if_stale(&self) -> bool {
        let age = match fs::metadata(&self.path).and_then(|meta| meta.modified()) {
            Ok(modified) => SystemTime::now()
                .duration_since(modified)
                .unwrap_or(Duration::ZERO),
            // Holder released between our create attempt and the stat.
            Err(_) => return true,
        };
        if age <= self.stale {
            return false;
        }
        warn!(
            target: "warden-coord",
            path = %self.path.display(),
            age_secs = age.as_secs(),
            "stealing stale file mutex"
        );
        let _ = fs::remove_file(&self.path);
        true
    }
}

/// Held mutex; releases on drop. Deletion by another process (because the
/// lock was stolen after we stalled) is tolerated silently.
#[derive(Debug)]
pub struct FileMutexGuard {
    path: PathBuf,
    released: bool,
}

impl FileMutexGuard {
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            if let Err(err) = fs::remove_file(&self.path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    debug!(
                        target: "warden-coord",
                        path = %self.path.display(),
                        %err,
                        "mutex sentinel removal failed"
                    );
                }
            }
        }
    }
}

impl Drop for FileMutexGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}
