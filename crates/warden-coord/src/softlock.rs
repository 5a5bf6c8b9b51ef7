use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::CoordError;
use crate::fsx;
use crate::mutex::FileMutex;
use crate::paths::CoordPaths;
use crate::registry::WindowRegistry;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const MUTEX_SLICE: Duration = Duration::from_secs(5);
const RENEW_MUTEX_WAIT: Duration = Duration::from_secs(1);

/// Current lease recorded in the softlock file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Lease {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<f64>,
}

impl Lease {
    fn holder(&self, now: f64) -> Option<(&str, f64)> {
        let owner = self.owner.as_deref()?;
        let expires_at = self.expires_at.unwrap_or(0.0);
        (expires_at > now).then_some((owner, expires_at))
    }
}

/// Outcome of an acquisition attempt.
#[derive(Clone, Debug)]
pub enum AcquireOutcome {
    Acquired {
        expires_at: f64,
    },
    /// Another owner holds an unexpired lease.
    Busy {
        owner: Option<String>,
        expires_at: Option<f64>,
    },
    /// I/O kept failing for the whole wait budget.
    IoError {
        detail: String,
    },
}

impl AcquireOutcome {
    pub fn acquired(&self) -> bool {
        matches!(self, Self::Acquired { .. })
    }
}

/// Durable TTL-leased lock on the right to drive the shared browser.
///
/// The lease file is only ever rewritten under its sibling file mutex; the
/// first successful write of `{owner, expires_at}` wins. An expired lease is
/// reclaimable by anyone, which is also the crash-recovery story: a dead
/// owner stops renewing and the lock frees itself after the TTL.
#[derive(Clone, Debug)]
pub struct ActionLock {
    paths: CoordPaths,
    mutex_stale: Duration,
}

impl ActionLock {
    pub fn new(paths: CoordPaths, mutex_stale: Duration) -> Self {
        Self { paths, mutex_stale }
    }

    /// Try to take the lease for `owner`, polling until `wait` elapses.
    ///
    /// Grants immediately when the file is absent, the lease is expired, or
    /// `owner` already holds it (reentrant across calls from one process).
    pub fn acquire(&self, owner: &str, ttl: Duration, wait: Duration) -> AcquireOutcome {
        let deadline = Instant::now() + wait;
        let mut last_io: Option<String> = None;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let mutex_wait = remaining.min(MUTEX_SLICE).max(Duration::from_millis(100));

            match self.locked(mutex_wait, |lock| {
                let now = fsx::now_secs();
                let state: Lease = fsx::read_json(&lock.paths.softlock()).unwrap_or_default();
                match state.holder(now) {
                    Some((current, expires_at)) if current != owner => {
                        Ok(AcquireOutcome::Busy {
                            owner: Some(current.to_string()),
                            expires_at: Some(expires_at),
                        })
                    }
                    _ => {
                        let expires_at = now + ttl.as_secs_f64();
                        lock.write_lease(owner, expires_at)?;
                        Ok(AcquireOutcome::Acquired { expires_at })
                    }
                }
            }) {
                Ok(outcome @ AcquireOutcome::Acquired { .. }) => return outcome,
                Ok(busy) => {
                    if Instant::now() >= deadline {
                        return busy;
                    }
                }
                Err(CoordError::MutexTimeout { .. }) => {
                    if Instant::now() >= deadline {
                        // Best-effort read without the mutex, so the caller
                        // can still report who is holding the lease.
                        let state: Lease =
                            fsx::read_json(&self.paths.softlock()).unwrap_or_default();
                        return AcquireOutcome::Busy {
                            owner: state.owner,
                            expires_at: state.expires_at,
                        };
                    }
                }
                Err(err) => {
                    debug!(target: "warden-coord", %err, "softlock acquire retry");
                    last_io = Some(err.to_string());
                    if Instant::now() >= deadline {
                        return AcquireOutcome::IoError {
                            detail: last_io.unwrap_or_default(),
                        };
                    }
                }
            }

            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Extend the lease when `owner` still holds it (or the lease has
    /// expired and is free to reclaim). Returns false when another owner has
    /// taken over, which callers must treat as loss of mutual exclusion.
    ///
    /// A successful renewal also refreshes the window-registry heartbeat for
    /// `owner`; heartbeat failures are non-fatal.
    pub fn renew(&self, registry: &WindowRegistry, owner: &str, ttl: Duration) -> bool {
        let renewed = self.locked(RENEW_MUTEX_WAIT, |lock| {
            let now = fsx::now_secs();
            let state: Lease = fsx::read_json(&lock.paths.softlock()).unwrap_or_default();
            match state.holder(now) {
                Some((current, _)) if current != owner => Ok(false),
                _ => {
                    lock.write_lease(owner, now + ttl.as_secs_f64())?;
                    Ok(true)
                }
            }
        });

        match renewed {
            Ok(true) => {
                registry.heartbeat(owner);
                true
            }
            Ok(false) => false,
            Err(err) => {
                warn!(target: "warden-coord", %err, "softlock renew failed");
                false
            }
        }
    }

    /// Drop the lease if `owner` holds it. A non-owner release never mutates
    /// the file.
    pub fn release(&self, owner: &str) -> bool {
        let released = self.locked(MUTEX_SLICE, |lock| {
            let state: Lease = fsx::read_json(&lock.paths.softlock()).unwrap_or_default();
            if state.owner.as_deref() == Some(owner) {
                fsx::atomic_write_json(&lock.paths.softlock(), &Lease::default())
                    .map_err(|source| CoordError::io(&lock.paths.softlock(), source))?;
                Ok(true)
            } else {
                Ok(false)
            }
        });

        match released {
            Ok(flag) => flag,
            Err(err) => {
                warn!(target: "warden-coord", %err, "softlock release failed");
                false
            }
        }
    }

    /// Read the lease without taking the mutex, for diagnostics and busy
    /// replies.
    pub fn peek(&self) -> Lease {
        fsx::read_json(&self.paths.softlock()).unwrap_or_default()
    }

    fn write_lease(&self, owner: &str, expires_at: f64) -> Result<(), CoordError> {
        let lease = Lease {
            owner: Some(owner.to_string()),
            expires_at: Some(expires_at),
        };
        fsx::atomic_write_json(&self.paths.softlock(), &lease)
            .map_err(|source| CoordError::io(&self.paths.softlock(), source))
    }

    fn locked<T>(
        &self,
        wait: Duration,
        body: impl FnOnce(&Self) -> Result<T, CoordError>,
    ) -> Result<T, CoordError> {
        let mutex = FileMutex::new(self.paths.softlock_mutex(), self.mutex_stale);
        let guard = mutex.acquire(wait)?;
        let result = body(self);
        guard.release();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileKey;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn fixture(dir: &std::path::Path) -> (ActionLock, WindowRegistry) {
        let key = ProfileKey::derive(dir, "Default", false).unwrap();
        let paths = CoordPaths::new(dir, key).unwrap();
        let stale = Duration::from_secs(60);
        (
            ActionLock::new(paths.clone(), stale),
            WindowRegistry::new(paths, stale),
        )
    }

    #[test]
    fn acquire_release_roundtrip() {
        let dir = tempdir().unwrap();
        let (lock, _) = fixture(dir.path());
        let ttl = Duration::from_secs(30);

        assert!(lock.acquire("agent:1", ttl, Duration::ZERO).acquired());
        assert!(lock.release("agent:1"));
        let lease = lock.peek();
        assert!(lease.owner.is_none());
    }

    #[test]
    fn busy_for_second_owner_and_reentrant_for_first() {
        let dir = tempdir().unwrap();
        let (lock, _) = fixture(dir.path());
        let ttl = Duration::from_secs(30);

        assert!(lock.acquire("agent:a", ttl, Duration::ZERO).acquired());
        match lock.acquire("agent:b", ttl, Duration::from_millis(150)) {
            AcquireOutcome::Busy { owner, expires_at } => {
                assert_eq!(owner.as_deref(), Some("agent:a"));
                assert!(expires_at.unwrap() > fsx::now_secs());
            }
            other => panic!("expected busy, got {other:?}"),
        }
        assert!(lock.acquire("agent:a", ttl, Duration::ZERO).acquired());
    }

    #[test]
    fn expired_lease_is_reclaimable() {
        let dir = tempdir().unwrap();
        let (lock, _) = fixture(dir.path());

        assert!(lock
            .acquire("agent:dead", Duration::from_millis(50), Duration::ZERO)
            .acquired());
        thread::sleep(Duration::from_millis(120));
        assert!(lock
            .acquire("agent:new", Duration::from_secs(30), Duration::ZERO)
            .acquired());
        assert_eq!(lock.peek().owner.as_deref(), Some("agent:new"));
    }

    #[test]
    fn release_by_non_owner_is_a_no_op() {
        let dir = tempdir().unwrap();
        let (lock, _) = fixture(dir.path());

        assert!(lock
            .acquire("agent:a", Duration::from_secs(30), Duration::ZERO)
            .acquired());
        assert!(!lock.release("agent:b"));
        assert_eq!(lock.peek().owner.as_deref(), Some("agent:a"));
    }

    #[test]
    fn renew_extends_monotonically_and_detects_takeover() {
        let dir = tempdir().unwrap();
        let (lock, registry) = fixture(dir.path());
        let ttl = Duration::from_secs(30);

        assert!(lock.acquire("agent:a", ttl, Duration::ZERO).acquired());
        let first = lock.peek().expires_at.unwrap();
        assert!(lock.renew(&registry, "agent:a", ttl));
        let second = lock.peek().expires_at.unwrap();
        assert!(second >= first);

        // Simulate takeover after expiry: another owner writes the lease.
        assert!(!lock.release("agent:b"));
        fsx::atomic_write_json(
            &CoordPaths::new(
                dir.path(),
                ProfileKey::derive(dir.path(), "Default", false).unwrap(),
            )
            .unwrap()
            .softlock(),
            &Lease {
                owner: Some("agent:b".into()),
                expires_at: Some(fsx::now_secs() + 30.0),
            },
        )
        .unwrap();
        assert!(!lock.renew(&registry, "agent:a", ttl));
    }

    #[test]
    fn renew_piggybacks_registry_heartbeat() {
        let dir = tempdir().unwrap();
        let (lock, registry) = fixture(dir.path());
        let ttl = Duration::from_secs(30);

        assert!(lock.acquire("agent:a", ttl, Duration::ZERO).acquired());
        registry.register("agent:a", "TARGET", None);
        let before = registry.entry("agent:a").unwrap().last_heartbeat;
        thread::sleep(Duration::from_millis(20));
        assert!(lock.renew(&registry, "agent:a", ttl));
        let after = registry.entry("agent:a").unwrap().last_heartbeat;
        assert!(after > before);
    }

    #[test]
    fn contended_acquire_has_a_single_winner() {
        let dir = tempdir().unwrap();
        let (lock, _) = fixture(dir.path());
        let lock = Arc::new(lock);
        let ttl = Duration::from_secs(30);

        let mut handles = Vec::new();
        for idx in 0..8 {
            let lock = Arc::clone(&lock);
            handles.push(thread::spawn(move || {
                let owner = format!("agent:{idx}");
                lock.acquire(&owner, ttl, Duration::ZERO)
                    .acquired()
                    .then_some(owner)
            }));
        }

        let winners: HashSet<String> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(winners.len(), 1, "exactly one owner may win: {winners:?}");
        let lease = lock.peek();
        assert!(winners.contains(lease.owner.as_deref().unwrap()));
    }
}
