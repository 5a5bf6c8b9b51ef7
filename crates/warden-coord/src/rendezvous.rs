use std::fs;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fsx;
use crate::paths::CoordPaths;
use crate::probe::ProcessProbe;

/// Cached "which endpoint is the shared browser on" hint.
///
/// Written whenever a process confirms a working debug endpoint; read by
/// late joiners so they attach instead of relaunching. The cache is a hint,
/// not a guarantee: readers still have to probe the port before trusting it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rendezvous {
    pub host: String,
    pub port: u16,
    pub pid: u32,
    pub written_at: f64,
}

#[derive(Clone, Debug)]
pub struct RendezvousFile {
    paths: CoordPaths,
}

impl RendezvousFile {
    pub fn new(paths: CoordPaths) -> Self {
        Self { paths }
    }

    /// Read the cached endpoint, rejecting entries that are older than
    /// `ttl` or whose recorded browser process is no longer alive. Absence
    /// and parse failure read the same as a rejected entry.
    pub fn read(&self, ttl: Duration, probe: &dyn ProcessProbe) -> Option<Rendezvous> {
        let entry: Rendezvous = fsx::read_json(&self.paths.rendezvous())?;
        let age = fsx::now_secs() - entry.written_at;
        if age > ttl.as_secs_f64() {
            debug!(target: "warden-coord", age_secs = age as u64, "rendezvous expired");
            return None;
        }
        if entry.port == 0 || !probe.is_alive(entry.pid) {
            debug!(target: "warden-coord", pid = entry.pid, "rendezvous owner is gone");
            return None;
        }
        Some(entry)
    }

    pub fn write(&self, host: &str, port: u16, pid: u32) {
        let entry = Rendezvous {
            host: host.to_string(),
            port,
            pid,
            written_at: fsx::now_secs(),
        };
        if let Err(err) = fsx::atomic_write_json(&self.paths.rendezvous(), &entry) {
            debug!(target: "warden-coord", %err, "rendezvous write failed");
        }
    }

    pub fn clear(&self) {
        let _ = fs::remove_file(self.paths.rendezvous());
    }
}
