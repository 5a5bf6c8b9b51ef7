use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::errors::CoordError;
use crate::fsx;
use crate::mutex::FileMutex;
use crate::paths::CoordPaths;
use crate::probe::ProcessProbe;

const MUTEX_WAIT: Duration = Duration::from_secs(5);

/// Ownership record for one agent's browser window.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WindowEntry {
    pub target_id: String,
    #[serde(default)]
    pub window_id: Option<i64>,
    #[serde(default)]
    pub pid: u32,
    #[serde(default)]
    pub created_at: f64,
    #[serde(default)]
    pub last_heartbeat: f64,
}

/// Persistent agent-tag → window mapping shared by all processes on one
/// profile. Mutations are read-modify-write under a dedicated file mutex;
/// heartbeat freshness is what keeps an entry alive across scans.
#[derive(Clone, Debug)]
pub struct WindowRegistry {
    paths: CoordPaths,
    mutex_stale: Duration,
}

impl WindowRegistry {
    pub fn new(paths: CoordPaths, mutex_stale: Duration) -> Self {
        Self { paths, mutex_stale }
    }

    /// Insert or replace the entry for `agent_tag`, stamped with this
    /// process id and the current time.
    pub fn register(&self, agent_tag: &str, target_id: &str, window_id: Option<i64>) {
        let now = fsx::now_secs();
        let entry = WindowEntry {
            target_id: target_id.to_string(),
            window_id,
            pid: std::process::id(),
            created_at: now,
            last_heartbeat: now,
        };
        self.mutate("register", |map| {
            map.insert(
                agent_tag.to_string(),
                serde_json::to_value(&entry).unwrap_or(Value::Null),
            );
        });
    }

    /// Refresh `last_heartbeat` for `agent_tag`; missing entries are a
    /// silent no-op.
    pub fn heartbeat(&self, agent_tag: &str) {
        self.mutate("heartbeat", |map| {
            if let Some(Value::Object(entry)) = map.get_mut(agent_tag) {
                entry.insert("last_heartbeat".into(), fsx::now_secs().into());
            }
        });
    }

    /// Remove the entry for `agent_tag`.
    pub fn unregister(&self, agent_tag: &str) {
        self.mutate("unregister", |map| {
            map.remove(agent_tag);
        });
    }

    /// All well-formed entries. Malformed records read as absent.
    pub fn entries(&self) -> BTreeMap<String, WindowEntry> {
        self.raw()
            .into_iter()
            .filter_map(|(tag, value)| {
                serde_json::from_value::<WindowEntry>(value)
                    .ok()
                    .map(|entry| (tag, entry))
            })
            .collect()
    }

    pub fn entry(&self, agent_tag: &str) -> Option<WindowEntry> {
        self.entries().remove(agent_tag)
    }

    pub fn len(&self) -> usize {
        self.raw().len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw().is_empty()
    }

    /// Prune entries whose owner process is dead, whose heartbeat is older
    /// than `stale`, or whose target the browser no longer knows (when the
    /// caller supplies the live target set). Returns the removed entries so
    /// the caller can best-effort close their targets.
    ///
    /// Removal decisions are per-entry; one malformed or undecidable record
    /// never blocks pruning of the rest.
    pub fn scan_and_clean(
        &self,
        probe: &dyn ProcessProbe,
        stale: Duration,
        live_targets: Option<&HashSet<String>>,
    ) -> Vec<(String, WindowEntry)> {
        let now = fsx::now_secs();
        let mut removed = Vec::new();

        self.mutate("scan_and_clean", |map| {
            let tags: Vec<String> = map.keys().cloned().collect();
            for tag in tags {
                let Some(value) = map.get(&tag) else { continue };
                let entry = match serde_json::from_value::<WindowEntry>(value.clone()) {
                    Ok(entry) => entry,
                    Err(err) => {
                        info!(
                            target: "warden-coord",
                            agent = %tag,
                            %err,
                            "pruning malformed registry entry"
                        );
                        map.remove(&tag);
                        continue;
                    }
                };

                let dead = !probe.is_alive(entry.pid);
                let heartbeat_age = now - entry.last_heartbeat;
                let is_stale = heartbeat_age > stale.as_secs_f64();
                let target_gone = live_targets
                    .map(|targets| !targets.contains(&entry.target_id))
                    .unwrap_or(false);

                if dead || is_stale || target_gone {
                    info!(
                        target: "warden-coord",
                        agent = %tag,
                        target_id = %entry.target_id,
                        dead,
                        stale = is_stale,
                        target_gone,
                        "pruning registry entry"
                    );
                    map.remove(&tag);
                    removed.push((tag, entry));
                }
            }
        });

        removed
    }

    fn raw(&self) -> BTreeMap<String, Value> {
        fsx::read_json(&self.paths.window_registry()).unwrap_or_default()
    }

    fn mutate(&self, op: &str, body: impl FnOnce(&mut BTreeMap<String, Value>)) {
        let mutex = FileMutex::new(self.paths.window_registry_mutex(), self.mutex_stale);
        let guard = match mutex.acquire(MUTEX_WAIT) {
            Ok(guard) => guard,
            Err(err) => {
                warn!(target: "warden-coord", %err, op, "registry mutex unavailable");
                return;
            }
        };

        let mut map = self.raw();
        body(&mut map);
        if let Err(err) = fsx::atomic_write_json(&self.paths.window_registry(), &map)
            .map_err(|source| CoordError::io(&self.paths.window_registry(), source))
        {
            // Registry updates are best-effort by contract; the heartbeat
            // will repair state on the next renewal.
            debug!(target: "warden-coord", %err, op, "registry write failed");
        }
        guard.release();
    }
}
