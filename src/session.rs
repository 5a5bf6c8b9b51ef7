use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::OnceCell;
use tokio::sync::{Mutex, MutexGuard};
use warden_cdp::{DebugEndpoint, DriverOps};
use warden_coord::{
    ActionLock, CoordPaths, ProcessProbe, ProfileKey, RendezvousFile, SystemProcessProbe,
    WindowRegistry,
};

use crate::config::GatewayConfig;
use crate::errors::GatewayError;

/// Coordination handles bound to this profile's key. Cheap to clone into
/// blocking tasks.
#[derive(Clone)]
pub struct Coord {
    pub paths: CoordPaths,
    pub lock: ActionLock,
    pub registry: WindowRegistry,
    pub rendezvous: RendezvousFile,
    pub probe: Arc<dyn ProcessProbe>,
}

/// Mutable per-process session state. Guarded by the context's state mutex,
/// which doubles as the intra-process lock: holding the guard is what
/// serializes tool executions inside one process.
#[derive(Default)]
pub struct SessionState {
    pub driver: Option<Arc<dyn DriverOps>>,
    pub endpoint: Option<DebugEndpoint>,
    pub target_id: Option<String>,
    pub window_id: Option<i64>,
    pub page_session: Option<String>,
}

impl SessionState {
    pub fn is_driver_initialized(&self) -> bool {
        self.driver
            .as_ref()
            .map(|driver| driver.is_connected())
            .unwrap_or(false)
    }

    pub fn is_window_ready(&self) -> bool {
        self.is_driver_initialized() && self.target_id.is_some()
    }

    pub fn debugger_address(&self) -> Option<String> {
        self.endpoint.as_ref().map(|endpoint| endpoint.to_string())
    }

    /// Forget the window, keep driver and endpoint; the next call recreates
    /// a window in the same browser.
    pub fn reset_window_state(&mut self) {
        self.target_id = None;
        self.window_id = None;
        self.page_session = None;
    }

    /// Drop everything. Only the force-close path uses this.
    pub async fn tear_down(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.quit().await;
        }
        self.endpoint = None;
        self.reset_window_state();
    }
}

/// Per-process container for one agent's browser session.
///
/// Passed around explicitly as `Arc<SessionContext>`; there is no hidden
/// global, so tests mint fresh contexts at will.
pub struct SessionContext {
    pub config: Arc<GatewayConfig>,
    pub coord: Coord,
    state: Mutex<SessionState>,
    agent_tag: OnceCell<String>,
    last_error: parking_lot::Mutex<Option<String>>,
}

impl SessionContext {
    pub fn new(config: GatewayConfig) -> Result<Arc<Self>, GatewayError> {
        let key = ProfileKey::derive(
            &config.user_data_dir,
            &config.profile_name,
            config.strict_profile,
        )?;
        let paths = CoordPaths::new(&config.coord_dir, key)?;
        let coord = Coord {
            lock: ActionLock::new(paths.clone(), config.file_mutex_stale),
            registry: WindowRegistry::new(paths.clone(), config.file_mutex_stale),
            rendezvous: RendezvousFile::new(paths.clone()),
            probe: Arc::new(SystemProcessProbe),
            paths,
        };
        Ok(Arc::new(Self {
            config: Arc::new(config),
            coord,
            state: Mutex::new(SessionState::default()),
            agent_tag: OnceCell::new(),
            last_error: parking_lot::Mutex::new(None),
        }))
    }

    /// Identity used as the action-lock owner and the registry key.
    /// Generated once per process instance.
    pub fn ensure_agent_tag(&self) -> &str {
        self.agent_tag.get_or_init(|| {
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or(0);
            let nonce = uuid::Uuid::new_v4().simple().to_string();
            format!("agent:{}:{}:{}", std::process::id(), millis, &nonce[..12])
        })
    }

    /// Intra-process lock: at most one tool handler runs at a time.
    pub async fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    pub fn record_error(&self, err: &GatewayError) {
        *self.last_error.lock() = Some(err.code().to_string());
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;
    use warden_cdp::DebugEndpoint;

    fn test_config(dir: &std::path::Path) -> GatewayConfig {
        GatewayConfig {
            user_data_dir: dir.join("profile"),
            profile_name: "Default".into(),
            browser_path: None,
            fixed_port: None,
            attach_any: false,
            coord_dir: dir.join("locks"),
            action_lock_ttl: Duration::from_secs(30),
            action_lock_wait: Duration::from_secs(60),
            file_mutex_stale: Duration::from_secs(60),
            registry_stale: Duration::from_secs(300),
            rendezvous_ttl: Duration::from_secs(86_400),
            snapshot_max_chars: 10_000,
            strict_profile: false,
            headless: true,
        }
    }

    #[test]
    fn agent_tag_is_stable_and_well_formed() {
        let dir = tempdir().unwrap();
        let ctx = SessionContext::new(test_config(dir.path())).unwrap();
        let tag = ctx.ensure_agent_tag().to_string();
        assert_eq!(tag, ctx.ensure_agent_tag());
        let parts: Vec<&str> = tag.split(':').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "agent");
        assert_eq!(parts[1], std::process::id().to_string());
    }

    #[tokio::test]
    async fn window_reset_keeps_endpoint() {
        let dir = tempdir().unwrap();
        let ctx = SessionContext::new(test_config(dir.path())).unwrap();
        let mut state = ctx.lock_state().await;
        state.endpoint = Some(DebugEndpoint::local(9225));
        state.target_id = Some("T1".into());
        state.window_id = Some(3);
        state.page_session = Some("S1".into());

        state.reset_window_state();
        assert!(state.target_id.is_none());
        assert!(state.window_id.is_none());
        assert!(state.page_session.is_none());
        assert!(state.endpoint.is_some());
    }
}
