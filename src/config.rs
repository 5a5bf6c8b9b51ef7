use std::path::PathBuf;
use std::time::Duration;

use crate::errors::GatewayError;

/// Resolved gateway configuration. Immutable once built; everything else in
/// the process reads from this.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub user_data_dir: PathBuf,
    pub profile_name: String,
    pub browser_path: Option<PathBuf>,
    pub fixed_port: Option<u16>,
    pub attach_any: bool,
    pub coord_dir: PathBuf,
    pub action_lock_ttl: Duration,
    pub action_lock_wait: Duration,
    pub file_mutex_stale: Duration,
    pub registry_stale: Duration,
    pub rendezvous_ttl: Duration,
    pub snapshot_max_chars: usize,
    pub strict_profile: bool,
    pub headless: bool,
}

/// Debug port used when no fixed port is configured.
pub const DEFAULT_DEBUG_PORT: u16 = 9225;

/// Ports probed by the permissive-attach path, before the launch default.
pub const CANDIDATE_PORTS: &[u16] = &[9222, 9223, DEFAULT_DEBUG_PORT];

impl GatewayConfig {
    /// Resolve configuration from process environment variables.
    pub fn from_env() -> Result<Self, GatewayError> {
        Self::from_lookup(&|name| std::env::var(name).ok())
    }

    /// Resolve configuration from an arbitrary variable source.
    ///
    /// Family overrides follow the preference order beta > canary > stable:
    /// a beta or canary executable path switches both the binary and the
    /// profile directory, so the shared instance never competes with the
    /// user's everyday browser.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, GatewayError> {
        let get = |name: &str| -> Option<String> {
            lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
        };

        let mut user_data_dir = get("WARDEN_USER_DATA_DIR");
        let mut profile_name = get("WARDEN_PROFILE_NAME").unwrap_or_else(|| "Default".into());
        let mut browser_path = get("WARDEN_BROWSER_PATH");

        if let Some(canary_path) = get("WARDEN_CANARY_PATH") {
            browser_path = Some(canary_path);
            user_data_dir = Some(get("WARDEN_CANARY_USER_DATA_DIR").ok_or_else(|| {
                GatewayError::Config(
                    "WARDEN_CANARY_USER_DATA_DIR is required when WARDEN_CANARY_PATH is set".into(),
                )
            })?);
            profile_name = get("WARDEN_CANARY_PROFILE_NAME").unwrap_or_else(|| "Default".into());
        }

        if let Some(beta_path) = get("WARDEN_BETA_PATH") {
            browser_path = Some(beta_path);
            user_data_dir = Some(get("WARDEN_BETA_USER_DATA_DIR").ok_or_else(|| {
                GatewayError::Config(
                    "WARDEN_BETA_USER_DATA_DIR is required when WARDEN_BETA_PATH is set".into(),
                )
            })?);
            profile_name = get("WARDEN_BETA_PROFILE_NAME").unwrap_or_else(|| "Default".into());
        }

        let user_data_dir = user_data_dir.ok_or_else(|| {
            GatewayError::Config(
                "WARDEN_USER_DATA_DIR is required (or a WARDEN_BETA_*/WARDEN_CANARY_* pair)".into(),
            )
        })?;

        let fixed_port = match get("WARDEN_DEBUG_PORT") {
            Some(raw) => Some(raw.parse::<u16>().map_err(|_| {
                GatewayError::Config(format!("WARDEN_DEBUG_PORT is not a port: {raw}"))
            })?),
            None => None,
        };

        let coord_dir = get("WARDEN_COORD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("warden-locks"));

        let secs = |name: &str, default: u64| -> Result<Duration, GatewayError> {
            match get(name) {
                Some(raw) => raw
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| GatewayError::Config(format!("{name} is not seconds: {raw}"))),
                None => Ok(Duration::from_secs(default)),
            }
        };

        let snapshot_max_chars = match get("WARDEN_SNAPSHOT_MAX_CHARS") {
            Some(raw) => raw.parse::<usize>().map_err(|_| {
                GatewayError::Config(format!("WARDEN_SNAPSHOT_MAX_CHARS is not a count: {raw}"))
            })?,
            None => 10_000,
        };

        let flag = |name: &str| -> bool {
            get(name)
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(false)
        };

        Ok(Self {
            user_data_dir: PathBuf::from(user_data_dir),
            profile_name,
            browser_path: browser_path.map(PathBuf::from),
            fixed_port,
            attach_any: flag("WARDEN_ATTACH_ANY"),
            coord_dir,
            action_lock_ttl: secs("WARDEN_ACTION_LOCK_TTL", 30)?,
            action_lock_wait: secs("WARDEN_ACTION_LOCK_WAIT", 60)?,
            file_mutex_stale: secs("WARDEN_FILE_MUTEX_STALE", 60)?,
            registry_stale: secs("WARDEN_REGISTRY_STALE", 300)?,
            rendezvous_ttl: secs("WARDEN_RENDEZVOUS_TTL", 86_400)?,
            snapshot_max_chars,
            strict_profile: flag("WARDEN_STRICT_PROFILE"),
            headless: flag("WARDEN_HEADLESS"),
        })
    }

    /// Port the launch path will use.
    pub fn launch_port(&self) -> u16 {
        self.fixed_port.unwrap_or(DEFAULT_DEBUG_PORT)
    }
}
