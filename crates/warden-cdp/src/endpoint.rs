use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tracing::debug;

use crate::errors::DriverError;

const HTTP_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const TCP_PROBE_TIMEOUT: Duration = Duration::from_millis(250);

/// A browser debug endpoint (`host:port` of the DevTools HTTP/websocket
/// server).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DebugEndpoint {
    pub host: String,
    pub port: u16,
}

impl DebugEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn local(port: u16) -> Self {
        Self::new("127.0.0.1", port)
    }
}

impl fmt::Display for DebugEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Payload of `GET /json/version`.
#[derive(Clone, Debug, Deserialize)]
pub struct VersionInfo {
    #[serde(rename = "Browser", default)]
    pub browser: Option<String>,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub websocket_url: String,
    #[serde(rename = "userDataDir", default)]
    pub user_data_dir: Option<String>,
}

/// Cheap TCP-level probe; true when something is accepting on the port.
pub async fn is_port_open(endpoint: &DebugEndpoint) -> bool {
    let addr = format!("{}:{}", endpoint.host, endpoint.port);
    matches!(
        tokio::time::timeout(TCP_PROBE_TIMEOUT, TcpStream::connect(&addr)).await,
        Ok(Ok(_))
    )
}

/// Fetch the browser's version metadata, including the websocket debugger
/// url required to attach.
pub async fn fetch_version(endpoint: &DebugEndpoint) -> Result<VersionInfo, DriverError> {
    let url = format!("http://{}/json/version", endpoint);
    let client = reqwest::Client::builder()
        .timeout(HTTP_PROBE_TIMEOUT)
        .build()
        .map_err(|err| DriverError::Unreachable(err.to_string()))?;
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|err| DriverError::Unreachable(err.to_string()))?;
    if !response.status().is_success() {
        return Err(DriverError::Unreachable(format!(
            "{url} answered {}",
            response.status()
        )));
    }
    response
        .json::<VersionInfo>()
        .await
        .map_err(|err| DriverError::Protocol(err.to_string()))
}

/// True when a DevTools debugger answers on the endpoint.
pub async fn is_debugger_listening(endpoint: &DebugEndpoint) -> bool {
    fetch_version(endpoint).await.is_ok()
}

/// Verify that the debugger on `endpoint` serves the expected profile
/// directory. Endpoints that do not report a profile fail the check; a
/// gateway must never mistake an unrelated browser for its own.
pub async fn serves_profile(endpoint: &DebugEndpoint, expected_dir: &Path) -> bool {
    match fetch_version(endpoint).await {
        Ok(info) => match info.user_data_dir {
            Some(actual) => same_dir(Path::new(&actual), expected_dir),
            None => false,
        },
        Err(err) => {
            debug!(target: "warden-cdp", %endpoint, %err, "profile verification probe failed");
            false
        }
    }
}

/// When the browser runs this profile in debug mode it records its port in
/// `DevToolsActivePort` inside the user-data-dir.
pub fn read_active_port_file(user_data_dir: &Path) -> Option<u16> {
    let path: PathBuf = user_data_dir.join("DevToolsActivePort");
    let raw = std::fs::read_to_string(path).ok()?;
    raw.lines().next()?.trim().parse().ok()
}

pub fn same_dir(a: &Path, b: &Path) -> bool {
    if a.as_os_str().is_empty() || b.as_os_str().is_empty() {
        return false;
    }
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(left), Ok(right)) => left == right,
        _ => a == b,
    }
}
