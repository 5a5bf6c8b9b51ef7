use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::endpoint::{self, DebugEndpoint};
use crate::errors::DriverError;
use crate::transport::{CdpTransport, CommandScope, WsTransport};

/// The opaque driver port the gateway core programs against.
///
/// Everything the core needs from a browser fits through one raw-command
/// hole; the typed helpers in [`crate::ops`] sit on top of it.
#[async_trait]
pub trait DriverOps: Send + Sync {
    async fn command(
        &self,
        scope: CommandScope,
        method: &str,
        params: Value,
    ) -> Result<Value, DriverError>;

    fn endpoint(&self) -> &DebugEndpoint;

    /// Whether the underlying connection is still believed healthy.
    fn is_connected(&self) -> bool;

    /// Drop the connection to the browser. Never terminates the browser
    /// itself; other agents keep using it.
    async fn quit(&self);
}

/// Real driver attached to a running browser's debug websocket.
pub struct CdpDriver {
    endpoint: DebugEndpoint,
    transport: Arc<WsTransport>,
}

impl CdpDriver {
    /// Attach to the debugger at `endpoint`, resolving the websocket url via
    /// `/json/version`.
    pub async fn attach(endpoint: DebugEndpoint) -> Result<Self, DriverError> {
        let version = endpoint::fetch_version(&endpoint).await?;
        let transport = WsTransport::connect(&version.websocket_url).await?;
        info!(
            target: "warden-cdp",
            %endpoint,
            browser = version.browser.as_deref().unwrap_or("<unknown>"),
            "driver attached"
        );
        Ok(Self {
            endpoint,
            transport: Arc::new(transport),
        })
    }
}

#[async_trait]
impl DriverOps for CdpDriver {
    async fn command(
        &self,
        scope: CommandScope,
        method: &str,
        params: Value,
    ) -> Result<Value, DriverError> {
        self.transport.send(scope, method, params).await
    }

    fn endpoint(&self) -> &DebugEndpoint {
        &self.endpoint
    }

    fn is_connected(&self) -> bool {
        self.transport.is_alive()
    }

    async fn quit(&self) {
        self.transport.close().await;
    }
}

/// Driver that refuses every command. Stands in where a connection is
/// structurally required but no browser is reachable.
#[derive(Debug)]
pub struct NoopDriver {
    endpoint: DebugEndpoint,
}

impl NoopDriver {
    pub fn new(endpoint: DebugEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl DriverOps for NoopDriver {
    async fn command(
        &self,
        _scope: CommandScope,
        method: &str,
        _params: Value,
    ) -> Result<Value, DriverError> {
        Err(DriverError::CdpIo(format!("no driver available for {method}")))
    }

    fn endpoint(&self) -> &DebugEndpoint {
        &self.endpoint
    }

    fn is_connected(&self) -> bool {
        false
    }

    async fn quit(&self) {}
}
