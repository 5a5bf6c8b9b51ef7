use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum DriverError {
    #[error("devtools endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("cdp i/o failure: {0}")]
    CdpIo(String),
    #[error("cdp command timed out: {0}")]
    Timeout(String),
    #[error("target not found: {0}")]
    TargetNotFound(String),
    #[error("driver is not connected")]
    NotConnected,
    #[error("cdp protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    /// Errors that indicate the websocket or browser is gone, as opposed to
    /// a command-level failure on a healthy connection.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::CdpIo(_) | Self::NotConnected)
    }
}
