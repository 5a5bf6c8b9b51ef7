use thiserror::Error;
use warden_cdp::DriverError;
use warden_coord::CoordError;

/// Failure taxonomy surfaced to agents. Every variant maps to a stable
/// `error` string in the reply envelope.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    Config(String),
    #[error("action lock is held by another agent")]
    LockBusy {
        owner: Option<String>,
        expires_at: Option<f64>,
    },
    #[error("action lock was taken over during execution")]
    LockLost,
    #[error("could not acquire the startup mutex and no endpoint appeared")]
    StartupContended,
    #[error("browser launched but the debug endpoint never came up")]
    StartupTimeout,
    #[error("failed to attach a driver: {0}")]
    DriverNotInitialized(String),
    #[error("browser window was lost: {0}")]
    WindowLost(String),
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("element not interactable: {0}")]
    ElementNotInteractable(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("coordination i/o failed: {0}")]
    Io(String),
    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    /// Stable wire code for the reply envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::LockBusy { .. } => "lock_busy",
            Self::LockLost => "lock_lost",
            Self::StartupContended => "startup_contended",
            Self::StartupTimeout => "startup_timeout",
            Self::DriverNotInitialized(_) => "driver_not_initialized",
            Self::WindowLost(_) => "window_lost",
            Self::ElementNotFound(_) => "element_not_found",
            Self::ElementNotInteractable(_) => "element_not_interactable",
            Self::Timeout(_) => "timeout",
            Self::Io(_) => "io_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Whether this failure invalidates the session's window state, so the
    /// next call recreates the window instead of reusing stale identifiers.
    pub fn invalidates_window(&self) -> bool {
        matches!(self, Self::DriverNotInitialized(_) | Self::WindowLost(_))
    }
}

impl From<CoordError> for GatewayError {
    fn from(err: CoordError) -> Self {
        match err {
            CoordError::EmptyUserDataDir | CoordError::MissingProfile { .. } => {
                Self::Config(err.to_string())
            }
            CoordError::MutexTimeout { .. } => Self::Io(err.to_string()),
            CoordError::Io { .. } => Self::Io(err.to_string()),
        }
    }
}

impl From<DriverError> for GatewayError {
    fn from(err: DriverError) -> Self {
        match &err {
            DriverError::Timeout(_) => Self::Timeout(err.to_string()),
            DriverError::Unreachable(_) | DriverError::NotConnected => {
                Self::DriverNotInitialized(err.to_string())
            }
            DriverError::TargetNotFound(_) => Self::WindowLost(err.to_string()),
            DriverError::CdpIo(_) | DriverError::Protocol(_) => Self::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(GatewayError::Config("x".into()).code(), "config_error");
        assert_eq!(
            GatewayError::LockBusy {
                owner: None,
                expires_at: None
            }
            .code(),
            "lock_busy"
        );
        assert_eq!(GatewayError::LockLost.code(), "lock_lost");
        assert_eq!(GatewayError::StartupTimeout.code(), "startup_timeout");
    }

    #[test]
    fn window_invalidation_is_limited_to_driver_and_window_failures() {
        assert!(GatewayError::WindowLost("gone".into()).invalidates_window());
        assert!(GatewayError::DriverNotInitialized("no ws".into()).invalidates_window());
        assert!(!GatewayError::Timeout("slow".into()).invalidates_window());
        assert!(!GatewayError::LockLost.invalidates_window());
    }
}
