//! Diagnostics object attached to failing replies.

use std::sync::Arc;

use serde_json::{json, Value};
use warden_cdp::ops;

use crate::session::{SessionContext, SessionState};

/// Gather what we know about the session's health. Everything here is
/// best-effort; diagnostics must never fail the reply they decorate.
pub async fn collect(ctx: &Arc<SessionContext>, state: &SessionState) -> Value {
    let registry = ctx.coord.registry.clone();
    let registry_entries = tokio::task::spawn_blocking(move || registry.len())
        .await
        .unwrap_or(0);

    let browser_version = match &state.driver {
        Some(driver) if driver.is_connected() => {
            ops::browser_version(driver.as_ref()).await.ok().flatten()
        }
        _ => None,
    };

    json!({
        "os": format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
        "user_data_dir": ctx.config.user_data_dir.display().to_string(),
        "profile_name": ctx.config.profile_name,
        "debugger": state.debugger_address(),
        "driver_initialized": state.is_driver_initialized(),
        "window_ready": state.is_window_ready(),
        "target_id": state.target_id,
        "window_id": state.window_id,
        "registry_entries": registry_entries,
        "browser_version": browser_version,
        "last_error": ctx.last_error(),
    })
}
