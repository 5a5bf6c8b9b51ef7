//! Per-agent window lifecycle inside the shared browser.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use warden_cdp::{ops, DriverOps};

use crate::errors::GatewayError;
use crate::session::{SessionContext, SessionState};

const HANDLE_POLL_ATTEMPTS: u32 = 20;
const HANDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Make sure this agent owns a live window and the driver session points at
/// it; creates and registers one if the current target is gone.
pub async fn ensure_window(
    ctx: &Arc<SessionContext>,
    state: &mut SessionState,
) -> Result<(), GatewayError> {
    let driver = state
        .driver
        .clone()
        .ok_or_else(|| GatewayError::DriverNotInitialized("no driver in session".into()))?;

    if let Some(target_id) = state.target_id.clone() {
        // A window is only ours while the browser confirms the target AND
        // the registry still records our claim; a pruned entry means other
        // agents may treat the window as orphaned.
        if validate_target(driver.as_ref(), &target_id).await
            && registry_entry_exists(ctx).await
        {
            if state.page_session.is_none() {
                state.page_session = Some(
                    ops::attach_to_target(driver.as_ref(), &target_id)
                        .await
                        .map_err(|err| GatewayError::WindowLost(err.to_string()))?,
                );
            }
            return Ok(());
        }
        debug!(target: "warden", %target_id, "window validation failed; recreating");
        state.reset_window_state();
    }

    cleanup_orphans(ctx, driver.as_ref()).await;

    // Prefer a real OS window; older builds only speak Target.createTarget.
    let (mut window_id, target_id) = match ops::create_window(driver.as_ref()).await {
        Ok(created) if created.target_id.is_some() => (created.window_id, created.target_id),
        other => {
            if let Err(err) = other {
                debug!(target: "warden", %err, "Browser.createWindow unavailable");
            }
            let target_id = ops::create_target(driver.as_ref(), "about:blank", true)
                .await
                .map_err(|err| GatewayError::WindowLost(format!("window create failed: {err}")))?;
            (None, Some(target_id))
        }
    };
    let target_id =
        target_id.ok_or_else(|| GatewayError::WindowLost("browser returned no target".into()))?;

    if window_id.is_none() {
        window_id = ops::window_for_target(driver.as_ref(), &target_id)
            .await
            .unwrap_or(None);
    }

    // The new target takes a beat to show up in the target list.
    let mut visible = false;
    for _ in 0..HANDLE_POLL_ATTEMPTS {
        if validate_target(driver.as_ref(), &target_id).await {
            visible = true;
            break;
        }
        tokio::time::sleep(HANDLE_POLL_INTERVAL).await;
    }
    if !visible {
        return Err(GatewayError::WindowLost(format!(
            "created target {target_id} never became attachable"
        )));
    }

    let page_session = ops::attach_to_target(driver.as_ref(), &target_id)
        .await
        .map_err(|err| GatewayError::WindowLost(format!("window attach failed: {err}")))?;

    let agent_tag = ctx.ensure_agent_tag().to_string();
    let registry = ctx.coord.registry.clone();
    let register_target = target_id.clone();
    let _ = tokio::task::spawn_blocking(move || {
        registry.register(&agent_tag, &register_target, window_id)
    })
    .await;

    info!(target: "warden", %target_id, ?window_id, "window ready");
    state.target_id = Some(target_id);
    state.window_id = window_id;
    state.page_session = Some(page_session);
    Ok(())
}

/// Close this agent's window, unregister it, and keep the driver so the
/// same process can open another window later.
pub async fn close_window(
    ctx: &Arc<SessionContext>,
    state: &mut SessionState,
) -> Result<bool, GatewayError> {
    let Some(target_id) = state.target_id.clone() else {
        return Ok(false);
    };
    let Some(driver) = state.driver.clone() else {
        state.reset_window_state();
        return Ok(false);
    };

    let closed = match ops::close_target(driver.as_ref(), &target_id).await {
        Ok(flag) => flag,
        Err(err) => {
            debug!(target: "warden", %err, "closeTarget failed; window may already be gone");
            false
        }
    };

    let agent_tag = ctx.ensure_agent_tag().to_string();
    let registry = ctx.coord.registry.clone();
    let _ = tokio::task::spawn_blocking(move || registry.unregister(&agent_tag)).await;

    state.reset_window_state();
    Ok(closed)
}

/// Nuclear option: quit the driver, kill every browser process on this
/// profile, release the lease and delete the coordination files.
pub async fn force_close_all(
    ctx: &Arc<SessionContext>,
    state: &mut SessionState,
) -> (Vec<u32>, Vec<String>) {
    state.tear_down().await;

    let user_data_dir = ctx.config.user_data_dir.clone();
    let (killed, mut errors) =
        tokio::task::spawn_blocking(move || crate::process::kill_browser_family(&user_data_dir))
            .await
            .unwrap_or_else(|err| (Vec::new(), vec![err.to_string()]));

    let owner = ctx.ensure_agent_tag().to_string();
    let lock = ctx.coord.lock.clone();
    let paths = ctx.coord.paths.clone();
    let cleanup = tokio::task::spawn_blocking(move || {
        lock.release(&owner);
        for path in paths.all_files() {
            let _ = std::fs::remove_file(path);
        }
    })
    .await;
    if let Err(err) = cleanup {
        errors.push(format!("coordination cleanup failed: {err}"));
    }

    (killed, errors)
}

/// Close leftover blank windows belonging to this agent's OS window.
///
/// The filter is strictly "same OS window as mine": blank-looking targets
/// in any other window belong to other agents and must never be touched.
pub async fn close_extra_blank_windows(state: &SessionState) -> usize {
    let (Some(driver), Some(own_window), Some(own_target)) = (
        state.driver.clone(),
        state.window_id,
        state.target_id.clone(),
    ) else {
        return 0;
    };

    let targets = match ops::page_targets(driver.as_ref()).await {
        Ok(targets) => targets,
        Err(_) => return 0,
    };

    let mut closed = 0;
    for target in targets {
        if target.target_id == own_target {
            continue;
        }
        let blank = target
            .url
            .as_deref()
            .map(|url| url.is_empty() || url == "about:blank" || url == "chrome://newtab/")
            .unwrap_or(true);
        if !blank {
            continue;
        }
        match ops::window_for_target(driver.as_ref(), &target.target_id).await {
            Ok(Some(window_id)) if window_id == own_window => {
                if ops::close_target(driver.as_ref(), &target.target_id)
                    .await
                    .unwrap_or(false)
                {
                    closed += 1;
                }
            }
            _ => {}
        }
    }
    closed
}

async fn registry_entry_exists(ctx: &Arc<SessionContext>) -> bool {
    let agent_tag = ctx.ensure_agent_tag().to_string();
    let registry = ctx.coord.registry.clone();
    tokio::task::spawn_blocking(move || registry.entry(&agent_tag).is_some())
        .await
        .unwrap_or(false)
}

async fn validate_target(driver: &dyn DriverOps, target_id: &str) -> bool {
    matches!(ops::target_info(driver, target_id).await, Ok(Some(info)) if info.target_id == target_id)
}

/// Registry cleanup pass: prune entries for dead/stale agents and
/// best-effort close the browser targets they leaked.
async fn cleanup_orphans(ctx: &Arc<SessionContext>, driver: &dyn DriverOps) {
    let live_targets: Option<HashSet<String>> = match ops::page_targets(driver).await {
        Ok(targets) => Some(targets.into_iter().map(|t| t.target_id).collect()),
        Err(err) => {
            debug!(target: "warden", %err, "target enumeration failed; scanning without it");
            None
        }
    };

    let registry = ctx.coord.registry.clone();
    let probe = Arc::clone(&ctx.coord.probe);
    let stale = ctx.config.registry_stale;
    let removed = tokio::task::spawn_blocking(move || {
        registry.scan_and_clean(probe.as_ref(), stale, live_targets.as_ref())
    })
    .await
    .unwrap_or_default();

    for (agent, entry) in removed {
        match ops::close_target(driver, &entry.target_id).await {
            Ok(_) => info!(
                target: "warden",
                %agent,
                target_id = %entry.target_id,
                "closed orphaned window"
            ),
            Err(err) => warn!(
                target: "warden",
                %agent,
                target_id = %entry.target_id,
                %err,
                "could not close orphaned window"
            ),
        }
    }
}
