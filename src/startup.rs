//! Startup arbiter: ensure exactly one shared browser runs in debug mode
//! for this profile, and leave the session attached to it.
//!
//! Order of attack: rendezvous fast path, then election under the startup
//! file mutex (re-check rendezvous, read the browser's own active-port
//! file, optionally attach to any live candidate port, finally launch).
//! Whatever path wins, the confirmed endpoint is written back to the
//! rendezvous file so later joiners skip the election entirely.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, info, warn};
use warden_cdp::{binary, endpoint, CdpDriver, DebugEndpoint};
use warden_coord::FileMutex;

use crate::config::{GatewayConfig, CANDIDATE_PORTS};
use crate::errors::GatewayError;
use crate::process::find_browser_by_port;
use crate::session::{SessionContext, SessionState};

const STARTUP_MUTEX_WAIT: Duration = Duration::from_secs(8);
const LAUNCH_WAIT: Duration = Duration::from_secs(10);
const LAUNCH_POLL: Duration = Duration::from_millis(100);

/// Make sure `state.driver` is attached to a live debug endpoint,
/// electing this process to launch the browser if nobody else has.
pub async fn ensure_driver(
    ctx: &Arc<SessionContext>,
    state: &mut SessionState,
) -> Result<(), GatewayError> {
    if state.is_driver_initialized() {
        return Ok(());
    }
    // A dead driver handle is worth discarding before we re-elect.
    state.driver = None;
    state.page_session = None;

    // Fast path: someone already published a working endpoint.
    if let Some(found) = read_rendezvous(ctx).await {
        if let Ok(()) = try_attach(ctx, state, found.clone(), false).await {
            return Ok(());
        }
        debug!(target: "warden", endpoint = %found, "rendezvous endpoint did not attach");
    }

    let mutex = FileMutex::new(
        ctx.coord.paths.startup_mutex(),
        ctx.config.file_mutex_stale,
    );
    let guard = {
        let mutex = mutex.clone();
        tokio::task::spawn_blocking(move || mutex.acquire(STARTUP_MUTEX_WAIT))
            .await
            .map_err(|err| GatewayError::Internal(err.to_string()))?
    };

    let guard = match guard {
        Ok(guard) => guard,
        Err(_) => {
            // Somebody else is mid-election; their rendezvous may already
            // be out by now.
            if let Some(found) = read_rendezvous(ctx).await {
                if try_attach(ctx, state, found, false).await.is_ok() {
                    return Ok(());
                }
            }
            return Err(GatewayError::StartupContended);
        }
    };

    // Guard held from here: exactly one process runs the remaining steps.
    let result = elect_and_attach(ctx, state).await;
    drop(guard);
    result
}

async fn elect_and_attach(
    ctx: &Arc<SessionContext>,
    state: &mut SessionState,
) -> Result<(), GatewayError> {
    // Re-check under the mutex; the previous holder may have finished.
    if let Some(found) = read_rendezvous(ctx).await {
        if try_attach(ctx, state, found, false).await.is_ok() {
            return Ok(());
        }
    }

    // The browser itself records its active debug port inside the profile,
    // so an endpoint discovered this way is the profile's by construction.
    if let Some(port) = endpoint::read_active_port_file(&ctx.config.user_data_dir) {
        let found = DebugEndpoint::local(port);
        if endpoint::is_port_open(&found).await {
            if try_attach(ctx, state, found, true).await.is_ok() {
                return Ok(());
            }
        }
    }

    // Permissive attach: any live debugger on a candidate port will do.
    if ctx.config.attach_any {
        let mut candidates: Vec<u16> = Vec::new();
        candidates.extend(ctx.config.fixed_port);
        candidates.extend(CANDIDATE_PORTS);
        for port in candidates {
            let found = DebugEndpoint::local(port);
            if endpoint::is_port_open(&found).await
                && try_attach(ctx, state, found, true).await.is_ok()
            {
                return Ok(());
            }
        }
    }

    // Nobody is serving this profile: launch our own browser. The endpoint
    // is ours by construction, no verification round-trip needed.
    let port = ctx.config.launch_port();
    launch_browser(&ctx.config, port).await?;
    let found = wait_for_endpoint(&ctx.config, port).await?;
    try_attach(ctx, state, found, true).await
}

async fn read_rendezvous(ctx: &Arc<SessionContext>) -> Option<DebugEndpoint> {
    let rendezvous = ctx.coord.rendezvous.clone();
    let probe = Arc::clone(&ctx.coord.probe);
    let ttl = ctx.config.rendezvous_ttl;
    let entry = tokio::task::spawn_blocking(move || rendezvous.read(ttl, probe.as_ref()))
        .await
        .ok()??;
    let found = DebugEndpoint::new(entry.host, entry.port);
    endpoint::is_port_open(&found).await.then_some(found)
}

/// Attach the driver to `found` and publish the endpoint on success.
async fn try_attach(
    ctx: &Arc<SessionContext>,
    state: &mut SessionState,
    found: DebugEndpoint,
    skip_profile_check: bool,
) -> Result<(), GatewayError> {
    if !(skip_profile_check || ctx.config.attach_any) && !profile_matches(ctx, &found).await {
        return Err(GatewayError::DriverNotInitialized(format!(
            "debugger on {found} does not serve the configured profile"
        )));
    }

    let driver = CdpDriver::attach(found.clone())
        .await
        .map_err(|err| GatewayError::DriverNotInitialized(err.to_string()))?;

    let pid = find_browser_by_port(found.port).unwrap_or_else(std::process::id);
    let rendezvous = ctx.coord.rendezvous.clone();
    let host = found.host.clone();
    let port = found.port;
    let _ = tokio::task::spawn_blocking(move || rendezvous.write(&host, port, pid)).await;

    info!(target: "warden", endpoint = %found, "attached to shared browser");
    state.endpoint = Some(found);
    state.driver = Some(Arc::new(driver));
    Ok(())
}

/// Does the debugger at `found` serve our profile? The version payload's
/// `userDataDir` is authoritative when present; otherwise the profile's
/// active-port file vouching for the port is accepted.
async fn profile_matches(ctx: &Arc<SessionContext>, found: &DebugEndpoint) -> bool {
    if endpoint::serves_profile(found, &ctx.config.user_data_dir).await {
        return true;
    }
    endpoint::read_active_port_file(&ctx.config.user_data_dir) == Some(found.port)
}

async fn launch_browser(config: &GatewayConfig, port: u16) -> Result<(), GatewayError> {
    let binary = config
        .browser_path
        .clone()
        .or_else(binary::detect_browser_executable)
        .ok_or_else(|| {
            GatewayError::Config("no browser binary configured and none found on PATH".into())
        })?;

    std::fs::create_dir_all(&config.user_data_dir)
        .map_err(|err| GatewayError::Io(err.to_string()))?;

    let mut command = Command::new(&binary);
    command
        .arg(format!("--remote-debugging-port={port}"))
        .arg(format!("--user-data-dir={}", config.user_data_dir.display()))
        .arg(format!("--profile-directory={}", config.profile_name))
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--new-window")
        .arg("--disable-dev-shm-usage")
        .arg("about:blank")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    if config.headless {
        command.arg("--headless=new");
    }

    let child = command
        .spawn()
        .map_err(|err| GatewayError::DriverNotInitialized(format!("launch failed: {err}")))?;
    info!(
        target: "warden",
        binary = %binary.display(),
        port,
        pid = child.id().unwrap_or(0),
        "launched shared browser"
    );
    // The browser daemonizes into its own process tree; we track it through
    // the debug port, not the child handle.
    drop(child);
    Ok(())
}

/// Wait for the launched browser to open its debug port, or to record a
/// (possibly different) port in its active-port file.
async fn wait_for_endpoint(
    config: &GatewayConfig,
    port: u16,
) -> Result<DebugEndpoint, GatewayError> {
    let deadline = Instant::now() + LAUNCH_WAIT;
    loop {
        if let Some(file_port) = endpoint::read_active_port_file(&config.user_data_dir) {
            let found = DebugEndpoint::local(file_port);
            if endpoint::is_port_open(&found).await {
                return Ok(found);
            }
        }
        let found = DebugEndpoint::local(port);
        if endpoint::is_port_open(&found).await {
            return Ok(found);
        }
        if Instant::now() >= deadline {
            warn!(target: "warden", port, "debug endpoint never opened after launch");
            return Err(GatewayError::StartupTimeout);
        }
        tokio::time::sleep(LAUNCH_POLL).await;
    }
}
