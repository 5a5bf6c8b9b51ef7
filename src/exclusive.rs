//! Exclusive-access protocol: the wrapper every tool handler runs under.
//!
//! One wrapped call walks the chain intra-process lock → cross-process
//! action lock → driver/window readiness → handler, with a background
//! heartbeat renewing the lease while the handler runs. Every terminating
//! path drops what it acquired: the intra lock by scope, the lease either
//! by explicit release (pre-handler failures) or by natural expiry after
//! the final renewal (completed handlers — see DESIGN.md on why completion
//! does not release).

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use warden_coord::AcquireOutcome;

use crate::diagnostics;
use crate::errors::GatewayError;
use crate::reply;
use crate::session::{SessionContext, SessionState};
use crate::snapshot;
use crate::startup;
use crate::window;

/// What a handler needs ready before it runs.
#[derive(Clone, Copy, Debug)]
pub enum Ensure {
    /// Driver attached and this agent's window validated or created.
    DriverAndWindow,
    /// Driver attached; window state untouched.
    DriverOnly,
    /// Locks only.
    Nothing,
}

#[derive(Clone, Copy, Debug)]
pub struct RunOptions {
    pub tool: &'static str,
    pub ensure: Ensure,
    pub with_snapshot: bool,
    /// Keep the lease warm on exit. Handlers that release or delete the
    /// lock themselves (`unlock`, `force_close_all`) turn this off so the
    /// wrapper does not resurrect it.
    pub retain_lease: bool,
}

impl RunOptions {
    pub fn new(tool: &'static str, ensure: Ensure) -> Self {
        Self {
            tool,
            ensure,
            with_snapshot: false,
            retain_lease: true,
        }
    }

    pub fn with_snapshot(mut self) -> Self {
        self.with_snapshot = true;
        self
    }

    pub fn releasing_lease(mut self) -> Self {
        self.retain_lease = false;
        self
    }
}

/// Run `handler` under the full protocol. Never returns an error out of the
/// wrapper: every failure, including a panicking handler, becomes a
/// structured reply.
pub async fn run<F>(ctx: &Arc<SessionContext>, opts: RunOptions, handler: F) -> Value
where
    F: for<'a> FnOnce(&'a mut SessionState) -> BoxFuture<'a, Result<Value, GatewayError>>,
{
    let owner = ctx.ensure_agent_tag().to_string();

    // Intra-process serialization: one tool execution per process. The
    // guard also gates all session-state access.
    let mut state = ctx.lock_state().await;

    match acquire_lock(ctx, &owner).await {
        AcquireOutcome::Acquired { .. } => {}
        AcquireOutcome::Busy {
            owner: current,
            expires_at,
        } => {
            let err = GatewayError::LockBusy {
                owner: current,
                expires_at,
            };
            ctx.record_error(&err);
            return reply::error(&err, None);
        }
        AcquireOutcome::IoError { detail } => {
            let err = GatewayError::Io(detail);
            ctx.record_error(&err);
            return reply::error(&err, None);
        }
    }

    if let Err(err) = ensure_ready(ctx, &mut state, opts.ensure).await {
        if err.invalidates_window() {
            state.reset_window_state();
        }
        ctx.record_error(&err);
        // Pre-handler failure: give the lease back immediately.
        release_lock(ctx, &owner).await;
        let diag = diagnostics::collect(ctx, &state).await;
        return reply::error(&err, Some(diag));
    }

    // Heartbeat renews the lease while the handler runs. The drop guard
    // stops it even if this future is dropped mid-flight. Handlers that
    // release the lease themselves run without one, so a renewal can never
    // race their cleanup.
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();
    let lock_lost = Arc::new(AtomicBool::new(false));
    let heartbeat = opts
        .retain_lease
        .then(|| spawn_heartbeat(ctx, owner.clone(), cancel.clone(), Arc::clone(&lock_lost)));

    let outcome = AssertUnwindSafe(handler(&mut state)).catch_unwind().await;

    cancel.cancel();
    if let Some(heartbeat) = heartbeat {
        let _ = heartbeat.await;
    }

    let outcome = match outcome {
        Ok(inner) => inner,
        Err(_) => {
            warn!(target: "warden", tool = opts.tool, "handler panicked");
            Err(GatewayError::Internal(format!(
                "{} handler panicked",
                opts.tool
            )))
        }
    };

    // A usurped lease means our mutual exclusion was gone while the handler
    // ran; the result cannot be trusted to have been exclusive.
    if lock_lost.load(Ordering::Relaxed) {
        let err = GatewayError::LockLost;
        ctx.record_error(&err);
        let diag = diagnostics::collect(ctx, &state).await;
        return reply::error(&err, Some(diag));
    }

    let response = match outcome {
        Ok(body) => {
            let snapshot = if opts.with_snapshot {
                snapshot::capture(&state, ctx.config.snapshot_max_chars).await
            } else {
                None
            };
            reply::with_snapshot(reply::ok(body), snapshot)
        }
        Err(err) => {
            if err.invalidates_window() {
                state.reset_window_state();
            }
            ctx.record_error(&err);
            let diag = diagnostics::collect(ctx, &state).await;
            reply::error(&err, Some(diag))
        }
    };

    if opts.retain_lease {
        final_renew(ctx, &owner).await;
    }

    response
}

async fn ensure_ready(
    ctx: &Arc<SessionContext>,
    state: &mut SessionState,
    ensure: Ensure,
) -> Result<(), GatewayError> {
    match ensure {
        Ensure::Nothing => Ok(()),
        Ensure::DriverOnly => startup::ensure_driver(ctx, state).await,
        Ensure::DriverAndWindow => {
            startup::ensure_driver(ctx, state).await?;
            window::ensure_window(ctx, state).await
        }
    }
}

async fn acquire_lock(ctx: &Arc<SessionContext>, owner: &str) -> AcquireOutcome {
    let lock = ctx.coord.lock.clone();
    let ttl = ctx.config.action_lock_ttl;
    let wait = ctx.config.action_lock_wait;
    let owner = owner.to_string();
    tokio::task::spawn_blocking(move || lock.acquire(&owner, ttl, wait))
        .await
        .unwrap_or_else(|err| AcquireOutcome::IoError {
            detail: err.to_string(),
        })
}

async fn release_lock(ctx: &Arc<SessionContext>, owner: &str) {
    let lock = ctx.coord.lock.clone();
    let owner = owner.to_string();
    let _ = tokio::task::spawn_blocking(move || lock.release(&owner)).await;
}

async fn final_renew(ctx: &Arc<SessionContext>, owner: &str) {
    let lock = ctx.coord.lock.clone();
    let registry = ctx.coord.registry.clone();
    let ttl = ctx.config.action_lock_ttl;
    let owner = owner.to_string();
    let _ = tokio::task::spawn_blocking(move || lock.renew(&registry, &owner, ttl)).await;
}

fn spawn_heartbeat(
    ctx: &Arc<SessionContext>,
    owner: String,
    cancel: CancellationToken,
    lock_lost: Arc<AtomicBool>,
) -> JoinHandle<()> {
    let lock = ctx.coord.lock.clone();
    let registry = ctx.coord.registry.clone();
    let ttl = ctx.config.action_lock_ttl;
    let interval = (ttl / 3).max(Duration::from_millis(250));

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            let lock = lock.clone();
            let registry = registry.clone();
            let renew_owner = owner.clone();
            let renewed =
                tokio::task::spawn_blocking(move || lock.renew(&registry, &renew_owner, ttl))
                    .await
                    .unwrap_or(false);

            if !renewed {
                debug!(target: "warden", %owner, "lease renewal refused; flagging lock_lost");
                lock_lost.store(true, Ordering::Relaxed);
                break;
            }
        }
    })
}
