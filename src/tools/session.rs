//! Session lifecycle tools: start, close, unlock, force-close.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::exclusive::{self, Ensure, RunOptions};
use crate::session::SessionContext;
use crate::window;

/// Start (or re-validate) this agent's session: driver attached, window
/// owned, leftover blank windows in our own OS window swept away.
pub async fn start_session(ctx: &Arc<SessionContext>) -> Value {
    let ttl = ctx.config.action_lock_ttl;
    let mut reply = exclusive::run(
        ctx,
        RunOptions::new("start_session", Ensure::DriverAndWindow).with_snapshot(),
        move |state| {
            Box::pin(async move {
                let swept = window::close_extra_blank_windows(state).await;
                Ok(json!({
                    "debugger": state.debugger_address(),
                    "lock_ttl_seconds": ttl.as_secs(),
                    "swept_blank_windows": swept,
                }))
            })
        },
    )
    .await;

    // The session id is the agent tag; stamp it outside the handler so
    // failure envelopes carry it too.
    if let Value::Object(map) = &mut reply {
        map.insert("session_id".into(), json!(ctx.ensure_agent_tag()));
    }
    reply
}

/// Close this agent's window. The browser stays up for everyone else; the
/// lease is left to expire on its own.
pub async fn close_window(ctx: &Arc<SessionContext>) -> Value {
    let ctx_inner = Arc::clone(ctx);
    exclusive::run(
        ctx,
        RunOptions::new("close_window", Ensure::Nothing),
        move |state| {
            Box::pin(async move {
                let closed = window::close_window(&ctx_inner, state).await?;
                Ok(json!({ "closed": closed }))
            })
        },
    )
    .await
}

/// Release this agent's action lock explicitly.
pub async fn unlock(ctx: &Arc<SessionContext>) -> Value {
    let ctx_inner = Arc::clone(ctx);
    exclusive::run(
        ctx,
        RunOptions::new("unlock", Ensure::Nothing).releasing_lease(),
        move |_state| {
            Box::pin(async move {
                let owner = ctx_inner.ensure_agent_tag().to_string();
                let lock = ctx_inner.coord.lock.clone();
                let released = tokio::task::spawn_blocking(move || lock.release(&owner))
                    .await
                    .unwrap_or(false);
                Ok(json!({ "released": released }))
            })
        },
    )
    .await
}

/// Recovery hammer: kill every browser process on this profile and wipe
/// the coordination files.
pub async fn force_close_all(ctx: &Arc<SessionContext>) -> Value {
    let ctx_inner = Arc::clone(ctx);
    exclusive::run(
        ctx,
        RunOptions::new("force_close_all", Ensure::Nothing).releasing_lease(),
        move |state| {
            Box::pin(async move {
                let (killed, errors) = window::force_close_all(&ctx_inner, state).await;
                Ok(json!({
                    "killed_processes": killed,
                    "errors": errors,
                }))
            })
        },
    )
    .await
}
