//! Cross-process action-lock behavior, exercised through the exclusive
//! wrapper with two contexts sharing one coordination directory.

mod support;

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::{json, Value};
use tempfile::tempdir;

use browser_warden::errors::GatewayError;
use browser_warden::exclusive::{self, Ensure, RunOptions};
use browser_warden::session::SessionContext;
use browser_warden::tools;
use warden_coord::fsx;
use warden_coord::Lease;

use support::{default_test_config, test_config};

fn noop_options(tool: &'static str) -> RunOptions {
    RunOptions::new(tool, Ensure::Nothing)
}

async fn run_noop(ctx: &Arc<SessionContext>) -> Value {
    exclusive::run(ctx, noop_options("noop"), |_state| {
        Box::pin(async move { Ok(json!({ "ran": true })) })
    })
    .await
}

#[tokio::test]
async fn contended_lock_reports_busy_then_recovers() {
    let dir = tempdir().unwrap();
    let ctx_a = SessionContext::new(default_test_config(dir.path())).unwrap();
    let ctx_b = SessionContext::new(default_test_config(dir.path())).unwrap();

    // A holds the lease.
    let reply_a = run_noop(&ctx_a).await;
    assert_eq!(reply_a["ok"], json!(true));
    let owner_a = ctx_a.ensure_agent_tag().to_string();

    // B times out within its bounded wait and learns who holds the lease.
    let reply_b = run_noop(&ctx_b).await;
    assert_eq!(reply_b["ok"], json!(false));
    assert_eq!(reply_b["error"], json!("lock_busy"));
    assert_eq!(reply_b["current_owner"], json!(owner_a));
    assert!(reply_b["expires_at"].as_f64().unwrap() > fsx::now_secs());

    // A releases explicitly; B gets through.
    let unlock_a = tools::session::unlock(&ctx_a).await;
    assert_eq!(unlock_a["released"], json!(true));
    let reply_b2 = run_noop(&ctx_b).await;
    assert_eq!(reply_b2["ok"], json!(true));
}

#[tokio::test]
async fn stale_lease_is_reclaimed() {
    let dir = tempdir().unwrap();
    let ctx = SessionContext::new(default_test_config(dir.path())).unwrap();

    let softlock = ctx.coord.paths.softlock();
    fsx::atomic_write_json(
        &softlock,
        &Lease {
            owner: Some("agent:99999:0:deadbeef".into()),
            expires_at: Some(fsx::now_secs() - 10.0),
        },
    )
    .unwrap();

    let reply = run_noop(&ctx).await;
    assert_eq!(reply["ok"], json!(true));
    let lease = ctx.coord.lock.peek();
    assert_eq!(lease.owner.as_deref(), Some(ctx.ensure_agent_tag()));
}

#[tokio::test]
async fn completed_handler_leaves_expiring_lease() {
    let dir = tempdir().unwrap();
    let ctx = SessionContext::new(default_test_config(dir.path())).unwrap();

    let reply = run_noop(&ctx).await;
    assert_eq!(reply["ok"], json!(true));

    // The lease survives completion (it expires rather than being released;
    // `unlock` is the explicit release path).
    let lease = ctx.coord.lock.peek();
    assert_eq!(lease.owner.as_deref(), Some(ctx.ensure_agent_tag()));
    assert!(lease.expires_at.unwrap() > fsx::now_secs());

    let unlock = tools::session::unlock(&ctx).await;
    assert_eq!(unlock["ok"], json!(true));
    assert_eq!(unlock["released"], json!(true));
    assert!(ctx.coord.lock.peek().owner.is_none());
}

#[tokio::test]
async fn panicking_handler_releases_both_locks() {
    let dir = tempdir().unwrap();
    let config = test_config(
        dir.path(),
        Duration::from_millis(400),
        Duration::from_millis(200),
    );
    let ctx = SessionContext::new(config).unwrap();

    fn boom() -> Value {
        panic!("handler blew up")
    }
    let reply = exclusive::run(&ctx, noop_options("explode"), |_state| {
        Box::pin(async move { Ok(boom()) })
    })
    .await;
    assert_eq!(reply["ok"], json!(false));
    assert_eq!(reply["error"], json!("internal_error"));

    // Intra-process lock is free again: the same context can run another
    // handler immediately.
    let again = run_noop(&ctx).await;
    assert_eq!(again["ok"], json!(true));

    // And the lease is gone for other owners once the short TTL passes.
    let ctx_b = SessionContext::new(test_config(
        dir.path(),
        Duration::from_millis(400),
        Duration::from_secs(2),
    ))
    .unwrap();
    let reply_b = run_noop(&ctx_b).await;
    assert_eq!(reply_b["ok"], json!(true));
}

#[tokio::test]
async fn usurped_lease_surfaces_lock_lost() {
    let dir = tempdir().unwrap();
    let config = test_config(
        dir.path(),
        Duration::from_millis(600),
        Duration::from_millis(200),
    );
    let ctx = SessionContext::new(config).unwrap();
    let softlock = ctx.coord.paths.softlock();

    // While the handler runs, an intruder takes the lease over directly.
    let intruder = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        fsx::atomic_write_json(
            &softlock,
            &Lease {
                owner: Some("agent:1:0:intruder".into()),
                expires_at: Some(fsx::now_secs() + 60.0),
            },
        )
        .unwrap();
    });

    let reply = exclusive::run(&ctx, noop_options("slow"), |_state| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(900)).await;
            Ok(json!({ "ran": true }))
        })
    })
    .await;
    intruder.await.unwrap();

    assert_eq!(reply["ok"], json!(false));
    assert_eq!(reply["error"], json!("lock_lost"));
}

#[tokio::test]
async fn wrapper_never_throws() {
    let dir = tempdir().unwrap();
    let ctx = SessionContext::new(default_test_config(dir.path())).unwrap();

    // Handler errors become structured replies, not panics or Err returns.
    let reply = exclusive::run(&ctx, noop_options("failing"), |_state| {
        Box::pin(async move { Err(GatewayError::Timeout("deliberate".into())) })
    })
    .await;
    assert_eq!(reply["ok"], json!(false));
    assert_eq!(reply["error"], json!("timeout"));
    assert!(reply["diagnostics"].is_object());

    // catch_unwind composes with the wrapper: nothing escapes.
    let safe = std::panic::AssertUnwindSafe(run_noop(&ctx))
        .catch_unwind()
        .await;
    assert!(safe.is_ok());
}
