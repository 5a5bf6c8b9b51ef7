//! Window lifecycle against the fake browser: creation, validation,
//! orphan cleanup and the strict own-window blank sweep.

mod support;

use serde_json::json;
use tempfile::tempdir;

use browser_warden::tools;
use warden_cdp::DriverOps;
use warden_coord::fsx;

use support::{context_with_driver, default_test_config};

#[tokio::test]
async fn start_session_creates_and_registers_a_window() {
    let dir = tempdir().unwrap();
    let (ctx, driver) = context_with_driver(default_test_config(dir.path())).await;

    let reply = tools::session::start_session(&ctx).await;
    assert_eq!(reply["ok"], json!(true), "reply: {reply}");
    assert_eq!(reply["lock_ttl_seconds"], json!(30));
    assert_eq!(reply["debugger"], json!("127.0.0.1:9225"));

    let session_id = reply["session_id"].as_str().unwrap().to_string();
    assert!(session_id.starts_with(&format!("agent:{}:", std::process::id())));

    // Snapshot came from the fake page.
    assert_eq!(reply["snapshot"]["title"], json!("Fake Page"));

    // Registry has exactly our entry, pointing at a real target.
    let entries = ctx.coord.registry.entries();
    assert_eq!(entries.len(), 1);
    let entry = entries.get(&session_id).unwrap();
    assert_eq!(entry.pid, std::process::id());
    assert!(driver
        .browser
        .lock()
        .unwrap()
        .targets
        .contains_key(&entry.target_id));

    // Softlock holds our (expiring) lease.
    let lease = ctx.coord.lock.peek();
    assert_eq!(lease.owner.as_deref(), Some(session_id.as_str()));
    assert!(lease.expires_at.unwrap() > fsx::now_secs());
}

#[tokio::test]
async fn orphaned_windows_are_cleaned_before_creation() {
    let dir = tempdir().unwrap();
    let (ctx, driver) = context_with_driver(default_test_config(dir.path())).await;

    // A dead process left a window behind, in the browser and the registry.
    driver.seed_target("FAKE-ORPHAN", "about:blank", 1);
    let registry_path = ctx.coord.paths.window_registry();
    fsx::atomic_write_json(
        &registry_path,
        &json!({
            "agent:99999:0:deadbeef": {
                "target_id": "FAKE-ORPHAN",
                "window_id": 1,
                "pid": 99999,
                "created_at": 0.0,
                "last_heartbeat": 0.0,
            }
        }),
    )
    .unwrap();

    let reply = tools::session::start_session(&ctx).await;
    assert_eq!(reply["ok"], json!(true), "reply: {reply}");

    // The orphan entry is gone and its target was closed.
    let entries = ctx.coord.registry.entries();
    assert_eq!(entries.len(), 1);
    assert!(!entries.contains_key("agent:99999:0:deadbeef"));
    assert!(!driver.browser.lock().unwrap().targets.contains_key("FAKE-ORPHAN"));
    assert!(driver.saw_command("Target.closeTarget"));
}

#[tokio::test]
async fn close_window_unregisters_and_keeps_driver() {
    let dir = tempdir().unwrap();
    let (ctx, driver) = context_with_driver(default_test_config(dir.path())).await;

    let started = tools::session::start_session(&ctx).await;
    assert_eq!(started["ok"], json!(true));
    assert_eq!(ctx.coord.registry.len(), 1);

    let closed = tools::session::close_window(&ctx).await;
    assert_eq!(closed["ok"], json!(true));
    assert_eq!(closed["closed"], json!(true));

    // Registry is empty, window state reset, driver still attached.
    assert!(ctx.coord.registry.is_empty());
    {
        let state = ctx.lock_state().await;
        assert!(state.target_id.is_none());
        assert!(state.window_id.is_none());
        assert!(state.is_driver_initialized());
    }
    assert!(driver.is_connected());

    // Closing again is a clean no-op.
    let again = tools::session::close_window(&ctx).await;
    assert_eq!(again["closed"], json!(false));
}

#[tokio::test]
async fn vanished_target_is_recreated_on_next_call() {
    let dir = tempdir().unwrap();
    let (ctx, driver) = context_with_driver(default_test_config(dir.path())).await;

    assert_eq!(tools::session::start_session(&ctx).await["ok"], json!(true));
    let first_target = {
        let state = ctx.lock_state().await;
        state.target_id.clone().unwrap()
    };

    // Someone closed our window behind our back.
    driver.drop_target(&first_target);

    let reply = tools::navigation::navigate(
        &ctx,
        serde_json::from_value(json!({ "url": "https://example.com" })).unwrap(),
    )
    .await;
    assert_eq!(reply["ok"], json!(true), "reply: {reply}");

    let state = ctx.lock_state().await;
    let second_target = state.target_id.clone().unwrap();
    assert_ne!(first_target, second_target);
    assert_eq!(
        driver
            .browser
            .lock()
            .unwrap()
            .targets
            .get(&second_target)
            .unwrap()
            .url,
        "https://example.com"
    );
}

#[tokio::test]
async fn pruned_registry_entry_forces_recreation() {
    let dir = tempdir().unwrap();
    let (ctx, _driver) = context_with_driver(default_test_config(dir.path())).await;

    assert_eq!(tools::session::start_session(&ctx).await["ok"], json!(true));
    let first_target = {
        let state = ctx.lock_state().await;
        state.target_id.clone().unwrap()
    };

    // Another process pruned our claim; the window no longer counts as ours
    // even though the browser still has the target.
    ctx.coord.registry.unregister(ctx.ensure_agent_tag());

    assert_eq!(tools::session::start_session(&ctx).await["ok"], json!(true));
    let state = ctx.lock_state().await;
    assert_ne!(state.target_id.clone().unwrap(), first_target);
    assert_eq!(ctx.coord.registry.len(), 1);
}

#[tokio::test]
async fn blank_sweep_never_touches_other_windows() {
    let dir = tempdir().unwrap();
    let (ctx, driver) = context_with_driver(default_test_config(dir.path())).await;

    assert_eq!(tools::session::start_session(&ctx).await["ok"], json!(true));
    let own_window = {
        let state = ctx.lock_state().await;
        state.window_id.unwrap()
    };

    // A blank tab in our window, and a blank window owned by another agent.
    driver.seed_target("OWN-BLANK", "about:blank", own_window);
    driver.seed_target("FOREIGN-BLANK", "about:blank", own_window + 50);

    let reply = tools::session::start_session(&ctx).await;
    assert_eq!(reply["ok"], json!(true));

    let browser = driver.browser.lock().unwrap();
    assert!(
        !browser.targets.contains_key("OWN-BLANK"),
        "blank tab in our own window should be swept"
    );
    assert!(
        browser.targets.contains_key("FOREIGN-BLANK"),
        "another agent's window must never be touched"
    );
}
