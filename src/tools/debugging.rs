//! Introspection tools: element probing and session diagnostics.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use warden_cdp::ops;

use crate::diagnostics;
use crate::exclusive::{self, Ensure, RunOptions};
use crate::selectors::{self, SelectorKind};
use crate::session::SessionContext;
use crate::tools::page;

#[derive(Debug, Deserialize)]
pub struct DebugElementRequest {
    pub selector: String,
    #[serde(default)]
    pub selector_type: SelectorKind,
    #[serde(default)]
    pub iframe_selector: Option<String>,
}

/// Report everything the page knows about an element. Deliberately does not
/// fail when the element is missing; the report says so instead.
pub async fn debug_element(ctx: &Arc<SessionContext>, req: DebugElementRequest) -> Value {
    exclusive::run(
        ctx,
        RunOptions::new("debug_element", Ensure::DriverAndWindow),
        move |state| {
            Box::pin(async move {
                let (driver, session) = page(state)?;
                let script = selectors::probe_script(
                    req.selector_type,
                    &req.selector,
                    req.iframe_selector.as_deref(),
                );
                let report = ops::evaluate(driver.as_ref(), &session, &script).await?;
                Ok(json!({
                    "selector": req.selector,
                    "element": report,
                }))
            })
        },
    )
    .await
}

/// Session-level diagnostics without touching the browser window.
pub async fn get_diagnostics(ctx: &Arc<SessionContext>) -> Value {
    let ctx_inner = Arc::clone(ctx);
    exclusive::run(
        ctx,
        RunOptions::new("get_diagnostics", Ensure::Nothing),
        move |state| {
            Box::pin(async move {
                let diag = diagnostics::collect(&ctx_inner, state).await;
                Ok(json!({
                    "diagnostics": diag,
                    "context_state": {
                        "driver_initialized": state.is_driver_initialized(),
                        "window_ready": state.is_window_ready(),
                        "debugger": state.debugger_address(),
                        "target_id": state.target_id,
                        "window_id": state.window_id,
                        "agent_tag": ctx_inner.ensure_agent_tag(),
                    },
                }))
            })
        },
    )
    .await
}
