//! Navigation, readiness waits and scrolling.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use warden_cdp::{ops, DriverOps};

use crate::errors::GatewayError;
use crate::exclusive::{self, Ensure, RunOptions};
use crate::selectors::{self, SelectorKind};
use crate::session::SessionContext;
use crate::tools::page;

const READY_POLL: Duration = Duration::from_millis(100);
const ELEMENT_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub url: String,
    #[serde(default = "default_wait_for")]
    pub wait_for: String,
    #[serde(default = "default_nav_timeout")]
    pub timeout_sec: u64,
}

fn default_wait_for() -> String {
    "load".into()
}

fn default_nav_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize)]
pub struct WaitForElementRequest {
    pub selector: String,
    #[serde(default)]
    pub selector_type: SelectorKind,
    #[serde(default = "default_element_timeout")]
    pub timeout_sec: u64,
    #[serde(default)]
    pub iframe_selector: Option<String>,
}

fn default_element_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct ScrollRequest {
    #[serde(default)]
    pub x: i64,
    #[serde(default)]
    pub y: i64,
}

pub async fn navigate(ctx: &Arc<SessionContext>, req: NavigateRequest) -> Value {
    exclusive::run(
        ctx,
        RunOptions::new("navigate", Ensure::DriverAndWindow).with_snapshot(),
        move |state| {
            Box::pin(async move {
                let (driver, session) = page(state)?;
                ops::navigate(driver.as_ref(), &session, &req.url).await?;
                wait_document_ready(
                    driver.as_ref(),
                    &session,
                    &req.wait_for,
                    Duration::from_secs(req.timeout_sec.min(60)),
                )
                .await;
                Ok(json!({ "action": "navigate", "url": req.url }))
            })
        },
    )
    .await
}

pub async fn wait_for_element(ctx: &Arc<SessionContext>, req: WaitForElementRequest) -> Value {
    exclusive::run(
        ctx,
        RunOptions::new("wait_for_element", Ensure::DriverAndWindow),
        move |state| {
            Box::pin(async move {
                let (driver, session) = page(state)?;
                let script = selectors::probe_script(
                    req.selector_type,
                    &req.selector,
                    req.iframe_selector.as_deref(),
                );
                let deadline = Instant::now() + Duration::from_secs(req.timeout_sec);
                loop {
                    let probe = ops::evaluate(driver.as_ref(), &session, &script).await?;
                    let present = probe.get("status").and_then(Value::as_str) == Some("found");
                    let visible = probe.get("visible").and_then(Value::as_bool).unwrap_or(false);
                    if present && visible {
                        return Ok(json!({ "found": true, "selector": req.selector }));
                    }
                    if Instant::now() >= deadline {
                        return Err(GatewayError::Timeout(format!(
                            "element {} did not appear within {}s",
                            req.selector, req.timeout_sec
                        )));
                    }
                    tokio::time::sleep(ELEMENT_POLL).await;
                }
            })
        },
    )
    .await
}

pub async fn scroll(ctx: &Arc<SessionContext>, req: ScrollRequest) -> Value {
    exclusive::run(
        ctx,
        RunOptions::new("scroll", Ensure::DriverAndWindow),
        move |state| {
            Box::pin(async move {
                let (driver, session) = page(state)?;
                let script = format!("window.scrollBy({}, {});", req.x, req.y);
                ops::evaluate(driver.as_ref(), &session, &script).await?;
                Ok(json!({ "action": "scroll", "x": req.x, "y": req.y }))
            })
        },
    )
    .await
}

/// Poll `document.readyState` until the requested phase or the deadline.
/// Not fatal on timeout; the snapshot shows whatever state the page is in.
pub(crate) async fn wait_document_ready(
    driver: &dyn DriverOps,
    session: &str,
    wait_for: &str,
    timeout: Duration,
) {
    let want_complete = !wait_for.eq_ignore_ascii_case("domcontentloaded");
    let deadline = Instant::now() + timeout;
    loop {
        let ready = ops::evaluate(driver, session, "document.readyState")
            .await
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .map(|s| {
                if want_complete {
                    s == "complete"
                } else {
                    s == "interactive" || s == "complete"
                }
            })
            .unwrap_or(false);
        if ready {
            return;
        }
        if Instant::now() >= deadline {
            debug!(target: "warden", wait_for, "document readiness wait timed out");
            return;
        }
        tokio::time::sleep(READY_POLL).await;
    }
}
