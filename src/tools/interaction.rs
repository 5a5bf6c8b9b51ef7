//! Element interaction: click, fill, keyboard.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{json, Value};
use warden_cdp::ops;

use crate::errors::GatewayError;
use crate::exclusive::{self, Ensure, RunOptions};
use crate::keys;
use crate::selectors::{self, SelectorKind};
use crate::session::SessionContext;
use crate::tools::page;

const RETRY_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Deserialize)]
pub struct ClickRequest {
    pub selector: String,
    #[serde(default)]
    pub selector_type: SelectorKind,
    #[serde(default = "default_timeout")]
    pub timeout_sec: u64,
    #[serde(default)]
    pub iframe_selector: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FillRequest {
    pub selector: String,
    pub text: String,
    #[serde(default)]
    pub selector_type: SelectorKind,
    #[serde(default = "default_clear_first")]
    pub clear_first: bool,
    #[serde(default = "default_timeout")]
    pub timeout_sec: u64,
    #[serde(default)]
    pub iframe_selector: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendKeysRequest {
    pub key: String,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub selector_type: SelectorKind,
}

fn default_timeout() -> u64 {
    10
}

fn default_clear_first() -> bool {
    true
}

pub async fn click(ctx: &Arc<SessionContext>, req: ClickRequest) -> Value {
    exclusive::run(
        ctx,
        RunOptions::new("click", Ensure::DriverAndWindow).with_snapshot(),
        move |state| {
            Box::pin(async move {
                let (driver, session) = page(state)?;
                let script = selectors::click_script(
                    req.selector_type,
                    &req.selector,
                    req.iframe_selector.as_deref(),
                );
                run_with_retry(
                    driver.as_ref(),
                    &session,
                    &script,
                    &req.selector,
                    Duration::from_secs(req.timeout_sec),
                )
                .await?;
                Ok(json!({ "action": "click", "selector": req.selector }))
            })
        },
    )
    .await
}

pub async fn fill(ctx: &Arc<SessionContext>, req: FillRequest) -> Value {
    exclusive::run(
        ctx,
        RunOptions::new("fill", Ensure::DriverAndWindow).with_snapshot(),
        move |state| {
            Box::pin(async move {
                let (driver, session) = page(state)?;
                let script = selectors::fill_script(
                    req.selector_type,
                    &req.selector,
                    req.iframe_selector.as_deref(),
                    &req.text,
                    req.clear_first,
                );
                run_with_retry(
                    driver.as_ref(),
                    &session,
                    &script,
                    &req.selector,
                    Duration::from_secs(req.timeout_sec),
                )
                .await?;
                Ok(json!({ "action": "fill", "selector": req.selector }))
            })
        },
    )
    .await
}

pub async fn send_keys(ctx: &Arc<SessionContext>, req: SendKeysRequest) -> Value {
    exclusive::run(
        ctx,
        RunOptions::new("send_keys", Ensure::DriverAndWindow),
        move |state| {
            Box::pin(async move {
                let (driver, session) = page(state)?;

                if let Some(selector) = &req.selector {
                    let script = selectors::focus_script(req.selector_type, selector);
                    let result = ops::evaluate(driver.as_ref(), &session, &script).await?;
                    selectors::status_to_result(&result, selector)?;
                }

                match keys::named_key(&req.key) {
                    Some(spec) => {
                        ops::press_key(
                            driver.as_ref(),
                            &session,
                            spec.key,
                            spec.code,
                            spec.vk,
                            spec.text,
                        )
                        .await?
                    }
                    None => ops::insert_text(driver.as_ref(), &session, &req.key).await?,
                }

                Ok(json!({ "action": "send_keys", "key": req.key, "selector": req.selector }))
            })
        },
    )
    .await
}

/// Run a locator action script until it succeeds or the deadline passes.
/// Transient misses (element not yet in the DOM, still hidden) are retried;
/// the last status decides the error.
async fn run_with_retry(
    driver: &dyn warden_cdp::DriverOps,
    session: &str,
    script: &str,
    selector: &str,
    timeout: Duration,
) -> Result<(), GatewayError> {
    let deadline = Instant::now() + timeout;
    loop {
        let result = ops::evaluate(driver, session, script).await?;
        match selectors::status_to_result(&result, selector) {
            Ok(()) => return Ok(()),
            Err(err) => {
                if Instant::now() >= deadline {
                    return Err(err);
                }
            }
        }
        tokio::time::sleep(RETRY_POLL).await;
    }
}
