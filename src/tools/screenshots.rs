//! Screenshot capture.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use warden_cdp::ops;

use crate::errors::GatewayError;
use crate::exclusive::{self, Ensure, RunOptions};
use crate::session::SessionContext;
use crate::tools::page;

#[derive(Debug, Deserialize)]
pub struct TakeScreenshotRequest {
    #[serde(default)]
    pub return_base64: bool,
    #[serde(default)]
    pub path: Option<String>,
}

pub async fn take_screenshot(ctx: &Arc<SessionContext>, req: TakeScreenshotRequest) -> Value {
    exclusive::run(
        ctx,
        RunOptions::new("take_screenshot", Ensure::DriverAndWindow),
        move |state| {
            Box::pin(async move {
                let (driver, session) = page(state)?;
                let png = ops::capture_screenshot(driver.as_ref(), &session).await?;

                if let Some(path) = &req.path {
                    tokio::fs::write(path, &png).await.map_err(|err| {
                        GatewayError::Io(format!("could not write screenshot to {path}: {err}"))
                    })?;
                    let mut body = json!({ "action": "take_screenshot", "path": path });
                    if req.return_base64 {
                        body["image_base64"] = json!(BASE64.encode(&png));
                    }
                    return Ok(body);
                }

                Ok(json!({
                    "action": "take_screenshot",
                    "image_base64": BASE64.encode(&png),
                }))
            })
        },
    )
    .await
}
