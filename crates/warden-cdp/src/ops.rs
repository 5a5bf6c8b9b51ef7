//! Typed wrappers for the raw DevTools commands the gateway issues.
//!
//! Each helper builds the command payload, sends it through the driver port
//! and extracts the interesting fields, surfacing malformed responses as
//! protocol errors.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::driver::DriverOps;
use crate::errors::DriverError;
use crate::transport::CommandScope;

#[derive(Clone, Debug, Deserialize)]
pub struct TargetInfo {
    #[serde(rename = "targetId")]
    pub target_id: String,
    #[serde(rename = "type")]
    pub target_type: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub attached: bool,
}

#[derive(Debug, Deserialize)]
struct TargetInfosPayload {
    #[serde(rename = "targetInfos")]
    target_infos: Vec<TargetInfo>,
}

#[derive(Debug, Deserialize)]
struct TargetInfoPayload {
    #[serde(rename = "targetInfo")]
    target_info: TargetInfo,
}

/// Result of asking the browser for a fresh OS window.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CreatedWindow {
    #[serde(rename = "windowId", default)]
    pub window_id: Option<i64>,
    #[serde(rename = "targetId", default)]
    pub target_id: Option<String>,
}

/// Cookie shape accepted by `Network.setCookie`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CookieParam {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    #[serde(default, rename = "httpOnly", skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
}

pub async fn browser_version(driver: &dyn DriverOps) -> Result<Option<String>, DriverError> {
    let response = driver
        .command(CommandScope::Browser, "Browser.getVersion", json!({}))
        .await?;
    Ok(response
        .get("product")
        .and_then(Value::as_str)
        .map(str::to_string))
}

/// Ask the browser for a new OS-level window. Not every browser build
/// supports this command; callers fall back to [`create_target`].
pub async fn create_window(driver: &dyn DriverOps) -> Result<CreatedWindow, DriverError> {
    let response = driver
        .command(
            CommandScope::Browser,
            "Browser.createWindow",
            json!({ "state": "normal" }),
        )
        .await?;
    serde_json::from_value(response).map_err(|err| DriverError::Protocol(err.to_string()))
}

/// Create a page target, optionally in its own OS window.
pub async fn create_target(
    driver: &dyn DriverOps,
    url: &str,
    new_window: bool,
) -> Result<String, DriverError> {
    let response = driver
        .command(
            CommandScope::Browser,
            "Target.createTarget",
            json!({ "url": url, "newWindow": new_window }),
        )
        .await?;
    response
        .get("targetId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DriverError::Protocol("createTarget missing targetId".into()))
}

pub async fn window_for_target(
    driver: &dyn DriverOps,
    target_id: &str,
) -> Result<Option<i64>, DriverError> {
    let response = driver
        .command(
            CommandScope::Browser,
            "Browser.getWindowForTarget",
            json!({ "targetId": target_id }),
        )
        .await?;
    Ok(response.get("windowId").and_then(Value::as_i64))
}

/// All page targets the browser currently knows.
pub async fn page_targets(driver: &dyn DriverOps) -> Result<Vec<TargetInfo>, DriverError> {
    let response = driver
        .command(CommandScope::Browser, "Target.getTargets", json!({}))
        .await?;
    let payload: TargetInfosPayload =
        serde_json::from_value(response).map_err(|err| DriverError::Protocol(err.to_string()))?;
    Ok(payload
        .target_infos
        .into_iter()
        .filter(|info| info.target_type == "page")
        .collect())
}

pub async fn target_info(
    driver: &dyn DriverOps,
    target_id: &str,
) -> Result<Option<TargetInfo>, DriverError> {
    let result = driver
        .command(
            CommandScope::Browser,
            "Target.getTargetInfo",
            json!({ "targetId": target_id }),
        )
        .await;
    match result {
        Ok(response) => {
            let payload: TargetInfoPayload = serde_json::from_value(response)
                .map_err(|err| DriverError::Protocol(err.to_string()))?;
            Ok(Some(payload.target_info))
        }
        // The browser answers with a command-level error for unknown ids.
        Err(DriverError::Protocol(_)) | Err(DriverError::TargetNotFound(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

pub async fn activate_target(driver: &dyn DriverOps, target_id: &str) -> Result<(), DriverError> {
    driver
        .command(
            CommandScope::Browser,
            "Target.activateTarget",
            json!({ "targetId": target_id }),
        )
        .await
        .map(|_| ())
}

pub async fn close_target(driver: &dyn DriverOps, target_id: &str) -> Result<bool, DriverError> {
    let response = driver
        .command(
            CommandScope::Browser,
            "Target.closeTarget",
            json!({ "targetId": target_id }),
        )
        .await?;
    Ok(response
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(true))
}

/// Attach a flat-protocol session to a page target.
pub async fn attach_to_target(
    driver: &dyn DriverOps,
    target_id: &str,
) -> Result<String, DriverError> {
    let response = driver
        .command(
            CommandScope::Browser,
            "Target.attachToTarget",
            json!({ "targetId": target_id, "flatten": true }),
        )
        .await?;
    response
        .get("sessionId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DriverError::Protocol("attachToTarget missing sessionId".into()))
}

pub async fn navigate(driver: &dyn DriverOps, session: &str, url: &str) -> Result<(), DriverError> {
    let response = driver
        .command(
            CommandScope::Session(session.to_string()),
            "Page.navigate",
            json!({ "url": url }),
        )
        .await?;
    if let Some(text) = response.get("errorText").and_then(Value::as_str) {
        if !text.is_empty() {
            return Err(DriverError::Protocol(format!("navigation failed: {text}")));
        }
    }
    Ok(())
}

/// Evaluate a script in the page, returning the value by copy. A thrown
/// exception surfaces as a protocol error carrying the description.
pub async fn evaluate(
    driver: &dyn DriverOps,
    session: &str,
    expression: &str,
) -> Result<Value, DriverError> {
    let response = driver
        .command(
            CommandScope::Session(session.to_string()),
            "Runtime.evaluate",
            json!({
                "expression": expression,
                "returnByValue": true,
                "awaitPromise": true,
            }),
        )
        .await?;

    if let Some(details) = response.get("exceptionDetails") {
        let description = details
            .get("exception")
            .and_then(|ex| ex.get("description"))
            .and_then(Value::as_str)
            .or_else(|| details.get("text").and_then(Value::as_str))
            .unwrap_or("script exception");
        return Err(DriverError::Protocol(description.to_string()));
    }

    Ok(response
        .get("result")
        .and_then(|result| result.get("value"))
        .cloned()
        .unwrap_or(Value::Null))
}

pub async fn capture_screenshot(
    driver: &dyn DriverOps,
    session: &str,
) -> Result<Vec<u8>, DriverError> {
    let response = driver
        .command(
            CommandScope::Session(session.to_string()),
            "Page.captureScreenshot",
            json!({ "format": "png" }),
        )
        .await?;
    let data = response
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| DriverError::Protocol("captureScreenshot missing data".into()))?;
    BASE64
        .decode(data)
        .map_err(|err| DriverError::Protocol(err.to_string()))
}

pub async fn get_cookies(driver: &dyn DriverOps, session: &str) -> Result<Value, DriverError> {
    let response = driver
        .command(
            CommandScope::Session(session.to_string()),
            "Network.getCookies",
            json!({}),
        )
        .await?;
    Ok(response.get("cookies").cloned().unwrap_or(json!([])))
}

pub async fn set_cookie(
    driver: &dyn DriverOps,
    session: &str,
    cookie: &CookieParam,
) -> Result<bool, DriverError> {
    let params =
        serde_json::to_value(cookie).map_err(|err| DriverError::Protocol(err.to_string()))?;
    let response = driver
        .command(
            CommandScope::Session(session.to_string()),
            "Network.setCookie",
            params,
        )
        .await?;
    Ok(response
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(true))
}

pub async fn delete_cookies(
    driver: &dyn DriverOps,
    session: &str,
    name: &str,
    url: Option<&str>,
    domain: Option<&str>,
) -> Result<(), DriverError> {
    let mut params = json!({ "name": name });
    if let Some(url) = url {
        params["url"] = json!(url);
    }
    if let Some(domain) = domain {
        params["domain"] = json!(domain);
    }
    driver
        .command(
            CommandScope::Session(session.to_string()),
            "Network.deleteCookies",
            params,
        )
        .await
        .map(|_| ())
}

/// One named key press (down + up) dispatched to the page.
pub async fn press_key(
    driver: &dyn DriverOps,
    session: &str,
    key: &str,
    code: &str,
    vk: i64,
    text: Option<&str>,
) -> Result<(), DriverError> {
    let mut down = json!({
        "type": if text.is_some() { "keyDown" } else { "rawKeyDown" },
        "key": key,
        "code": code,
        "windowsVirtualKeyCode": vk,
        "nativeVirtualKeyCode": vk,
    });
    if let Some(text) = text {
        down["text"] = json!(text);
    }
    driver
        .command(
            CommandScope::Session(session.to_string()),
            "Input.dispatchKeyEvent",
            down,
        )
        .await?;
    driver
        .command(
            CommandScope::Session(session.to_string()),
            "Input.dispatchKeyEvent",
            json!({
                "type": "keyUp",
                "key": key,
                "code": code,
                "windowsVirtualKeyCode": vk,
                "nativeVirtualKeyCode": vk,
            }),
        )
        .await
        .map(|_| ())
}

pub async fn insert_text(
    driver: &dyn DriverOps,
    session: &str,
    text: &str,
) -> Result<(), DriverError> {
    driver
        .command(
            CommandScope::Session(session.to_string()),
            "Input.insertText",
            json!({ "text": text }),
        )
        .await
        .map(|_| ())
}
