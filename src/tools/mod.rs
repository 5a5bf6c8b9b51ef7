//! Tool handlers exposed through the outer transport. Every handler runs
//! under the exclusive-access protocol in [`crate::exclusive`].

pub mod cookies;
pub mod debugging;
pub mod interaction;
pub mod navigation;
pub mod screenshots;
pub mod session;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use warden_cdp::DriverOps;

use crate::errors::GatewayError;
use crate::reply;
use crate::session::{SessionContext, SessionState};

/// Route one tool call to its handler. Unknown tools and malformed
/// arguments come back as structured errors, never as transport failures.
pub async fn dispatch(ctx: &Arc<SessionContext>, tool: &str, args: Value) -> Value {
    match tool {
        "start_session" => session::start_session(ctx).await,
        "close_window" => session::close_window(ctx).await,
        "force_close_all" => session::force_close_all(ctx).await,
        "unlock" => session::unlock(ctx).await,
        "navigate" => match parse(args) {
            Ok(req) => navigation::navigate(ctx, req).await,
            Err(err) => reply::error(&err, None),
        },
        "wait_for_element" => match parse(args) {
            Ok(req) => navigation::wait_for_element(ctx, req).await,
            Err(err) => reply::error(&err, None),
        },
        "scroll" => match parse(args) {
            Ok(req) => navigation::scroll(ctx, req).await,
            Err(err) => reply::error(&err, None),
        },
        "click" => match parse(args) {
            Ok(req) => interaction::click(ctx, req).await,
            Err(err) => reply::error(&err, None),
        },
        "fill" => match parse(args) {
            Ok(req) => interaction::fill(ctx, req).await,
            Err(err) => reply::error(&err, None),
        },
        "send_keys" => match parse(args) {
            Ok(req) => interaction::send_keys(ctx, req).await,
            Err(err) => reply::error(&err, None),
        },
        "take_screenshot" => match parse(args) {
            Ok(req) => screenshots::take_screenshot(ctx, req).await,
            Err(err) => reply::error(&err, None),
        },
        "get_cookies" => cookies::get_cookies(ctx).await,
        "add_cookie" => match parse(args) {
            Ok(req) => cookies::add_cookie(ctx, req).await,
            Err(err) => reply::error(&err, None),
        },
        "delete_cookie" => match parse(args) {
            Ok(req) => cookies::delete_cookie(ctx, req).await,
            Err(err) => reply::error(&err, None),
        },
        "debug_element" => match parse(args) {
            Ok(req) => debugging::debug_element(ctx, req).await,
            Err(err) => reply::error(&err, None),
        },
        "get_diagnostics" => debugging::get_diagnostics(ctx).await,
        other => reply::error(
            &GatewayError::Internal(format!("unknown tool: {other}")),
            None,
        ),
    }
}

fn parse<T: DeserializeOwned>(args: Value) -> Result<T, GatewayError> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args)
        .map_err(|err| GatewayError::Internal(format!("invalid arguments: {err}")))
}

/// Driver handle and page session of the current window; handlers that run
/// with `Ensure::DriverAndWindow` can rely on both being present.
pub(crate) fn page(state: &SessionState) -> Result<(Arc<dyn DriverOps>, String), GatewayError> {
    let driver = state
        .driver
        .clone()
        .ok_or_else(|| GatewayError::DriverNotInitialized("no driver in session".into()))?;
    let session = state
        .page_session
        .clone()
        .ok_or_else(|| GatewayError::WindowLost("no page session bound".into()))?;
    Ok((driver, session))
}
