//! Cookie operations on the shared profile.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use warden_cdp::ops::{self, CookieParam};

use crate::exclusive::{self, Ensure, RunOptions};
use crate::session::SessionContext;
use crate::tools::page;

#[derive(Debug, Deserialize)]
pub struct DeleteCookieRequest {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
}

pub async fn get_cookies(ctx: &Arc<SessionContext>) -> Value {
    exclusive::run(
        ctx,
        RunOptions::new("get_cookies", Ensure::DriverAndWindow),
        move |state| {
            Box::pin(async move {
                let (driver, session) = page(state)?;
                let cookies = ops::get_cookies(driver.as_ref(), &session).await?;
                Ok(json!({ "cookies": cookies }))
            })
        },
    )
    .await
}

pub async fn add_cookie(ctx: &Arc<SessionContext>, req: CookieParam) -> Value {
    exclusive::run(
        ctx,
        RunOptions::new("add_cookie", Ensure::DriverAndWindow),
        move |state| {
            Box::pin(async move {
                let (driver, session) = page(state)?;
                let accepted = ops::set_cookie(driver.as_ref(), &session, &req).await?;
                Ok(json!({ "action": "add_cookie", "name": req.name, "accepted": accepted }))
            })
        },
    )
    .await
}

pub async fn delete_cookie(ctx: &Arc<SessionContext>, req: DeleteCookieRequest) -> Value {
    exclusive::run(
        ctx,
        RunOptions::new("delete_cookie", Ensure::DriverAndWindow),
        move |state| {
            Box::pin(async move {
                let (driver, session) = page(state)?;
                ops::delete_cookies(
                    driver.as_ref(),
                    &session,
                    &req.name,
                    req.url.as_deref(),
                    req.domain.as_deref(),
                )
                .await?;
                Ok(json!({ "action": "delete_cookie", "name": req.name }))
            })
        },
    )
    .await
}
