//! Shared test fixtures: a scripted in-memory browser standing in for the
//! real DevTools endpoint, and context builders with fast timings.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use browser_warden::config::GatewayConfig;
use browser_warden::session::SessionContext;
use warden_cdp::{CommandScope, DebugEndpoint, DriverError, DriverOps};

pub const FAKE_PORT: u16 = 9225;

#[derive(Clone, Debug)]
pub struct FakeTarget {
    pub url: String,
    pub window_id: i64,
}

#[derive(Debug, Default)]
pub struct FakeBrowser {
    pub targets: HashMap<String, FakeTarget>,
    pub supports_create_window: bool,
    next_id: u64,
}

impl FakeBrowser {
    fn new_target(&mut self, url: &str, window_id: Option<i64>) -> (String, i64) {
        self.next_id += 1;
        let window_id = window_id.unwrap_or(self.next_id as i64 + 100);
        let target_id = format!("TARGET-{}", self.next_id);
        self.targets.insert(
            target_id.clone(),
            FakeTarget {
                url: url.to_string(),
                window_id,
            },
        );
        (target_id, window_id)
    }
}

/// In-memory browser that answers the DevTools commands the gateway issues.
pub struct FakeDriver {
    endpoint: DebugEndpoint,
    pub browser: Mutex<FakeBrowser>,
    pub commands: Mutex<Vec<String>>,
    connected: AtomicBool,
}

impl FakeDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            endpoint: DebugEndpoint::local(FAKE_PORT),
            browser: Mutex::new(FakeBrowser {
                supports_create_window: true,
                ..Default::default()
            }),
            commands: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        })
    }

    pub fn seed_target(&self, target_id: &str, url: &str, window_id: i64) {
        self.browser.lock().unwrap().targets.insert(
            target_id.to_string(),
            FakeTarget {
                url: url.to_string(),
                window_id,
            },
        );
    }

    pub fn drop_target(&self, target_id: &str) {
        self.browser.lock().unwrap().targets.remove(target_id);
    }

    pub fn saw_command(&self, needle: &str) -> bool {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .any(|entry| entry.contains(needle))
    }

    fn session_target(scope: &CommandScope) -> Option<String> {
        match scope {
            CommandScope::Session(session) => {
                session.strip_prefix("sess-").map(str::to_string)
            }
            CommandScope::Browser => None,
        }
    }

    fn evaluate(&self, scope: &CommandScope, expression: &str) -> Value {
        let url = Self::session_target(scope)
            .and_then(|target| {
                self.browser
                    .lock()
                    .unwrap()
                    .targets
                    .get(&target)
                    .map(|t| t.url.clone())
            })
            .unwrap_or_else(|| "about:blank".to_string());

        let value = if expression.contains("document.readyState") {
            json!("complete")
        } else if expression.contains("location.href") {
            json!(url)
        } else if expression.contains("document.title") {
            json!("Fake Page")
        } else if expression.contains("outerHTML") {
            json!("<html><body><p>fake</p></body></html>")
        } else {
            json!({ "status": "ok" })
        };
        json!({ "result": { "value": value } })
    }
}

#[async_trait]
impl DriverOps for FakeDriver {
    async fn command(
        &self,
        scope: CommandScope,
        method: &str,
        params: Value,
    ) -> Result<Value, DriverError> {
        self.commands
            .lock()
            .unwrap()
            .push(format!("{method} {params}"));

        match method {
            "Browser.getVersion" => Ok(json!({ "product": "FakeChrome/1.0" })),
            "Target.getTargets" => {
                let browser = self.browser.lock().unwrap();
                let infos: Vec<Value> = browser
                    .targets
                    .iter()
                    .map(|(id, target)| {
                        json!({
                            "targetId": id,
                            "type": "page",
                            "url": target.url,
                            "attached": true,
                        })
                    })
                    .collect();
                Ok(json!({ "targetInfos": infos }))
            }
            "Target.getTargetInfo" => {
                let target_id = params["targetId"].as_str().unwrap_or_default().to_string();
                let browser = self.browser.lock().unwrap();
                match browser.targets.get(&target_id) {
                    Some(target) => Ok(json!({
                        "targetInfo": {
                            "targetId": target_id,
                            "type": "page",
                            "url": target.url,
                            "attached": true,
                        }
                    })),
                    None => Err(DriverError::Protocol("No target with given id".into())),
                }
            }
            "Browser.createWindow" => {
                let mut browser = self.browser.lock().unwrap();
                if !browser.supports_create_window {
                    return Err(DriverError::Protocol(
                        "'Browser.createWindow' wasn't found".into(),
                    ));
                }
                let (target_id, window_id) = browser.new_target("about:blank", None);
                Ok(json!({ "windowId": window_id, "targetId": target_id }))
            }
            "Target.createTarget" => {
                let url = params["url"].as_str().unwrap_or("about:blank");
                let mut browser = self.browser.lock().unwrap();
                let (target_id, _) = browser.new_target(url, None);
                Ok(json!({ "targetId": target_id }))
            }
            "Browser.getWindowForTarget" => {
                let target_id = params["targetId"].as_str().unwrap_or_default();
                let browser = self.browser.lock().unwrap();
                match browser.targets.get(target_id) {
                    Some(target) => Ok(json!({ "windowId": target.window_id })),
                    None => Err(DriverError::Protocol("No target with given id".into())),
                }
            }
            "Target.attachToTarget" => {
                let target_id = params["targetId"].as_str().unwrap_or_default();
                let browser = self.browser.lock().unwrap();
                if browser.targets.contains_key(target_id) {
                    Ok(json!({ "sessionId": format!("sess-{target_id}") }))
                } else {
                    Err(DriverError::Protocol("No target with given id".into()))
                }
            }
            "Target.closeTarget" => {
                let target_id = params["targetId"].as_str().unwrap_or_default();
                let mut browser = self.browser.lock().unwrap();
                let existed = browser.targets.remove(target_id).is_some();
                Ok(json!({ "success": existed }))
            }
            "Page.navigate" => {
                let url = params["url"].as_str().unwrap_or_default().to_string();
                if let Some(target) = Self::session_target(&scope) {
                    if let Some(entry) = self.browser.lock().unwrap().targets.get_mut(&target) {
                        entry.url = url;
                    }
                }
                Ok(json!({}))
            }
            "Runtime.evaluate" => {
                let expression = params["expression"].as_str().unwrap_or_default();
                Ok(self.evaluate(&scope, expression))
            }
            "Page.captureScreenshot" => Ok(json!({ "data": "aGVsbG8=" })),
            "Network.getCookies" => Ok(json!({ "cookies": [] })),
            _ => Ok(json!({})),
        }
    }

    fn endpoint(&self) -> &DebugEndpoint {
        &self.endpoint
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn quit(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }
}

/// Config pointing at a per-test temp dir, with millisecond-scale lock
/// timings so contention scenarios run fast.
pub fn test_config(dir: &Path, ttl: Duration, wait: Duration) -> GatewayConfig {
    GatewayConfig {
        user_data_dir: dir.join("profile"),
        profile_name: "Default".into(),
        browser_path: None,
        fixed_port: None,
        attach_any: false,
        coord_dir: dir.join("locks"),
        action_lock_ttl: ttl,
        action_lock_wait: wait,
        file_mutex_stale: Duration::from_secs(60),
        registry_stale: Duration::from_secs(300),
        rendezvous_ttl: Duration::from_secs(86_400),
        snapshot_max_chars: 10_000,
        strict_profile: false,
        headless: true,
    }
}

pub fn default_test_config(dir: &Path) -> GatewayConfig {
    test_config(dir, Duration::from_secs(30), Duration::from_millis(500))
}

/// Context with a fake driver already attached, as if the startup arbiter
/// had run.
pub async fn context_with_driver(config: GatewayConfig) -> (Arc<SessionContext>, Arc<FakeDriver>) {
    let ctx = SessionContext::new(config).expect("context builds");
    let driver = FakeDriver::new();
    {
        let mut state = ctx.lock_state().await;
        state.driver = Some(driver.clone());
        state.endpoint = Some(DebugEndpoint::local(FAKE_PORT));
    }
    (ctx, driver)
}
