use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::target::SessionId as CdpSessionId;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide::error::CdpError;
use chromiumoxide_types::{CallId, Message, MethodId, Response};
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::DriverError;

const COMMAND_DEADLINE: Duration = Duration::from_secs(30);

/// Scope a raw command executes in: the browser connection itself, or an
/// attached page session (flat protocol).
#[derive(Clone, Debug)]
pub enum CommandScope {
    Browser,
    Session(String),
}

#[async_trait]
pub trait CdpTransport: Send + Sync {
    async fn send(
        &self,
        scope: CommandScope,
        method: &str,
        params: Value,
    ) -> Result<Value, DriverError>;
    fn is_alive(&self) -> bool;
    async fn close(&self);
}

struct ControlMessage {
    scope: CommandScope,
    method: String,
    params: Value,
    responder: oneshot::Sender<Result<Value, DriverError>>,
}

/// Raw CDP command loop over the browser's websocket.
///
/// One task owns the connection; commands are funneled through a channel and
/// matched back to callers by `CallId`. Events from the browser are drained
/// and dropped here — the gateway polls state explicitly instead of reacting
/// to the event stream.
pub struct WsTransport {
    command_tx: mpsc::Sender<ControlMessage>,
    loop_task: JoinHandle<()>,
    alive: Arc<AtomicBool>,
}

impl WsTransport {
    pub async fn connect(ws_url: &str) -> Result<Self, DriverError> {
        let conn = Connection::<CdpEventMessage>::connect(ws_url)
            .await
            .map_err(|err| DriverError::Unreachable(err.to_string()))?;

        let (command_tx, command_rx) = mpsc::channel(64);
        let alive = Arc::new(AtomicBool::new(true));
        let loop_alive = alive.clone();

        let loop_task = tokio::spawn(async move {
            let result = Self::run_loop(conn, command_rx).await;
            loop_alive.store(false, Ordering::Relaxed);
            if let Err(err) = result {
                error!(target: "warden-cdp", %err, "transport loop terminated with error");
            }
        });

        info!(target: "warden-cdp", url = %ws_url, "cdp connection established");

        Ok(Self {
            command_tx,
            loop_task,
            alive,
        })
    }

    async fn run_loop(
        mut conn: Connection<CdpEventMessage>,
        mut command_rx: mpsc::Receiver<ControlMessage>,
    ) -> Result<(), DriverError> {
        let mut inflight: HashMap<CallId, oneshot::Sender<Result<Value, DriverError>>> =
            HashMap::new();

        loop {
            tokio::select! {
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(cmd) => Self::submit(&mut conn, cmd, &mut inflight)?,
                        // Transport handle dropped; stop the loop.
                        None => return Ok(()),
                    }
                }
                message = conn.next() => {
                    match message {
                        Some(Ok(Message::Response(resp))) => {
                            Self::resolve(resp, &mut inflight);
                        }
                        Some(Ok(Message::Event(event))) => {
                            debug!(target: "warden-cdp", ?event, "dropping unsolicited cdp event");
                        }
                        Some(Err(err)) => {
                            let mapped = map_cdp_error(err);
                            for (_, sender) in inflight.drain() {
                                let _ = sender.send(Err(mapped.clone()));
                            }
                            return Err(mapped);
                        }
                        None => {
                            let err = DriverError::CdpIo("cdp connection closed".into());
                            for (_, sender) in inflight.drain() {
                                let _ = sender.send(Err(err.clone()));
                            }
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn submit(
        conn: &mut Connection<CdpEventMessage>,
        cmd: ControlMessage,
        inflight: &mut HashMap<CallId, oneshot::Sender<Result<Value, DriverError>>>,
    ) -> Result<(), DriverError> {
        let session = match cmd.scope {
            CommandScope::Browser => None,
            CommandScope::Session(session_id) => Some(CdpSessionId::from(session_id)),
        };

        let method_id: MethodId = cmd.method.clone().into();
        match conn.submit_command(method_id, session, cmd.params) {
            Ok(call_id) => {
                inflight.insert(call_id, cmd.responder);
                Ok(())
            }
            Err(err) => {
                let mapped = map_cdp_error(CdpError::Serde(err));
                let _ = cmd.responder.send(Err(mapped.clone()));
                Err(mapped)
            }
        }
    }

    fn resolve(
        resp: Response,
        inflight: &mut HashMap<CallId, oneshot::Sender<Result<Value, DriverError>>>,
    ) {
        let result = if let Some(result) = resp.result {
            Ok(result)
        } else if let Some(error) = resp.error {
            Err(DriverError::Protocol(format!(
                "cdp error {}: {}",
                error.code, error.message
            )))
        } else {
            Err(DriverError::Protocol("empty cdp response".into()))
        };

        if let Some(sender) = inflight.remove(&resp.id) {
            let _ = sender.send(result);
        }
    }
}

#[async_trait]
impl CdpTransport for WsTransport {
    async fn send(
        &self,
        scope: CommandScope,
        method: &str,
        params: Value,
    ) -> Result<Value, DriverError> {
        if !self.is_alive() {
            return Err(DriverError::NotConnected);
        }

        let (resp_tx, resp_rx) = oneshot::channel();
        let message = ControlMessage {
            scope,
            method: method.to_string(),
            params,
            responder: resp_tx,
        };

        self.command_tx
            .send(message)
            .await
            .map_err(|err| DriverError::CdpIo(err.to_string()))?;

        match tokio::time::timeout(COMMAND_DEADLINE, resp_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(DriverError::CdpIo("command response channel closed".into())),
            Err(_) => Err(DriverError::Timeout(method.to_string())),
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    async fn close(&self) {
        self.alive.store(false, Ordering::Relaxed);
        self.loop_task.abort();
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Relaxed);
        self.loop_task.abort();
    }
}

fn map_cdp_error(err: CdpError) -> DriverError {
    let hint = err.to_string();
    match err {
        CdpError::Timeout => DriverError::Timeout(hint),
        CdpError::Ws(_) | CdpError::Io(_) | CdpError::NoResponse => DriverError::CdpIo(hint),
        CdpError::NotFound => DriverError::TargetNotFound(hint),
        _ => {
            warn!(target: "warden-cdp", %hint, "unclassified cdp error");
            DriverError::Protocol(hint)
        }
    }
}
