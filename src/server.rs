//! Newline-delimited JSON transport over stdio.
//!
//! One request per line: `{"id": …, "tool": "...", "args": {…}}`. The reply
//! is the tool envelope with the request id echoed back. Transport problems
//! (unreadable line, missing tool) come back as envelopes too; the loop
//! itself only ends at EOF.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::errors::GatewayError;
use crate::reply;
use crate::session::SessionContext;
use crate::tools;

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Option<Value>,
    tool: String,
    #[serde(default)]
    args: Value,
}

/// Serve tool calls until stdin closes.
///
/// `context` carries the config-resolution result: with an invalid
/// configuration the server still answers every call with a `config_error`
/// envelope, before any lock is touched.
pub async fn serve(context: Result<Arc<SessionContext>, GatewayError>) -> std::io::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    info!(target: "warden", "gateway serving on stdio");

    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        let response = handle_line(&context, &line).await;
        let mut body = serde_json::to_vec(&response).unwrap_or_else(|_| b"{}".to_vec());
        body.push(b'\n');
        stdout.write_all(&body).await?;
        stdout.flush().await?;
    }

    info!(target: "warden", "stdin closed; gateway exiting");
    Ok(())
}

async fn handle_line(context: &Result<Arc<SessionContext>, GatewayError>, line: &str) -> Value {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(err) => {
            debug!(target: "warden", %err, "unparseable request line");
            return reply::error(
                &GatewayError::Internal(format!("unparseable request: {err}")),
                None,
            );
        }
    };

    let mut response = match context {
        Ok(ctx) => tools::dispatch(ctx, &request.tool, request.args).await,
        Err(err) => reply::error(&GatewayError::Config(err.to_string()), None),
    };

    if let (Value::Object(map), Some(id)) = (&mut response, request.id) {
        map.insert("id".into(), id);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_config_answers_config_error() {
        let context = Err(GatewayError::Config("WARDEN_USER_DATA_DIR is required".into()));
        let response =
            handle_line(&context, r#"{"id": 7, "tool": "navigate", "args": {"url": "x"}}"#).await;
        assert_eq!(response["ok"], json!(false));
        assert_eq!(response["error"], json!("config_error"));
        assert_eq!(response["id"], json!(7));
    }

    #[tokio::test]
    async fn garbage_lines_get_structured_errors() {
        let context = Err(GatewayError::Config("irrelevant".into()));
        let response = handle_line(&context, "not json").await;
        assert_eq!(response["ok"], json!(false));
        assert_eq!(response["error"], json!("internal_error"));
    }
}
