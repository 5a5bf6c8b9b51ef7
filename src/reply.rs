//! Reply envelope shared by every tool handler.

use serde_json::{json, Map, Value};

use crate::errors::GatewayError;

/// Successful reply: `{ok: true}` merged with handler-specific fields.
pub fn ok(body: Value) -> Value {
    let mut out = Map::new();
    out.insert("ok".into(), json!(true));
    merge(&mut out, body);
    Value::Object(out)
}

/// Failure reply: `{ok: false, error, message}` plus error-specific fields
/// and optional diagnostics.
pub fn error(err: &GatewayError, diagnostics: Option<Value>) -> Value {
    let mut out = Map::new();
    out.insert("ok".into(), json!(false));
    out.insert("error".into(), json!(err.code()));
    out.insert("message".into(), json!(err.to_string()));

    if let GatewayError::LockBusy { owner, expires_at } = err {
        out.insert("current_owner".into(), json!(owner));
        out.insert("expires_at".into(), json!(expires_at));
    }

    if let Some(diag) = diagnostics {
        out.insert("diagnostics".into(), diag);
    }

    Value::Object(out)
}

/// Attach a snapshot to an existing reply, when one was captured.
pub fn with_snapshot(mut reply: Value, snapshot: Option<Value>) -> Value {
    if let (Value::Object(map), Some(snapshot)) = (&mut reply, snapshot) {
        map.insert("snapshot".into(), snapshot);
    }
    reply
}

fn merge(out: &mut Map<String, Value>, body: Value) {
    if let Value::Object(extra) = body {
        for (key, value) in extra {
            out.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_busy_reply_is_inspectable() {
        let err = GatewayError::LockBusy {
            owner: Some("agent:42:0:dead".into()),
            expires_at: Some(1234.5),
        };
        let reply = error(&err, None);
        assert_eq!(reply["ok"], json!(false));
        assert_eq!(reply["error"], json!("lock_busy"));
        assert_eq!(reply["current_owner"], json!("agent:42:0:dead"));
        assert_eq!(reply["expires_at"], json!(1234.5));
    }

    #[test]
    fn ok_merges_body_fields() {
        let reply = ok(json!({"closed": true}));
        assert_eq!(reply["ok"], json!(true));
        assert_eq!(reply["closed"], json!(true));
    }
}
