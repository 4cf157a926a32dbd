//! Wire protocol: HTTP request bodies and the live-status socket frames
//!
//! Live socket, client → server (RPC request):
//!   { "id": "req-1", "method": "think", "params": { "message": "Hello" } }
//!
//! Server → client (RPC response):
//!   { "id": "req-1", "result": { ... } }
//!   { "id": "req-1", "error": { "code": 429, "message": "overloaded", "cause": "Overloaded" } }
//!
//! Server → client (event push, no id):
//!   { "event": "status", "data": { "active_connections": 1, ... } }

use crate::error::Error;
use crate::types::{Priority, SystemStatusSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Upper bound on message length accepted from callers.
pub const MAX_MESSAGE_CHARS: usize = 10_000;

// ---------------------------------------------------------------------------
// Client → Server: JSON-RPC style
// ---------------------------------------------------------------------------

/// RPC request from a live-socket client.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Server → Client: RPC response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn ok(id: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                cause: None,
            }),
        }
    }

    pub fn method_not_found(id: impl Into<String>, method: &str) -> Self {
        Self::err(id, -32601, format!("Method not found: {}", method))
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::err("", -32700, message)
    }

    /// Error response carrying the transport status and typed cause of `error`.
    pub fn from_error(id: impl Into<String>, error: &Error) -> Self {
        Self {
            id: id.into(),
            result: None,
            error: Some(RpcError {
                code: error.status_code() as i32,
                message: error.to_string(),
                cause: Some(error.cause().to_string()),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

// ---------------------------------------------------------------------------
// Server → Client: Event push
// ---------------------------------------------------------------------------

/// Server-pushed event (no id, no request correlation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub event: String,
    pub data: serde_json::Value,
}

impl EventMessage {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// One coalesced status change.
    pub fn status(snapshot: &SystemStatusSnapshot) -> Self {
        Self::new(
            "status",
            serde_json::to_value(snapshot).unwrap_or(serde_json::Value::Null),
        )
    }

    /// Sent once when a socket connects.
    pub fn info(version: &str) -> Self {
        Self::new("info", serde_json::json!({ "version": version }))
    }
}

// ---------------------------------------------------------------------------
// HTTP bodies
// ---------------------------------------------------------------------------

/// `POST /think`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThinkBody {
    pub message: String,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    #[serde(default)]
    pub priority: Priority,
}

impl ThinkBody {
    pub fn validate(&self) -> Result<(), Error> {
        validate_text("message", &self.message)
    }
}

/// `POST /task/queue`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskBody {
    pub task_data: serde_json::Value,
    #[serde(default)]
    pub priority: Priority,
}

impl TaskBody {
    pub fn validate(&self) -> Result<(), Error> {
        if self.task_data.is_null() {
            return Err(Error::InvalidRequest("task_data must not be null".into()));
        }
        Ok(())
    }
}

/// `POST /task/done`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskDoneBody {
    pub task_id: String,
}

/// `POST /phi3`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DirectBody {
    pub prompt: String,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl DirectBody {
    pub fn validate(&self) -> Result<(), Error> {
        validate_text("prompt", &self.prompt)
    }
}

/// `POST /speak/text`. Verdicts are accepted either as plain strings or as
/// objects carrying `content` (or `verdict`/`analysis`) and `confidence`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpeakBody {
    #[serde(default)]
    pub left_verdict: serde_json::Value,
    #[serde(default)]
    pub right_verdict: serde_json::Value,
    #[serde(default)]
    pub distilled: serde_json::Value,
}

impl SpeakBody {
    /// The caller-supplied override, if `distilled.verdict` is a non-empty string.
    pub fn distilled_override(&self) -> Option<String> {
        self.distilled
            .get("verdict")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

/// Content and stated confidence of a caller-supplied verdict. `None` when
/// the value is null or empty.
pub fn verdict_parts(value: &serde_json::Value) -> Option<(String, Option<f64>)> {
    use serde_json::Value;
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some((s.clone(), None)),
        Value::Object(map) => {
            let confidence = map.get("confidence").and_then(Value::as_f64);
            let content = ["content", "verdict", "analysis"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string());
            Some((content, confidence))
        }
        other => Some((other.to_string(), None)),
    }
}

/// `POST /connect`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectBody {
    pub platform: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Uniform error body: `{ "error": { "cause": ..., "message": ... } }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub cause: String,
    pub message: String,
    pub retryable: bool,
}

impl From<&Error> for ErrorBody {
    fn from(e: &Error) -> Self {
        Self {
            error: ErrorDetail {
                cause: e.cause().to_string(),
                message: e.to_string(),
                retryable: e.is_retryable(),
            },
        }
    }
}

fn validate_text(field: &str, text: &str) -> Result<(), Error> {
    if text.trim().is_empty() {
        return Err(Error::InvalidRequest(format!("{} must not be empty", field)));
    }
    if text.chars().count() > MAX_MESSAGE_CHARS {
        return Err(Error::InvalidRequest(format!(
            "{} exceeds {} characters",
            field, MAX_MESSAGE_CHARS
        )));
    }
    Ok(())
}
