//! Blocking JSON-RPC 2.0 client over HTTP.
//!
//! Every call is a `POST` of `{"jsonrpc":"2.0","id":n,"method":..,"params":..}`
//! to a single endpoint. The client implements [`RemoteProcedure`], so the
//! dispatcher runs it directly on its worker threads.

use rpcpulse_core::{RemoteError, RemoteProcedure};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

/// Longest slice of an error body quoted back in a [`RemoteError`].
const MAX_BODY_EXCERPT: usize = 256;

/// Errors building the client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Request envelope.
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: &'a Value,
}

impl<'a> JsonRpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: &'a Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// `error` member of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Turn an HTTP status and body into the call's `result`, or a protocol error.
pub fn parse_response(status: u16, body: &str) -> Result<Value, RemoteError> {
    if !(200..300).contains(&status) {
        return Err(RemoteError::Protocol(format!(
            "HTTP status {}: {}",
            status,
            excerpt(body)
        )));
    }

    let envelope: Value = serde_json::from_str(body)
        .map_err(|e| RemoteError::Protocol(format!("invalid JSON body: {}", e)))?;
    let object = envelope
        .as_object()
        .ok_or_else(|| RemoteError::Protocol("response is not a JSON object".to_string()))?;

    if let Some(error) = object.get("error").filter(|e| !e.is_null()) {
        let error: JsonRpcErrorObject = serde_json::from_value(error.clone())
            .map_err(|e| RemoteError::Protocol(format!("malformed error object: {}", e)))?;
        return Err(RemoteError::Protocol(format!(
            "JSON-RPC error {}: {}",
            error.code, error.message
        )));
    }

    object
        .get("result")
        .cloned()
        .ok_or_else(|| RemoteError::Protocol("response has neither result nor error".to_string()))
}

fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(MAX_BODY_EXCERPT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// JSON-RPC client bound to one endpoint.
pub struct JsonRpcClient {
    endpoint: String,
    http: reqwest::blocking::Client,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    /// Create a client; `timeout` bounds each request end to end.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("rpcpulse/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            endpoint: endpoint.into(),
            http,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Perform one call and return its `result` member.
    pub fn call(&self, method: &str, params: &Value) -> Result<Value, RemoteError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| RemoteError::Transport(format!("failed to read body: {}", e)))?;
        trace!(id, method, status, bytes = body.len(), "JSON-RPC response");

        parse_response(status, &body)
    }

    /// Whether the node answers `getHealth` successfully.
    pub fn check_health(&self) -> bool {
        self.call("getHealth", &Value::Null).is_ok()
    }
}

impl RemoteProcedure for JsonRpcClient {
    fn invoke(&self, method: &str, params: &Value) -> Result<Value, RemoteError> {
        self.call(method, params)
    }
}
