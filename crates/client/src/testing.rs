//! Scripted in-memory transport for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use crate::error::ApiError;
use crate::transport::{HttpReply, Transport};

/// A request the session handed to the transport.
#[derive(Debug, Clone)]
pub enum Recorded {
    Json { url: String, auth: Option<String>, body: Value },
    Bytes { url: String, data: Vec<u8> },
    Get { url: String },
}

/// A scripted reply. `Rpc` replies echo the request id back.
pub enum Scripted {
    Rpc(Value),
    Raw(Result<HttpReply, ApiError>),
}

pub fn rpc_ok(result: Value) -> Scripted {
    Scripted::Rpc(json!({ "jsonrpc": "2.0", "result": result }))
}

pub fn rpc_error(code: i64, message: &str) -> Scripted {
    Scripted::Rpc(json!({ "jsonrpc": "2.0", "error": { "code": code, "message": message } }))
}

#[derive(Default)]
struct Inner {
    calls: Vec<Recorded>,
    replies: VecDeque<Scripted>,
}

#[derive(Clone, Default)]
pub struct RecordingTransport {
    inner: Arc<Mutex<Inner>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, reply: Scripted) {
        self.inner.lock().unwrap().replies.push_back(reply);
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.lock().unwrap().calls.len()
    }

    /// JSON-RPC methods in call order; ticket transfers appear as "upload"/"download".
    pub fn methods(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| match c {
                Recorded::Json { body, .. } => body["method"].as_str().unwrap_or("?").to_string(),
                Recorded::Bytes { .. } => "upload".to_string(),
                Recorded::Get { .. } => "download".to_string(),
            })
            .collect()
    }

    pub fn rpc_ids(&self) -> Vec<u64> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                Recorded::Json { body, .. } => body["id"].as_u64(),
                _ => None,
            })
            .collect()
    }

    fn next_reply(&self, request_id: Option<&Value>) -> Result<HttpReply, ApiError> {
        let scripted = self.inner.lock().unwrap().replies.pop_front();
        match scripted {
            Some(Scripted::Rpc(mut body)) => {
                if let Some(id) = request_id {
                    body["id"] = id.clone();
                }
                Ok(HttpReply {
                    status: 200,
                    headers: vec![("Content-Type".into(), "application/json".into())],
                    body: serde_json::to_vec(&body).unwrap(),
                })
            }
            Some(Scripted::Raw(reply)) => reply,
            None => Err(ApiError::Transport("no scripted reply left".into())),
        }
    }
}

impl Transport for RecordingTransport {
    fn post_json(&self, url: &str, auth_token: Option<&str>, body: &Value) -> Result<HttpReply, ApiError> {
        self.inner.lock().unwrap().calls.push(Recorded::Json {
            url: url.to_string(),
            auth: auth_token.map(String::from),
            body: body.clone(),
        });
        self.next_reply(body.get("id"))
    }

    fn post_bytes(&self, url: &str, data: Vec<u8>) -> Result<HttpReply, ApiError> {
        self.inner.lock().unwrap().calls.push(Recorded::Bytes { url: url.to_string(), data });
        self.next_reply(None)
    }

    fn get(&self, url: &str) -> Result<HttpReply, ApiError> {
        self.inner.lock().unwrap().calls.push(Recorded::Get { url: url.to_string() });
        self.next_reply(None)
    }
}
