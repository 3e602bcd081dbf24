//! In-process engine stand-in for tests

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

use super::transport::Transport;
use crate::error::{EngineError, Result};

/// What the mock engine answers to one request
pub enum MockReply {
    /// Success envelope with the request's id
    Result(Value),
    /// Error envelope with the request's id
    Fault(i64, String),
    /// Envelope sent verbatim
    Raw(Value),
    /// Body bytes sent verbatim
    Bytes(Vec<u8>),
    /// Transport-level failure
    Fail(EngineError),
}

type Handler = dyn Fn(&str, &[Value]) -> MockReply + Send + Sync;

/// Records every request and answers through a handler
pub struct MockTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<Value>>,
}

impl MockTransport {
    /// The handler receives the method name and positional params
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&str, &[Value]) -> MockReply + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Every request body received so far
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().clone()
    }

    /// Method names received so far, in order
    pub fn methods(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|r| r["method"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post(&self, body: Vec<u8>) -> Result<Vec<u8>> {
        let request: Value = serde_json::from_slice(&body)?;
        self.requests.lock().push(request.clone());

        let method = request["method"].as_str().unwrap_or_default();
        let params = request["params"].as_array().cloned().unwrap_or_default();
        let id = request["id"].clone();

        let envelope = match (self.handler)(method, &params) {
            MockReply::Result(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
            MockReply::Fault(code, message) => {
                json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
            }
            MockReply::Raw(envelope) => envelope,
            MockReply::Bytes(bytes) => return Ok(bytes),
            MockReply::Fail(err) => return Err(err),
        };

        Ok(serde_json::to_vec(&envelope)?)
    }

    fn endpoint(&self) -> String {
        "mock://engine/jsonrpc".to_string()
    }
}
