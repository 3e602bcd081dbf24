//! Request/response correlation
//!
//! An [`RpcChannel`] turns typed requests into JSON-RPC envelopes, sends
//! them over a [`Transport`] and checks that the answer belongs to the
//! request it was sent for.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use super::batch::BatchCall;
use super::message::{id_text, JsonRpcRequest, JsonRpcResponse};
use super::params::{encode_params, RpcParams};
use super::transport::Transport;
use crate::error::{EngineError, Result};

/// Default method namespace
pub const DEFAULT_NAMESPACE: &str = "aria2";

const MULTICALL: &str = "system.multicall";

/// One logical connection to an engine
pub struct RpcChannel {
    transport: Arc<dyn Transport>,
    secret: String,
    namespace: String,
    next_id: AtomicU64,
}

impl RpcChannel {
    pub fn new(transport: Arc<dyn Transport>, secret: impl Into<String>) -> Self {
        Self::with_namespace(transport, secret, DEFAULT_NAMESPACE)
    }

    /// Use a method namespace other than `aria2`
    pub fn with_namespace(
        transport: Arc<dyn Transport>,
        secret: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        // Random start so ids from a previous session are unlikely to match
        let seed = rand::random::<u32>() as u64;
        Self {
            transport,
            secret: secret.into(),
            namespace: namespace.into(),
            next_id: AtomicU64::new(seed),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn endpoint(&self) -> String {
        self.transport.endpoint()
    }

    fn next_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Send one typed request
    pub async fn call<P: RpcParams>(&self, params: &P) -> Result<P::Response> {
        let values = encode_params(params, &self.secret)?;
        let method = P::method_name(&self.namespace);
        let result = self.call_raw(&method, values).await?;
        decode_result(&method, result)
    }

    /// Send a `system.multicall` for a tuple of typed requests and return
    /// its undecoded slots
    pub async fn multicall<B: BatchCall>(&self, batch: &B) -> Result<Vec<Value>> {
        let calls = batch.encode_calls(&self.namespace, &self.secret)?;
        let result = self.call_raw(MULTICALL, vec![Value::Array(calls)]).await?;
        decode_result(MULTICALL, result)
    }

    /// Send an already-encoded positional parameter list
    pub async fn call_raw(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let id = self.next_id();
        let request = JsonRpcRequest::new(id.clone(), method, params);
        let body = serde_json::to_vec(&request)?;
        debug!("-> {} (id {})", method, id);

        let raw = self.transport.post(body).await?;
        let response: JsonRpcResponse = serde_json::from_slice(&raw).map_err(|e| {
            EngineError::transport_error_full("Malformed JSON-RPC response", self.transport.endpoint(), e.to_string())
        })?;

        let actual = id_text(&response.id);
        if actual != id {
            if let Some(error) = &response.error {
                debug!("<- uncorrelated error for {}: {} {}", method, error.code, error.message);
            }
            return Err(EngineError::correlation_error(id, actual));
        }

        if let Some(error) = response.error {
            debug!("<- {} failed: {} {}", method, error.code, error.message);
            return Err(EngineError::protocol_error(error.code, error.message));
        }

        trace!("<- {} (id {})", method, id);
        response
            .result
            .ok_or_else(|| EngineError::transport_error(format!("Response to {} has neither result nor error", method)))
    }
}

impl fmt::Debug for RpcChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcChannel")
            .field("endpoint", &self.transport.endpoint())
            .field("namespace", &self.namespace)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Decode a `result` value into the method's response type
pub(crate) fn decode_result<T: DeserializeOwned>(method: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| {
        EngineError::transport_error_with_source(format!("Unexpected result for {}", method), e.to_string())
    })
}
