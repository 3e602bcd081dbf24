//! `system.multicall` batching
//!
//! A tuple of typed requests becomes one multicall. The engine answers with
//! one slot per call, in order: a one-element array holding the result, or
//! a fault object.

use serde_json::{json, Value};

use super::channel::decode_result;
use super::message::RpcErrorObject;
use super::params::{encode_params, RpcParams};
use crate::error::{EngineError, Result};

/// A fixed-size group of heterogeneous requests
pub trait BatchCall: Send + Sync {
    /// Tuple of the individual responses
    type Output: Send;

    /// Whether any call in the group closes the connection
    const SHUTS_DOWN: bool;

    /// `{"methodName", "params"}` entries, each with its own token
    fn encode_calls(&self, namespace: &str, secret: &str) -> Result<Vec<Value>>;

    fn decode_results(namespace: &str, slots: Vec<Value>) -> Result<Self::Output>;

    /// Whether a shutdown-class call in the group succeeded, whatever
    /// happened to the other slots
    fn shut_down_by(slots: &[Value]) -> bool;
}

fn multicall_entry<P: RpcParams>(params: &P, namespace: &str, secret: &str) -> Result<Value> {
    Ok(json!({
        "methodName": P::method_name(namespace),
        "params": encode_params(params, secret)?,
    }))
}

fn decode_slot<P: RpcParams>(namespace: &str, slot: Option<Value>) -> Result<P::Response> {
    let method = P::method_name(namespace);
    match slot {
        Some(Value::Array(mut items)) if items.len() == 1 => decode_result(&method, items.remove(0)),
        Some(Value::Object(fault)) if fault.contains_key("code") => {
            let fault: RpcErrorObject = decode_result(&method, Value::Object(fault))?;
            Err(EngineError::protocol_error(fault.code, fault.message))
        }
        Some(other) => Err(EngineError::transport_error(format!(
            "Unexpected multicall slot for {}: {}",
            method, other
        ))),
        None => Err(EngineError::transport_error(format!("Missing multicall slot for {}", method))),
    }
}

macro_rules! impl_batch_call {
    ($($idx:tt $T:ident),+) => {
        impl<$($T: RpcParams),+> BatchCall for ($($T,)+) {
            type Output = ($($T::Response,)+);

            const SHUTS_DOWN: bool = false $(|| $T::SHUTS_DOWN)+;

            fn encode_calls(&self, namespace: &str, secret: &str) -> Result<Vec<Value>> {
                Ok(vec![$(multicall_entry(&self.$idx, namespace, secret)?),+])
            }

            fn decode_results(namespace: &str, slots: Vec<Value>) -> Result<Self::Output> {
                let expected = [$(stringify!($T)),+].len();
                if slots.len() != expected {
                    return Err(EngineError::transport_error(format!(
                        "Multicall returned {} results for {} calls",
                        slots.len(),
                        expected
                    )));
                }
                let mut slots = slots.into_iter();
                Ok(($(decode_slot::<$T>(namespace, slots.next())?,)+))
            }

            fn shut_down_by(slots: &[Value]) -> bool {
                [$($T::SHUTS_DOWN),+]
                    .iter()
                    .zip(slots)
                    .any(|(shuts_down, slot)| *shuts_down && slot.is_array())
            }
        }
    };
}

impl_batch_call!(0 A);
impl_batch_call!(0 A, 1 B);
impl_batch_call!(0 A, 1 B, 2 C);
impl_batch_call!(0 A, 1 B, 2 C, 3 D);
impl_batch_call!(0 A, 1 B, 2 C, 3 D, 4 E);
impl_batch_call!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F);
impl_batch_call!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G);
impl_batch_call!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H);
