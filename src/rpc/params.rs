//! Positional parameter encoding
//!
//! Every request type lists its fields in declaration order through
//! [`RpcParams::encode`]. Absent optional fields are left out of the array
//! entirely; a present field after an absent one would shift every later slot,
//! so [`ParamWriter`] rejects it before anything is sent.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{EngineError, Result};

/// A typed request: method, positional layout and response type
pub trait RpcParams: Send + Sync {
    /// Decoded `result` of a successful call
    type Response: DeserializeOwned + Send + 'static;

    /// Method name without namespace, e.g. `addUri`
    const METHOD: &'static str;

    /// `system.*` methods are never namespaced
    const SYSTEM: bool = false;

    /// Whether the secret token leads the parameter list
    const REQUIRES_TOKEN: bool = true;

    /// Whether success closes the connection
    const SHUTS_DOWN: bool = false;

    /// Write the fields, in declaration order
    fn encode(&self, out: &mut ParamWriter) -> Result<()>;

    /// Full method name for a namespace such as `aria2`
    fn method_name(namespace: &str) -> String {
        if Self::SYSTEM {
            format!("system.{}", Self::METHOD)
        } else {
            format!("{}.{}", namespace, Self::METHOD)
        }
    }
}

/// Builds the positional `params` array for one call
#[derive(Debug, Default)]
pub struct ParamWriter {
    values: Vec<Value>,
    omitted: Option<&'static str>,
}

impl ParamWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the `token:<secret>` slot
    pub fn with_token(secret: &str) -> Self {
        Self {
            values: vec![Value::String(format!("token:{}", secret))],
            omitted: None,
        }
    }

    /// Append a required field
    pub fn push<T: Serialize + ?Sized>(&mut self, field: &'static str, value: &T) -> Result<()> {
        self.check_gap(field)?;
        let value = serde_json::to_value(value).map_err(|e| {
            EngineError::validation_error_with_field(format!("cannot encode parameter: {}", e), field)
        })?;
        self.values.push(value);
        Ok(())
    }

    /// Append an optional field; `None` ends the array
    pub fn push_opt<T: Serialize>(&mut self, field: &'static str, value: Option<&T>) -> Result<()> {
        match value {
            Some(v) => self.push(field, v),
            None => {
                self.omitted.get_or_insert(field);
                Ok(())
            }
        }
    }

    /// Append an already-encoded value
    pub fn push_value(&mut self, field: &'static str, value: Value) -> Result<()> {
        self.check_gap(field)?;
        self.values.push(value);
        Ok(())
    }

    fn check_gap(&self, field: &'static str) -> Result<()> {
        match self.omitted {
            Some(absent) => Err(EngineError::validation_error_with_field(
                format!("'{}' is present but earlier parameter '{}' is absent", field, absent),
                field,
            )),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Encode a request's full positional array, token first when required
pub fn encode_params<P: RpcParams>(params: &P, secret: &str) -> Result<Vec<Value>> {
    let mut writer = if P::REQUIRES_TOKEN {
        ParamWriter::with_token(secret)
    } else {
        ParamWriter::new()
    };
    params.encode(&mut writer)?;
    Ok(writer.into_values())
}
