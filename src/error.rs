//! Error types for the aria2 host
//!
//! This module defines the error taxonomy shared by the RPC transport,
//! the protocol client, the process supervisor and the task tracker.

use std::fmt;

/// Result alias used by the library modules
pub type Result<T> = std::result::Result<T, EngineError>;

/// Comprehensive error type for engine operations
#[derive(Debug, Clone)]
pub enum EngineError {
    /// Connection refused, timeout, unreadable or malformed body
    TransportError {
        message: String,
        endpoint: Option<String>,
        source: Option<String>,
    },

    /// The engine answered with an explicit JSON-RPC error object
    ProtocolError {
        code: i64,
        message: String,
    },

    /// The response id does not match the request id
    CorrelationError {
        expected: String,
        actual: String,
    },

    /// Caller supplied an invalid argument; nothing was sent
    ValidationError {
        message: String,
        field: Option<String>,
    },

    /// The engine subprocess failed to spawn, exited or could not be stopped
    ProcessError {
        message: String,
        source: Option<String>,
    },

    /// The connection was shut down; no request went over the wire
    ConnectionClosed,

    /// The startup health probe gave up
    ProbeError {
        attempts: u32,
        last_error: Option<String>,
    },

    /// Configuration errors
    ConfigError {
        message: String,
        field: Option<String>,
    },

    /// Torrent / magnet input parsing errors
    ParseError {
        message: String,
        source: Option<String>,
    },
}

impl EngineError {
    /// Create a new TransportError
    pub fn transport_error(message: impl Into<String>) -> Self {
        EngineError::TransportError {
            message: message.into(),
            endpoint: None,
            source: None,
        }
    }

    /// Create a new TransportError with endpoint and source
    pub fn transport_error_full(
        message: impl Into<String>,
        endpoint: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        EngineError::TransportError {
            message: message.into(),
            endpoint: Some(endpoint.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new TransportError with source
    pub fn transport_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        EngineError::TransportError {
            message: message.into(),
            endpoint: None,
            source: Some(source.into()),
        }
    }

    /// Create a new ProtocolError
    pub fn protocol_error(code: i64, message: impl Into<String>) -> Self {
        EngineError::ProtocolError {
            code,
            message: message.into(),
        }
    }

    /// Create a new CorrelationError
    pub fn correlation_error(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        EngineError::CorrelationError {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a new ValidationError
    pub fn validation_error(message: impl Into<String>) -> Self {
        EngineError::ValidationError {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new ValidationError with field
    pub fn validation_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        EngineError::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new ProcessError
    pub fn process_error(message: impl Into<String>) -> Self {
        EngineError::ProcessError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new ProcessError with source
    pub fn process_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        EngineError::ProcessError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new ProbeError
    pub fn probe_error(attempts: u32, last_error: Option<&EngineError>) -> Self {
        EngineError::ProbeError {
            attempts,
            last_error: last_error.map(|e| e.to_string()),
        }
    }

    /// Create a new ConfigError
    pub fn config_error(message: impl Into<String>) -> Self {
        EngineError::ConfigError {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new ConfigError with field
    pub fn config_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        EngineError::ConfigError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new ParseError
    pub fn parse_error(message: impl Into<String>) -> Self {
        EngineError::ParseError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new ParseError with source
    pub fn parse_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        EngineError::ParseError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Transport failures are the only retryable class, and only while probing
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::TransportError { .. })
    }

    /// Check if this is a transport failure
    pub fn is_transport(&self) -> bool {
        matches!(self, EngineError::TransportError { .. })
    }

    /// Check if the engine rejected the call
    pub fn is_protocol(&self) -> bool {
        matches!(self, EngineError::ProtocolError { .. })
    }

    /// The engine's error code, for protocol errors
    pub fn code(&self) -> Option<i64> {
        match self {
            EngineError::ProtocolError { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let ctx = context.into();
        match &mut self {
            EngineError::TransportError { source, .. }
            | EngineError::ProcessError { source, .. }
            | EngineError::ParseError { source, .. } => {
                *source = Some(source.as_ref().map_or_else(|| ctx.clone(), |s| format!("{}: {}", s, ctx)));
            }
            _ => {}
        }
        self
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::TransportError { message, endpoint, source } => {
                match (endpoint, source) {
                    (Some(e), Some(s)) => write!(f, "Transport error: {} (endpoint: {}, source: {})", message, e, s),
                    (Some(e), None) => write!(f, "Transport error: {} (endpoint: {})", message, e),
                    (None, Some(s)) => write!(f, "Transport error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Transport error: {}", message),
                }
            }
            EngineError::ProtocolError { code, message } => {
                write!(f, "Engine error {}: {}", code, message)
            }
            EngineError::CorrelationError { expected, actual } => {
                write!(f, "Correlation error: expected response id {}, got {}", expected, actual)
            }
            EngineError::ValidationError { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Validation error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Validation error: {}", message)
                }
            }
            EngineError::ProcessError { message, source } => {
                if let Some(src) = source {
                    write!(f, "Process error: {} (source: {})", message, src)
                } else {
                    write!(f, "Process error: {}", message)
                }
            }
            EngineError::ConnectionClosed => write!(f, "Connection closed: the engine was shut down"),
            EngineError::ProbeError { attempts, last_error } => {
                if let Some(last) = last_error {
                    write!(f, "Probe error: engine not reachable after {} attempts (last: {})", attempts, last)
                } else {
                    write!(f, "Probe error: engine not reachable after {} attempts", attempts)
                }
            }
            EngineError::ConfigError { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Config error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Config error: {}", message)
                }
            }
            EngineError::ParseError { message, source } => {
                if let Some(src) = source {
                    write!(f, "Parse error: {} (source: {})", message, src)
                } else {
                    write!(f, "Parse error: {}", message)
                }
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        let endpoint = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let message = if err.is_connect() {
            "Failed to connect to engine"
        } else if err.is_timeout() {
            "Engine request timed out"
        } else if err.is_body() || err.is_decode() {
            "Failed to read engine response"
        } else {
            "HTTP request to engine failed"
        };
        EngineError::transport_error_full(message, endpoint, err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::transport_error_with_source("Malformed JSON-RPC payload", err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::process_error_with_source(err.to_string(), err.kind().to_string())
    }
}

impl From<url::ParseError> for EngineError {
    fn from(err: url::ParseError) -> Self {
        EngineError::config_error_with_field(format!("Invalid engine endpoint: {}", err), "endpoint")
    }
}

impl From<tokio::time::error::Elapsed> for EngineError {
    fn from(_err: tokio::time::error::Elapsed) -> Self {
        EngineError::transport_error("Operation timed out")
    }
}
