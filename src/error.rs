//! Gateway error taxonomy — JSON-RPC error codes plus the per-layer errors
//! (configuration, adapters, pool) folded into one umbrella type for the
//! HTTP surface.
//!
//! Propagation policy: adapter errors bubble to the executor verbatim and are
//! translated into user-visible A2A events there; configuration errors are
//! fatal at startup; only the JSON-RPC layer converts errors into
//! [`JsonRpcError`] payloads.

use crate::config::ConfigError;
use crate::pool::PoolError;
use crate::types::JsonRpcError;
use crate::upstream::AdapterError;

// ---------------------------------------------------------------------------
// Standard JSON-RPC 2.0 error codes
// ---------------------------------------------------------------------------

/// Invalid JSON was received by the server.
pub const PARSE_ERROR: i64 = -32700;

/// The JSON sent is not a valid Request object.
pub const INVALID_REQUEST: i64 = -32600;

/// The method does not exist / is not available.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Invalid method parameter(s).
pub const INVALID_PARAMS: i64 = -32602;

/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i64 = -32603;

// ---------------------------------------------------------------------------
// A2A-specific error codes
// ---------------------------------------------------------------------------

/// The requested task was not found.
pub const TASK_NOT_FOUND: i64 = -32001;

/// The task cannot be canceled in its current state.
pub const TASK_NOT_CANCELABLE: i64 = -32002;

// ---------------------------------------------------------------------------
// GatewayError
// ---------------------------------------------------------------------------

/// Unified error type for the gateway's request path.
///
/// Layer-specific errors ([`ConfigError`], [`AdapterError`], [`PoolError`])
/// convert into this via `From`, preserving the original as the source.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Startup configuration problem — fatal, never produced at request time.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Upstream adapter failure (timeout, HTTP, network, socket).
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// Connection pool failure (dead entry, exhausted reconnects).
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// No task with the given id (code -32001).
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// No agent with the given id — surfaces as HTTP 404 on the agent routes.
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// Malformed request parameters (code -32602).
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Unknown JSON-RPC method (code -32601).
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Task store failure.
    #[error("Task store error: {0}")]
    Store(String),

    /// Catch-all for internal failures (code -32603).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// Returns the JSON-RPC error code for this error.
    pub fn code(&self) -> i64 {
        match self {
            GatewayError::TaskNotFound(_) => TASK_NOT_FOUND,
            GatewayError::InvalidParams(_) => INVALID_PARAMS,
            GatewayError::MethodNotFound(_) => METHOD_NOT_FOUND,
            _ => INTERNAL_ERROR,
        }
    }
}

impl From<GatewayError> for JsonRpcError {
    fn from(err: GatewayError) -> Self {
        JsonRpcError {
            code: err.code(),
            message: err.to_string(),
            data: None,
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::InvalidParams(err.to_string())
    }
}

impl From<redis::RedisError> for GatewayError {
    fn from(err: redis::RedisError) -> Self {
        GatewayError::Store(err.to_string())
    }
}
