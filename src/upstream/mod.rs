//! Upstream adapters — the two interchangeable strategies for invoking a
//! Cognigy flow.
//!
//! Both adapters implement [`FlowAdapter`] and produce the same thing: an
//! ordered sequence of [`RawOutput`] records for one logical turn.
//! [`RestAdapter`] performs a single request/response POST;
//! [`SocketAdapter`] holds a per-invocation WebSocket session and forwards
//! each output to a caller callback as it arrives.

pub mod envelope;
pub mod rest;
pub mod socket;

pub use rest::RestAdapter;
pub use socket::{SocketAdapter, SocketConnector};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::TransportKind;

/// A single record emitted by the backend as part of one logical turn.
///
/// Either field may be absent; the data map may still be wrapped in the
/// backend's `_cognigy._default` envelope (see [`envelope`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOutput {
    /// Output text, possibly empty or absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Structured data map, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RawOutput {
    /// A plain-text output record.
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            data: None,
        }
    }

    /// A data-only output record.
    pub fn data_only(data: Value) -> Self {
        Self {
            text: None,
            data: Some(data),
        }
    }
}

/// The user turn handed to an adapter.
#[derive(Debug, Clone)]
pub struct FlowInput {
    /// The user's text.
    pub text: String,

    /// Conversation/session identifier, passed through to the backend.
    pub session_id: String,

    /// Backend user identity for this conversation.
    pub user_id: String,

    /// Optional extra payload forwarded to the flow.
    pub data: Option<Value>,
}

/// Callback invoked for each raw output as it arrives from a streaming
/// session, with its monotonically increasing index.
///
/// A callback error is logged by the adapter and does not abort the session.
pub type OutputCallback =
    dyn Fn(&RawOutput, usize) -> Result<(), Box<dyn std::error::Error + Send + Sync>> + Send + Sync;

/// Adapter failure kinds.
///
/// These bubble to the executor verbatim, which translates them into
/// user-visible A2A events; no raw error detail ever reaches a client.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The request exceeded the adapter's end-to-end deadline.
    #[error("backend request timed out after {seconds}s")]
    Timeout {
        /// The deadline that was exceeded.
        seconds: u64,
    },

    /// The backend answered with a non-2xx status.
    #[error("backend returned HTTP {status}")]
    Http {
        /// The HTTP status code.
        status: u16,
    },

    /// Transport-level failure reaching the backend.
    #[error("network error talking to backend")]
    Network {
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The streaming session closed before signalling completion.
    #[error("backend session disconnected before completion")]
    Disconnect,

    /// The streaming session reported an error.
    #[error("backend session error: {message}")]
    SocketError {
        /// The session's error text (logged, never surfaced to clients).
        message: String,
    },

    /// The streaming session exceeded its overall deadline.
    #[error("backend session timed out after {seconds}s")]
    SessionTimeout {
        /// The deadline that was exceeded.
        seconds: u64,
    },

    /// The streaming session could not be established.
    #[error("failed to connect to backend session: {message}")]
    ConnectFailed {
        /// The connect failure text.
        message: String,
    },
}

/// One upstream invocation strategy.
///
/// `send` delivers one user turn and resolves with the complete ordered
/// output list. Streaming implementations additionally invoke `on_output`
/// for each record as it arrives, before `send` resolves.
#[async_trait]
pub trait FlowAdapter: Send + Sync {
    /// Which transport this adapter speaks.
    fn transport(&self) -> TransportKind;

    /// Deliver one user turn to the flow.
    async fn send(
        &self,
        input: FlowInput,
        on_output: Option<&OutputCallback>,
    ) -> Result<Vec<RawOutput>, AdapterError>;
}

/// Compose the upstream endpoint URL: base with any single trailing `/`
/// stripped, then the endpoint token appended as a path segment.
pub(crate) fn endpoint_url(base: &str, token: &str) -> String {
    let base = base.strip_suffix('/').unwrap_or(base);
    format!("{}/{}", base, token)
}
