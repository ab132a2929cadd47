//! Socket adapter — per-invocation WebSocket session to a flow endpoint.
//!
//! Every call constructs a dedicated session bound to the caller's user and
//! session ids; sessions are never shared across calls, so outputs of
//! concurrent conversations cannot pollute each other. The connect cost per
//! invocation is the price of that isolation.
//!
//! Also provides [`SocketConnector`], the production
//! [`UpstreamConnector`](crate::pool::UpstreamConnector) used by the
//! connection pool for its agent-level liveness links.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

use crate::config::{AgentDescriptor, TransportKind};
use crate::pool::{LinkEvent, PersistentLink, PoolError, UpstreamConnector};

use super::envelope::expand_output;
use super::{endpoint_url, AdapterError, FlowAdapter, FlowInput, OutputCallback, RawOutput};

/// Hard upper bound for one streaming session, connect included.
const SESSION_TIMEOUT_SECS: u64 = 60;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The one frame the gateway sends: the user's turn.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename = "input")]
struct InputFrame<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Value>,
}

/// Frames the backend session sends.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ServerFrame {
    /// One raw backend output.
    #[serde(rename = "output")]
    Output { output: RawOutput },

    /// The turn is complete; the buffered outputs are the full result.
    #[serde(rename = "finalPing")]
    FinalPing,

    /// The session failed server-side.
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: String,
    },
}

/// Per-invocation WebSocket session adapter for SOCKET endpoints.
pub struct SocketAdapter {
    base_url: String,
    token: String,
}

impl SocketAdapter {
    /// Build an adapter for the given endpoint base URL and token.
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            token: token.to_string(),
        }
    }

    /// Build an adapter for a resolved agent descriptor.
    pub fn for_agent(agent: &AgentDescriptor) -> Self {
        Self::new(&agent.endpoint_url, &agent.endpoint_token)
    }

    async fn run_session(
        &self,
        input: &FlowInput,
        on_output: Option<&OutputCallback>,
    ) -> Result<Vec<RawOutput>, AdapterError> {
        let url = session_url(
            &self.base_url,
            &self.token,
            &input.session_id,
            &input.user_id,
        )?;

        debug!(session_id = %input.session_id, "opening flow session");
        let (mut socket, _response) =
            connect_async(url.as_str())
                .await
                .map_err(|error| AdapterError::ConnectFailed {
                    message: error.to_string(),
                })?;

        let frame = InputFrame {
            text: &input.text,
            data: input.data.as_ref(),
        };
        let encoded = serde_json::to_string(&frame).map_err(|error| AdapterError::SocketError {
            message: error.to_string(),
        })?;
        socket
            .send(WsMessage::text(encoded))
            .await
            .map_err(|error| AdapterError::SocketError {
                message: error.to_string(),
            })?;

        let mut outputs: Vec<RawOutput> = Vec::new();
        loop {
            match socket.next().await {
                Some(Ok(WsMessage::Text(text))) => match serde_json::from_str(&text) {
                    Ok(ServerFrame::Output { output }) => {
                        for entry in expand_output(output) {
                            outputs.push(entry);
                            let index = outputs.len() - 1;
                            if let Some(callback) = on_output {
                                if let Err(error) = callback(&outputs[index], index) {
                                    warn!(index, %error, "output callback failed; session continues");
                                }
                            }
                        }
                    }
                    Ok(ServerFrame::FinalPing) => {
                        debug!(count = outputs.len(), "flow session completed");
                        let _ = socket.close(None).await;
                        return Ok(outputs);
                    }
                    Ok(ServerFrame::Error { message }) => {
                        let _ = socket.close(None).await;
                        return Err(AdapterError::SocketError { message });
                    }
                    Err(error) => {
                        warn!(%error, "ignoring unparseable frame from flow session");
                    }
                },
                Some(Ok(WsMessage::Close(_))) | None => {
                    return Err(AdapterError::Disconnect);
                }
                Some(Ok(_)) => continue,
                Some(Err(error)) => {
                    return Err(AdapterError::SocketError {
                        message: error.to_string(),
                    });
                }
            }
        }
    }
}

#[async_trait]
impl FlowAdapter for SocketAdapter {
    fn transport(&self) -> TransportKind {
        TransportKind::Socket
    }

    async fn send(
        &self,
        input: FlowInput,
        on_output: Option<&OutputCallback>,
    ) -> Result<Vec<RawOutput>, AdapterError> {
        // The timeout wraps connect, send and every read; the socket is
        // dropped (and with it the connection) on every exit path.
        match tokio::time::timeout(
            Duration::from_secs(SESSION_TIMEOUT_SECS),
            self.run_session(&input, on_output),
        )
        .await
        {
            Ok(result) => result,
            Err(_elapsed) => Err(AdapterError::SessionTimeout {
                seconds: SESSION_TIMEOUT_SECS,
            }),
        }
    }
}

/// Session URL: endpoint with the token path segment, `http(s)` rewritten to
/// `ws(s)`, and the session/user identity as query parameters.
fn session_url(
    base: &str,
    token: &str,
    session_id: &str,
    user_id: &str,
) -> Result<Url, AdapterError> {
    let mut url = websocket_url(base, token)?;
    url.query_pairs_mut()
        .append_pair("sessionId", session_id)
        .append_pair("userId", user_id);
    Ok(url)
}

/// Endpoint URL with the `ws(s)` scheme, no session identity.
pub(crate) fn websocket_url(base: &str, token: &str) -> Result<Url, AdapterError> {
    let http_url = endpoint_url(base, token);
    let ws_url = if let Some(rest) = http_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = http_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        http_url
    };
    Url::parse(&ws_url).map_err(|error| AdapterError::ConnectFailed {
        message: format!("invalid endpoint URL: {}", error),
    })
}

// ---------------------------------------------------------------------------
// Pool connector
// ---------------------------------------------------------------------------

/// Production connector for the connection pool: opens one liveness
/// WebSocket per socket agent and reports its disconnects/errors.
#[derive(Debug, Default)]
pub struct SocketConnector;

#[async_trait]
impl UpstreamConnector for SocketConnector {
    async fn connect(
        &self,
        agent: &AgentDescriptor,
    ) -> Result<Box<dyn PersistentLink>, PoolError> {
        let url = websocket_url(&agent.endpoint_url, &agent.endpoint_token).map_err(|error| {
            PoolError::ConnectFailed {
                message: error.to_string(),
            }
        })?;
        let (socket, _response) =
            connect_async(url.as_str())
                .await
                .map_err(|error| PoolError::ConnectFailed {
                    message: error.to_string(),
                })?;
        debug!(agent_id = %agent.id, "pool link established");
        Ok(Box::new(SocketLink { socket }))
    }
}

/// A live pool link over a WebSocket.
struct SocketLink {
    socket: Socket,
}

#[async_trait]
impl PersistentLink for SocketLink {
    async fn next_event(&mut self) -> LinkEvent {
        loop {
            match self.socket.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Ok(ServerFrame::Error { message }) = serde_json::from_str(&text) {
                        return LinkEvent::Errored { message };
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => return LinkEvent::Disconnected,
                Some(Ok(_)) => continue,
                Some(Err(error)) => {
                    return LinkEvent::Errored {
                        message: error.to_string(),
                    }
                }
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.socket.close(None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_url_rewrites_scheme_and_appends_identity() {
        let url = session_url("https://endpoint.example/socket/", "tok-1", "s 1", "a2a-s 1").unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/socket/tok-1");
        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            query,
            vec![
                ("sessionId".to_string(), "s 1".to_string()),
                ("userId".to_string(), "a2a-s 1".to_string())
            ]
        );
    }

    #[test]
    fn plain_http_becomes_ws() {
        let url = websocket_url("http://localhost:9009", "tok").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:9009/tok");
    }

    #[test]
    fn input_frame_omits_absent_data() {
        let frame = InputFrame {
            text: "hi",
            data: None,
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value, serde_json::json!({"type": "input", "text": "hi"}));
    }

    #[test]
    fn server_frames_parse_by_type_tag() {
        let frame: ServerFrame =
            serde_json::from_str(r#"{"type":"output","output":{"text":"hi"}}"#).unwrap();
        assert!(matches!(frame, ServerFrame::Output { .. }));

        let frame: ServerFrame = serde_json::from_str(r#"{"type":"finalPing"}"#).unwrap();
        assert!(matches!(frame, ServerFrame::FinalPing));

        let frame: ServerFrame = serde_json::from_str(r#"{"type":"error"}"#).unwrap();
        assert!(matches!(frame, ServerFrame::Error { .. }));
    }
}
