//! HTTP surface — discovery endpoints, health probe and the per-agent
//! JSON-RPC entry point, as an axum `Router`.
//!
//! | Method | Path                                         | Meaning                      |
//! |--------|----------------------------------------------|------------------------------|
//! | GET    | `/.well-known/agents.json`                   | All discovery cards          |
//! | GET    | `/agents`                                    | Same as above                |
//! | GET    | `/agents/:id/.well-known/agent-card.json`    | One discovery card           |
//! | POST   | `/agents/:id/`                               | JSON-RPC entry point         |
//! | GET    | `/health`                                    | Liveness probe               |
//! | GET    | `/.well-known/agent-card.json`               | 404 with discovery guidance  |

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{debug, warn};

use crate::error::{self, GatewayError};
use crate::registry::AgentRegistry;
use crate::types::JsonRpcError;

use super::request_handler::RequestHandler;

/// Shared state for the routes.
struct AppState {
    handler: Arc<RequestHandler>,
    registry: Arc<AgentRegistry>,
}

/// Build the gateway router.
pub fn gateway_router(handler: Arc<RequestHandler>, registry: Arc<AgentRegistry>) -> Router {
    let state = Arc::new(AppState { handler, registry });

    Router::new()
        .route("/.well-known/agents.json", get(handle_list_cards))
        .route("/agents", get(handle_list_cards))
        .route(
            "/agents/{id}/.well-known/agent-card.json",
            get(handle_agent_card),
        )
        .route("/agents/{id}/", post(handle_jsonrpc))
        .route("/agents/{id}", post(handle_jsonrpc))
        .route("/health", get(handle_health))
        .route("/.well-known/agent-card.json", get(handle_root_card))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state)
}

/// List every discovery card.
async fn handle_list_cards(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.cards()).into_response()
}

/// One agent's discovery card.
async fn handle_agent_card(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.registry.card(&id) {
        Some(card) => Json(card).into_response(),
        None => agent_not_found(&id),
    }
}

/// Liveness probe.
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "agents": state.registry.len(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// The single-agent well-known path does not exist here; point clients at
/// the multi-agent discovery URL.
async fn handle_root_card() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "not_found",
            "message": "This gateway hosts multiple agents; fetch the agent list instead.",
            "agentsUrl": "/.well-known/agents.json",
        })),
    )
}

fn agent_not_found(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "agent_not_found",
            "message": format!("No agent with id '{}'", id),
        })),
    )
        .into_response()
}

/// JSON-RPC 2.0 request envelope.
#[derive(Debug, serde::Deserialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

/// JSON-RPC 2.0 response envelope.
#[derive(Debug, serde::Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Option<Value>, code: i64, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
        }
    }

    fn from_gateway_error(id: Option<Value>, err: GatewayError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(err.into()),
        }
    }
}

/// Per-agent JSON-RPC dispatch.
async fn handle_jsonrpc(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Json(request): Json<JsonRpcRequest>,
) -> Response {
    if !state.registry.has(&agent_id) {
        return agent_not_found(&agent_id);
    }

    if request.jsonrpc != "2.0" {
        return Json(JsonRpcResponse::error(
            request.id,
            error::INVALID_REQUEST,
            "Invalid JSON-RPC version — must be \"2.0\"".to_string(),
        ))
        .into_response();
    }

    debug!(agent_id = %agent_id, method = %request.method, "JSON-RPC request");

    match request.method.as_str() {
        "message/send" => {
            let params = match parse_params(request.params) {
                Ok(params) => params,
                Err(response) => return respond(request.id, Err(response)),
            };
            let result = state.handler.message_send(&agent_id, params).await;
            respond(request.id, result)
        }
        "message/stream" => {
            let params = match parse_params(request.params) {
                Ok(params) => params,
                Err(response) => return respond(request.id, Err(response)),
            };
            match state.handler.message_stream(&agent_id, params).await {
                Ok(consumer) => sse_response(request.id, consumer),
                Err(gateway_error) => respond(request.id, Err(gateway_error)),
            }
        }
        "tasks/get" => {
            let params = match parse_params(request.params) {
                Ok(params) => params,
                Err(response) => return respond(request.id, Err(response)),
            };
            let result = state
                .handler
                .tasks_get(params)
                .await
                .and_then(|task| Ok(serde_json::to_value(task)?));
            respond(request.id, result)
        }
        "tasks/cancel" => {
            let params = match parse_params(request.params) {
                Ok(params) => params,
                Err(response) => return respond(request.id, Err(response)),
            };
            let result = state
                .handler
                .tasks_cancel(&agent_id, params)
                .await
                .and_then(|task| Ok(serde_json::to_value(task)?));
            respond(request.id, result)
        }
        other => Json(JsonRpcResponse::error(
            request.id,
            error::METHOD_NOT_FOUND,
            format!("Unknown method '{}'", other),
        ))
        .into_response(),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, GatewayError> {
    serde_json::from_value(params).map_err(|parse_error| {
        GatewayError::InvalidParams(parse_error.to_string())
    })
}

fn respond(id: Option<Value>, result: Result<Value, GatewayError>) -> Response {
    match result {
        Ok(value) => Json(JsonRpcResponse::success(id, value)).into_response(),
        Err(gateway_error) => {
            warn!(%gateway_error, "request failed");
            Json(JsonRpcResponse::from_gateway_error(id, gateway_error)).into_response()
        }
    }
}

/// Stream one invocation's events as SSE, each wrapped in a JSON-RPC
/// success envelope carrying the request id.
fn sse_response(request_id: Option<Value>, mut consumer: super::EventConsumer) -> Response {
    let stream = async_stream::stream! {
        while let Some(event) = consumer.next_event().await {
            let envelope = match serde_json::to_value(&event) {
                Ok(value) => JsonRpcResponse::success(request_id.clone(), value),
                Err(serialize_error) => {
                    warn!(%serialize_error, "failed to serialize stream event");
                    continue;
                }
            };
            match serde_json::to_string(&envelope) {
                Ok(payload) => yield Ok::<Event, Infallible>(Event::default().data(payload)),
                Err(serialize_error) => warn!(%serialize_error, "failed to serialize envelope"),
            }
            if event.is_final() {
                break;
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}
