//! End-to-end HTTP surface tests: discovery, health, and JSON-RPC dispatch
//! over a running gateway with a scripted upstream.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use cognigy_a2a_gateway::config::{AgentDescriptor, TransportKind};
use cognigy_a2a_gateway::executor::FlowExecutor;
use cognigy_a2a_gateway::pool::{ConnectionPool, PersistentLink, PoolError, UpstreamConnector};
use cognigy_a2a_gateway::registry::AgentRegistry;
use cognigy_a2a_gateway::server::{
    gateway_router, AgentExecutor, InMemoryTaskStore, RequestHandler,
};
use cognigy_a2a_gateway::sessions::TaskSessionRegistry;
use cognigy_a2a_gateway::types::AgentSkill;
use cognigy_a2a_gateway::upstream::{
    AdapterError, FlowAdapter, FlowInput, OutputCallback, RawOutput,
};

/// REST-style adapter that echoes the user text back.
struct EchoAdapter;

#[async_trait]
impl FlowAdapter for EchoAdapter {
    fn transport(&self) -> TransportKind {
        TransportKind::Rest
    }

    async fn send(
        &self,
        input: FlowInput,
        _on_output: Option<&OutputCallback>,
    ) -> Result<Vec<RawOutput>, AdapterError> {
        Ok(vec![RawOutput::text_only(format!("Echo: {}", input.text))])
    }
}

/// Pool connector that must never be dialed in these tests.
struct NeverConnector;

#[async_trait]
impl UpstreamConnector for NeverConnector {
    async fn connect(
        &self,
        _agent: &AgentDescriptor,
    ) -> Result<Box<dyn PersistentLink>, PoolError> {
        Err(PoolError::ConnectFailed {
            message: "not available in this test".to_string(),
        })
    }
}

fn descriptor() -> AgentDescriptor {
    AgentDescriptor {
        id: "support".to_string(),
        name: "Support Bot".to_string(),
        description: "Answers support questions".to_string(),
        version: "2.0.0".to_string(),
        transport: TransportKind::Rest,
        endpoint_url: "https://endpoint.example/rest".to_string(),
        endpoint_token: "tok".to_string(),
        skills: vec![AgentSkill {
            id: "faq".to_string(),
            name: "FAQ".to_string(),
            description: "Answers questions".to_string(),
            tags: vec!["support".to_string()],
        }],
    }
}

async fn spawn_gateway() -> SocketAddr {
    let registry = Arc::new(
        AgentRegistry::new(vec![descriptor()], "http://gateway.example").unwrap(),
    );
    let sessions = Arc::new(TaskSessionRegistry::new());
    let store = Arc::new(InMemoryTaskStore::new());
    let pool = Arc::new(ConnectionPool::new(Arc::new(NeverConnector)));

    let mut executors: HashMap<String, Arc<dyn AgentExecutor>> = HashMap::new();
    executors.insert(
        "support".to_string(),
        Arc::new(FlowExecutor::new(
            descriptor(),
            Arc::new(EchoAdapter),
            sessions,
        )),
    );

    let handler = Arc::new(RequestHandler::new(
        Arc::clone(&registry),
        executors,
        store,
        pool,
    ));
    let app = gateway_router(handler, registry);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn rpc(method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params})
}

fn send_params(task_id: &str, text: &str) -> Value {
    json!({
        "message": {
            "messageId": "m-1",
            "role": "user",
            "kind": "message",
            "parts": [{"kind": "text", "text": text}],
            "contextId": "c-1",
            "taskId": task_id
        }
    })
}

#[tokio::test]
async fn discovery_lists_cards_at_both_paths() {
    let addr = spawn_gateway().await;
    let client = reqwest::Client::new();

    for path in ["/.well-known/agents.json", "/agents"] {
        let cards: Value = client
            .get(format!("http://{}{}", addr, path))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let cards = cards.as_array().unwrap();
        assert_eq!(cards.len(), 1, "path {}", path);
        assert_eq!(cards[0]["name"], "Support Bot");
    }
}

#[tokio::test]
async fn agent_card_has_the_wire_shape() {
    let addr = spawn_gateway().await;
    let card: Value = reqwest::Client::new()
        .get(format!(
            "http://{}/agents/support/.well-known/agent-card.json",
            addr
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(card["protocolVersion"], "0.3.0");
    assert_eq!(card["version"], "2.0.0");
    assert_eq!(card["url"], "http://gateway.example/agents/support/");
    assert_eq!(
        card["capabilities"],
        json!({"streaming": false, "pushNotifications": false, "stateTransitionHistory": false})
    );
    assert_eq!(card["defaultInputModes"], json!(["text"]));
    assert_eq!(card["defaultOutputModes"], json!(["text"]));
    assert_eq!(card["skills"][0]["id"], "faq");
    assert_eq!(card["skills"][0]["tags"], json!(["support"]));
}

#[tokio::test]
async fn root_agent_card_points_at_multi_agent_discovery() {
    let addr = spawn_gateway().await;
    let response = reqwest::Client::new()
        .get(format!("http://{}/.well-known/agent-card.json", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["agentsUrl"], "/.well-known/agents.json");
}

#[tokio::test]
async fn health_reports_agent_count() {
    let addr = spawn_gateway().await;
    let body: Value = reqwest::Client::new()
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "healthy");
    assert_eq!(body["agents"], 1);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn message_send_returns_the_agent_message() {
    let addr = spawn_gateway().await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("http://{}/agents/support/", addr))
        .json(&rpc("message/send", send_params("t-echo", "hi")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["jsonrpc"], "2.0");
    assert_eq!(body["id"], 1);
    let result = &body["result"];
    assert_eq!(result["kind"], "message");
    assert_eq!(result["role"], "agent");
    assert_eq!(result["parts"], json!([{"kind": "text", "text": "Echo: hi"}]));

    // The task settled as completed and is fetchable.
    let body: Value = client
        .post(format!("http://{}/agents/support/", addr))
        .json(&rpc("tasks/get", json!({"id": "t-echo"})))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["result"]["status"]["state"], "completed");
    assert_eq!(body["result"]["contextId"], "c-1");
}

#[tokio::test]
async fn tasks_get_unknown_id_is_32001() {
    let addr = spawn_gateway().await;
    let body: Value = reqwest::Client::new()
        .post(format!("http://{}/agents/support/", addr))
        .json(&rpc("tasks/get", json!({"id": "missing"})))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["error"]["code"], -32001);
}

#[tokio::test]
async fn tasks_cancel_settles_a_stored_task() {
    let addr = spawn_gateway().await;
    let client = reqwest::Client::new();

    client
        .post(format!("http://{}/agents/support/", addr))
        .json(&rpc("message/send", send_params("t-cancel", "hi")))
        .send()
        .await
        .unwrap();

    let body: Value = client
        .post(format!("http://{}/agents/support/", addr))
        .json(&rpc("tasks/cancel", json!({"id": "t-cancel"})))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["result"]["status"]["state"], "canceled");
}

#[tokio::test]
async fn unknown_method_is_32601() {
    let addr = spawn_gateway().await;
    let body: Value = reqwest::Client::new()
        .post(format!("http://{}/agents/support/", addr))
        .json(&rpc("tasks/frobnicate", json!({})))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["error"]["code"], -32601);
}

#[tokio::test]
async fn invalid_params_is_32602() {
    let addr = spawn_gateway().await;
    let body: Value = reqwest::Client::new()
        .post(format!("http://{}/agents/support/", addr))
        .json(&rpc("message/send", json!({"nope": true})))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["error"]["code"], -32602);
}

#[tokio::test]
async fn wrong_jsonrpc_version_is_rejected() {
    let addr = spawn_gateway().await;
    let body: Value = reqwest::Client::new()
        .post(format!("http://{}/agents/support/", addr))
        .json(&json!({"jsonrpc": "1.0", "id": 1, "method": "message/send", "params": {}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["error"]["code"], -32600);
}

#[tokio::test]
async fn unknown_agent_is_404() {
    let addr = spawn_gateway().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{}/agents/ghost/", addr))
        .json(&rpc("message/send", send_params("t", "hi")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let response = client
        .get(format!(
            "http://{}/agents/ghost/.well-known/agent-card.json",
            addr
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}
