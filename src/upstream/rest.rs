//! REST adapter — one-shot request/response invocation of a flow.
//!
//! One HTTP POST per turn; the backend answers with the complete
//! `outputStack` for that turn, so there is nothing to stream.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::{AgentDescriptor, TransportKind};

use super::envelope::{expand_output, is_internal_metadata};
use super::{endpoint_url, AdapterError, FlowAdapter, FlowInput, OutputCallback, RawOutput};

/// End-to-end deadline for one backend POST, connect included.
const REQUEST_TIMEOUT_SECS: u64 = 8;

/// The REST response body: the outputs of one logical turn.
#[derive(Debug, Deserialize)]
struct RestResponse {
    #[serde(rename = "outputStack", default)]
    output_stack: Vec<RawOutput>,
}

/// One-shot HTTP POST adapter for REST endpoints.
pub struct RestAdapter {
    client: reqwest::Client,
    url: String,
}

impl RestAdapter {
    /// Build an adapter for the given endpoint base URL and token.
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: endpoint_url(base_url, token),
        }
    }

    /// Build an adapter for a resolved agent descriptor.
    pub fn for_agent(agent: &AgentDescriptor) -> Self {
        Self::new(&agent.endpoint_url, &agent.endpoint_token)
    }
}

#[async_trait]
impl FlowAdapter for RestAdapter {
    fn transport(&self) -> TransportKind {
        TransportKind::Rest
    }

    async fn send(
        &self,
        input: FlowInput,
        _on_output: Option<&OutputCallback>,
    ) -> Result<Vec<RawOutput>, AdapterError> {
        let body = request_body(&input);

        debug!(url = %self.url, session_id = %input.session_id, "sending REST request to flow");

        let response = self
            .client
            .post(&self.url)
            .header(ACCEPT, "application/json")
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .json(&body)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Http {
                status: status.as_u16(),
            });
        }

        let parsed: RestResponse = response.json().await.map_err(classify_reqwest_error)?;

        let outputs: Vec<RawOutput> = parsed
            .output_stack
            .into_iter()
            .filter(|output| !is_internal_metadata(output))
            .flat_map(expand_output)
            .collect();

        debug!(count = outputs.len(), "flow returned output stack");
        Ok(outputs)
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> AdapterError {
    if error.is_timeout() {
        AdapterError::Timeout {
            seconds: REQUEST_TIMEOUT_SECS,
        }
    } else {
        AdapterError::Network { source: error }
    }
}

/// The upstream request body. The `data` key is absent when the caller
/// supplied none, not null.
pub fn request_body(input: &FlowInput) -> Value {
    let mut body = json!({
        "userId": input.user_id,
        "sessionId": input.session_id,
        "text": input.text,
    });
    if let Some(data) = &input.data {
        body["data"] = data.clone();
    }
    body
}
