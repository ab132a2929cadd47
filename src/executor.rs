//! Flow executor — runs one A2A invocation against a Cognigy flow.
//!
//! The executor opens the task, invokes the agent's upstream adapter, routes
//! each normalized output to the matching A2A event kind (status-update with
//! message vs artifact-update with file), and closes the task with exactly
//! one terminal state. Event ordering within an invocation is the order the
//! upstream produced the outputs; the terminal event is always last.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{AgentDescriptor, TransportKind};
use crate::error::GatewayResult;
use crate::normalizer::{self, NormalizedOutput};
use crate::server::{AgentExecutor, EventQueue, RequestContext};
use crate::sessions::{CancelSignal, TaskSessionRegistry};
use crate::types::{
    Artifact, Message, StreamResponse, TaskArtifactUpdateEvent, TaskState, TaskStatus,
    TaskStatusUpdateEvent,
};
use crate::upstream::{FlowAdapter, FlowInput, RawOutput};

/// Prefix for the synthetic backend user identity derived from the context id.
pub const USER_ID_PREFIX: &str = "a2a";

/// The only failure text ever surfaced to a client on the request/response
/// path. Details stay in the logs.
pub const GENERIC_ERROR_TEXT: &str = "An error occurred while processing your request.";

/// Per-agent executor: one upstream adapter plus the shared session registry.
pub struct FlowExecutor {
    agent: AgentDescriptor,
    adapter: Arc<dyn FlowAdapter>,
    sessions: Arc<TaskSessionRegistry>,
}

/// Deregisters the task session on every exit path.
struct SessionGuard {
    sessions: Arc<TaskSessionRegistry>,
    task_id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.deregister(&self.task_id);
    }
}

impl FlowExecutor {
    /// Build an executor for one agent.
    pub fn new(
        agent: AgentDescriptor,
        adapter: Arc<dyn FlowAdapter>,
        sessions: Arc<TaskSessionRegistry>,
    ) -> Self {
        Self {
            agent,
            adapter,
            sessions,
        }
    }

    /// The agent this executor serves.
    pub fn agent(&self) -> &AgentDescriptor {
        &self.agent
    }

    /// Whether this executor drives a streaming transport.
    pub fn is_streaming(&self) -> bool {
        self.adapter.transport() == TransportKind::Socket
    }

    fn status_update(
        task_id: &str,
        context_id: &str,
        state: TaskState,
        message: Option<Message>,
        r#final: bool,
    ) -> StreamResponse {
        StreamResponse::StatusUpdate(TaskStatusUpdateEvent {
            task_id: task_id.to_string(),
            context_id: context_id.to_string(),
            kind: "status-update".to_string(),
            status: TaskStatus {
                state,
                message,
                timestamp: Some(chrono::Utc::now().to_rfc3339()),
            },
            r#final,
            metadata: None,
        })
    }

    /// Route one normalized output to its event kind.
    fn publish_output(
        queue: &EventQueue,
        task_id: &str,
        context_id: &str,
        normalized: NormalizedOutput,
    ) {
        match normalized {
            NormalizedOutput::StatusMessage { parts } => {
                // Fresh message id per event.
                let message =
                    Message::agent(parts, Some(context_id.to_string()), Some(task_id.to_string()));
                queue.publish(Self::status_update(
                    task_id,
                    context_id,
                    TaskState::Working,
                    Some(message),
                    false,
                ));
            }
            NormalizedOutput::Artifact { parts, name, .. } => {
                queue.publish(StreamResponse::ArtifactUpdate(TaskArtifactUpdateEvent {
                    task_id: task_id.to_string(),
                    context_id: context_id.to_string(),
                    kind: "artifact-update".to_string(),
                    artifact: Artifact {
                        artifact_id: Uuid::new_v4().to_string(),
                        name: Some(name),
                        description: None,
                        parts,
                        metadata: None,
                    },
                    // Each media file is its own complete artifact.
                    append: Some(false),
                    last_chunk: Some(true),
                    metadata: None,
                }));
            }
        }
    }
}

#[async_trait]
impl AgentExecutor for FlowExecutor {
    async fn execute(&self, context: RequestContext, event_queue: EventQueue) -> GatewayResult<()> {
        let task_id = context.task_id.clone();
        let context_id = context.context_id.clone();
        let user_text = context.user_text().to_string();
        let upstream_data = context.upstream_data();
        let is_stream = self.is_streaming();

        info!(
            agent_id = %self.agent.id,
            task_id = %task_id,
            streaming = is_stream,
            "executing invocation"
        );

        let signal = CancelSignal::new();
        self.sessions.register(&task_id, signal.clone());
        let _guard = SessionGuard {
            sessions: Arc::clone(&self.sessions),
            task_id: task_id.clone(),
        };

        if is_stream {
            // Opening update: working, nothing to say yet.
            event_queue.publish(Self::status_update(
                &task_id,
                &context_id,
                TaskState::Working,
                None,
                false,
            ));
        }

        let callback = {
            let queue = event_queue.clone();
            let signal = signal.clone();
            let task_id = task_id.clone();
            let context_id = context_id.clone();
            move |output: &RawOutput,
                  index: usize|
                  -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
                if signal.is_canceled() {
                    debug!(task_id = %task_id, index, "dropping output after cancel");
                    return Ok(());
                }
                match normalizer::normalize(output) {
                    Ok(normalized) => {
                        Self::publish_output(&queue, &task_id, &context_id, normalized)
                    }
                    Err(normalize_error) => {
                        warn!(task_id = %task_id, index, %normalize_error, "skipping output");
                    }
                }
                Ok(())
            }
        };

        let input = FlowInput {
            text: user_text,
            session_id: context_id.clone(),
            user_id: format!("{}-{}", USER_ID_PREFIX, context_id),
            data: upstream_data,
        };

        let result = self
            .adapter
            .send(input, if is_stream { Some(&callback) } else { None })
            .await;

        match result {
            Ok(outputs) => {
                if signal.is_canceled() {
                    info!(task_id = %task_id, "invocation canceled");
                    event_queue.publish(Self::status_update(
                        &task_id,
                        &context_id,
                        TaskState::Canceled,
                        None,
                        true,
                    ));
                } else if is_stream {
                    event_queue.publish(Self::status_update(
                        &task_id,
                        &context_id,
                        TaskState::Completed,
                        None,
                        true,
                    ));
                } else {
                    // One response message carrying every output, flattened.
                    let parts = normalizer::flatten_outputs(&outputs);
                    let message =
                        Message::agent(parts, Some(context_id.clone()), Some(task_id.clone()));
                    event_queue.publish(StreamResponse::Message(message));
                }
            }
            Err(adapter_error) => {
                error!(
                    agent_id = %self.agent.id,
                    task_id = %task_id,
                    %adapter_error,
                    "upstream invocation failed"
                );
                if is_stream {
                    event_queue.publish(Self::status_update(
                        &task_id,
                        &context_id,
                        TaskState::Failed,
                        None,
                        true,
                    ));
                } else {
                    let message = Message::agent(
                        vec![crate::types::Part::text(GENERIC_ERROR_TEXT)],
                        Some(context_id.clone()),
                        Some(task_id.clone()),
                    );
                    event_queue.publish(StreamResponse::Message(message));
                }
            }
        }

        event_queue.close();
        Ok(())
    }

    async fn cancel(&self, context: RequestContext, event_queue: EventQueue) -> GatewayResult<()> {
        let task_id = context.task_id.clone();
        if self.sessions.cancel(&task_id) {
            // The running execute publishes the canceled terminal itself.
            info!(task_id = %task_id, "cancel signal fired for in-flight task");
        } else {
            // No in-flight work matched — answer with a synthetic terminal.
            info!(task_id = %task_id, "cancel for unknown task; publishing terminal directly");
            event_queue.publish(Self::status_update(
                &task_id,
                &context.context_id,
                TaskState::Canceled,
                None,
                true,
            ));
        }
        event_queue.close();
        Ok(())
    }
}
