//! Agent execution contract — the integration point between the JSON-RPC
//! request handling and the gateway's executor.
//!
//! Implementors read from a [`RequestContext`] and publish events (status
//! updates, artifacts, messages) to an [`EventQueue`].

use async_trait::async_trait;
use serde_json::Value;

use crate::error::GatewayResult;
use crate::types::{Message, Task};

use super::event_queue::EventQueue;

/// Context for one agent execution request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique identifier for this task.
    pub task_id: String,

    /// Conversation context identifier — the client's session id.
    pub context_id: String,

    /// The incoming user message. `None` for cancel requests.
    pub message: Option<Message>,

    /// The existing task, if this is a continuation of a previous request.
    pub task: Option<Task>,

    /// Optional metadata from the client request.
    pub metadata: Option<Value>,
}

impl RequestContext {
    /// Text of the first text part in the user message; empty when the
    /// message is absent or carries no text part.
    pub fn user_text(&self) -> &str {
        self.message
            .as_ref()
            .and_then(Message::first_text)
            .unwrap_or("")
    }

    /// The task's `metadata.cognigyData` entry, when it is a JSON object —
    /// forwarded as extra payload to the upstream call.
    pub fn upstream_data(&self) -> Option<Value> {
        self.task
            .as_ref()
            .and_then(|task| task.metadata.as_ref())
            .and_then(|metadata| metadata.get("cognigyData"))
            .filter(|value| value.is_object())
            .cloned()
    }
}

/// Core trait for agent execution logic.
///
/// The server framework calls [`execute`](AgentExecutor::execute) when a new
/// message arrives and [`cancel`](AgentExecutor::cancel) when a cancellation
/// is requested.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Run one invocation to completion, publishing events to the queue.
    ///
    /// Returns once the invocation has terminated; the terminal event has
    /// been published and the queue has been closed before this resolves.
    async fn execute(&self, context: RequestContext, event_queue: EventQueue) -> GatewayResult<()>;

    /// Request cancellation of the task identified by `context.task_id`.
    async fn cancel(&self, context: RequestContext, event_queue: EventQueue) -> GatewayResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Part;
    use serde_json::json;

    #[test]
    fn user_text_takes_first_text_part() {
        let message = Message::agent(
            vec![Part::data(json!({})), Part::text("hello"), Part::text("later")],
            None,
            None,
        );
        let context = RequestContext {
            task_id: "t1".into(),
            context_id: "c1".into(),
            message: Some(message),
            task: None,
            metadata: None,
        };
        assert_eq!(context.user_text(), "hello");
    }

    #[test]
    fn upstream_data_requires_an_object() {
        let mut task = Task::submitted("t1", "c1");
        task.metadata = Some(json!({"cognigyData": "not-an-object"}));
        let context = RequestContext {
            task_id: "t1".into(),
            context_id: "c1".into(),
            message: None,
            task: Some(task.clone()),
            metadata: None,
        };
        assert_eq!(context.upstream_data(), None);

        task.metadata = Some(json!({"cognigyData": {"customer": "acme"}}));
        let context = RequestContext {
            task: Some(task),
            ..context
        };
        assert_eq!(context.upstream_data(), Some(json!({"customer": "acme"})));
    }
}
