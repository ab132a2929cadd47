//! JSON-RPC method handling — ties the registry, executors, task store and
//! connection pool together for one gateway process.
//!
//! `message/send` runs the executor to completion and folds the event stream
//! back into the stored task; `message/stream` hands the event stream to the
//! SSE layer and folds in the background. Pool bookkeeping
//! (`session_started` / `session_ended`) brackets every socket invocation.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, warn};
use uuid::Uuid;

use crate::config::TransportKind;
use crate::error::{GatewayError, GatewayResult};
use crate::pool::ConnectionPool;
use crate::registry::AgentRegistry;
use crate::types::{
    CancelTaskParams, GetTaskParams, Message, SendMessageParams, StreamResponse, Task, TaskState,
    TaskStatus,
};

use super::agent_execution::{AgentExecutor, RequestContext};
use super::event_queue::{EventConsumer, EventQueue};
use super::task_store::TaskStore;

/// Per-process request handler over all configured agents.
pub struct RequestHandler {
    registry: Arc<AgentRegistry>,
    executors: HashMap<String, Arc<dyn AgentExecutor>>,
    store: Arc<dyn TaskStore>,
    pool: Arc<ConnectionPool>,
}

impl RequestHandler {
    /// Wire up a handler.
    pub fn new(
        registry: Arc<AgentRegistry>,
        executors: HashMap<String, Arc<dyn AgentExecutor>>,
        store: Arc<dyn TaskStore>,
        pool: Arc<ConnectionPool>,
    ) -> Self {
        Self {
            registry,
            executors,
            store,
            pool,
        }
    }

    fn executor(&self, agent_id: &str) -> GatewayResult<Arc<dyn AgentExecutor>> {
        self.executors
            .get(agent_id)
            .cloned()
            .ok_or_else(|| GatewayError::AgentNotFound(agent_id.to_string()))
    }

    /// Handle `message/send`: run the invocation to completion and answer
    /// with the agent's direct `Message` when one was produced, the final
    /// `Task` otherwise.
    pub async fn message_send(
        &self,
        agent_id: &str,
        params: SendMessageParams,
    ) -> GatewayResult<Value> {
        let (executor, context, is_socket) = self.begin_invocation(agent_id, &params).await?;
        let task_id = context.task_id.clone();

        let queue = EventQueue::with_default_capacity();
        let mut consumer = EventConsumer::new(queue.clone());

        let run = tokio::spawn({
            let queue = queue.clone();
            async move { executor.execute(context, queue).await }
        });

        let events = consumer.collect_until_final().await;

        match run.await {
            Ok(Ok(())) => {}
            Ok(Err(execute_error)) => {
                error!(task_id = %task_id, %execute_error, "executor returned an error")
            }
            Err(join_error) => error!(task_id = %task_id, %join_error, "executor task panicked"),
        }
        if is_socket {
            self.pool.session_ended(agent_id).await;
        }

        let mut task = self
            .store
            .get(&task_id)
            .await?
            .ok_or_else(|| GatewayError::Internal(format!("task {} vanished", task_id)))?;
        let mut response_message = None;
        for event in &events {
            apply_event(&mut task, event, &mut response_message);
        }
        // A direct message closes the invocation without a terminal status
        // event; settle the stored task alongside it.
        if response_message.is_some() && !task.status.state.is_terminal() {
            task.status = TaskStatus::now(TaskState::Completed);
        }
        self.store.save(task.clone()).await?;

        Ok(match response_message {
            Some(message) => serde_json::to_value(message)?,
            None => serde_json::to_value(task)?,
        })
    }

    /// Handle `message/stream`: start the invocation and return the event
    /// consumer feeding the SSE response. Task folding and pool bookkeeping
    /// happen in the background.
    pub async fn message_stream(
        &self,
        agent_id: &str,
        params: SendMessageParams,
    ) -> GatewayResult<EventConsumer> {
        let (executor, context, is_socket) = self.begin_invocation(agent_id, &params).await?;
        let task_id = context.task_id.clone();

        let queue = EventQueue::with_default_capacity();
        // Both consumers subscribe before the executor starts publishing.
        let sse_consumer = EventConsumer::new(queue.clone());
        let mut fold_consumer = EventConsumer::new(queue.clone());

        tokio::spawn({
            let queue = queue.clone();
            async move {
                if let Err(execute_error) = executor.execute(context, queue).await {
                    error!(%execute_error, "executor returned an error");
                }
            }
        });

        let store = Arc::clone(&self.store);
        let pool = Arc::clone(&self.pool);
        let agent_id = agent_id.to_string();
        tokio::spawn(async move {
            let events = fold_consumer.collect_until_final().await;
            if is_socket {
                pool.session_ended(&agent_id).await;
            }
            match store.get(&task_id).await {
                Ok(Some(mut task)) => {
                    let mut response_message = None;
                    for event in &events {
                        apply_event(&mut task, event, &mut response_message);
                    }
                    if response_message.is_some() && !task.status.state.is_terminal() {
                        task.status = TaskStatus::now(TaskState::Completed);
                    }
                    if let Err(save_error) = store.save(task).await {
                        error!(task_id = %task_id, %save_error, "failed to persist task");
                    }
                }
                Ok(None) => warn!(task_id = %task_id, "task vanished during streaming"),
                Err(store_error) => error!(task_id = %task_id, %store_error, "task load failed"),
            }
        });

        Ok(sse_consumer)
    }

    /// Handle `tasks/get`.
    pub async fn tasks_get(&self, params: GetTaskParams) -> GatewayResult<Task> {
        self.store
            .get(&params.id)
            .await?
            .ok_or(GatewayError::TaskNotFound(params.id))
    }

    /// Handle `tasks/cancel`.
    ///
    /// When the task is in flight, the executor fires its cancel signal and
    /// the running invocation publishes the terminal event on its own bus;
    /// when nothing is in flight, the executor publishes a synthetic
    /// terminal here and the task is folded immediately.
    pub async fn tasks_cancel(&self, agent_id: &str, params: CancelTaskParams) -> GatewayResult<Task> {
        let executor = self.executor(agent_id)?;
        let mut task = self
            .store
            .get(&params.id)
            .await?
            .ok_or_else(|| GatewayError::TaskNotFound(params.id.clone()))?;

        let queue = EventQueue::with_default_capacity();
        let mut consumer = EventConsumer::new(queue.clone());
        let context = RequestContext {
            task_id: params.id.clone(),
            context_id: task.context_id.clone(),
            message: None,
            task: Some(task.clone()),
            metadata: None,
        };
        executor.cancel(context, queue).await?;

        let events = consumer.collect_until_final().await;
        let mut response_message = None;
        for event in &events {
            apply_event(&mut task, event, &mut response_message);
        }
        self.store.save(task.clone()).await?;
        Ok(task)
    }

    /// Common invocation setup: resolve the agent, mint/reuse ids, persist
    /// the working task, and bracket socket agents with pool bookkeeping.
    async fn begin_invocation(
        &self,
        agent_id: &str,
        params: &SendMessageParams,
    ) -> GatewayResult<(Arc<dyn AgentExecutor>, RequestContext, bool)> {
        let descriptor = self
            .registry
            .get(agent_id)
            .cloned()
            .ok_or_else(|| GatewayError::AgentNotFound(agent_id.to_string()))?;
        let executor = self.executor(agent_id)?;

        let message = params.message.clone();
        let task_id = message
            .task_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let context_id = message
            .context_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut task = self
            .store
            .get(&task_id)
            .await?
            .unwrap_or_else(|| Task::submitted(&task_id, &context_id));
        if params.metadata.is_some() {
            task.metadata = params.metadata.clone();
        }
        task.status = TaskStatus::now(TaskState::Working);
        task.history.get_or_insert_with(Vec::new).push(message.clone());
        self.store.save(task.clone()).await?;

        let is_socket = descriptor.transport == TransportKind::Socket;
        if is_socket {
            // A dead pool entry fails the invocation before any work starts.
            self.pool.get_or_create(&descriptor).await?;
            self.pool.session_started(agent_id).await;
        }

        let context = RequestContext {
            task_id,
            context_id,
            message: Some(message),
            task: Some(task),
            metadata: params.metadata.clone(),
        };
        Ok((executor, context, is_socket))
    }
}

/// Fold one event into the task aggregate.
fn apply_event(task: &mut Task, event: &StreamResponse, response_message: &mut Option<Message>) {
    match event {
        StreamResponse::StatusUpdate(update) => {
            task.status = update.status.clone();
            if let Some(message) = &update.status.message {
                task.history
                    .get_or_insert_with(Vec::new)
                    .push(message.clone());
            }
        }
        StreamResponse::ArtifactUpdate(update) => {
            task.artifacts
                .get_or_insert_with(Vec::new)
                .push(update.artifact.clone());
        }
        StreamResponse::Message(message) => {
            *response_message = Some(message.clone());
        }
    }
}
