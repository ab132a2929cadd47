//! Task store — persistence for A2A tasks.
//!
//! The executor path only needs save/load of single tasks; implementations
//! must serialize per-task mutations. [`InMemoryTaskStore`] suits
//! single-instance deployments; [`RedisTaskStore`] makes tasks survive
//! restarts and shared across replicas.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::types::Task;

/// Trait for persisting and retrieving A2A tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Save or overwrite a task.
    async fn save(&self, task: Task) -> GatewayResult<()>;

    /// Retrieve a task by id. `None` when absent.
    async fn get(&self, task_id: &str) -> GatewayResult<Option<Task>>;

    /// Delete a task by id. Silently succeeds when absent.
    async fn delete(&self, task_id: &str) -> GatewayResult<()>;
}

/// In-memory task store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: Arc<RwLock<HashMap<String, Task>>>,
}

impl InMemoryTaskStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn save(&self, task: Task) -> GatewayResult<()> {
        let mut tasks = self.tasks.write().await;
        debug!(task_id = %task.id, state = %task.status.state, "task saved");
        tasks.insert(task.id.clone(), task);
        Ok(())
    }

    async fn get(&self, task_id: &str) -> GatewayResult<Option<Task>> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(task_id).cloned())
    }

    async fn delete(&self, task_id: &str) -> GatewayResult<()> {
        let mut tasks = self.tasks.write().await;
        if tasks.remove(task_id).is_none() {
            warn!(task_id, "deleted task was not in the store");
        }
        Ok(())
    }
}

/// Redis-backed task store.
///
/// Tasks live under `<prefix><task_id>` as JSON strings with a per-key TTL,
/// so abandoned tasks expire on their own.
pub struct RedisTaskStore {
    connection: redis::aio::ConnectionManager,
    prefix: String,
    ttl_seconds: u64,
}

impl RedisTaskStore {
    /// Connect to Redis. Fails fast — a bad URL or unreachable server is a
    /// startup error, never a request-time one.
    pub async fn connect(url: &str, prefix: &str, ttl_seconds: u64) -> GatewayResult<Self> {
        let client = redis::Client::open(url)?;
        let connection = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self {
            connection,
            prefix: prefix.to_string(),
            ttl_seconds,
        })
    }

    fn key(&self, task_id: &str) -> String {
        format!("{}{}", self.prefix, task_id)
    }
}

#[async_trait]
impl TaskStore for RedisTaskStore {
    async fn save(&self, task: Task) -> GatewayResult<()> {
        let payload = serde_json::to_string(&task)
            .map_err(|error| GatewayError::Store(error.to_string()))?;
        let mut connection = self.connection.clone();
        let _: () = connection
            .set_ex(self.key(&task.id), payload, self.ttl_seconds)
            .await?;
        debug!(task_id = %task.id, "task saved to redis");
        Ok(())
    }

    async fn get(&self, task_id: &str) -> GatewayResult<Option<Task>> {
        let mut connection = self.connection.clone();
        let payload: Option<String> = connection.get(self.key(task_id)).await?;
        match payload {
            Some(raw) => {
                let task = serde_json::from_str(&raw)
                    .map_err(|error| GatewayError::Store(error.to_string()))?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, task_id: &str) -> GatewayResult<()> {
        let mut connection = self.connection.clone();
        let _: () = connection.del(self.key(task_id)).await?;
        Ok(())
    }
}
