//! A2A server layer — the event bus, execution contract, task stores,
//! JSON-RPC request handling and the HTTP routes.

pub mod agent_execution;
pub mod event_queue;
pub mod request_handler;
pub mod routes;
pub mod task_store;

pub use agent_execution::{AgentExecutor, RequestContext};
pub use event_queue::{EventConsumer, EventQueue};
pub use request_handler::RequestHandler;
pub use routes::gateway_router;
pub use task_store::{InMemoryTaskStore, RedisTaskStore, TaskStore};
