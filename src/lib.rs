//! # cognigy-a2a-gateway — Cognigy.AI flows as A2A agents
//!
//! A protocol-translation gateway that exposes Cognigy.AI flows as
//! first-class agents speaking the open Agent-to-Agent (A2A) JSON-RPC 2.0
//! protocol, v0.3.0. External A2A clients discover agents via well-known
//! endpoints and invoke them via `message/send`; the gateway translates each
//! invocation into a backend call, normalizes the backend's heterogeneous
//! output format into A2A event streams, and enforces task lifecycle
//! semantics including streaming, cancellation, and failure states.
//!
//! ## Architecture
//!
//! Data flow for a single invocation:
//!
//! ```text
//! A2A client ──POST /agents/:id/──► routes ──► request handler
//!     ▲                                             │
//!     │ events (SSE / JSON-RPC result)              ▼
//!     └──────── event queue ◄──── FlowExecutor ──► FlowAdapter ──► Cognigy
//!                                      │                endpoint (REST/SOCKET)
//!                                      ▼
//!                               output normalizer
//! ```
//!
//! - [`upstream`] — the two interchangeable backend strategies:
//!   [`upstream::RestAdapter`] (one-shot HTTP POST) and
//!   [`upstream::SocketAdapter`] (per-invocation WebSocket session), both
//!   yielding sequences of [`upstream::RawOutput`] records.
//! - [`normalizer`] — pure translation of each raw output into either a
//!   status-message payload or a media artifact, always with a rendered
//!   text fallback.
//! - [`executor`] — the per-request orchestrator driving one adapter and
//!   routing normalized outputs onto the event queue.
//! - [`pool`] — long-lived upstream connection tracking with a formal state
//!   machine, jittered exponential backoff and idle eviction.
//! - [`sessions`] — in-flight task registry enabling cooperative cancel.
//! - [`registry`] — resolved agent descriptors plus precomputed discovery
//!   cards.
//! - [`server`] — the A2A server layer: event queue, task stores, JSON-RPC
//!   request handling and the axum routes.
//! - [`config`] — environment settings and the agents config file with
//!   `${VAR}` placeholder resolution.

pub mod config;
pub mod error;
pub mod executor;
pub mod normalizer;
pub mod pool;
pub mod registry;
pub mod server;
pub mod sessions;
pub mod types;
pub mod upstream;

pub use error::{GatewayError, GatewayResult};
