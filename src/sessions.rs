//! Task session registry — maps in-flight task ids to cooperative
//! cancellation signals so a concurrent cancel request can abort streaming
//! work.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

/// Cooperative cancellation signal.
///
/// Canceling sets a flag that executors poll; it does not abort in-flight
/// I/O but promptly short-circuits post-upstream work.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
}

impl CancelSignal {
    /// A fresh, un-fired signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether the signal has been fired.
    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Thread-safe map from task id to cancellation signal.
///
/// Lookups and mutations are synchronous — nothing awaits under the lock.
#[derive(Debug, Default)]
pub struct TaskSessionRegistry {
    sessions: Mutex<HashMap<String, CancelSignal>>,
}

impl TaskSessionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a signal for an in-flight task. A duplicate registration is
    /// logged and the new signal replaces the old one.
    pub fn register(&self, task_id: &str, signal: CancelSignal) {
        let mut sessions = self.sessions.lock().expect("session registry poisoned");
        if sessions.insert(task_id.to_string(), signal).is_some() {
            warn!(task_id, "replacing existing session registration");
        } else {
            debug!(task_id, "task session registered");
        }
    }

    /// Drop a task's registration. No-op when absent.
    pub fn deregister(&self, task_id: &str) {
        let mut sessions = self.sessions.lock().expect("session registry poisoned");
        if sessions.remove(task_id).is_some() {
            debug!(task_id, "task session deregistered");
        }
    }

    /// Fire the signal for a task. Returns whether a signal was found.
    pub fn cancel(&self, task_id: &str) -> bool {
        let sessions = self.sessions.lock().expect("session registry poisoned");
        match sessions.get(task_id) {
            Some(signal) => {
                signal.cancel();
                debug!(task_id, "task session canceled");
                true
            }
            None => false,
        }
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().expect("session registry poisoned").len()
    }

    /// Whether no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
