use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;

use super::hub::{DEFAULT_BUFFER_CAPACITY, DEFAULT_LISTENER_CAPACITY, EventBroker};

/// Explicit owner of per-session brokers.
///
/// One broker exists per client-visible unit of work (an analysis run or a
/// chat turn). There is no ambient global map: callers construct a manager
/// and pass it to whoever needs session lookup.
pub struct SessionManager {
    sessions: Mutex<FxHashMap<String, Arc<EventBroker>>>,
    buffer_capacity: usize,
    listener_capacity: usize,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY, DEFAULT_LISTENER_CAPACITY)
    }
}

impl SessionManager {
    pub fn new(buffer_capacity: usize, listener_capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(FxHashMap::default()),
            buffer_capacity,
            listener_capacity,
        }
    }

    /// Fetch the broker for `session_id`, creating it on first use.
    pub fn get_or_create(&self, session_id: &str) -> Arc<EventBroker> {
        let mut sessions = self.sessions.lock().expect("session map lock poisoned");
        Arc::clone(sessions.entry(session_id.to_string()).or_insert_with(|| {
            tracing::debug!(session = %session_id, "broker created");
            Arc::new(EventBroker::new(
                self.buffer_capacity,
                self.listener_capacity,
            ))
        }))
    }

    /// Fetch an existing broker without creating one.
    pub fn get(&self, session_id: &str) -> Option<Arc<EventBroker>> {
        let sessions = self.sessions.lock().expect("session map lock poisoned");
        sessions.get(session_id).cloned()
    }

    /// Tear down and forget the session's broker. No-op for unknown ids.
    pub fn remove(&self, session_id: &str) {
        let broker = {
            let mut sessions = self.sessions.lock().expect("session map lock poisoned");
            sessions.remove(session_id)
        };
        if let Some(broker) = broker {
            broker.teardown();
            tracing::debug!(session = %session_id, "broker removed");
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().expect("session map lock poisoned").len()
    }
}
