//! Per-session conversation memory.
//!
//! The engine returns [`MemoryUpdates`] diffs; this store owns the
//! authoritative merge and the storage. Sessions are bounded: once the cap is
//! reached, the least recently touched session is evicted.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::config::AgentConfig;
use crate::types::{ConversationMemory, MemoryUpdates};

pub struct SessionStore {
    inner: RwLock<Inner>,
    max_sessions: usize,
}

struct Inner {
    sessions: HashMap<String, ConversationMemory>,
    // Touch order, least recent first.
    order: Vec<String>,
}

impl SessionStore {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            inner: RwLock::new(Inner {
                sessions: HashMap::new(),
                order: Vec::new(),
            }),
            max_sessions: config.max_sessions,
        }
    }

    /// Snapshot of a session's memory, if the session exists.
    pub fn get(&self, session_id: &str) -> Option<ConversationMemory> {
        self.inner.read().sessions.get(session_id).cloned()
    }

    /// Merge a diff into the session's memory, creating the session if
    /// needed. `None` fields leave the stored value alone; an empty
    /// `last_query` clears it.
    pub fn apply(&self, session_id: &str, updates: MemoryUpdates) -> ConversationMemory {
        let mut inner = self.inner.write();
        inner.touch(session_id, self.max_sessions);

        let memory = inner
            .sessions
            .entry(session_id.to_string())
            .or_default();

        match updates.last_query {
            Some(q) if q.is_empty() => memory.last_query = None,
            Some(q) => memory.last_query = Some(q),
            None => {}
        }
        if let Some(topic) = updates.last_topic {
            memory.last_topic = Some(topic);
        }
        if let Some(entities) = updates.recent_entities {
            memory.recent_entities = entities;
        }
        if let Some(carryover) = updates.context_carryover {
            memory.context_carryover = carryover;
        }

        memory.clone()
    }

    /// Drop a session outright.
    pub fn remove(&self, session_id: &str) {
        let mut inner = self.inner.write();
        inner.sessions.remove(session_id);
        inner.order.retain(|id| id != session_id);
    }

    pub fn len(&self) -> usize {
        self.inner.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().sessions.is_empty()
    }
}

impl Inner {
    fn touch(&mut self, session_id: &str, max_sessions: usize) {
        self.order.retain(|id| id != session_id);
        self.order.push(session_id.to_string());

        while self.order.len() > max_sessions {
            let evicted = self.order.remove(0);
            self.sessions.remove(&evicted);
            debug!(session = %evicted, "evicted least recently used session");
        }
    }
}
