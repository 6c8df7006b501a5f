//! Chat session cache (C12, data model §3): TTL eviction + LRU-by-last-
//! access eviction when over a max-size cap, guarded by a single mutex per
//! spec §5 ("the mutex is held only for insert/lookup/eviction, never
//! across generation"). Generalizes the teacher's `DashMap<String,
//! McpSession>` + idle-pruning loop in `server/src/main.rs` from an MCP
//! session map into a chat session cache with an explicit cap.

use crate::model::{ChatMessage, ChatRole};
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const DEFAULT_SESSION_ID: &str = "default";

#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    pub messages: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn push(&mut self, role: ChatRole, content: String) {
        self.messages.push(ChatMessage { role, content, timestamp: chrono::Utc::now() });
    }

    /// Last `n` turns, oldest first (spec §4.12 step 4: "last ≤10 turns").
    pub fn last_turns(&self, n: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }
}

/// Sessions plus last-access times, with TTL + max-size enforcement. Not
/// `Sync` by itself — callers wrap it in one `Mutex`/`RwLock`.
pub struct ChatSessionCache {
    sessions: HashMap<String, ChatSession>,
    last_access: HashMap<String, Instant>,
    ttl: Duration,
    max_sessions: usize,
}

impl ChatSessionCache {
    pub fn new(ttl: Duration, max_sessions: usize) -> Self {
        Self { sessions: HashMap::new(), last_access: HashMap::new(), ttl, max_sessions }
    }

    /// Evict TTL-expired sessions relative to `now`.
    pub fn evict_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .last_access
            .iter()
            .filter(|(_, &t)| now.duration_since(t) > self.ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            self.sessions.remove(&id);
            self.last_access.remove(&id);
        }
    }

    /// Evict the least-recently-used session(s) until under the cap.
    fn evict_lru_if_over_cap(&mut self) {
        while self.sessions.len() > self.max_sessions {
            if let Some((lru_id, _)) = self.last_access.iter().min_by_key(|(_, &t)| t).map(|(id, t)| (id.clone(), *t)) {
                self.sessions.remove(&lru_id);
                self.last_access.remove(&lru_id);
            } else {
                break;
            }
        }
    }

    /// Get-or-create the session for `session_id`, refreshing its access
    /// time, evicting expired entries and enforcing the cap first.
    pub fn get_or_create(&mut self, session_id: &str, now: Instant) -> &mut ChatSession {
        self.evict_expired(now);
        if !self.sessions.contains_key(session_id) {
            self.sessions.insert(session_id.to_string(), ChatSession::default());
        }
        self.last_access.insert(session_id.to_string(), now);
        self.evict_lru_if_over_cap();
        self.sessions.get_mut(session_id).expect("just inserted")
    }

    pub fn get(&self, session_id: &str) -> Option<&ChatSession> {
        self.sessions.get(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_eviction() {
        let mut cache = ChatSessionCache::new(Duration::from_secs(60), 100);
        let t0 = Instant::now();
        cache.get_or_create("s1", t0);
        assert_eq!(cache.len(), 1);
        let t1 = t0 + Duration::from_secs(61);
        cache.evict_expired(t1);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn lru_eviction_over_cap() {
        let mut cache = ChatSessionCache::new(Duration::from_secs(3600), 2);
        let t0 = Instant::now();
        cache.get_or_create("s1", t0);
        cache.get_or_create("s2", t0 + Duration::from_secs(1));
        cache.get_or_create("s3", t0 + Duration::from_secs(2));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("s1").is_none(), "least-recently-used session should be evicted");
        assert!(cache.get("s2").is_some());
        assert!(cache.get("s3").is_some());
    }

    #[test]
    fn last_turns_caps_history() {
        let mut session = ChatSession::default();
        for i in 0..15 {
            session.push(ChatRole::User, format!("message {i}"));
        }
        assert_eq!(session.last_turns(10).len(), 10);
        assert_eq!(session.last_turns(10).last().unwrap().content, "message 14");
    }
}
