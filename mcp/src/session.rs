//! Per-transport session state: small recency ring-buffers, created lazily
//! on first query and kept in a process-wide map keyed by transport id.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::RwLock;

const RECENCY_CAP: usize = 10;

#[derive(Debug, Default, Clone, Serialize)]
pub struct Session {
    pub recent_searches: Vec<String>,
    pub recent_entities: Vec<String>,
    pub recent_paths: Vec<String>,
}

fn push_recent(list: &mut Vec<String>, item: String) {
    list.retain(|existing| existing != &item);
    list.insert(0, item);
    list.truncate(RECENCY_CAP);
}

impl Session {
    pub fn note_search(&mut self, query: &str) {
        push_recent(&mut self.recent_searches, query.to_string());
    }

    pub fn note_entity(&mut self, entity_id: &str) {
        push_recent(&mut self.recent_entities, entity_id.to_string());
    }

    pub fn note_path(&mut self, source_id: &str, target_id: &str) {
        push_recent(&mut self.recent_paths, format!("{source_id}->{target_id}"));
    }
}

/// Process-wide session map, one entry per transport id.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_session<F, R>(&self, transport_id: &str, f: F) -> R
    where
        F: FnOnce(&mut Session) -> R,
    {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(transport_id.to_string()).or_default();
        f(session)
    }
}
