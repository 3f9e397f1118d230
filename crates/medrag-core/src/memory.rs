//! Vector Memory
//!
//! Session-scoped semantic recall (§4.11). Kept entirely in-process rather
//! than in the relational store: the non-goal in §1 explicitly excludes
//! "persisting chat transcripts beyond a process-local session", and at the
//! per-session cap of 256 items a brute-force cosine scan is simpler and
//! fast enough that the shared HNSW index in [`crate::store`] would be
//! overkill. Partitioned by session id; cross-session access is forbidden
//! by construction (§5) — every operation takes a session id and only ever
//! touches that session's deque.
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::Utc;

use crate::embeddings::Embedding;
use crate::models::MemoryItem;

/// Default per-session eviction cap (§4.11).
pub const DEFAULT_CAPACITY: usize = 256;

/// Similarity threshold below which the Agent Controller must not inject a
/// recalled memory (§4.10 step 1).
pub const RECALL_SIMILARITY_THRESHOLD: f32 = 0.3;

/// Default number of recalled items prepended to a turn (§4.10 step 1).
pub const DEFAULT_RECALL_TOP_K: usize = 3;

struct StoredItem {
    item: MemoryItem,
    embedding: Embedding,
}

/// One recalled fact and its similarity to the query.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RecallHit {
    pub text: String,
    pub similarity: f32,
}

/// Per-session memory statistics (backs the `get_memory_stats` tool).
#[derive(Debug, Clone, serde::Serialize)]
pub struct MemoryStats {
    pub session_id: String,
    pub item_count: usize,
    pub capacity: usize,
    pub oldest: Option<chrono::DateTime<Utc>>,
    pub newest: Option<chrono::DateTime<Utc>>,
}

struct SessionMemory {
    items: VecDeque<StoredItem>,
}

impl SessionMemory {
    fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }
}

/// The session-scoped memory store. One instance per process, internally
/// synchronized (§5), keyed by session id.
pub struct VectorMemory {
    sessions: Mutex<HashMap<String, SessionMemory>>,
    capacity: usize,
}

impl Default for VectorMemory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl VectorMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// `remember(session, text)` (§4.11). Evicts the oldest item first once
    /// the session is at capacity.
    pub fn remember(&self, session_id: &str, text: impl Into<String>, embedding: Embedding) {
        let mut sessions = self.sessions.lock().expect("memory lock poisoned");
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(SessionMemory::new);

        if session.items.len() >= self.capacity {
            session.items.pop_front();
        }
        session.items.push_back(StoredItem {
            item: MemoryItem {
                session_id: session_id.to_string(),
                text: text.into(),
                created_at: Utc::now(),
            },
            embedding,
        });
    }

    /// `recall(session, query, top_k)` (§4.11): cosine similarity over this
    /// session's stored embeddings only, descending.
    pub fn recall(&self, session_id: &str, query: &Embedding, top_k: usize) -> Vec<RecallHit> {
        let sessions = self.sessions.lock().expect("memory lock poisoned");
        let Some(session) = sessions.get(session_id) else {
            return Vec::new();
        };

        let mut scored: Vec<RecallHit> = session
            .items
            .iter()
            .map(|stored| RecallHit {
                text: stored.item.text.clone(),
                similarity: stored.embedding.cosine_similarity(query),
            })
            .collect();

        scored.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        scored
    }

    /// The recall used by the Agent Controller (§4.10 step 1): top-3,
    /// filtered to similarity > 0.3.
    pub fn recall_for_turn(&self, session_id: &str, query: &Embedding) -> Vec<RecallHit> {
        self.recall(session_id, query, DEFAULT_RECALL_TOP_K)
            .into_iter()
            .filter(|hit| hit.similarity > RECALL_SIMILARITY_THRESHOLD)
            .collect()
    }

    pub fn stats(&self, session_id: &str) -> MemoryStats {
        let sessions = self.sessions.lock().expect("memory lock poisoned");
        match sessions.get(session_id) {
            Some(session) => MemoryStats {
                session_id: session_id.to_string(),
                item_count: session.items.len(),
                capacity: self.capacity,
                oldest: session.items.front().map(|s| s.item.created_at),
                newest: session.items.back().map(|s| s.item.created_at),
            },
            None => MemoryStats {
                session_id: session_id.to_string(),
                item_count: 0,
                capacity: self.capacity,
                oldest: None,
                newest: None,
            },
        }
    }

    pub fn clear(&self, session_id: &str) {
        self.sessions
            .lock()
            .expect("memory lock poisoned")
            .remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn recall_is_scoped_to_its_own_session() {
        let memory = VectorMemory::new(10);
        memory.remember("session-a", "patient prefers morning appointments", emb(&[1.0, 0.0]));
        memory.remember("session-b", "patient allergic to penicillin", emb(&[1.0, 0.0]));

        let hits = memory.recall("session-a", &emb(&[1.0, 0.0]), 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "patient prefers morning appointments");
    }

    #[test]
    fn recall_for_turn_drops_low_similarity_hits() {
        let memory = VectorMemory::new(10);
        memory.remember("s1", "unrelated fact", emb(&[0.0, 1.0]));

        let hits = memory.recall_for_turn("s1", &emb(&[1.0, 0.0]));
        assert!(hits.is_empty());
    }

    #[test]
    fn eviction_drops_oldest_first_at_capacity() {
        let memory = VectorMemory::new(2);
        memory.remember("s1", "first", emb(&[1.0, 0.0]));
        memory.remember("s1", "second", emb(&[1.0, 0.0]));
        memory.remember("s1", "third", emb(&[1.0, 0.0]));

        let stats = memory.stats("s1");
        assert_eq!(stats.item_count, 2);
        let hits = memory.recall("s1", &emb(&[1.0, 0.0]), 10);
        assert!(hits.iter().any(|h| h.text == "third"));
        assert!(!hits.iter().any(|h| h.text == "first"));
    }
}
