use crate::embedding::{EmbeddingProvider, LocalEmbedding};
use crate::event_log::{EventLog, EventRecord, FileEventLog, InMemoryEventLog, MemoryEvent};
use crate::store::{FileVectorStore, InMemoryVectorStore, MemoryEntry, SearchResult, VectorStore};
use cadre_core::{CadreError, CadreResult};
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Session-scoped memory shared by every unit of an organization.
///
/// Wraps an [`EventLog`] (what happened, in order) and a [`VectorStore`]
/// (what was learned, searchable by content). Cloning is cheap and all
/// clones see the same stores.
#[derive(Clone)]
pub struct Memory {
    events: Arc<dyn EventLog>,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Memory {
    /// Assemble a memory from explicit backends.
    pub fn new(
        events: Arc<dyn EventLog>,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            events,
            store,
            embedder,
        }
    }

    /// Volatile memory with the default local embedding.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryEventLog::new()),
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(LocalEmbedding::default()),
        )
    }

    /// File-backed memory under `dir`: `events/<session>.jsonl` and `vectors.jsonl`.
    pub async fn open(dir: &Path, embedding_dimension: usize) -> CadreResult<Self> {
        let events = FileEventLog::new(dir.join("events")).await?;
        let store = FileVectorStore::new(dir.join("vectors.jsonl")).await?;
        debug!(dir = %dir.display(), "Opened file-backed memory");
        Ok(Self::new(
            Arc::new(events),
            Arc::new(store),
            Arc::new(LocalEmbedding::new(embedding_dimension)),
        ))
    }

    /// Append an event to the session log.
    pub async fn record(
        &self,
        session_id: Uuid,
        unit: &str,
        event: MemoryEvent,
    ) -> CadreResult<EventRecord> {
        self.events.append(session_id, unit, event).await
    }

    /// The last `n` events of a session, oldest first.
    pub async fn history(&self, session_id: Uuid, n: usize) -> CadreResult<Vec<EventRecord>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        self.events.recent(session_id, n).await
    }

    /// The full event log of a session.
    pub async fn events(&self, session_id: Uuid) -> CadreResult<Vec<EventRecord>> {
        self.events.read(session_id).await
    }

    /// Write `content` to the long-term store and return the entry id.
    pub async fn remember(
        &self,
        session_id: Uuid,
        content: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> CadreResult<Uuid> {
        if content.trim().is_empty() {
            return Err(CadreError::Memory("Cannot remember empty content".into()));
        }
        let entry = MemoryEntry {
            id: Uuid::new_v4(),
            content: content.to_string(),
            embedding: self.embedder.embed(content).await?,
            metadata,
            session_id: Some(session_id),
            created_at: Utc::now(),
        };
        let id = entry.id;
        self.store.insert(entry).await?;
        debug!(session_id = %session_id, entry = %id, "Stored long-term memory");
        Ok(id)
    }

    /// Top-`k` long-term entries of a session most similar to `query`.
    ///
    /// Returns nothing for a blank query or `k == 0`. Identical calls with no
    /// intervening [`remember`](Self::remember) return identical results.
    pub async fn recall(
        &self,
        session_id: Uuid,
        query: &str,
        k: usize,
    ) -> CadreResult<Vec<SearchResult>> {
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let embedding = self.embedder.embed(query).await?;
        self.store.search(&embedding, k, Some(session_id)).await
    }

    /// Number of long-term entries across all sessions.
    pub async fn entry_count(&self) -> CadreResult<usize> {
        self.store.count().await
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("embedding_dimension", &self.embedder.dimension())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recall_is_scoped_to_session() {
        let memory = Memory::in_memory();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        memory
            .remember(a, "CFO leads in Germany", HashMap::new())
            .await
            .unwrap();
        memory
            .remember(b, "CFO leads in France", HashMap::new())
            .await
            .unwrap();

        let hits = memory.recall(a, "CFO leads", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.content, "CFO leads in Germany");
    }

    #[tokio::test]
    async fn blank_query_recalls_nothing() {
        let memory = Memory::in_memory();
        let sid = Uuid::new_v4();
        memory.remember(sid, "anything", HashMap::new()).await.unwrap();
        assert!(memory.recall(sid, "   ", 5).await.unwrap().is_empty());
        assert!(memory.recall(sid, "anything", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remember_rejects_empty_content() {
        let memory = Memory::in_memory();
        assert!(memory
            .remember(Uuid::new_v4(), "", HashMap::new())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn history_zero_is_empty() {
        let memory = Memory::in_memory();
        let sid = Uuid::new_v4();
        memory
            .record(sid, "w", MemoryEvent::Note { content: "x".into() })
            .await
            .unwrap();
        assert!(memory.history(sid, 0).await.unwrap().is_empty());
        assert_eq!(memory.history(sid, 1).await.unwrap().len(), 1);
    }
}
