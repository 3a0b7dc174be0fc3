use async_trait::async_trait;
use cadre_core::{CadreError, CadreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Something a unit chose to remember, with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Entry identifier.
    pub id: Uuid,
    /// The remembered text.
    pub content: String,
    /// Embedding of `content`.
    pub embedding: Vec<f32>,
    /// Free-form metadata supplied by the writer.
    pub metadata: HashMap<String, serde_json::Value>,
    /// Owning session, if any.
    pub session_id: Option<Uuid>,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
}

/// One hit of a similarity search.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// The matching entry.
    pub entry: MemoryEntry,
    /// Cosine similarity to the query.
    pub score: f32,
}

/// Long-term store searched by embedding similarity.
///
/// Entries are never updated or evicted.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Add an entry.
    async fn insert(&self, entry: MemoryEntry) -> CadreResult<()>;

    /// The `top_k` entries most similar to `query`, best first, restricted to
    /// `session` when given. Equal scores keep insertion order.
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        session: Option<Uuid>,
    ) -> CadreResult<Vec<SearchResult>>;

    /// Number of entries across all sessions.
    async fn count(&self) -> CadreResult<usize>;
}

/// Score `entries` against `query` and keep the best `top_k`.
fn rank(
    entries: &[MemoryEntry],
    query: &[f32],
    top_k: usize,
    session: Option<Uuid>,
) -> CadreResult<Vec<SearchResult>> {
    if query.is_empty() {
        return Err(CadreError::Memory("Empty query embedding".into()));
    }
    let mut hits: Vec<(usize, f32)> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| session.is_none() || e.session_id == session)
        .map(|(i, e)| (i, cosine(query, &e.embedding)))
        .collect();
    // sort_by is stable
    hits.sort_by(|a, b| b.1.total_cmp(&a.1));
    Ok(hits
        .into_iter()
        .take(top_k)
        .map(|(i, score)| SearchResult {
            entry: entries[i].clone(),
            score,
        })
        .collect())
}

/// Cosine similarity; 0 for mismatched lengths or zero vectors.
pub(crate) fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let (dot, na, nb) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

// ---------------------------------------------------------------------------
// InMemoryVectorStore
// ---------------------------------------------------------------------------

/// Vector store held in process memory; brute-force search.
#[derive(Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<Vec<MemoryEntry>>,
}

impl InMemoryVectorStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn insert(&self, entry: MemoryEntry) -> CadreResult<()> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        session: Option<Uuid>,
    ) -> CadreResult<Vec<SearchResult>> {
        rank(&self.entries.read().await, query, top_k, session)
    }

    async fn count(&self) -> CadreResult<usize> {
        Ok(self.entries.read().await.len())
    }
}

// ---------------------------------------------------------------------------
// FileVectorStore
// ---------------------------------------------------------------------------

/// Vector store backed by a JSONL file, one entry per line.
///
/// The file is read once on open; inserts append a line, then update the
/// in-memory copy, so file order and search order agree.
pub struct FileVectorStore {
    path: PathBuf,
    entries: RwLock<Vec<MemoryEntry>>,
    file: Mutex<tokio::fs::File>,
}

impl FileVectorStore {
    /// Open the store at `path`, creating the file and its directory if needed.
    pub async fn new(path: PathBuf) -> CadreResult<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let entries = if path.exists() {
            load_entries(&path).await?
        } else {
            Vec::new()
        };
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                CadreError::Memory(format!("Cannot open vector store {}: {e}", path.display()))
            })?;
        debug!(path = %path.display(), entries = entries.len(), "Vector store opened");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
            file: Mutex::new(file),
        })
    }
}

async fn load_entries(path: &std::path::Path) -> CadreResult<Vec<MemoryEntry>> {
    let data = tokio::fs::read_to_string(path).await?;
    let mut entries = Vec::new();
    for (n, line) in data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(line).map_err(|e| {
            CadreError::Memory(format!("{} line {}: {e}", path.display(), n + 1))
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

#[async_trait]
impl VectorStore for FileVectorStore {
    async fn insert(&self, entry: MemoryEntry) -> CadreResult<()> {
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await.map_err(|e| {
            CadreError::Memory(format!("Write to {} failed: {e}", self.path.display()))
        })?;
        file.flush().await?;
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        session: Option<Uuid>,
    ) -> CadreResult<Vec<SearchResult>> {
        rank(&self.entries.read().await, query, top_k, session)
    }

    async fn count(&self) -> CadreResult<usize> {
        Ok(self.entries.read().await.len())
    }
}
