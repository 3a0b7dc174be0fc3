//! Shared, session-scoped memory for Cadre units.
//!
//! Two stores back every session: an append-only event log that units read
//! for recent context, and a similarity-indexed long-term store queried by
//! content. Both outlive any single task; neither evicts.
//!
//! # Main types
//!
//! - [`Memory`]: Handle injected into every unit: `record` / `recall` / `remember`.
//! - [`EventLog`]: Trait for append-only per-session event logs.
//! - [`InMemoryEventLog`], [`FileEventLog`]: Event log backends.
//! - [`VectorStore`]: Trait for storing and querying embedding vectors.
//! - [`InMemoryVectorStore`], [`FileVectorStore`]: Vector store backends.
//! - [`LocalEmbedding`]: Local hashed bag-of-words embedding provider.

/// Embedding provider trait and local implementation.
pub mod embedding;
/// Append-only session event log.
pub mod event_log;
/// The memory handle shared by all units.
pub mod memory;
/// Vector store trait and file-backed implementation.
pub mod store;

pub use embedding::{EmbeddingProvider, LocalEmbedding};
pub use event_log::{EventLog, EventRecord, FileEventLog, InMemoryEventLog, MemoryEvent};
pub use memory::Memory;
pub use store::{FileVectorStore, InMemoryVectorStore, MemoryEntry, SearchResult, VectorStore};
