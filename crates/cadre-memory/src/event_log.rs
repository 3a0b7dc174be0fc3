use async_trait::async_trait;
use cadre_core::{CadreError, CadreResult, FailureKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// MemoryEvent
// ---------------------------------------------------------------------------

/// Something a unit did or observed during a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoryEvent {
    /// A unit accepted a task.
    TaskReceived {
        /// Task text.
        task: String,
    },
    /// A parent handed a sub-task to a child.
    Delegated {
        /// Child unit name.
        child: String,
        /// Sub-task text.
        task: String,
    },
    /// A worker invoked one of its tools.
    ToolCalled {
        /// Model-assigned call id.
        call_id: String,
        /// Tool name.
        tool: String,
        /// Arguments as sent by the model.
        arguments: serde_json::Value,
    },
    /// A tool returned (or failed).
    ToolReturned {
        /// Model-assigned call id.
        call_id: String,
        /// Tool name.
        tool: String,
        /// Tool output or error text.
        content: String,
        /// Whether the call failed.
        is_error: bool,
    },
    /// Free-form note, e.g. a reasoning step.
    Note {
        /// Note text.
        content: String,
    },
    /// A unit produced a result.
    Completed {
        /// Result status.
        status: String,
        /// Result output text.
        output: String,
    },
    /// A unit failed.
    Failed {
        /// Failure classification.
        kind: FailureKind,
        /// Failure message.
        message: String,
    },
}

impl MemoryEvent {
    /// One-line rendering used when feeding history to a model.
    pub fn describe(&self) -> String {
        match self {
            MemoryEvent::TaskReceived { task } => format!("task received: {task}"),
            MemoryEvent::Delegated { child, task } => format!("delegated to {child}: {task}"),
            MemoryEvent::ToolCalled {
                tool, arguments, ..
            } => format!("called {tool} with {arguments}"),
            MemoryEvent::ToolReturned {
                tool,
                content,
                is_error,
                ..
            } => {
                if *is_error {
                    format!("{tool} failed: {content}")
                } else {
                    format!("{tool} returned: {content}")
                }
            }
            MemoryEvent::Note { content } => format!("note: {content}"),
            MemoryEvent::Completed { status, output } => format!("completed ({status}): {output}"),
            MemoryEvent::Failed { kind, message } => format!("failed ({kind}): {message}"),
        }
    }
}

// ---------------------------------------------------------------------------
// EventRecord
// ---------------------------------------------------------------------------

/// A [`MemoryEvent`] as stored in the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position within the session, starting at 0.
    pub seq: u64,
    /// Record identifier.
    pub id: Uuid,
    /// Owning session.
    pub session_id: Uuid,
    /// Name of the unit that recorded the event.
    pub unit: String,
    /// Append time.
    pub timestamp: DateTime<Utc>,
    /// The event itself.
    pub event: MemoryEvent,
}

impl EventRecord {
    fn new(seq: u64, session_id: Uuid, unit: &str, event: MemoryEvent) -> Self {
        Self {
            seq,
            id: Uuid::new_v4(),
            session_id,
            unit: unit.to_string(),
            timestamp: Utc::now(),
            event,
        }
    }
}

// ---------------------------------------------------------------------------
// EventLog trait
// ---------------------------------------------------------------------------

/// Append-only, per-session event log.
///
/// Records are never modified or removed. Sequence numbers are dense and
/// assigned at append time, so `read` always returns records in append order.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append an event and return the stored record.
    async fn append(
        &self,
        session_id: Uuid,
        unit: &str,
        event: MemoryEvent,
    ) -> CadreResult<EventRecord>;

    /// Every record of a session, oldest first.
    async fn read(&self, session_id: Uuid) -> CadreResult<Vec<EventRecord>>;

    /// The last `n` records of a session, oldest first.
    async fn recent(&self, session_id: Uuid, n: usize) -> CadreResult<Vec<EventRecord>> {
        let mut all = self.read(session_id).await?;
        let start = all.len().saturating_sub(n);
        Ok(all.split_off(start))
    }
}

// ---------------------------------------------------------------------------
// InMemoryEventLog
// ---------------------------------------------------------------------------

/// Event log held in process memory.
#[derive(Default)]
pub struct InMemoryEventLog {
    sessions: RwLock<HashMap<Uuid, Vec<EventRecord>>>,
}

impl InMemoryEventLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn append(
        &self,
        session_id: Uuid,
        unit: &str,
        event: MemoryEvent,
    ) -> CadreResult<EventRecord> {
        let mut sessions = self.sessions.write().await;
        let records = sessions.entry(session_id).or_default();
        let record = EventRecord::new(records.len() as u64, session_id, unit, event);
        records.push(record.clone());
        Ok(record)
    }

    async fn read(&self, session_id: Uuid) -> CadreResult<Vec<EventRecord>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&session_id).cloned().unwrap_or_default())
    }

    async fn recent(&self, session_id: Uuid, n: usize) -> CadreResult<Vec<EventRecord>> {
        let sessions = self.sessions.read().await;
        let Some(records) = sessions.get(&session_id) else {
            return Ok(Vec::new());
        };
        let start = records.len().saturating_sub(n);
        Ok(records[start..].to_vec())
    }
}

// ---------------------------------------------------------------------------
// FileEventLog
// ---------------------------------------------------------------------------

/// Event log persisted as one `<session>.jsonl` file per session.
///
/// Appends hold the write side of `next_seq`, reads the read side, so a read
/// never sees a line that is still being written. A trailing line that does
/// not parse (a write cut short by a crash) is skipped on read and cut off
/// before the next append.
pub struct FileEventLog {
    dir: PathBuf,
    // Next sequence number per session, once the file has been checked.
    next_seq: RwLock<HashMap<Uuid, u64>>,
}

/// A session file as found on disk.
struct Loaded {
    records: Vec<EventRecord>,
    /// Bytes up to and including the last good line.
    good_len: u64,
    /// Whether the last good line ends with a newline.
    terminated: bool,
    /// Whether anything follows `good_len`.
    torn: bool,
}

impl FileEventLog {
    /// Open (and create if needed) a log rooted at `dir`.
    pub async fn new(dir: PathBuf) -> CadreResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            next_seq: RwLock::new(HashMap::new()),
        })
    }

    fn session_path(&self, session_id: Uuid) -> PathBuf {
        self.dir.join(format!("{session_id}.jsonl"))
    }

    async fn load(&self, session_id: Uuid) -> CadreResult<Loaded> {
        let path = self.session_path(session_id);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let blank = |line: &[u8]| line.iter().all(u8::is_ascii_whitespace);
        let lines: Vec<&[u8]> = data.split_inclusive(|b| *b == b'\n').collect();
        let last_content = lines.iter().rposition(|l| !blank(l));
        let mut loaded = Loaded {
            records: Vec::new(),
            good_len: 0,
            terminated: true,
            torn: false,
        };
        let mut offset = 0u64;
        for (i, line) in lines.iter().enumerate() {
            offset += line.len() as u64;
            if blank(line) {
                loaded.good_len = offset;
                continue;
            }
            match serde_json::from_slice::<EventRecord>(line) {
                Ok(record) => {
                    loaded.records.push(record);
                    loaded.good_len = offset;
                    loaded.terminated = line.ends_with(b"\n");
                }
                Err(e) if Some(i) == last_content => {
                    warn!(session_id = %session_id, error = %e, "Skipping torn last line of event log");
                    loaded.torn = true;
                    break;
                }
                Err(e) => {
                    return Err(CadreError::Memory(format!(
                        "Corrupt event log for session {session_id}, line {}: {e}",
                        i + 1
                    )));
                }
            }
        }
        loaded.records.sort_by_key(|r| r.seq);
        Ok(loaded)
    }

    /// Cut a torn tail and terminate the last good line, so the next append
    /// starts on a fresh line. Returns the next sequence number.
    async fn repair(&self, session_id: Uuid) -> CadreResult<u64> {
        let loaded = self.load(session_id).await?;
        let path = self.session_path(session_id);
        if loaded.torn {
            let file = tokio::fs::OpenOptions::new().write(true).open(&path).await?;
            file.set_len(loaded.good_len).await?;
            warn!(session_id = %session_id, kept_bytes = loaded.good_len, "Truncated torn event log");
        }
        if !loaded.terminated {
            let mut file = tokio::fs::OpenOptions::new().append(true).open(&path).await?;
            file.write_all(b"\n").await?;
        }
        Ok(loaded.records.last().map_or(0, |r| r.seq + 1))
    }
}

#[async_trait]
impl EventLog for FileEventLog {
    async fn append(
        &self,
        session_id: Uuid,
        unit: &str,
        event: MemoryEvent,
    ) -> CadreResult<EventRecord> {
        let mut next_seq = self.next_seq.write().await;
        let seq = match next_seq.get(&session_id) {
            Some(seq) => *seq,
            None => self.repair(session_id).await?,
        };

        let record = EventRecord::new(seq, session_id, unit, event);
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.session_path(session_id))
            .await
            .map_err(|e| CadreError::Memory(format!("Failed to open event log: {e}")))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| CadreError::Memory(format!("Failed to write event: {e}")))?;
        file.flush().await?;

        next_seq.insert(session_id, seq + 1);
        Ok(record)
    }

    async fn read(&self, session_id: Uuid) -> CadreResult<Vec<EventRecord>> {
        let _appends = self.next_seq.read().await;
        Ok(self.load(session_id).await?.records)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
