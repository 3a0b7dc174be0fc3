use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Where a task came from and any caller-supplied annotations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Submitting channel: `cli`, `http`, `schedule`, `delegation`, ...
    pub channel: Option<String>,
    /// When the task was issued.
    pub issued_at: DateTime<Utc>,
    /// Free-form annotations.
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for TaskMetadata {
    fn default() -> Self {
        Self {
            channel: None,
            issued_at: Utc::now(),
            extra: HashMap::new(),
        }
    }
}

/// A unit of work submitted to a unit.
///
/// Tasks are immutable once issued. A parent that hands work to a child
/// derives a new task with [`Task::derive`] instead of editing its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    id: Uuid,
    text: String,
    session_id: Uuid,
    parent_id: Option<Uuid>,
    metadata: TaskMetadata,
}

impl Task {
    /// A new top-level task in `session_id`.
    pub fn new(text: impl Into<String>, session_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            session_id,
            parent_id: None,
            metadata: TaskMetadata::default(),
        }
    }

    /// Tag the submitting channel before the task is issued.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.metadata.channel = Some(channel.into());
        self
    }

    /// Attach a free-form annotation before the task is issued.
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.extra.insert(key.into(), value);
        self
    }

    /// A sub-task in the same session, linked back to this one.
    ///
    /// Annotations carry over; the channel becomes `delegation`.
    pub fn derive(&self, text: impl Into<String>) -> Task {
        Task {
            id: Uuid::new_v4(),
            text: text.into(),
            session_id: self.session_id,
            parent_id: Some(self.id),
            metadata: TaskMetadata {
                channel: Some("delegation".into()),
                issued_at: Utc::now(),
                extra: self.metadata.extra.clone(),
            },
        }
    }

    /// Task identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The task text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Owning session.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// The task this one was derived from, if any.
    pub fn parent_id(&self) -> Option<Uuid> {
        self.parent_id
    }

    /// Channel and annotations.
    pub fn metadata(&self) -> &TaskMetadata {
        &self.metadata
    }

    /// Whether the text is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}
