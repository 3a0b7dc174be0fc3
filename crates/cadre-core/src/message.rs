use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Who wrote a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Task submitter, or the parent unit delegating.
    User,
    /// The model.
    Assistant,
    /// Instructions.
    System,
    /// Tool output fed back to the model.
    Tool,
}

/// One turn of a model conversation, tied to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Message id.
    pub id: Uuid,
    /// Author.
    pub role: Role,
    /// Text.
    pub content: String,
    /// Owning session.
    pub session_id: Uuid,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Free-form annotations.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Message {
    /// A fresh message stamped now.
    pub fn new(role: Role, content: impl Into<String>, session_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            session_id,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Shorthand for [`Role::User`].
    pub fn user(content: impl Into<String>, session_id: Uuid) -> Self {
        Self::new(Role::User, content, session_id)
    }

    /// Shorthand for [`Role::Assistant`].
    pub fn assistant(content: impl Into<String>, session_id: Uuid) -> Self {
        Self::new(Role::Assistant, content, session_id)
    }

    /// Shorthand for [`Role::System`].
    pub fn system(content: impl Into<String>, session_id: Uuid) -> Self {
        Self::new(Role::System, content, session_id)
    }

    /// Shorthand for [`Role::Tool`].
    pub fn tool(content: impl Into<String>, session_id: Uuid) -> Self {
        Self::new(Role::Tool, content, session_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn shorthands_set_role() {
        let sid = Uuid::new_v4();
        assert_eq!(Message::tool("42", sid).role, Role::Tool);
        assert_eq!(Message::system("be brief", sid).role, Role::System);
        assert_eq!(Message::assistant("ok", sid).session_id, sid);
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    }
}
