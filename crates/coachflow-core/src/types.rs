//! Core types for Coachflow

use std::sync::Arc;

/// Conversation thread identifier - one per end user, cheaply cloneable
#[derive(Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct ThreadId(Arc<str>);

impl ThreadId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Arc::from(s.into()))
    }

    /// The thread owned by a user. Threads are keyed by user id alone.
    pub fn for_user(user_id: &str) -> Self {
        Self::new(user_id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File-name-safe rendering used by on-disk stores.
    pub fn file_stem(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// The CRUD branch an entity sub-agent takes for one invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Alter,
    Create,
    Delete,
    Read,
    NoImpact,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alter => "alter",
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Read => "read",
            Self::NoImpact => "no_impact",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alter" | "update" | "edit" | "change" | "regenerate" => Some(Self::Alter),
            "create" | "add" | "new" => Some(Self::Create),
            "delete" | "remove" => Some(Self::Delete),
            "read" | "show" | "view" | "list" => Some(Self::Read),
            "no_impact" | "none" => Some(Self::NoImpact),
            _ => None,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
