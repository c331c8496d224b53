//! Caller-facing suspend/resume payloads
//!
//! Wire format:
//!
//! Engine → Caller (suspension):
//!   { "task": "Would you like to create a training block?" }
//!   { "task": ["Week 1: ...", "Would you like to make any edits?"] }
//!
//! Caller → Engine (resume):
//!   { "user_input": "yes" }

use serde::{Deserialize, Serialize};

/// The prompt shown to the human: one line or a list of lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Task {
    One(String),
    Many(Vec<String>),
}

impl Task {
    /// All lines of the prompt, in display order.
    pub fn lines(&self) -> Vec<&str> {
        match self {
            Self::One(s) => vec![s.as_str()],
            Self::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }

    pub fn render(&self) -> String {
        self.lines().join("\n")
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }
}

impl From<String> for Task {
    fn from(s: String) -> Self {
        Task::One(s)
    }
}

impl From<&str> for Task {
    fn from(s: &str) -> Self {
        Task::One(s.to_string())
    }
}

impl From<Vec<String>> for Task {
    fn from(v: Vec<String>) -> Self {
        Task::Many(v)
    }
}

/// Suspension payload returned to the caller when a run pauses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interrupt {
    pub task: Task,
}

impl Interrupt {
    pub fn new(task: impl Into<Task>) -> Self {
        Self { task: task.into() }
    }
}

/// Resume input supplied by the caller to continue a paused run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resume {
    pub user_input: String,
}

impl Resume {
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
        }
    }
}
