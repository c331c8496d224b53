//! Error types for Coachflow

use crate::focus::Focus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{focus} not found: {detail}")]
    NotFound { focus: Focus, detail: String },

    #[error("extraction failed ({extractor}): {message}")]
    Extraction { extractor: String, message: String },

    #[error("no feasible {focus} schedule: {reason}")]
    Infeasible { focus: Focus, reason: String },

    #[error("checkpoint mismatch: {0}")]
    CheckpointMismatch(String),

    #[error("unknown node '{node}' in graph '{graph}'")]
    UnknownNode { graph: String, node: String },

    #[error("route '{label}' from node '{node}' is not registered")]
    UnmatchedRoute { node: String, label: String },

    #[error("graph '{graph}' exceeded {limit} steps")]
    StepLimit { graph: String, limit: usize },

    #[error("compilation error: {0}")]
    Compilation(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(focus: Focus, detail: impl Into<String>) -> Self {
        Self::NotFound {
            focus,
            detail: detail.into(),
        }
    }

    pub fn extraction(extractor: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction {
            extractor: extractor.into(),
            message: message.into(),
        }
    }

    pub fn infeasible(focus: Focus, reason: impl Into<String>) -> Self {
        Self::Infeasible {
            focus,
            reason: reason.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Retryable errors leave the thread's last checkpoint in place so the
    /// caller can resend the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Extraction { .. })
    }
}
