//! Agent path - which entity sub-agents are active, outermost first.
//!
//! The path is a value, not shared state: entering a sub-agent derives a
//! longer path for the embedded run and leaves the caller's path untouched.

use coachflow_core::Focus;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathFrame {
    pub focus: Focus,
    pub parent: Option<Focus>,
}

impl PathFrame {
    pub fn new(focus: Focus) -> Self {
        Self {
            focus,
            parent: focus.parent(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AgentPath {
    frames: Vec<PathFrame>,
}

impl AgentPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// A new path with `frame` on top.
    pub fn enter(&self, frame: PathFrame) -> Self {
        let mut frames = self.frames.clone();
        frames.push(frame);
        Self { frames }
    }

    pub fn current(&self) -> Option<&PathFrame> {
        self.frames.last()
    }

    pub fn focus(&self) -> Option<Focus> {
        self.current().map(|f| f.focus)
    }

    pub fn parent(&self) -> Option<Focus> {
        self.current().and_then(|f| f.parent)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn contains(&self, focus: Focus) -> bool {
        self.frames.iter().any(|f| f.focus == focus)
    }

    pub fn frames(&self) -> &[PathFrame] {
        &self.frames
    }
}

impl std::fmt::Display for AgentPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.frames.is_empty() {
            return f.write_str("<root>");
        }
        let names: Vec<&str> = self.frames.iter().map(|fr| fr.focus.as_str()).collect();
        f.write_str(&names.join(" > "))
    }
}
