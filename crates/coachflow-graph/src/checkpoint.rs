//! Per-thread checkpoints of suspended runs
//!
//! A thread has at most one checkpoint: the frame of the run that is
//! waiting for the human. Frames nest, one level per embedded graph, down
//! to the node that actually asked.

use chrono::{DateTime, Utc};
use coachflow_core::{Interrupt, Result, StateRecord, ThreadId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A paused position inside one graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub graph: String,
    /// The node that suspended. It runs again from its start on resume.
    pub node: String,
    /// State as it was when `node` began.
    pub state: StateRecord,
    /// Answers already given to `node`'s earlier interrupts, in order.
    #[serde(default)]
    pub resumes: Vec<String>,
    /// The paused embedded graph, when `node` is a sub-graph.
    #[serde(default)]
    pub child: Option<Box<Frame>>,
}

impl Frame {
    /// Number of graphs in the chain, this one included.
    pub fn depth(&self) -> usize {
        1 + self.child.as_ref().map_or(0, |c| c.depth())
    }

    /// The frame of the node that actually asked.
    pub fn innermost(&self) -> &Frame {
        match &self.child {
            Some(child) => child.innermost(),
            None => self,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    pub frame: Frame,
    /// The question that is waiting for an answer.
    pub interrupt: Interrupt,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(thread_id: &ThreadId, frame: Frame, interrupt: Interrupt) -> Self {
        Self {
            thread_id: thread_id.as_str().to_string(),
            frame,
            interrupt,
            saved_at: Utc::now(),
        }
    }

    pub fn thread(&self) -> ThreadId {
        ThreadId::new(self.thread_id.clone())
    }

    pub fn is_expired(&self, ttl: Option<Duration>) -> bool {
        let Some(ttl) = ttl else { return false };
        (Utc::now() - self.saved_at)
            .to_std()
            .map_or(false, |age| age > ttl)
    }
}

/// Storage for suspended runs, keyed by thread.
#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Replace the thread's checkpoint.
    async fn save(&self, checkpoint: Checkpoint) -> Result<()>;

    /// The thread's checkpoint, unless there is none or it has expired.
    async fn load(&self, thread: &ThreadId) -> Result<Option<Checkpoint>>;

    async fn discard(&self, thread: &ThreadId) -> Result<()>;

    /// Threads that currently hold a checkpoint.
    async fn threads(&self) -> Result<Vec<ThreadId>>;

    /// Drop expired checkpoints. Returns how many were removed.
    async fn gc(&self) -> Result<usize>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryCheckpointStore {
    entries: DashMap<ThreadId, Checkpoint>,
    ttl: Option<Duration>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait::async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        self.entries.insert(checkpoint.thread(), checkpoint);
        Ok(())
    }

    async fn load(&self, thread: &ThreadId) -> Result<Option<Checkpoint>> {
        let expired = match self.entries.get(thread) {
            None => return Ok(None),
            Some(cp) if !cp.is_expired(self.ttl) => return Ok(Some(cp.clone())),
            Some(_) => true,
        };
        if expired {
            info!(thread = %thread, "checkpoint expired");
            self.entries.remove(thread);
        }
        Ok(None)
    }

    async fn discard(&self, thread: &ThreadId) -> Result<()> {
        self.entries.remove(thread);
        Ok(())
    }

    async fn threads(&self) -> Result<Vec<ThreadId>> {
        Ok(self.entries.iter().map(|e| e.key().clone()).collect())
    }

    async fn gc(&self) -> Result<usize> {
        let before = self.entries.len();
        self.entries.retain(|_, cp| !cp.is_expired(self.ttl));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "checkpoint gc");
        }
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// File store: one JSON document per thread
// ---------------------------------------------------------------------------

pub struct FileCheckpointStore {
    dir: PathBuf,
    ttl: Option<Duration>,
}

impl FileCheckpointStore {
    /// Create the store, creating `dir` if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir, ttl: None })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, thread: &ThreadId) -> PathBuf {
        self.dir.join(format!("{}.json", thread.file_stem()))
    }

    async fn read(path: &Path) -> Result<Option<Checkpoint>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn checkpoint_files(&self) -> Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                out.push(path);
            }
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let path = self.path_for(&checkpoint.thread());
        let json = serde_json::to_vec_pretty(&checkpoint)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), bytes = json.len(), "checkpoint saved");
        Ok(())
    }

    async fn load(&self, thread: &ThreadId) -> Result<Option<Checkpoint>> {
        let path = self.path_for(thread);
        let Some(cp) = Self::read(&path).await? else {
            return Ok(None);
        };
        if cp.is_expired(self.ttl) {
            info!(thread = %thread, "checkpoint expired");
            Self::remove(&path).await?;
            return Ok(None);
        }
        Ok(Some(cp))
    }

    async fn discard(&self, thread: &ThreadId) -> Result<()> {
        Self::remove(&self.path_for(thread)).await
    }

    async fn threads(&self) -> Result<Vec<ThreadId>> {
        let mut out = Vec::new();
        for path in self.checkpoint_files().await? {
            match Self::read(&path).await {
                Ok(Some(cp)) => out.push(cp.thread()),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "unreadable checkpoint"),
            }
        }
        Ok(out)
    }

    async fn gc(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.checkpoint_files().await? {
            let expired = match Self::read(&path).await {
                Ok(Some(cp)) => cp.is_expired(self.ttl),
                Ok(None) => false,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable checkpoint");
                    false
                }
            };
            if expired {
                Self::remove(&path).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, dir = %self.dir.display(), "checkpoint gc");
        }
        Ok(removed)
    }
}
