//! Coach runtime - one coordinator run per user message, checkpointed per user

use crate::builder::{build_entity_graphs, Collaborators};
use crate::config::{CheckpointBackend, CoachConfig};
use crate::coordinator::{build_coordinator, REQUEST_TEXT, SUMMARY};
use crate::scheduler::{Scheduler, TemplateScheduler};
use crate::store::EntityStore;
use coachflow_core::fields::{REQUEST_PARSED, USER_ID};
use coachflow_core::{Interrupt, Resume, Result, StatePatch, StateRecord, ThreadId};
use coachflow_graph::{
    CheckpointStore, FileCheckpointStore, GraphRunner, MemoryCheckpointStore, RunOutcome,
};
use coachflow_llm::Extractor;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// What the user sees after one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The run is waiting for an answer to this.
    Prompt(Interrupt),
    /// The run finished.
    Completed { message: String, state: StateRecord },
}

impl Reply {
    /// The text to show the user.
    pub fn text(&self) -> String {
        match self {
            Self::Prompt(interrupt) => interrupt.task.render(),
            Self::Completed { message, .. } => message.clone(),
        }
    }

    pub fn is_prompt(&self) -> bool {
        matches!(self, Self::Prompt(_))
    }
}

pub struct CoachRuntime {
    runner: GraphRunner,
    deps: Collaborators,
    /// Invocations on one thread run one at a time.
    locks: DashMap<ThreadId, Arc<Mutex<()>>>,
}

impl CoachRuntime {
    pub fn new(
        config: &CoachConfig,
        extractor: Arc<dyn Extractor>,
        scheduler: Arc<dyn Scheduler>,
        store: Arc<dyn EntityStore>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Result<Self> {
        let deps = Collaborators {
            extractor,
            store,
            scheduler,
            limits: config.engine.clone(),
        };
        let graphs = build_entity_graphs(&deps)?;
        let coordinator = build_coordinator(&graphs, &deps)?;
        info!(graphs = graphs.len(), "coach runtime ready");

        Ok(Self {
            runner: GraphRunner::new(coordinator, checkpoints)
                .with_max_steps(config.engine.max_steps),
            deps,
            locks: DashMap::new(),
        })
    }

    /// Runtime with the configured checkpoint backend and the template scheduler.
    pub async fn open(
        config: &CoachConfig,
        extractor: Arc<dyn Extractor>,
        store: Arc<dyn EntityStore>,
    ) -> Result<Self> {
        let ttl = config.checkpoints.ttl();
        let checkpoints: Arc<dyn CheckpointStore> = match config.checkpoints.backend {
            CheckpointBackend::Memory => Arc::new(MemoryCheckpointStore::new().with_ttl(ttl)),
            CheckpointBackend::File => Arc::new(
                FileCheckpointStore::open(config.checkpoints.dir.clone())
                    .await?
                    .with_ttl(ttl),
            ),
        };
        Self::new(
            config,
            extractor,
            Arc::new(TemplateScheduler::new()),
            store,
            checkpoints,
        )
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.deps.store
    }

    pub fn checkpoints(&self) -> &Arc<dyn CheckpointStore> {
        self.runner.store()
    }

    fn lock_for(&self, thread: &ThreadId) -> Arc<Mutex<()>> {
        self.locks.entry(thread.clone()).or_default().clone()
    }

    /// A new request in free text. Any question the user left unanswered
    /// is dropped.
    pub async fn start(&self, user_id: &str, text: &str) -> Result<Reply> {
        let patch = StatePatch::new().set(REQUEST_TEXT, text);
        self.invoke(user_id, patch, None).await
    }

    /// A new request whose per-entity flags are already set. Extraction of
    /// the request is skipped.
    pub async fn start_structured(&self, user_id: &str, request: StatePatch) -> Result<Reply> {
        let mut patch = StatePatch::new().set(REQUEST_PARSED, true);
        patch.extend(request);
        self.invoke(user_id, patch, None).await
    }

    /// Answer the question the user's run is waiting on.
    pub async fn resume(&self, user_id: &str, answer: &str) -> Result<Reply> {
        self.invoke(user_id, StatePatch::new(), Some(Resume::new(answer)))
            .await
    }

    pub async fn pending(&self, user_id: &str) -> Result<Option<Interrupt>> {
        self.runner.pending(&ThreadId::for_user(user_id)).await
    }

    pub async fn has_pending(&self, user_id: &str) -> Result<bool> {
        Ok(self.pending(user_id).await?.is_some())
    }

    /// Drop expired checkpoints.
    pub async fn gc(&self) -> Result<usize> {
        let removed = self.runner.store().gc().await?;
        if removed > 0 {
            info!(removed, "expired checkpoints removed");
        }
        Ok(removed)
    }

    async fn invoke(
        &self,
        user_id: &str,
        patch: StatePatch,
        resume: Option<Resume>,
    ) -> Result<Reply> {
        let thread = ThreadId::for_user(user_id);
        let lock = self.lock_for(&thread);
        let _guard = lock.lock().await;

        let mut initial = StateRecord::new();
        initial.merge(patch);
        initial.merge(StatePatch::new().set(USER_ID, user_id));
        debug!(thread = %thread, resume = resume.is_some(), "invoking coordinator");

        match self.runner.invoke(&thread, initial, resume).await? {
            RunOutcome::Suspended(interrupt) => Ok(Reply::Prompt(interrupt)),
            RunOutcome::Done(state) => {
                let message = state.get_str(SUMMARY).unwrap_or_default().to_string();
                Ok(Reply::Completed { message, state })
            }
        }
    }
}
