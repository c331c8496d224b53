//! GraphRunner - drives a compiled graph per thread through its checkpoint store

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::compiled::{CompiledGraph, RunContext, Start, Step, DEFAULT_MAX_STEPS};
use coachflow_core::{Error, Interrupt, Resume, Result, StateRecord, ThreadId};
use std::sync::Arc;
use tracing::{info, warn};

/// Result of one invocation from the caller's point of view.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The run finished; this is the final State Record.
    Done(StateRecord),
    /// The run is waiting for the human.
    Suspended(Interrupt),
}

impl RunOutcome {
    pub fn interrupt(&self) -> Option<&Interrupt> {
        match self {
            Self::Suspended(i) => Some(i),
            Self::Done(_) => None,
        }
    }

    pub fn state(&self) -> Option<&StateRecord> {
        match self {
            Self::Done(s) => Some(s),
            Self::Suspended(_) => None,
        }
    }
}

pub struct GraphRunner {
    graph: CompiledGraph,
    store: Arc<dyn CheckpointStore>,
    max_steps: usize,
}

impl GraphRunner {
    pub fn new(graph: CompiledGraph, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            graph,
            store,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn graph(&self) -> &CompiledGraph {
        &self.graph
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// The question a thread is currently waiting on, if any.
    pub async fn pending(&self, thread: &ThreadId) -> Result<Option<Interrupt>> {
        Ok(self.store.load(thread).await?.map(|cp| cp.interrupt))
    }

    /// Start or continue a thread's run.
    ///
    /// With `resume`, the thread's checkpoint is continued and `initial` is
    /// ignored; a resume for a thread with no checkpoint is an error.
    /// Without `resume`, any checkpoint is abandoned and a fresh run starts
    /// from `initial`.
    ///
    /// A suspended run is checkpointed and a finished one clears the
    /// checkpoint. On failure the checkpoint is kept only when the error is
    /// retryable and no node committed during this invocation, so the caller
    /// can send the same answer again without repeating a write.
    pub async fn invoke(
        &self,
        thread: &ThreadId,
        initial: StateRecord,
        resume: Option<Resume>,
    ) -> Result<RunOutcome> {
        let existing = self.store.load(thread).await?;
        let start = match (resume, existing) {
            (Some(_), None) => {
                return Err(Error::CheckpointMismatch(format!(
                    "thread '{}' has no suspended run to resume",
                    thread
                )));
            }
            (Some(resume), Some(cp)) => {
                if cp.frame.graph != self.graph.name() {
                    return Err(Error::CheckpointMismatch(format!(
                        "thread '{}' is suspended in graph '{}', not '{}'",
                        thread,
                        cp.frame.graph,
                        self.graph.name()
                    )));
                }
                info!(thread = %thread, node = %cp.frame.innermost().node, "resuming");
                Start::Resume {
                    frame: cp.frame,
                    value: resume.user_input,
                }
            }
            (None, Some(cp)) => {
                warn!(
                    thread = %thread,
                    node = %cp.frame.innermost().node,
                    "abandoning suspended run for a new request"
                );
                self.store.discard(thread).await?;
                Start::Fresh(initial)
            }
            (None, None) => Start::Fresh(initial),
        };

        let run = RunContext::new(thread.clone()).with_max_steps(self.max_steps);
        match self.graph.run(start, &run).await {
            Ok(Step::Suspended { interrupt, frame }) => {
                self.store
                    .save(Checkpoint::new(thread, frame, interrupt.clone()))
                    .await?;
                Ok(RunOutcome::Suspended(interrupt))
            }
            Ok(Step::Done(state)) => {
                self.store.discard(thread).await?;
                info!(thread = %thread, graph = %self.graph.name(), "run complete");
                Ok(RunOutcome::Done(state))
            }
            Err(e) => {
                if e.is_retryable() && !run.has_committed() {
                    warn!(thread = %thread, error = %e, "run failed; checkpoint kept for retry");
                } else if e.is_retryable() {
                    warn!(
                        thread = %thread,
                        error = %e,
                        "run failed after a commit; checkpoint dropped so the commit is not replayed"
                    );
                    self.store.discard(thread).await?;
                } else {
                    warn!(thread = %thread, error = %e, "run failed");
                    self.store.discard(thread).await?;
                }
                Err(e)
            }
        }
    }
}
