//! Compiled graph and its run loop

use crate::checkpoint::Frame;
use crate::graph::{Edge, END};
use crate::node::{Node, NodeContext, NodeError};
use crate::path::{AgentPath, PathFrame};
use coachflow_core::{Error, Interrupt, Result, StateRecord, ThreadId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Default cap on node executions per run of one graph.
pub const DEFAULT_MAX_STEPS: usize = 256;

/// Identity and position of one run. Cloned into every node context.
///
/// The commit counter is shared by every clone and nested context, so the
/// caller can tell whether any node in the invocation wrote to the store.
#[derive(Clone, Debug)]
pub struct RunContext {
    pub thread_id: ThreadId,
    pub path: AgentPath,
    pub max_steps: usize,
    commits: Arc<AtomicUsize>,
}

impl RunContext {
    pub fn new(thread_id: impl Into<ThreadId>) -> Self {
        Self {
            thread_id: thread_id.into(),
            path: AgentPath::root(),
            max_steps: DEFAULT_MAX_STEPS,
            commits: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_path(mut self, path: AgentPath) -> Self {
        self.path = path;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Context for a run embedded one level deeper.
    pub fn enter(&self, frame: PathFrame) -> Self {
        Self {
            thread_id: self.thread_id.clone(),
            path: self.path.enter(frame),
            max_steps: self.max_steps,
            commits: self.commits.clone(),
        }
    }

    /// Note that a node committed durable work during this invocation.
    pub fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::SeqCst);
    }

    pub fn has_committed(&self) -> bool {
        self.commits.load(Ordering::SeqCst) > 0
    }
}

/// Where a run begins.
#[derive(Debug)]
pub enum Start {
    Fresh(StateRecord),
    /// Re-enter a paused frame, delivering `value` to the interrupt that
    /// paused it.
    Resume { frame: Frame, value: String },
}

/// How a run ended.
#[derive(Debug)]
pub enum Step {
    Done(StateRecord),
    Suspended { interrupt: Interrupt, frame: Frame },
}

struct Inner {
    name: String,
    entry: String,
    nodes: HashMap<String, Arc<dyn Node>>,
    order: Vec<String>,
    edges: HashMap<String, Edge>,
}

/// An immutable, validated graph. Cheap to clone and share between runs.
#[derive(Clone)]
pub struct CompiledGraph {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("name", &self.inner.name)
            .field("entry", &self.inner.entry)
            .field("nodes", &self.inner.order)
            .finish()
    }
}

impl CompiledGraph {
    pub(crate) fn new(
        name: String,
        entry: String,
        nodes: HashMap<String, Arc<dyn Node>>,
        order: Vec<String>,
        edges: HashMap<String, Edge>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                entry,
                nodes,
                order,
                edges,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn entry(&self) -> &str {
        &self.inner.entry
    }

    /// Node names in registration order.
    pub fn node_names(&self) -> &[String] {
        &self.inner.order
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.inner.nodes.contains_key(name)
    }

    /// Run until the graph finishes or a node suspends.
    pub async fn run(&self, start: Start, run: &RunContext) -> Result<Step> {
        let graph = self.inner.name.as_str();
        let (mut current, mut state, mut resume) = match start {
            Start::Fresh(state) => (self.inner.entry.clone(), state, None),
            Start::Resume { frame, value } => {
                if frame.graph != graph {
                    return Err(Error::CheckpointMismatch(format!(
                        "frame belongs to graph '{}', not '{}'",
                        frame.graph, graph
                    )));
                }
                if !self.has_node(&frame.node) {
                    return Err(Error::UnknownNode {
                        graph: graph.to_string(),
                        node: frame.node.clone(),
                    });
                }
                (frame.node.clone(), frame.state.clone(), Some((frame, value)))
            }
        };

        let mut steps = 0usize;
        loop {
            steps += 1;
            if steps > run.max_steps {
                return Err(Error::StepLimit {
                    graph: graph.to_string(),
                    limit: run.max_steps,
                });
            }

            let node = self
                .inner
                .nodes
                .get(&current)
                .cloned()
                .ok_or_else(|| Error::UnknownNode {
                    graph: graph.to_string(),
                    node: current.clone(),
                })?;

            let mut ctx = match resume.take() {
                Some((frame, value)) => NodeContext::resuming(run, frame, value),
                None => NodeContext::fresh(run, graph, &current),
            };
            debug!(graph, node = %current, path = %run.path, resuming = ctx.is_resuming(), "node start");

            match node.run(&state, &mut ctx).await {
                Ok(patch) => state.merge(patch),
                Err(NodeError::Interrupted { interrupt, child }) => {
                    info!(
                        graph,
                        node = %current,
                        thread = %run.thread_id,
                        path = %run.path,
                        "run suspended"
                    );
                    let frame = Frame {
                        graph: graph.to_string(),
                        node: current,
                        state,
                        resumes: ctx.into_resumes(),
                        child,
                    };
                    return Ok(Step::Suspended { interrupt, frame });
                }
                Err(NodeError::Failed(e)) => {
                    debug!(graph, node = %current, error = %e, "node failed");
                    return Err(e);
                }
            }

            match self.next_node(&current, &state)? {
                Some(next) => current = next,
                None => {
                    debug!(graph, steps, "run finished");
                    return Ok(Step::Done(state));
                }
            }
        }
    }

    fn next_node(&self, from: &str, state: &StateRecord) -> Result<Option<String>> {
        let target = match self.inner.edges.get(from) {
            None => return Ok(None),
            Some(Edge::Direct(to)) => to.clone(),
            Some(Edge::Conditional { router, routes }) => {
                let label = router(state);
                routes
                    .get(&label)
                    .cloned()
                    .ok_or_else(|| Error::UnmatchedRoute {
                        node: from.to_string(),
                        label,
                    })?
            }
        };
        if target == END {
            Ok(None)
        } else {
            Ok(Some(target))
        }
    }
}
