//! Node trait, node context, and the interrupt mechanism

use crate::checkpoint::Frame;
use crate::compiled::RunContext;
use crate::path::AgentPath;
use coachflow_core::{Error, Interrupt, StatePatch, StateRecord, Task, ThreadId};

/// How a node run can end other than with a patch.
#[derive(Debug)]
pub enum NodeError {
    /// The node asked the human something. `child` carries the paused frame
    /// of an embedded graph when the question came from inside a sub-agent.
    Interrupted {
        interrupt: Interrupt,
        child: Option<Box<Frame>>,
    },
    Failed(Error),
}

impl From<Error> for NodeError {
    fn from(e: Error) -> Self {
        NodeError::Failed(e)
    }
}

pub type NodeResult = Result<StatePatch, NodeError>;

/// One step of a graph.
///
/// A resumed node runs again from its first line: every `ctx.interrupt`
/// call that already received an answer returns that answer immediately.
/// Anything the node does before its last `interrupt` call therefore runs
/// once per resume. Keep writes, inserts, and other non-idempotent work
/// after the final `interrupt` call.
#[async_trait::async_trait]
pub trait Node: Send + Sync {
    async fn run(&self, state: &StateRecord, ctx: &mut NodeContext) -> NodeResult;
}

/// Adapter for synchronous closures.
pub struct FnNode<F>(pub F);

#[async_trait::async_trait]
impl<F> Node for FnNode<F>
where
    F: Fn(&StateRecord, &mut NodeContext) -> NodeResult + Send + Sync,
{
    async fn run(&self, state: &StateRecord, ctx: &mut NodeContext) -> NodeResult {
        (self.0)(state, ctx)
    }
}

/// Per-execution context handed to a node.
pub struct NodeContext {
    run: RunContext,
    graph: String,
    node: String,
    resumes: Vec<String>,
    cursor: usize,
    child: Option<(Frame, String)>,
}

impl NodeContext {
    pub(crate) fn fresh(run: &RunContext, graph: &str, node: &str) -> Self {
        Self {
            run: run.clone(),
            graph: graph.to_string(),
            node: node.to_string(),
            resumes: Vec::new(),
            cursor: 0,
            child: None,
        }
    }

    /// Context for re-running a paused node. A resume value for a paused
    /// embedded graph is routed to that graph, not to this node's own
    /// `interrupt` calls.
    pub(crate) fn resuming(run: &RunContext, frame: Frame, value: String) -> Self {
        let Frame {
            graph,
            node,
            mut resumes,
            child,
            ..
        } = frame;
        let child = match child {
            Some(child) => Some((*child, value)),
            None => {
                resumes.push(value);
                None
            }
        };
        Self {
            run: run.clone(),
            graph,
            node,
            resumes,
            cursor: 0,
            child,
        }
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.run.thread_id
    }

    pub fn path(&self) -> &AgentPath {
        &self.run.path
    }

    pub fn run_context(&self) -> &RunContext {
        &self.run
    }

    /// Call after a store transaction commits. A retryable failure later in
    /// the same invocation then drops the checkpoint instead of replaying it.
    pub fn record_commit(&self) {
        self.run.record_commit();
    }

    pub fn graph_name(&self) -> &str {
        &self.graph
    }

    pub fn node_name(&self) -> &str {
        &self.node
    }

    /// True when this execution is a re-run of a paused node.
    pub fn is_resuming(&self) -> bool {
        !self.resumes.is_empty() || self.child.is_some()
    }

    /// Ask the human something.
    ///
    /// On the first execution this suspends the run (propagate the error
    /// with `?`). When the node is re-run after a resume, the n-th call
    /// returns the n-th answer instead.
    pub fn interrupt(&mut self, task: impl Into<Task>) -> Result<String, NodeError> {
        if let Some(answer) = self.resumes.get(self.cursor) {
            self.cursor += 1;
            return Ok(answer.clone());
        }
        Err(NodeError::Interrupted {
            interrupt: Interrupt::new(task),
            child: None,
        })
    }

    /// The paused embedded frame and its resume value, if this node is a
    /// sub-graph being resumed. Can be taken once.
    pub fn take_child(&mut self) -> Option<(Frame, String)> {
        self.child.take()
    }

    pub(crate) fn into_resumes(self) -> Vec<String> {
        // Only the answers this execution actually consumed are replayed.
        let mut resumes = self.resumes;
        resumes.truncate(self.cursor);
        resumes
    }
}
