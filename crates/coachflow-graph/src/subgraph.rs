//! SubgraphNode - a compiled graph embedded as one node of another graph

use crate::compiled::{CompiledGraph, Start, Step};
use crate::node::{Node, NodeContext, NodeError, NodeResult};
use crate::path::PathFrame;
use coachflow_core::fields::is_global;
use coachflow_core::{FieldNamer, Focus, StatePatch, StateRecord};
use std::sync::Arc;
use tracing::debug;

/// Maps one State Record to the keys that cross a graph boundary.
#[derive(Clone)]
pub struct Projection(Arc<dyn Fn(&StateRecord) -> StatePatch + Send + Sync>);

impl Projection {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&StateRecord) -> StatePatch + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Global keys plus every key owned by `focus` or one of its ancestors.
    pub fn focus_slice(focus: Focus) -> Self {
        let owners = lineage_namers(focus);
        Self::new(move |state| {
            state.slice(|key| is_global(key) || owners.iter().any(|n| n.owns(key)))
        })
    }

    /// Keys owned by `focus` or one of its ancestors, without globals.
    pub fn lineage(focus: Focus) -> Self {
        let owners = lineage_namers(focus);
        Self::new(move |state| state.slice(|key| owners.iter().any(|n| n.owns(key))))
    }

    /// Only the keys owned by `focus`.
    pub fn namespaced(focus: Focus) -> Self {
        let namer = FieldNamer::new(focus);
        Self::new(move |state| state.slice(|key| namer.owns(key)))
    }

    /// Everything.
    pub fn all() -> Self {
        Self::new(|state| state.slice(|_| true))
    }

    pub fn apply(&self, state: &StateRecord) -> StatePatch {
        (self.0)(state)
    }
}

fn lineage_namers(focus: Focus) -> Vec<FieldNamer> {
    std::iter::once(focus)
        .chain(focus.ancestors())
        .map(FieldNamer::new)
        .collect()
}

pub struct SubgraphNode {
    focus: Focus,
    graph: CompiledGraph,
    input: Projection,
    output: Projection,
}

impl SubgraphNode {
    pub fn new(focus: Focus, graph: CompiledGraph) -> Self {
        Self {
            focus,
            graph,
            input: Projection::focus_slice(focus),
            output: Projection::namespaced(focus),
        }
    }

    pub fn with_input(mut self, input: Projection) -> Self {
        self.input = input;
        self
    }

    pub fn with_output(mut self, output: Projection) -> Self {
        self.output = output;
        self
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }
}

#[async_trait::async_trait]
impl Node for SubgraphNode {
    async fn run(&self, state: &StateRecord, ctx: &mut NodeContext) -> NodeResult {
        let start = match ctx.take_child() {
            Some((frame, value)) => Start::Resume { frame, value },
            None => Start::Fresh(StateRecord::from(self.input.apply(state))),
        };
        let run = ctx.run_context().enter(PathFrame::new(self.focus));
        debug!(focus = %self.focus, path = %run.path, "entering sub-agent");

        match self.graph.run(start, &run).await? {
            Step::Done(inner) => Ok(self.output.apply(&inner)),
            Step::Suspended { interrupt, frame } => Err(NodeError::Interrupted {
                interrupt,
                child: Some(Box::new(frame)),
            }),
        }
    }
}
