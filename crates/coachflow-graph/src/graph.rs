//! Graph builder: register nodes and edges, then compile.

use crate::compiled::CompiledGraph;
use crate::node::{FnNode, Node, NodeContext, NodeResult};
use coachflow_core::StateRecord;
use std::collections::HashMap;
use std::sync::Arc;

/// Edge target that terminates the run.
pub const END: &str = "__end__";

/// Routing function for a conditional edge: picks a label from the state.
pub type Router = Arc<dyn Fn(&StateRecord) -> String + Send + Sync>;

#[derive(Clone)]
pub(crate) enum Edge {
    Direct(String),
    Conditional {
        router: Router,
        routes: HashMap<String, String>,
    },
}

impl Edge {
    fn targets(&self) -> Vec<&str> {
        match self {
            Edge::Direct(to) => vec![to.as_str()],
            Edge::Conditional { routes, .. } => routes.values().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CompilationError {
    #[error("graph '{0}' has no entry node")]
    MissingEntry(String),

    #[error("graph '{graph}': node '{node}' is not registered")]
    UnknownNode { graph: String, node: String },

    #[error("graph '{graph}': node '{node}' is registered twice")]
    DuplicateNode { graph: String, node: String },

    #[error("graph '{graph}': node '{node}' already has an outgoing edge")]
    DuplicateEdge { graph: String, node: String },

    #[error("graph '{graph}': conditional edge from '{node}' has no routes")]
    EmptyRoutes { graph: String, node: String },
}

impl From<CompilationError> for coachflow_core::Error {
    fn from(e: CompilationError) -> Self {
        coachflow_core::Error::Compilation(e.to_string())
    }
}

/// A graph under construction.
///
/// Registration errors are collected and reported by [`StateGraph::compile`],
/// so a builder chain never panics halfway.
pub struct StateGraph {
    name: String,
    entry: Option<String>,
    nodes: HashMap<String, Arc<dyn Node>>,
    order: Vec<String>,
    edges: HashMap<String, Edge>,
    errors: Vec<CompilationError>,
}

impl StateGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry: None,
            nodes: HashMap::new(),
            order: Vec::new(),
            edges: HashMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_node(&mut self, name: impl Into<String>, node: impl Node + 'static) -> &mut Self {
        self.add_shared_node(name, Arc::new(node))
    }

    pub fn add_shared_node(&mut self, name: impl Into<String>, node: Arc<dyn Node>) -> &mut Self {
        let name = name.into();
        if self.nodes.contains_key(&name) {
            self.errors.push(CompilationError::DuplicateNode {
                graph: self.name.clone(),
                node: name,
            });
            return self;
        }
        self.order.push(name.clone());
        self.nodes.insert(name, node);
        self
    }

    /// Register a synchronous closure as a node.
    pub fn add_fn_node<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&StateRecord, &mut NodeContext) -> NodeResult + Send + Sync + 'static,
    {
        self.add_node(name, FnNode(f))
    }

    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.insert_edge(from.into(), Edge::Direct(to.into()))
    }

    /// Route from `from` by label: `router` reads the merged state after
    /// `from` ran, and its label is looked up in `routes`.
    pub fn add_conditional_edge<F>(
        &mut self,
        from: impl Into<String>,
        router: F,
        routes: &[(&str, &str)],
    ) -> &mut Self
    where
        F: Fn(&StateRecord) -> String + Send + Sync + 'static,
    {
        let from = from.into();
        if routes.is_empty() {
            self.errors.push(CompilationError::EmptyRoutes {
                graph: self.name.clone(),
                node: from.clone(),
            });
        }
        let routes = routes
            .iter()
            .map(|(label, to)| (label.to_string(), to.to_string()))
            .collect();
        self.insert_edge(
            from,
            Edge::Conditional {
                router: Arc::new(router),
                routes,
            },
        )
    }

    fn insert_edge(&mut self, from: String, edge: Edge) -> &mut Self {
        if self.edges.contains_key(&from) {
            self.errors.push(CompilationError::DuplicateEdge {
                graph: self.name.clone(),
                node: from,
            });
            return self;
        }
        self.edges.insert(from, edge);
        self
    }

    pub fn set_entry(&mut self, name: impl Into<String>) -> &mut Self {
        self.entry = Some(name.into());
        self
    }

    /// Validate the wiring and freeze the graph.
    pub fn compile(&self) -> Result<CompiledGraph, CompilationError> {
        if let Some(err) = self.errors.first() {
            return Err(err.clone());
        }

        let entry = self
            .entry
            .clone()
            .ok_or_else(|| CompilationError::MissingEntry(self.name.clone()))?;
        self.check_node(&entry)?;

        for (from, edge) in &self.edges {
            self.check_node(from)?;
            for to in edge.targets() {
                if to != END {
                    self.check_node(to)?;
                }
            }
        }

        Ok(CompiledGraph::new(
            self.name.clone(),
            entry,
            self.nodes.clone(),
            self.order.clone(),
            self.edges.clone(),
        ))
    }

    fn check_node(&self, name: &str) -> Result<(), CompilationError> {
        if self.nodes.contains_key(name) {
            Ok(())
        } else {
            Err(CompilationError::UnknownNode {
                graph: self.name.clone(),
                node: name.to_string(),
            })
        }
    }
}
