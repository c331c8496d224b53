//! coachflow-graph - checkpointed state-graph engine
//!
//! Nodes run one at a time over a shared `StateRecord`. A node may suspend
//! the whole run to ask the human something; the run is checkpointed and
//! later resumed from the same node. Compiled graphs embed inside other
//! graphs as single nodes, and suspension passes through the embedding.

pub mod checkpoint;
pub mod compiled;
pub mod graph;
pub mod node;
pub mod path;
pub mod runner;
pub mod subgraph;

pub use checkpoint::{
    Checkpoint, CheckpointStore, FileCheckpointStore, Frame, MemoryCheckpointStore,
};
pub use compiled::{CompiledGraph, RunContext, Start, Step};
pub use graph::{CompilationError, Router, StateGraph, END};
pub use node::{FnNode, Node, NodeContext, NodeError, NodeResult};
pub use path::{AgentPath, PathFrame};
pub use runner::{GraphRunner, RunOutcome};
pub use subgraph::{Projection, SubgraphNode};
