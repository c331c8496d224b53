//! Coachflow Agents - Entity sub-agents, the coordinator, and the coach runtime
//!
//! Every entity in the hierarchy gets the same graph shape (parent
//! resolution, operation routing, then read, delete, or the edit loop),
//! specialised by an `EntityAgent` strategy.

pub mod builder;
pub mod config;
pub mod coordinator;
pub mod decision;
mod delete;
pub mod draft;
mod edit_loop;
pub mod entities;
pub mod filter;
pub mod read;
mod resolver;
pub mod router;
pub mod runtime;
pub mod scheduler;
pub mod store;
pub mod strategy;
pub mod validate;

pub use builder::{build_entity_graph, build_entity_graphs, nodes, Collaborators};
pub use config::{CheckpointBackend, CoachConfig, EngineConfig};
pub use coordinator::{build_coordinator, REQUEST_TEXT, SUMMARY};
pub use draft::{Draft, DraftItem, EditInstruction};
pub use entities::agent_for;
pub use router::select_operation;
pub use runtime::{CoachRuntime, Reply};
pub use scheduler::{Infeasible, ItemTemplate, ScheduleRequest, Scheduler, TemplateScheduler};
pub use store::{EntityRecord, EntityStore, MemoryStore, NewRecord, RecordQuery};
pub use strategy::EntityAgent;
