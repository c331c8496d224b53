//! Operation routing: one CRUD branch per invocation

use crate::builder::AgentScope;
use crate::strategy::EntityAgent;
use coachflow_core::{EntityView, Focus, Operation, StatePatch, StateRecord};
use coachflow_graph::{Node, NodeContext, NodeResult};
use std::sync::Arc;
use tracing::info;

/// Pick exactly one operation from the request flags.
///
/// Precedence is alter, create, delete, read. Create and delete fall back to
/// alter for entities without their own path. No flag means no impact.
pub fn select_operation(agent: &dyn EntityAgent, view: &EntityView<'_>) -> Operation {
    if view.is_altered() {
        Operation::Alter
    } else if view.is_created() {
        if agent.supports_create() {
            Operation::Create
        } else {
            Operation::Alter
        }
    } else if view.is_deleted() {
        if agent.supports_delete() {
            Operation::Delete
        } else {
            Operation::Alter
        }
    } else if view.is_read() {
        Operation::Read
    } else {
        Operation::NoImpact
    }
}

pub(crate) fn route_operation(focus: Focus) -> impl Fn(&StateRecord) -> String + Send + Sync {
    move |state| {
        let view = EntityView::new(state, focus);
        let label = match view.operation() {
            Some(Operation::Alter) => "alter",
            Some(Operation::Create) => "create",
            Some(Operation::Delete) => "delete",
            Some(Operation::Read) if !view.read_plural() => "read_single",
            Some(Operation::Read) if view.read_current() => "read_current",
            Some(Operation::Read) => "read_all",
            Some(Operation::NoImpact) | None => "no_impact",
        };
        label.into()
    }
}

pub(crate) struct DetermineOperation {
    scope: Arc<AgentScope>,
}

impl DetermineOperation {
    pub fn new(scope: Arc<AgentScope>) -> Self {
        Self { scope }
    }
}

#[async_trait::async_trait]
impl Node for DetermineOperation {
    async fn run(&self, state: &StateRecord, ctx: &mut NodeContext) -> NodeResult {
        let scope = &self.scope;
        let fields = scope.fields();
        let op = select_operation(scope.agent.as_ref(), &scope.view(state));
        info!(focus = %scope.focus(), operation = %op, path = %ctx.path(), "operation selected");

        let mut patch = StatePatch::new().set(fields.operation(), op.as_str());
        if op == Operation::NoImpact {
            patch.insert(fields.completed(), false);
        }
        Ok(patch)
    }
}
