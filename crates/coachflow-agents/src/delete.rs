//! Deleting one item and everything under it

use crate::builder::AgentScope;
use crate::filter;
use crate::store::with_transaction;
use coachflow_core::{StatePatch, StateRecord};
use coachflow_graph::{Node, NodeContext, NodeResult};
use coachflow_llm::{FieldSpec, TargetSchema};
use std::sync::Arc;
use tracing::info;

/// Pull the words that name the item to delete out of the request.
pub(crate) struct ExtractDeletionTarget {
    scope: Arc<AgentScope>,
}

impl ExtractDeletionTarget {
    pub fn new(scope: Arc<AgentScope>) -> Self {
        Self { scope }
    }
}

#[async_trait::async_trait]
impl Node for ExtractDeletionTarget {
    async fn run(&self, state: &StateRecord, _ctx: &mut NodeContext) -> NodeResult {
        let scope = &self.scope;
        let focus = scope.focus();
        let detail = scope.view(state).detail();

        let target = if detail.trim().is_empty() {
            String::new()
        } else {
            let schema = TargetSchema::new(
                format!("{}_deletion", focus.as_str()),
                format!("Which {} the user wants deleted", focus.label()),
            )
            .field(FieldSpec::text(
                "target",
                "the item to delete, in the user's words",
            ));
            let extraction = scope.extract(detail, &scope.agent.prompt(), &schema).await?;
            extraction.get_str("target").unwrap_or_default().to_string()
        };

        Ok(StatePatch::new().set(scope.fields().target_filter(), vec![target]))
    }
}

/// Narrow the items under the parent to one and delete it with its
/// descendants.
pub(crate) struct LocateDeletion {
    scope: Arc<AgentScope>,
}

impl LocateDeletion {
    pub fn new(scope: Arc<AgentScope>) -> Self {
        Self { scope }
    }
}

#[async_trait::async_trait]
impl Node for LocateDeletion {
    async fn run(&self, state: &StateRecord, ctx: &mut NodeContext) -> NodeResult {
        let scope = &self.scope;
        let fields = scope.fields();
        let candidates = scope.items_under_parent(state)?;
        let first_round = scope.view(state).target_filter().join(" ");

        let (record, rounds) = filter::locate(
            ctx,
            scope.focus(),
            &candidates,
            &first_round,
            scope.limits().max_disambiguation_rounds,
        )?;

        let removed = with_transaction(scope.store(), |tx| tx.delete_cascade(record.id))?;
        ctx.record_commit();
        info!(focus = %scope.focus(), id = record.id, removed, "deleted");

        let message = if removed > 1 {
            format!(
                "Deleted {} \"{}\" and {} item(s) under it.",
                scope.label(),
                record.name,
                removed - 1
            )
        } else {
            format!("Deleted {} \"{}\".", scope.label(), record.name)
        };
        Ok(StatePatch::new()
            .set(fields.target_id(), record.id)
            .set(fields.target_filter(), rounds)
            .set(fields.result_ids(), vec![record.id])
            .set(fields.completed(), true)
            .set(fields.formatted(), message))
    }
}
