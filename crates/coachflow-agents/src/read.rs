//! Reading items back to the user

use crate::builder::AgentScope;
use crate::store::{EntityRecord, RecordQuery};
use coachflow_core::{StatePatch, StateRecord};
use coachflow_graph::{Node, NodeContext, NodeResult};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// The user's current item.
    Single,
    /// Every item under the resolved parent.
    Current,
    /// Every item the user owns.
    All,
}

pub(crate) struct ReadNode {
    scope: Arc<AgentScope>,
    mode: ReadMode,
}

impl ReadNode {
    pub fn new(scope: Arc<AgentScope>, mode: ReadMode) -> Self {
        Self { scope, mode }
    }

    fn records(&self, state: &StateRecord) -> coachflow_core::Result<Vec<EntityRecord>> {
        let scope = &self.scope;
        let user_id = scope.user_id(state)?;
        match self.mode {
            ReadMode::Single => Ok(scope
                .store()
                .current(&user_id, scope.focus())?
                .into_iter()
                .collect()),
            ReadMode::Current => scope.items_under_parent(state),
            ReadMode::All => scope.store().list(&RecordQuery::new(user_id, scope.focus())),
        }
    }
}

#[async_trait::async_trait]
impl Node for ReadNode {
    async fn run(&self, state: &StateRecord, _ctx: &mut NodeContext) -> NodeResult {
        let scope = &self.scope;
        let fields = scope.fields();
        let records = self.records(state)?;
        debug!(focus = %scope.focus(), mode = ?self.mode, count = records.len(), "read");

        let formatted = if records.is_empty() {
            format!("You have no {} yet.", scope.label())
        } else {
            let mut lines = vec![format!("Your {}:", scope.label())];
            lines.extend(records.iter().map(|r| format!("- {}", r.summary())));
            lines.join("\n")
        };
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        let rows = records
            .iter()
            .map(EntityRecord::to_json)
            .collect::<coachflow_core::Result<Vec<_>>>()?;
        Ok(StatePatch::new()
            .set(fields.completed(), !ids.is_empty())
            .set(fields.result_ids(), ids)
            .set(fields.records(), rows)
            .set(fields.formatted(), formatted))
    }
}
