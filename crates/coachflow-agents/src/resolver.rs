//! Parent resolution: find the ancestor a request attaches to, or get
//! permission to create it.

use crate::builder::AgentScope;
use crate::decision::{classify, Decision};
use crate::router::select_operation;
use coachflow_core::{Error, FieldNamer, Focus, Operation, StatePatch, StateRecord};
use coachflow_graph::{Node, NodeContext, NodeResult};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

const GRANTED: &str = "granted";
const DENIED: &str = "denied";

fn parent_of(scope: &AgentScope) -> Result<Focus, Error> {
    scope.focus().parent().ok_or_else(|| {
        Error::Internal(format!("{} has no parent to resolve", scope.focus()))
    })
}

/// START routing: overrides first, then anything that needs no parent.
pub(crate) fn route_start(
    scope: Arc<AgentScope>,
) -> impl Fn(&StateRecord) -> String + Send + Sync + 'static {
    move |state| {
        let view = scope.view(state);
        if scope.focus().parent().is_none() {
            return "resolved".into();
        }
        if view.perform_with_parent_id().is_some() {
            return "override".into();
        }
        match select_operation(scope.agent.as_ref(), &view) {
            Operation::NoImpact => "resolved".into(),
            Operation::Read if view.read_plural() && !view.read_current() => "resolved".into(),
            _ => "retrieve".into(),
        }
    }
}

/// After RETRIEVE_PARENT: found, worth asking about, or hopeless.
///
/// Deletes and reads never create a parent. A parent whose own agent has
/// already run in this request is not offered again.
pub(crate) fn route_retrieved(
    scope: Arc<AgentScope>,
) -> impl Fn(&StateRecord) -> String + Send + Sync + 'static {
    move |state| {
        let view = scope.view(state);
        if view.parent_id().is_some() {
            return "found".into();
        }
        let op = select_operation(scope.agent.as_ref(), &view);
        if matches!(op, Operation::Delete | Operation::Read) {
            return "abort".into();
        }
        let parent_ran = scope
            .focus()
            .parent()
            .is_some_and(|p| state.contains(&FieldNamer::new(p).completed()));
        if parent_ran {
            "abort".into()
        } else {
            "missing".into()
        }
    }
}

pub(crate) fn route_permission(
    scope: Arc<AgentScope>,
) -> impl Fn(&StateRecord) -> String + Send + Sync + 'static {
    move |state| match state.get_str(&scope.fields().permission()) {
        Some(GRANTED) => "granted".into(),
        _ => "denied".into(),
    }
}

/// Use the ancestor the caller named instead of looking one up.
pub(crate) struct ApplyOverride {
    scope: Arc<AgentScope>,
}

impl ApplyOverride {
    pub fn new(scope: Arc<AgentScope>) -> Self {
        Self { scope }
    }
}

#[async_trait::async_trait]
impl Node for ApplyOverride {
    async fn run(&self, state: &StateRecord, _ctx: &mut NodeContext) -> NodeResult {
        let scope = &self.scope;
        let parent = parent_of(scope)?;
        let user_id = scope.user_id(state)?;
        let id = scope.view(state).perform_with_parent_id().unwrap_or_default();

        match scope.store().get(id)? {
            Some(record) if record.focus == parent && record.user_id == user_id => {
                debug!(focus = %scope.focus(), parent_id = id, "parent override");
                Ok(StatePatch::new().set(scope.fields().parent_id(), id))
            }
            _ => Err(Error::not_found(
                parent,
                format!("no {} with id {}", parent.label(), id),
            )
            .into()),
        }
    }
}

/// Look up the user's current parent item. Always writes the parent id,
/// null when there is none.
pub(crate) struct RetrieveParent {
    scope: Arc<AgentScope>,
}

impl RetrieveParent {
    pub fn new(scope: Arc<AgentScope>) -> Self {
        Self { scope }
    }
}

#[async_trait::async_trait]
impl Node for RetrieveParent {
    async fn run(&self, state: &StateRecord, _ctx: &mut NodeContext) -> NodeResult {
        let scope = &self.scope;
        let parent = parent_of(scope)?;
        let user_id = scope.user_id(state)?;
        let found = scope.store().current(&user_id, parent)?;
        debug!(
            focus = %scope.focus(),
            parent = %parent,
            found = ?found.as_ref().map(|r| r.id),
            "retrieved parent"
        );
        let id = found.map_or(Value::Null, |r| Value::from(r.id));
        Ok(StatePatch::new().set(scope.fields().parent_id(), id))
    }
}

/// Ask whether the missing parent should be created.
///
/// If the parent was already requested in this run, permission counts as
/// given and nothing is asked.
pub(crate) struct AskPermission {
    scope: Arc<AgentScope>,
}

impl AskPermission {
    pub fn new(scope: Arc<AgentScope>) -> Self {
        Self { scope }
    }

    fn grant(&self, state: &StateRecord, parent: Focus) -> StatePatch {
        let pf = FieldNamer::new(parent);
        let mut patch = StatePatch::new()
            .set(pf.is_requested(), true)
            .set(self.scope.fields().permission(), GRANTED);
        if !state.get_bool(&pf.is_altered()) && !state.get_bool(&pf.is_created()) {
            patch.insert(pf.is_altered(), true);
        }
        let parent_detail = state.get_str(&pf.detail()).unwrap_or_default();
        if parent_detail.trim().is_empty() {
            patch.insert(pf.detail(), self.scope.view(state).detail());
        }
        patch
    }
}

#[async_trait::async_trait]
impl Node for AskPermission {
    async fn run(&self, state: &StateRecord, ctx: &mut NodeContext) -> NodeResult {
        let scope = &self.scope;
        let parent = parent_of(scope)?;

        if state.get_bool(&FieldNamer::new(parent).is_requested()) {
            debug!(focus = %scope.focus(), parent = %parent, "parent already requested");
            return Ok(self.grant(state, parent));
        }

        let question = format!(
            "You don't have a {} yet, and a {} needs one. Would you like to create it?",
            parent.label(),
            scope.label()
        );
        let max_rounds = scope.limits().max_disambiguation_rounds;
        let mut unclear = 0;
        let granted = loop {
            let prompt = if unclear == 0 {
                question.clone()
            } else {
                format!("Please answer yes or no. {}", question)
            };
            match classify(&ctx.interrupt(prompt)?) {
                Decision::Yes => break true,
                Decision::No => break false,
                Decision::Unclear => {
                    unclear += 1;
                    if unclear > max_rounds {
                        break false;
                    }
                }
            }
        };

        info!(focus = %scope.focus(), parent = %parent, granted, "parent permission");
        if granted {
            Ok(self.grant(state, parent))
        } else {
            Ok(StatePatch::new().set(scope.fields().permission(), DENIED))
        }
    }
}

/// Fail the request: there is no parent and none will be created.
pub(crate) struct AbortNode {
    scope: Arc<AgentScope>,
}

impl AbortNode {
    pub fn new(scope: Arc<AgentScope>) -> Self {
        Self { scope }
    }
}

#[async_trait::async_trait]
impl Node for AbortNode {
    async fn run(&self, state: &StateRecord, _ctx: &mut NodeContext) -> NodeResult {
        let scope = &self.scope;
        let parent = parent_of(scope)?;
        let detail = if state.get_str(&scope.fields().permission()) == Some(DENIED) {
            format!(
                "a {} needs a {}, and creating one was declined",
                scope.label(),
                parent.label()
            )
        } else {
            format!("there is no {} for this {}", parent.label(), scope.label())
        };
        info!(focus = %scope.focus(), parent = %parent, "aborting: {}", detail);
        Err(Error::not_found(parent, detail).into())
    }
}
