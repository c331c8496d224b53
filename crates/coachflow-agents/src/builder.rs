//! Assembling the generic entity graph from an `EntityAgent`

use crate::config::EngineConfig;
use crate::delete::{ExtractDeletionTarget, LocateDeletion};
use crate::edit_loop::{
    self, AbandonDraft, ApplyEdits, AskForEdits, ConfirmDraft, Finalize, FormatDraft,
    GenerateDraft, LocateTarget, RequestDetail, RetrieveInformation,
};
use crate::entities::agent_for;
use crate::read::{ReadMode, ReadNode};
use crate::resolver::{self, AbortNode, ApplyOverride, AskPermission, RetrieveParent};
use crate::router::{self, DetermineOperation};
use crate::scheduler::Scheduler;
use crate::store::{EntityRecord, EntityStore, RecordQuery};
use crate::strategy::EntityAgent;
use coachflow_core::{EntityView, Error, FieldNamer, Focus, Result, StateRecord};
use coachflow_graph::{
    CompilationError, CompiledGraph, Projection, StateGraph, SubgraphNode, END,
};
use coachflow_llm::{Extraction, Extractor, PromptTemplate, TargetSchema};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Node names shared by every entity graph.
pub mod nodes {
    pub const START: &str = "start";
    pub const APPLY_OVERRIDE: &str = "apply_override";
    pub const RETRIEVE_PARENT: &str = "retrieve_parent";
    pub const ASK_PERMISSION: &str = "ask_permission";
    pub const PARENT_AGENT: &str = "parent_agent";
    pub const ABORT: &str = "abort";
    pub const PARENT_RESOLVED: &str = "parent_resolved";
    pub const DETERMINE_OPERATION: &str = "determine_operation";
    pub const READ_SINGLE: &str = "read_single";
    pub const READ_CURRENT: &str = "read_current";
    pub const READ_ALL: &str = "read_all";
    pub const RETRIEVE_INFORMATION: &str = "retrieve_information";
    pub const LOCATE_TARGET: &str = "locate_target";
    pub const GENERATE_DRAFT: &str = "generate_draft";
    pub const REQUEST_DETAIL: &str = "request_detail";
    pub const FORMAT_DRAFT: &str = "format_draft";
    pub const ASK_FOR_EDITS: &str = "ask_for_edits";
    pub const APPLY_EDITS: &str = "apply_edits";
    pub const VALIDATE_DRAFT: &str = "validate_draft";
    pub const CONFIRM_DRAFT: &str = "confirm_draft";
    pub const FINALIZE: &str = "finalize";
    pub const ABANDON_DRAFT: &str = "abandon_draft";
    pub const EXTRACT_DELETION_TARGET: &str = "extract_deletion_target";
    pub const LOCATE_DELETION: &str = "locate_deletion";
}

/// The external services every agent node talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn Extractor>,
    pub store: Arc<dyn EntityStore>,
    pub scheduler: Arc<dyn Scheduler>,
    pub limits: EngineConfig,
}

/// What one entity graph's nodes share: the strategy and the collaborators.
pub(crate) struct AgentScope {
    pub agent: Arc<dyn EntityAgent>,
    pub deps: Collaborators,
}

impl AgentScope {
    pub fn focus(&self) -> Focus {
        self.agent.focus()
    }

    pub fn label(&self) -> &'static str {
        self.focus().label()
    }

    pub fn fields(&self) -> FieldNamer {
        FieldNamer::new(self.focus())
    }

    pub fn view<'a>(&self, state: &'a StateRecord) -> EntityView<'a> {
        EntityView::new(state, self.focus())
    }

    pub fn limits(&self) -> &EngineConfig {
        &self.deps.limits
    }

    pub fn store(&self) -> &dyn EntityStore {
        self.deps.store.as_ref()
    }

    pub fn user_id(&self, state: &StateRecord) -> Result<String> {
        self.view(state)
            .user_id()
            .map(str::to_string)
            .ok_or_else(|| Error::Internal("state has no user_id".into()))
    }

    /// The resolved parent record, if this entity has one.
    pub fn parent_record(&self, state: &StateRecord) -> Result<Option<EntityRecord>> {
        match self.view(state).parent_id() {
            Some(id) => self.store().get(id),
            None => Ok(None),
        }
    }

    /// This entity's items under the resolved parent. Root entities list
    /// every item the user owns.
    pub fn items_under_parent(&self, state: &StateRecord) -> Result<Vec<EntityRecord>> {
        let query = RecordQuery::new(self.user_id(state)?, self.focus())
            .under(self.view(state).parent_id());
        self.store().list(&query)
    }

    pub async fn extract(
        &self,
        raw_text: &str,
        prompt: &PromptTemplate,
        schema: &TargetSchema,
    ) -> Result<Extraction> {
        let extractor = &self.deps.extractor;
        extractor
            .extract(raw_text, prompt, schema)
            .await
            .map_err(|e| e.into_core(extractor.name()))
    }
}

/// Build the graph for one entity.
///
/// `parent_graph` is the compiled graph of the parent entity. Without it a
/// missing parent cannot be created and the request aborts instead of
/// asking permission.
pub fn build_entity_graph(
    agent: Arc<dyn EntityAgent>,
    deps: &Collaborators,
    parent_graph: Option<CompiledGraph>,
) -> std::result::Result<CompiledGraph, CompilationError> {
    use nodes::*;

    let focus = agent.focus();
    let scope = Arc::new(AgentScope {
        agent,
        deps: deps.clone(),
    });
    let mut g = StateGraph::new(format!("{}_agent", focus.as_str()));

    // Parent resolution
    g.add_fn_node(START, |_, _| Ok(Default::default()))
        .add_conditional_edge(
            START,
            resolver::route_start(scope.clone()),
            &[
                ("override", APPLY_OVERRIDE),
                ("retrieve", RETRIEVE_PARENT),
                ("resolved", PARENT_RESOLVED),
            ],
        )
        .set_entry(START);

    if let Some(parent) = focus.parent() {
        g.add_node(APPLY_OVERRIDE, ApplyOverride::new(scope.clone()))
            .add_edge(APPLY_OVERRIDE, PARENT_RESOLVED)
            .add_node(RETRIEVE_PARENT, RetrieveParent::new(scope.clone()))
            .add_node(ABORT, AbortNode::new(scope.clone()));

        match parent_graph {
            Some(parent_graph) => {
                g.add_conditional_edge(
                    RETRIEVE_PARENT,
                    resolver::route_retrieved(scope.clone()),
                    &[
                        ("found", PARENT_RESOLVED),
                        ("missing", ASK_PERMISSION),
                        ("abort", ABORT),
                    ],
                )
                .add_node(ASK_PERMISSION, AskPermission::new(scope.clone()))
                .add_conditional_edge(
                    ASK_PERMISSION,
                    resolver::route_permission(scope.clone()),
                    &[("granted", PARENT_AGENT), ("denied", ABORT)],
                )
                .add_node(
                    PARENT_AGENT,
                    SubgraphNode::new(parent, parent_graph)
                        .with_output(Projection::lineage(parent)),
                )
                .add_edge(PARENT_AGENT, RETRIEVE_PARENT);
            }
            None => {
                g.add_conditional_edge(
                    RETRIEVE_PARENT,
                    resolver::route_retrieved(scope.clone()),
                    &[
                        ("found", PARENT_RESOLVED),
                        ("missing", ABORT),
                        ("abort", ABORT),
                    ],
                );
            }
        }
    } else {
        // Root entities never leave START through the parent branches.
        g.add_fn_node(APPLY_OVERRIDE, |_, _| Ok(Default::default()))
            .add_edge(APPLY_OVERRIDE, PARENT_RESOLVED)
            .add_fn_node(RETRIEVE_PARENT, |_, _| Ok(Default::default()))
            .add_edge(RETRIEVE_PARENT, PARENT_RESOLVED);
    }

    g.add_fn_node(PARENT_RESOLVED, move |state, ctx| {
        debug!(
            focus = %focus,
            parent_id = ?EntityView::new(state, focus).parent_id(),
            path = %ctx.path(),
            "parent resolved"
        );
        Ok(Default::default())
    })
    .add_edge(PARENT_RESOLVED, DETERMINE_OPERATION);

    // Operation routing
    g.add_node(DETERMINE_OPERATION, DetermineOperation::new(scope.clone()))
        .add_conditional_edge(
            DETERMINE_OPERATION,
            router::route_operation(focus),
            &[
                ("alter", RETRIEVE_INFORMATION),
                ("create", RETRIEVE_INFORMATION),
                ("delete", EXTRACT_DELETION_TARGET),
                ("read_single", READ_SINGLE),
                ("read_current", READ_CURRENT),
                ("read_all", READ_ALL),
                ("no_impact", END),
            ],
        );

    // Read
    g.add_node(READ_SINGLE, ReadNode::new(scope.clone(), ReadMode::Single))
        .add_node(READ_CURRENT, ReadNode::new(scope.clone(), ReadMode::Current))
        .add_node(READ_ALL, ReadNode::new(scope.clone(), ReadMode::All));

    // Alter / create
    g.add_node(RETRIEVE_INFORMATION, RetrieveInformation::new(scope.clone()))
        .add_conditional_edge(
            RETRIEVE_INFORMATION,
            edit_loop::route_information(focus),
            &[("locate", LOCATE_TARGET), ("generate", GENERATE_DRAFT)],
        )
        .add_node(LOCATE_TARGET, LocateTarget::new(scope.clone()))
        .add_edge(LOCATE_TARGET, FORMAT_DRAFT)
        .add_node(GENERATE_DRAFT, GenerateDraft::new(scope.clone()))
        .add_conditional_edge(
            GENERATE_DRAFT,
            edit_loop::route_generated(focus),
            &[("ready", FORMAT_DRAFT), ("infeasible", REQUEST_DETAIL)],
        )
        .add_node(REQUEST_DETAIL, RequestDetail::new(scope.clone()))
        .add_edge(REQUEST_DETAIL, RETRIEVE_INFORMATION)
        .add_node(FORMAT_DRAFT, FormatDraft::new(scope.clone()))
        .add_edge(FORMAT_DRAFT, ASK_FOR_EDITS)
        .add_node(ASK_FOR_EDITS, AskForEdits::new(scope.clone()))
        .add_conditional_edge(
            ASK_FOR_EDITS,
            edit_loop::route_edit_choice(focus),
            &[
                ("finalize", FINALIZE),
                ("confirm", CONFIRM_DRAFT),
                ("regenerate", GENERATE_DRAFT),
                ("edit", APPLY_EDITS),
            ],
        )
        .add_node(APPLY_EDITS, ApplyEdits::new(scope.clone()))
        .add_edge(APPLY_EDITS, VALIDATE_DRAFT)
        .add_node(VALIDATE_DRAFT, FormatDraft::new(scope.clone()))
        .add_edge(VALIDATE_DRAFT, CONFIRM_DRAFT)
        .add_node(CONFIRM_DRAFT, ConfirmDraft::new(scope.clone()))
        .add_conditional_edge(
            CONFIRM_DRAFT,
            edit_loop::route_confirmation(scope.clone()),
            &[
                ("confirmed", FINALIZE),
                ("rejected", ASK_FOR_EDITS),
                ("exhausted", ABANDON_DRAFT),
            ],
        )
        .add_node(FINALIZE, Finalize::new(scope.clone()))
        .add_node(ABANDON_DRAFT, AbandonDraft::new(scope.clone()));

    // Delete
    g.add_node(EXTRACT_DELETION_TARGET, ExtractDeletionTarget::new(scope.clone()))
        .add_edge(EXTRACT_DELETION_TARGET, LOCATE_DELETION)
        .add_node(LOCATE_DELETION, LocateDeletion::new(scope));

    g.compile()
}

/// Build every entity graph, parents first, each embedding its parent's.
pub fn build_entity_graphs(
    deps: &Collaborators,
) -> std::result::Result<HashMap<Focus, CompiledGraph>, CompilationError> {
    let mut graphs: HashMap<Focus, CompiledGraph> = HashMap::new();
    for focus in Focus::ALL {
        let parent_graph = focus.parent().and_then(|p| graphs.get(&p).cloned());
        let graph = build_entity_graph(agent_for(focus), deps, parent_graph)?;
        graphs.insert(focus, graph);
    }
    Ok(graphs)
}
