//! Coordinator - the top-level graph run for each user message
//!
//! PARSE_REQUEST sets the per-entity request flags, then every requested
//! entity's agent runs once, parents before children, and SUMMARIZE joins
//! their results into one reply.

use crate::builder::Collaborators;
use crate::entities::agent_for;
use coachflow_core::fields::{OTHER_REQUESTS, REQUEST_PARSED};
use coachflow_core::{EntityView, FieldNamer, Focus, Operation, StatePatch, StateRecord};
use coachflow_graph::{
    CompilationError, CompiledGraph, Node, NodeContext, NodeResult, Projection, StateGraph,
    SubgraphNode, END,
};
use coachflow_llm::{Extractor, FieldSpec, PromptTemplate, TargetSchema};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The raw user message. Not a global key: entity agents never see it.
pub const REQUEST_TEXT: &str = "request_text";
/// The reply text written by SUMMARIZE.
pub const SUMMARY: &str = "summary";

pub const COORDINATOR_GRAPH: &str = "coordinator";
const PARSE_REQUEST: &str = "parse_request";
const SUMMARIZE: &str = "summarize";

/// The next requested entity whose agent has not run yet.
fn next_requested(state: &StateRecord) -> String {
    Focus::ALL
        .iter()
        .find(|f| {
            let fields = FieldNamer::new(**f);
            state.get_bool(&fields.is_requested()) && !state.contains(&fields.operation())
        })
        .map_or_else(|| SUMMARIZE.to_string(), |f| f.as_str().to_string())
}

/// Build the coordinator over already-built entity graphs.
pub fn build_coordinator(
    graphs: &HashMap<Focus, CompiledGraph>,
    deps: &Collaborators,
) -> Result<CompiledGraph, CompilationError> {
    let agents: Vec<Focus> = Focus::ALL
        .into_iter()
        .filter(|f| graphs.contains_key(f))
        .collect();
    let mut routes: Vec<(&str, &str)> = agents.iter().map(|f| (f.as_str(), f.as_str())).collect();
    routes.push((SUMMARIZE, SUMMARIZE));

    let mut g = StateGraph::new(COORDINATOR_GRAPH);
    g.add_node(PARSE_REQUEST, ParseRequest::new(deps.extractor.clone()))
        .add_conditional_edge(PARSE_REQUEST, next_requested, &routes)
        .set_entry(PARSE_REQUEST);

    for focus in agents {
        let Some(graph) = graphs.get(&focus) else {
            continue;
        };
        g.add_node(
            focus.as_str(),
            SubgraphNode::new(focus, graph.clone()).with_output(Projection::lineage(focus)),
        )
        .add_conditional_edge(focus.as_str(), next_requested, &routes);
    }

    g.add_node(SUMMARIZE, Summarize).add_edge(SUMMARIZE, END);
    g.compile()
}

// ============================================================================
// Request parsing
// ============================================================================

fn request_schema() -> TargetSchema {
    let entities: Vec<&str> = Focus::ALL.iter().map(|f| f.as_str()).collect();
    TargetSchema::new("request", "What the user is asking for, per entity")
        .field(FieldSpec::object_list(
            "requests",
            vec![
                FieldSpec::choice("entity", &entities, "the entity this part is about").required(),
                FieldSpec::choice(
                    "operation",
                    &["read", "create", "alter", "delete"],
                    "what to do with it",
                )
                .required(),
                FieldSpec::text("detail", "the user's words about this entity"),
                FieldSpec::boolean("read_plural", "true when several items should be shown"),
                FieldSpec::boolean(
                    "read_current",
                    "true when only items of the current plan should be shown",
                ),
            ],
            "one entry per entity the message touches",
        ))
        .field(FieldSpec::text_list(
            "other_requests",
            "anything that is not about one of these entities, verbatim",
        ))
}

fn request_prompt() -> PromptTemplate {
    let entities: Vec<String> = Focus::ALL
        .iter()
        .map(|f| format!("- {}: {}", f.as_str(), agent_for(*f).description()))
        .collect();
    PromptTemplate::new(
        "You route messages for a fitness coaching assistant. It manages these entities:\n\
         {entities}\n\n\
         Split the message into one request per entity it touches. \
         Extract only what the message states.\n\n\
         Message: {input}",
    )
    .with(&[("entities", entities.join("\n").as_str())])
}

/// The flag a parsed operation raises.
fn operation_flag(fields: &FieldNamer, op: Operation) -> Option<String> {
    match op {
        Operation::Alter => Some(fields.is_altered()),
        Operation::Create => Some(fields.is_created()),
        Operation::Delete => Some(fields.is_deleted()),
        Operation::Read => Some(fields.is_read()),
        Operation::NoImpact => None,
    }
}

pub(crate) struct ParseRequest {
    extractor: Arc<dyn Extractor>,
}

impl ParseRequest {
    pub fn new(extractor: Arc<dyn Extractor>) -> Self {
        Self { extractor }
    }
}

#[async_trait::async_trait]
impl Node for ParseRequest {
    async fn run(&self, state: &StateRecord, _ctx: &mut NodeContext) -> NodeResult {
        if state.get_bool(REQUEST_PARSED) {
            debug!("request already structured");
            return Ok(StatePatch::new());
        }
        let text = state.get_str(REQUEST_TEXT).unwrap_or_default();
        let mut patch = StatePatch::new().set(REQUEST_PARSED, true);
        if text.trim().is_empty() {
            return Ok(patch);
        }

        let extraction = self
            .extractor
            .extract(text, &request_prompt(), &request_schema())
            .await
            .map_err(|e| e.into_core(self.extractor.name()))?;

        let mut details: HashMap<Focus, Vec<String>> = HashMap::new();
        for request in extraction.get_objects("requests") {
            let entity = request.get("entity").and_then(|v| v.as_str()).unwrap_or_default();
            let Some(focus) = Focus::parse(entity) else {
                warn!(entity, "request for unknown entity dropped");
                continue;
            };
            let Some(op) = request
                .get("operation")
                .and_then(|v| v.as_str())
                .and_then(Operation::parse)
            else {
                continue;
            };
            let fields = FieldNamer::new(focus);
            patch.insert(fields.is_requested(), true);
            if let Some(flag) = operation_flag(&fields, op) {
                patch.insert(flag, true);
            }
            for key in ["read_plural", "read_current"] {
                if request.get(key).and_then(|v| v.as_bool()) == Some(true) {
                    let field = if key == "read_plural" {
                        fields.read_plural()
                    } else {
                        fields.read_current()
                    };
                    patch.insert(field, true);
                }
            }
            let detail = request
                .get("detail")
                .and_then(|v| v.as_str())
                .filter(|d| !d.trim().is_empty())
                .unwrap_or(text);
            details.entry(focus).or_default().push(detail.to_string());
        }
        let requested = details.len();
        for (focus, parts) in details {
            patch.insert(FieldNamer::new(focus).detail(), parts.join("\n"));
        }

        let other = extraction.get_strings("other_requests");
        info!(
            requested,
            other = other.len(),
            "request parsed"
        );
        patch.insert(OTHER_REQUESTS, other);
        Ok(patch)
    }
}

// ============================================================================
// Summary
// ============================================================================

struct Summarize;

#[async_trait::async_trait]
impl Node for Summarize {
    async fn run(&self, state: &StateRecord, _ctx: &mut NodeContext) -> NodeResult {
        let mut lines: Vec<String> = Focus::ALL
            .iter()
            .filter_map(|f| EntityView::new(state, *f).formatted())
            .filter(|s| !s.trim().is_empty())
            .map(String::from)
            .collect();

        let mut other = state.get_strings(OTHER_REQUESTS);
        for focus in Focus::ALL {
            other.extend(EntityView::new(state, focus).other_requests());
        }
        other.dedup();
        if !other.is_empty() {
            lines.push("I can't handle these here:".into());
            lines.extend(other.iter().map(|o| format!("- {}", o)));
        }
        if lines.is_empty() {
            lines.push("There was nothing for me to change.".into());
        }
        Ok(StatePatch::new().set(SUMMARY, lines.join("\n")))
    }
}
