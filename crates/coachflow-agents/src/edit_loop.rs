//! The alter/create flow: extract, draft, edit, validate, confirm, save.
//!
//! ```text
//! RETRIEVE_INFORMATION → LOCATE_TARGET | GENERATE_DRAFT
//! GENERATE_DRAFT       → FORMAT_DRAFT | REQUEST_DETAIL → RETRIEVE_INFORMATION
//! FORMAT_DRAFT         → ASK_FOR_EDITS
//! ASK_FOR_EDITS        → FINALIZE | CONFIRM_DRAFT | GENERATE_DRAFT | APPLY_EDITS
//! APPLY_EDITS          → VALIDATE_DRAFT → CONFIRM_DRAFT
//! CONFIRM_DRAFT        → FINALIZE | ASK_FOR_EDITS | ABANDON_DRAFT
//! ```
//!
//! Nothing edited is saved without a yes. Each edit or regeneration uses one
//! edit round, as does a declined confirmation. At `max_edit_rounds` edits
//! are no longer offered and the draft is shown for a last confirmation; a
//! no there abandons it.

use crate::builder::AgentScope;
use crate::decision::{classify, classify_edit_choice, Decision, EditChoice};
use crate::draft::{Draft, EditInstruction};
use crate::filter;
use crate::scheduler::ScheduleRequest;
use crate::store::{with_transaction, NewRecord, RecordQuery};
use coachflow_core::{EntityView, Error, Focus, Operation, StatePatch, StateRecord, Task};
use coachflow_graph::{Node, NodeContext, NodeResult};
use coachflow_llm::{FieldSpec, PromptTemplate, TargetSchema};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

const CHOICE_FINALIZE: &str = "finalize";
const CHOICE_CONFIRM: &str = "confirm";
const CHOICE_REGENERATE: &str = "regenerate";
const CHOICE_EDIT: &str = "edit";

fn load_draft(scope: &AgentScope, state: &StateRecord) -> Result<Draft, Error> {
    state
        .get_as::<Draft>(&scope.fields().draft())?
        .ok_or_else(|| Error::Internal(format!("{} has no draft", scope.focus())))
}

fn parameters(scope: &AgentScope, state: &StateRecord) -> Result<Map<String, Value>, Error> {
    Ok(state
        .get_as::<Map<String, Value>>(&scope.fields().parameters())?
        .unwrap_or_default())
}

fn bullet_list(items: &[String]) -> Vec<String> {
    items.iter().map(|v| format!("- {}", v)).collect()
}

// ============================================================================
// Routing
// ============================================================================

pub(crate) fn route_information(focus: Focus) -> impl Fn(&StateRecord) -> String + Send + Sync {
    move |state| {
        let view = EntityView::new(state, focus);
        let has_target = view
            .target_filter()
            .iter()
            .any(|t| !t.trim().is_empty());
        if view.operation() == Some(Operation::Alter) && has_target {
            "locate".into()
        } else {
            "generate".into()
        }
    }
}

pub(crate) fn route_generated(focus: Focus) -> impl Fn(&StateRecord) -> String + Send + Sync {
    move |state| {
        let key = EntityView::new(state, focus).fields().draft();
        match state.get(&key) {
            Some(v) if !v.is_null() => "ready".into(),
            _ => "infeasible".into(),
        }
    }
}

pub(crate) fn route_edit_choice(focus: Focus) -> impl Fn(&StateRecord) -> String + Send + Sync {
    move |state| {
        EntityView::new(state, focus)
            .edit_choice()
            .unwrap_or(CHOICE_CONFIRM)
            .to_string()
    }
}

pub(crate) fn route_confirmation(
    scope: Arc<AgentScope>,
) -> impl Fn(&StateRecord) -> String + Send + Sync {
    move |state| {
        let view = scope.view(state);
        if state.get_bool(&scope.fields().confirmed()) {
            "confirmed".into()
        } else if view.edit_round() > scope.limits().max_edit_rounds {
            "exhausted".into()
        } else {
            "rejected".into()
        }
    }
}

// ============================================================================
// Gathering parameters
// ============================================================================

/// Extract the entity's parameters from the request detail.
pub(crate) struct RetrieveInformation {
    scope: Arc<AgentScope>,
}

impl RetrieveInformation {
    pub fn new(scope: Arc<AgentScope>) -> Self {
        Self { scope }
    }

    fn schema(&self, operation: Option<Operation>) -> TargetSchema {
        let focus = self.scope.focus();
        let mut schema = TargetSchema::new(
            format!("{}_parameters", focus.as_str()),
            format!("What the user wants their {} to look like", focus.label()),
        );
        for field in self.scope.agent.parameter_fields() {
            schema = schema.field(field);
        }
        if operation == Some(Operation::Alter) {
            schema = schema.field(FieldSpec::text(
                "target",
                "the one existing item the user wants changed, in their words; \
                 leave out when the whole thing is being redone",
            ));
        }
        schema
    }
}

#[async_trait::async_trait]
impl Node for RetrieveInformation {
    async fn run(&self, state: &StateRecord, _ctx: &mut NodeContext) -> NodeResult {
        let scope = &self.scope;
        let view = scope.view(state);
        let fields = scope.fields();
        let detail = view.detail();

        let extraction = if detail.trim().is_empty() {
            Default::default()
        } else {
            let schema = self.schema(view.operation());
            scope.extract(detail, &scope.agent.prompt(), &schema).await?
        };
        debug!(focus = %scope.focus(), parameters = ?extraction.as_map(), "parameters extracted");

        let filter: Vec<String> = extraction.get_str("target").map(String::from).into_iter().collect();
        Ok(StatePatch::new()
            .set(fields.parameters(), extraction.into_value())
            .set(fields.target_filter(), filter))
    }
}

/// Alter of one named item: find it and seed the draft from it.
pub(crate) struct LocateTarget {
    scope: Arc<AgentScope>,
}

impl LocateTarget {
    pub fn new(scope: Arc<AgentScope>) -> Self {
        Self { scope }
    }
}

#[async_trait::async_trait]
impl Node for LocateTarget {
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

        // Parameters stated alongside the target apply to it right away.
        let editable: Vec<String> = scope
            .agent
            .editable_fields()
            .into_iter()
            .map(|f| f.name)
            .collect();
        let mut draft = Draft::from_record(&record);
        let params = parameters(scope, state)?;
        if let Some(item) = draft.items.first_mut() {
            for (k, v) in params {
                if editable.contains(&k) && !v.is_null() {
                    item.fields.insert(k, v);
                }
            }
        }

        info!(focus = %scope.focus(), target = record.id, "target located");
        Ok(StatePatch::new()
            .set(fields.target_id(), record.id)
            .set(fields.target_filter(), rounds)
            .set_json(fields.draft(), &draft)?)
    }
}

/// Ask the scheduler for a draft.
pub(crate) struct GenerateDraft {
    scope: Arc<AgentScope>,
}

impl GenerateDraft {
    pub fn new(scope: Arc<AgentScope>) -> Self {
        Self { scope }
    }
}

#[async_trait::async_trait]
impl Node for GenerateDraft {
    async fn run(&self, state: &StateRecord, _ctx: &mut NodeContext) -> NodeResult {
        let scope = &self.scope;
        let fields = scope.fields();
        let view = scope.view(state);

        let mut params = parameters(scope, state)?;
        params.remove("target");
        // Regenerating a located item keeps it a single item with its name.
        if let Some(id) = view.target_id() {
            if let Some(record) = scope.store().get(id)? {
                params.insert("count".into(), json!(1));
                params.insert("items".into(), json!([record.name]));
            }
        }

        let user_id = scope.user_id(state)?;
        let store = scope.store();
        let request = ScheduleRequest {
            focus: scope.focus(),
            parent: scope.parent_record(state)?,
            parameters: params,
            template: scope.agent.template(),
            equipment: store.list(&RecordQuery::new(user_id.clone(), Focus::Equipment))?,
            availability: store.current(&user_id, Focus::Availability)?,
            user_id,
        };

        match scope.deps.scheduler.solve(&request) {
            Ok(draft) => {
                debug!(focus = %scope.focus(), items = draft.len(), "draft generated");
                Ok(StatePatch::new()
                    .set_json(fields.draft(), &draft)?
                    .set(fields.violations(), Vec::<String>::new()))
            }
            Err(infeasible) => {
                let attempts = view.attempts() + 1;
                warn!(
                    focus = %scope.focus(),
                    attempts,
                    reason = %infeasible.reason,
                    "no feasible draft"
                );
                if attempts >= scope.limits().max_generation_attempts {
                    return Err(Error::infeasible(scope.focus(), infeasible.reason).into());
                }
                Ok(StatePatch::new()
                    .set(fields.draft(), Value::Null)
                    .set(fields.violations(), vec![infeasible.reason])
                    .set(fields.attempts(), attempts as i64))
            }
        }
    }
}

/// Ask for more detail after an infeasible request.
pub(crate) struct RequestDetail {
    scope: Arc<AgentScope>,
}

impl RequestDetail {
    pub fn new(scope: Arc<AgentScope>) -> Self {
        Self { scope }
    }
}

#[async_trait::async_trait]
impl Node for RequestDetail {
    async fn run(&self, state: &StateRecord, ctx: &mut NodeContext) -> NodeResult {
        let scope = &self.scope;
        let view = scope.view(state);

        let mut lines = vec![format!("I couldn't put together that {}:", scope.label())];
        lines.extend(bullet_list(&view.violations()));
        lines.push("Could you tell me more about what you want?".into());
        let answer = ctx.interrupt(Task::Many(lines))?;

        let detail = match view.detail().trim() {
            "" => answer,
            before => format!("{}\n{}", before, answer),
        };
        Ok(StatePatch::new().set(scope.fields().detail(), detail))
    }
}

// ============================================================================
// The edit loop
// ============================================================================

/// Render the draft and check it. Registered as both FORMAT_DRAFT and
/// VALIDATE_DRAFT.
pub(crate) struct FormatDraft {
    scope: Arc<AgentScope>,
}

impl FormatDraft {
    pub fn new(scope: Arc<AgentScope>) -> Self {
        Self { scope }
    }
}

#[async_trait::async_trait]
impl Node for FormatDraft {
    async fn run(&self, state: &StateRecord, _ctx: &mut NodeContext) -> NodeResult {
        let scope = &self.scope;
        let fields = scope.fields();
        let draft = load_draft(scope, state)?;
        let violations = scope.agent.validate(&draft);
        if !violations.is_empty() {
            debug!(focus = %scope.focus(), count = violations.len(), "draft has violations");
        }
        Ok(StatePatch::new()
            .set(fields.formatted(), draft.format().join("\n"))
            .set(fields.violations(), violations))
    }
}

pub(crate) struct AskForEdits {
    scope: Arc<AgentScope>,
}

impl AskForEdits {
    pub fn new(scope: Arc<AgentScope>) -> Self {
        Self { scope }
    }
}

#[async_trait::async_trait]
impl Node for AskForEdits {
    async fn run(&self, state: &StateRecord, ctx: &mut NodeContext) -> NodeResult {
        let scope = &self.scope;
        let fields = scope.fields();
        let view = scope.view(state);
        let round = view.edit_round();

        if round >= scope.limits().max_edit_rounds {
            info!(focus = %scope.focus(), round, "edit rounds used up");
            return Ok(StatePatch::new().set(fields.edit_choice(), CHOICE_CONFIRM));
        }

        let draft = load_draft(scope, state)?;
        let violations = view.violations();
        let mut lines = vec![format!("Here is your {}:", scope.label())];
        lines.extend(draft.format());
        if !violations.is_empty() {
            lines.push("Some things look off:".into());
            lines.extend(bullet_list(&violations));
        }
        lines.push("Would you like to make any edits?".into());

        let answer = ctx.interrupt(Task::Many(lines))?;
        let patch = match classify_edit_choice(&answer) {
            EditChoice::Done if violations.is_empty() => {
                StatePatch::new().set(fields.edit_choice(), CHOICE_FINALIZE)
            }
            EditChoice::Done => StatePatch::new().set(fields.edit_choice(), CHOICE_CONFIRM),
            EditChoice::Regenerate => StatePatch::new()
                .set(fields.edit_choice(), CHOICE_REGENERATE)
                .set(fields.regenerate(), true)
                .set(fields.edit_round(), (round + 1) as i64),
            EditChoice::Edit => StatePatch::new()
                .set(fields.edit_choice(), CHOICE_EDIT)
                .set(fields.edit_request(), answer),
        };
        Ok(patch)
    }
}

/// Apply an edit instruction to the draft items it names.
///
/// The extractor sees the draft and the exact labels it may target.
/// Anything aimed at an item that is not in the draft is passed on as
/// another request, word for word.
pub(crate) struct ApplyEdits {
    scope: Arc<AgentScope>,
}

impl ApplyEdits {
    pub fn new(scope: Arc<AgentScope>) -> Self {
        Self { scope }
    }

    fn schema(&self) -> TargetSchema {
        let mut item = vec![
            FieldSpec::text("target", "exact label of the draft item to change").required(),
            FieldSpec::text("instruction", "the user's words for this change"),
        ];
        item.extend(self.scope.agent.editable_fields());
        TargetSchema::new("draft_edits", "Edits to a draft")
            .field(FieldSpec::object_list(
                "edits",
                item,
                "one entry per item the user wants changed",
            ))
            .field(FieldSpec::text_list(
                "other_requests",
                "anything the user asked for that is not an item of this draft, verbatim",
            ))
    }

    fn prompt(&self, draft: &Draft) -> PromptTemplate {
        let rendered = draft.format().join("\n");
        let allow = draft.allow_list().join(", ");
        PromptTemplate::new(
            "You are editing the user's draft {label}.\n\
             Draft:\n{draft}\n\n\
             Items you may change, by exact label: {allow}\n\
             Never apply a change to an item that is not listed, even a similar one. \
             If the user refers to anything else, copy their words into other_requests.\n\n\
             Edit request: {input}",
        )
        .with(&[
            ("label", self.scope.label()),
            ("draft", rendered.as_str()),
            ("allow", allow.as_str()),
        ])
    }
}

#[async_trait::async_trait]
impl Node for ApplyEdits {
    async fn run(&self, state: &StateRecord, _ctx: &mut NodeContext) -> NodeResult {
        let scope = &self.scope;
        let fields = scope.fields();
        let view = scope.view(state);
        let mut draft = load_draft(scope, state)?;
        let request = state.get_str(&fields.edit_request()).unwrap_or_default();

        let extraction = scope
            .extract(request, &self.prompt(&draft), &self.schema())
            .await?;
        let edits: Vec<EditInstruction> = extraction
            .get_objects("edits")
            .iter()
            .map(EditInstruction::from_object)
            .collect();
        let editable: Vec<String> = scope
            .agent
            .editable_fields()
            .into_iter()
            .map(|f| f.name)
            .collect();
        let outcome = draft.apply_edits(&edits, &editable);

        let mut other_requests = view.other_requests();
        other_requests.extend(outcome.forwarded.iter().cloned());
        other_requests.extend(extraction.get_strings("other_requests"));
        info!(
            focus = %scope.focus(),
            applied = outcome.applied,
            forwarded = outcome.forwarded.len(),
            "edits applied"
        );

        Ok(StatePatch::new()
            .set_json(fields.draft(), &draft)?
            .set(fields.other_requests(), other_requests)
            .set(fields.edit_round(), (view.edit_round() + 1) as i64))
    }
}

pub(crate) struct ConfirmDraft {
    scope: Arc<AgentScope>,
}

impl ConfirmDraft {
    pub fn new(scope: Arc<AgentScope>) -> Self {
        Self { scope }
    }
}

#[async_trait::async_trait]
impl Node for ConfirmDraft {
    async fn run(&self, state: &StateRecord, ctx: &mut NodeContext) -> NodeResult {
        let scope = &self.scope;
        let fields = scope.fields();
        let view = scope.view(state);
        let violations = view.violations();
        let draft = load_draft(scope, state)?;

        let mut lines = vec![format!("Here is your {}:", scope.label())];
        lines.extend(draft.format());
        if violations.is_empty() {
            lines.push(format!("Save this {}?", scope.label()));
        } else {
            lines.push(format!(
                "Warning: this {} breaks {} rule(s):",
                scope.label(),
                violations.len()
            ));
            lines.extend(bullet_list(&violations));
            lines.push("Save it anyway?".into());
        }

        let max_rounds = scope.limits().max_disambiguation_rounds;
        let mut unclear = 0;
        let confirmed = loop {
            let mut prompt = lines.clone();
            if unclear > 0 {
                prompt.push("Please answer yes or no.".into());
            }
            match classify(&ctx.interrupt(Task::Many(prompt))?) {
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

        let mut patch = StatePatch::new().set(fields.confirmed(), confirmed);
        if !confirmed {
            patch.insert(fields.edit_round(), (view.edit_round() + 1) as i64);
        }
        Ok(patch)
    }
}

// ============================================================================
// Ending the loop
// ============================================================================

/// Persist the draft in one transaction.
///
/// A located target is updated in place and loses its descendants. A create
/// inserts. Anything else replaces every item of this entity under the
/// parent.
pub(crate) struct Finalize {
    scope: Arc<AgentScope>,
}

impl Finalize {
    pub fn new(scope: Arc<AgentScope>) -> Self {
        Self { scope }
    }
}

#[async_trait::async_trait]
impl Node for Finalize {
    async fn run(&self, state: &StateRecord, ctx: &mut NodeContext) -> NodeResult {
        let scope = &self.scope;
        let fields = scope.fields();
        let view = scope.view(state);
        let focus = scope.focus();
        let draft = load_draft(scope, state)?;
        let user_id = scope.user_id(state)?;
        let parent_id = view.parent_id();
        let operation = view.operation();

        let ids = with_transaction(scope.store(), |tx| {
            if let Some(id) = view.target_id() {
                let item = draft
                    .items
                    .first()
                    .ok_or_else(|| Error::Internal(format!("{} draft is empty", focus)))?;
                tx.update(id, item.label.clone(), item.fields.clone())?;
                tx.delete_children_of(id)?;
                return Ok(vec![id]);
            }
            if operation != Some(Operation::Create) {
                let query = RecordQuery::new(user_id.clone(), focus).under(parent_id);
                for existing in tx.list(&query) {
                    tx.delete_cascade(existing.id)?;
                }
            }
            draft
                .items
                .iter()
                .map(|item| {
                    tx.insert(NewRecord {
                        user_id: user_id.clone(),
                        focus,
                        parent_id,
                        name: item.label.clone(),
                        data: item.fields.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()
        })?;
        ctx.record_commit();

        info!(focus = %focus, ids = ?ids, "draft saved");
        let mut lines = vec![format!("Saved your {}:", scope.label())];
        lines.extend(draft.format());
        Ok(StatePatch::new()
            .set(fields.result_ids(), ids)
            .set(fields.completed(), true)
            .set(fields.formatted(), lines.join("\n")))
    }
}

pub(crate) struct AbandonDraft {
    scope: Arc<AgentScope>,
}

impl AbandonDraft {
    pub fn new(scope: Arc<AgentScope>) -> Self {
        Self { scope }
    }
}

#[async_trait::async_trait]
impl Node for AbandonDraft {
    async fn run(&self, _state: &StateRecord, _ctx: &mut NodeContext) -> NodeResult {
        let scope = &self.scope;
        info!(focus = %scope.focus(), "draft abandoned");
        Ok(StatePatch::new()
            .set(scope.fields().completed(), false)
            .set(
                scope.fields().formatted(),
                format!("Your {} draft was discarded; nothing was saved.", scope.label()),
            ))
    }
}
