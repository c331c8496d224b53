//! Tests for coachflow-agents: parent resolution, operation routing, the edit
//! loop, deletion, reads, the coordinator, and the coach runtime

use coachflow_agents::store::with_transaction;
use coachflow_agents::*;
use coachflow_core::fields::USER_ID;
use coachflow_core::{EntityView, Error, FieldNamer, Focus, Operation, StatePatch, StateRecord, ThreadId};
use coachflow_graph::{GraphRunner, MemoryCheckpointStore};
use coachflow_llm::ScriptedExtractor;
use serde_json::{json, Value};
use std::sync::Arc;

struct Harness {
    runtime: CoachRuntime,
    extractor: Arc<ScriptedExtractor>,
    store: Arc<MemoryStore>,
}

fn harness_with(config: CoachConfig, extractor: ScriptedExtractor) -> Harness {
    let extractor = Arc::new(extractor);
    let store = Arc::new(MemoryStore::new());
    let runtime = CoachRuntime::new(
        &config,
        extractor.clone(),
        Arc::new(TemplateScheduler::new()),
        store.clone(),
        Arc::new(MemoryCheckpointStore::new()),
    )
    .unwrap();
    Harness {
        runtime,
        extractor,
        store,
    }
}

fn harness(extractor: ScriptedExtractor) -> Harness {
    harness_with(CoachConfig::default(), extractor)
}

/// A structured request for one entity.
fn ask(focus: Focus, op: Operation, detail: &str) -> StatePatch {
    let f = FieldNamer::new(focus);
    let flag = match op {
        Operation::Alter => f.is_altered(),
        Operation::Create => f.is_created(),
        Operation::Delete => f.is_deleted(),
        Operation::Read => f.is_read(),
        Operation::NoImpact => f.is_requested(),
    };
    StatePatch::new()
        .set(f.is_requested(), true)
        .set(flag, true)
        .set(f.detail(), detail)
}

fn seed(store: &MemoryStore, focus: Focus, parent: Option<i64>, name: &str, data: Value) -> i64 {
    with_transaction(store, |tx| {
        tx.insert(NewRecord {
            user_id: "u".into(),
            focus,
            parent_id: parent,
            name: name.into(),
            data: data.as_object().cloned().unwrap_or_default(),
        })
    })
    .unwrap()
}

fn records(store: &MemoryStore, focus: Focus) -> Vec<EntityRecord> {
    store.all().into_iter().filter(|r| r.focus == focus).collect()
}

fn prompt(reply: &Reply) -> String {
    match reply {
        Reply::Prompt(interrupt) => interrupt.task.render(),
        other => panic!("expected a prompt, got {:?}", other),
    }
}

fn message(reply: &Reply) -> String {
    match reply {
        Reply::Completed { message, .. } => message.clone(),
        other => panic!("expected a completed run, got {:?}", other),
    }
}

/// A plan with three blocks. Returns the plan id.
fn seed_blocks(store: &MemoryStore) -> i64 {
    let plan = seed(store, Focus::LongTermPlan, None, "Plan 1", json!({"duration_weeks": 12}));
    for name in ["Hypertrophy block", "Strength block", "Peak block"] {
        seed(store, Focus::TrainingBlock, Some(plan), name, json!({"weeks": 4}));
    }
    plan
}

// ===========================================================================
// Operation router
// ===========================================================================

fn op_for(focus: Focus, flags: &[&str]) -> Operation {
    let mut patch = StatePatch::new();
    for flag in flags {
        patch.insert(format!("{}_{}", focus.as_str(), flag), true);
    }
    let state = StateRecord::from(patch);
    select_operation(agent_for(focus).as_ref(), &EntityView::new(&state, focus))
}

#[test]
fn router_precedence() {
    let f = Focus::TrainingBlock;
    assert_eq!(op_for(f, &["is_altered", "is_created", "is_deleted", "is_read"]), Operation::Alter);
    assert_eq!(op_for(f, &["is_created", "is_deleted", "is_read"]), Operation::Create);
    assert_eq!(op_for(f, &["is_deleted", "is_read"]), Operation::Delete);
    assert_eq!(op_for(f, &["is_read"]), Operation::Read);
    assert_eq!(op_for(f, &[]), Operation::NoImpact);
    assert_eq!(op_for(f, &["is_requested"]), Operation::NoImpact);
}

#[test]
fn router_without_create_or_delete_paths_alters() {
    assert_eq!(op_for(Focus::Availability, &["is_created"]), Operation::Alter);
    assert_eq!(op_for(Focus::WeeklyAvailability, &["is_deleted"]), Operation::Alter);
    assert_eq!(op_for(Focus::Equipment, &["is_deleted"]), Operation::Delete);
}

#[test]
fn every_flag_combination_yields_one_operation() {
    let flags = ["is_altered", "is_created", "is_deleted", "is_read"];
    for focus in Focus::ALL {
        for mask in 0..16u32 {
            let set: Vec<&str> = flags
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, f)| *f)
                .collect();
            let op = op_for(focus, &set);
            assert_eq!(op == Operation::NoImpact, set.is_empty(), "{} {:?}", focus, set);
        }
    }
}

// ===========================================================================
// Graph construction
// ===========================================================================

fn collaborators(store: Arc<MemoryStore>) -> Collaborators {
    Collaborators {
        extractor: Arc::new(ScriptedExtractor::new()),
        store,
        scheduler: Arc::new(TemplateScheduler::new()),
        limits: EngineConfig::default(),
    }
}

#[test]
fn every_entity_graph_compiles() {
    let graphs = build_entity_graphs(&collaborators(Arc::new(MemoryStore::new()))).unwrap();
    assert_eq!(graphs.len(), Focus::ALL.len());
    let block = &graphs[&Focus::TrainingBlock];
    assert_eq!(block.name(), "training_block_agent");
    assert!(block.has_node(nodes::ASK_PERMISSION));
    assert!(block.has_node(nodes::PARENT_AGENT));
    assert!(!graphs[&Focus::Equipment].has_node(nodes::ASK_PERMISSION));
}

#[tokio::test]
async fn missing_parent_without_parent_graph_aborts() {
    let deps = collaborators(Arc::new(MemoryStore::new()));
    let graph = build_entity_graph(agent_for(Focus::TrainingBlock), &deps, None).unwrap();
    assert!(!graph.has_node(nodes::ASK_PERMISSION));

    let runner = GraphRunner::new(graph, Arc::new(MemoryCheckpointStore::new()));
    let initial = StateRecord::from(
        ask(Focus::TrainingBlock, Operation::Create, "two blocks").set(USER_ID, "u"),
    );
    let err = runner
        .invoke(&ThreadId::for_user("u"), initial, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { focus: Focus::LongTermPlan, .. }));
}

// ===========================================================================
// Parent resolution
// ===========================================================================

#[tokio::test]
async fn permission_denied_is_not_found_and_store_untouched() {
    let h = harness(ScriptedExtractor::new());
    let reply = h
        .runtime
        .start_structured("u", ask(Focus::TrainingBlock, Operation::Create, "three blocks"))
        .await
        .unwrap();
    let question = prompt(&reply);
    assert!(question.contains("long-term plan"), "{}", question);
    assert!(question.contains("Would you like to create it?"));

    let err = h.runtime.resume("u", "no").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { focus: Focus::LongTermPlan, .. }));
    assert!(h.store.is_empty());
    assert!(!h.runtime.has_pending("u").await.unwrap());
}

#[tokio::test]
async fn unclear_permission_answer_asks_again() {
    let h = harness(ScriptedExtractor::new());
    h.runtime
        .start_structured("u", ask(Focus::TrainingBlock, Operation::Create, ""))
        .await
        .unwrap();

    let reply = h.runtime.resume("u", "what is that?").await.unwrap();
    assert!(prompt(&reply).contains("Please answer yes or no."));

    let err = h.runtime.resume("u", "nope").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn permission_granted_creates_parent_then_child() {
    let h = harness(
        ScriptedExtractor::new().on("training_block_parameters", json!({"count": 3})),
    );
    let reply = h
        .runtime
        .start_structured("u", ask(Focus::TrainingBlock, Operation::Create, "three blocks"))
        .await
        .unwrap();
    assert!(prompt(&reply).contains("Would you like to create it?"));

    // The parent's own edit loop runs inside the child's run.
    let reply = h.runtime.resume("u", "yes").await.unwrap();
    let plan_prompt = prompt(&reply);
    assert!(plan_prompt.contains("Here is your long-term plan:"), "{}", plan_prompt);
    assert!(plan_prompt.contains("Plan 1"));

    let reply = h.runtime.resume("u", "looks good").await.unwrap();
    let block_prompt = prompt(&reply);
    assert!(block_prompt.contains("Here is your training block:"), "{}", block_prompt);
    assert!(block_prompt.contains("Block 3"));

    let reply = h.runtime.resume("u", "no edits").await.unwrap();
    let summary = message(&reply);
    assert!(summary.contains("Saved your long-term plan:"), "{}", summary);
    assert!(summary.contains("Saved your training block:"));

    let plans = records(&h.store, Focus::LongTermPlan);
    assert_eq!(plans.len(), 1);
    let blocks = records(&h.store, Focus::TrainingBlock);
    assert_eq!(blocks.len(), 3);
    assert!(blocks.iter().all(|b| b.parent_id == Some(plans[0].id)));
}

#[tokio::test]
async fn every_created_ancestor_appears_in_the_summary() {
    let h = harness(ScriptedExtractor::new());
    let reply = h
        .runtime
        .start_structured("u", ask(Focus::WeeklyBlock, Operation::Create, "four weeks"))
        .await
        .unwrap();
    assert!(prompt(&reply).contains("Would you like to create it?"));
    let reply = h.runtime.resume("u", "yes").await.unwrap();
    assert!(prompt(&reply).contains("Would you like to create it?"));

    let reply = h.runtime.resume("u", "yes").await.unwrap();
    assert!(prompt(&reply).contains("Here is your long-term plan:"));
    let reply = h.runtime.resume("u", "looks good").await.unwrap();
    assert!(prompt(&reply).contains("Here is your training block:"));
    let reply = h.runtime.resume("u", "looks good").await.unwrap();
    assert!(prompt(&reply).contains("Here is your weekly block:"));

    let summary = message(&h.runtime.resume("u", "looks good").await.unwrap());
    assert!(summary.contains("Saved your long-term plan:"), "{}", summary);
    assert!(summary.contains("Saved your training block:"));
    assert!(summary.contains("Saved your weekly block:"));
    assert_eq!(records(&h.store, Focus::WeeklyBlock).len(), 4);
}

#[tokio::test]
async fn already_requested_parent_is_not_asked_about() {
    let store = Arc::new(MemoryStore::new());
    let graphs = build_entity_graphs(&collaborators(store)).unwrap();
    let runner = GraphRunner::new(
        graphs[&Focus::TrainingBlock].clone(),
        Arc::new(MemoryCheckpointStore::new()),
    );
    let initial = StateRecord::from(
        ask(Focus::TrainingBlock, Operation::Create, "two blocks")
            .set(USER_ID, "u")
            .set(FieldNamer::new(Focus::LongTermPlan).is_requested(), true),
    );

    let outcome = runner
        .invoke(&ThreadId::for_user("u"), initial, None)
        .await
        .unwrap();
    let task = outcome.interrupt().unwrap().task.render();
    assert!(task.contains("Here is your long-term plan:"), "{}", task);
    assert!(!task.contains("Would you like to create it?"));
}

#[tokio::test]
async fn parent_override_skips_lookup() {
    let h = harness(
        ScriptedExtractor::new().on("training_block_parameters", json!({"count": 1})),
    );
    let old = seed(&h.store, Focus::LongTermPlan, None, "Old plan", json!({}));
    seed(&h.store, Focus::LongTermPlan, None, "New plan", json!({}));

    let request = ask(Focus::TrainingBlock, Operation::Create, "one block").set(
        FieldNamer::new(Focus::TrainingBlock).perform_with_parent_id(),
        old,
    );
    let reply = h.runtime.start_structured("u", request).await.unwrap();
    assert!(prompt(&reply).contains("Block 1"));
    h.runtime.resume("u", "no").await.unwrap();

    let blocks = records(&h.store, Focus::TrainingBlock);
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].parent_id, Some(old));
}

#[tokio::test]
async fn parent_override_must_exist() {
    let h = harness(ScriptedExtractor::new());
    let request = ask(Focus::TrainingBlock, Operation::Create, "one block")
        .set(FieldNamer::new(Focus::TrainingBlock).perform_with_parent_id(), 99);
    let err = h.runtime.start_structured("u", request).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { focus: Focus::LongTermPlan, .. }));
}

// ===========================================================================
// Edit loop
// ===========================================================================

#[tokio::test]
async fn alter_with_one_match_edits_in_place() {
    let h = harness(
        ScriptedExtractor::new()
            .on("training_block_parameters", json!({"target": "strength", "weeks": 6})),
    );
    seed_blocks(&h.store);
    let strength = records(&h.store, Focus::TrainingBlock)[1].id;

    let reply = h
        .runtime
        .start_structured(
            "u",
            ask(Focus::TrainingBlock, Operation::Alter, "make the strength block six weeks"),
        )
        .await
        .unwrap();
    let text = prompt(&reply);
    assert!(!text.contains("Which one did you mean?"), "{}", text);
    assert!(text.contains("Strength block: weeks=6"), "{}", text);

    h.runtime.resume("u", "done").await.unwrap();
    let blocks = records(&h.store, Focus::TrainingBlock);
    assert_eq!(blocks.len(), 3);
    let updated = blocks.iter().find(|b| b.id == strength).unwrap();
    assert_eq!(updated.data["weeks"], json!(6));
}

#[tokio::test]
async fn alter_with_three_matches_lists_them_all() {
    let h = harness(
        ScriptedExtractor::new().on("training_block_parameters", json!({"target": "block"})),
    );
    seed_blocks(&h.store);

    let reply = h
        .runtime
        .start_structured("u", ask(Focus::TrainingBlock, Operation::Alter, "change the block"))
        .await
        .unwrap();
    let text = prompt(&reply);
    assert!(text.contains("3 training block entries match"), "{}", text);
    for name in ["Hypertrophy block", "Strength block", "Peak block"] {
        assert!(text.contains(name), "{} missing from {}", name, text);
    }
    assert!(text.ends_with("Which one did you mean?"));

    let reply = h.runtime.resume("u", "the peak one").await.unwrap();
    let text = prompt(&reply);
    assert!(text.contains("Here is your training block:"));
    assert!(text.contains("Peak block"));
    assert!(!text.contains("Strength block"));
}

#[tokio::test]
async fn disambiguation_gives_up_after_max_rounds() {
    let h = harness(
        ScriptedExtractor::new().on("training_block_parameters", json!({"target": "block"})),
    );
    seed_blocks(&h.store);
    h.runtime
        .start_structured("u", ask(Focus::TrainingBlock, Operation::Alter, "change the block"))
        .await
        .unwrap();

    assert!(h.runtime.resume("u", "block").await.unwrap().is_prompt());
    assert!(h.runtime.resume("u", "a block").await.unwrap().is_prompt());
    let err = h.runtime.resume("u", "any block").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { focus: Focus::TrainingBlock, .. }));
}

#[tokio::test]
async fn invalid_draft_requires_confirmation_listing_every_violation() {
    let h = harness(ScriptedExtractor::new().on(
        "availability_parameters",
        json!({"days_per_week": 0, "minutes_per_session": 5}),
    ));

    let reply = h
        .runtime
        .start_structured("u", ask(Focus::Availability, Operation::Alter, "0 days, 5 minutes"))
        .await
        .unwrap();
    assert!(prompt(&reply).contains("Some things look off:"));

    let reply = h.runtime.resume("u", "no edits").await.unwrap();
    let warning = prompt(&reply);
    assert!(warning.contains("breaks 2 rule(s)"), "{}", warning);
    assert!(warning.contains("days_per_week is 0, below the minimum of 1"));
    assert!(warning.contains("minutes_per_session is 5, below the minimum of 10"));
    assert!(warning.contains("Save it anyway?"));
    assert!(h.store.is_empty());

    h.runtime.resume("u", "yes").await.unwrap();
    let saved = records(&h.store, Focus::Availability);
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].data["days_per_week"], json!(0));
}

#[tokio::test]
async fn declined_confirmation_returns_to_edits() {
    let h = harness(ScriptedExtractor::new().on(
        "availability_parameters",
        json!({"days_per_week": 9}),
    ));
    h.runtime
        .start_structured("u", ask(Focus::Availability, Operation::Alter, "nine days"))
        .await
        .unwrap();
    h.runtime.resume("u", "looks good").await.unwrap();

    let reply = h.runtime.resume("u", "no").await.unwrap();
    assert!(prompt(&reply).contains("Would you like to make any edits?"));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn zero_edits_persists_the_draft_as_shown() {
    let h = harness(
        ScriptedExtractor::new()
            .on("equipment_parameters", json!({"items": ["Barbell", "Bench"]})),
    );
    let reply = h
        .runtime
        .start_structured("u", ask(Focus::Equipment, Operation::Create, "barbell and bench"))
        .await
        .unwrap();
    let shown: Vec<String> = match &reply {
        Reply::Prompt(i) => i.task.lines().iter().map(|l| l.to_string()).collect(),
        other => panic!("expected a prompt, got {:?}", other),
    };
    let draft_lines = &shown[1..shown.len() - 1];
    assert_eq!(draft_lines, ["Barbell: available=true", "Bench: available=true"]);

    h.runtime.resume("u", "no").await.unwrap();
    let saved: Vec<String> = records(&h.store, Focus::Equipment)
        .iter()
        .map(EntityRecord::summary)
        .collect();
    assert_eq!(saved, draft_lines);
}

#[tokio::test]
async fn edits_outside_the_draft_are_forwarded_verbatim() {
    let h = harness(
        ScriptedExtractor::new()
            .on("equipment_parameters", json!({"items": ["A", "B", "C"]}))
            .on(
                "draft_edits",
                json!({"edits": [
                    {"target": "D", "instruction": "make D unavailable", "available": false},
                    {"target": "B", "instruction": "mark B unavailable", "available": false}
                ]}),
            ),
    );
    h.runtime
        .start_structured("u", ask(Focus::Equipment, Operation::Create, "A, B and C"))
        .await
        .unwrap();

    let reply = h
        .runtime
        .resume("u", "make D unavailable and mark B unavailable")
        .await
        .unwrap();
    let text = prompt(&reply);
    assert!(text.contains("A: available=true"));
    assert!(text.contains("B: available=false"));
    assert!(text.contains("C: available=true"));
    assert!(!text.contains("D:"));
    assert!(text.contains("Save this equipment?"), "{}", text);

    let edit_call = h
        .extractor
        .calls()
        .into_iter()
        .find(|c| c.schema == "draft_edits")
        .unwrap();
    assert!(edit_call.prompt.contains("by exact label: A, B, C"));

    let reply = h.runtime.resume("u", "yes").await.unwrap();
    match &reply {
        Reply::Completed { message, state } => {
            assert!(message.contains("- make D unavailable"), "{}", message);
            let view = EntityView::new(state, Focus::Equipment);
            assert_eq!(view.other_requests(), vec!["make D unavailable"]);
        }
        other => panic!("expected a completed run, got {:?}", other),
    }
    let names: Vec<String> = records(&h.store, Focus::Equipment)
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(names, ["A", "B", "C"]);
}

#[tokio::test]
async fn edited_draft_is_confirmed_before_saving() {
    let h = harness(
        ScriptedExtractor::new()
            .on("equipment_parameters", json!({"items": ["A", "B"]}))
            .on(
                "draft_edits",
                json!({"edits": [{"target": "B", "available": false}]}),
            ),
    );
    h.runtime
        .start_structured("u", ask(Focus::Equipment, Operation::Create, "A and B"))
        .await
        .unwrap();

    let reply = h.runtime.resume("u", "mark B unavailable").await.unwrap();
    let text = prompt(&reply);
    assert!(text.contains("B: available=false"));
    assert!(text.contains("Save this equipment?"), "{}", text);
    assert!(h.store.is_empty(), "nothing is saved before a yes");

    let reply = h.runtime.resume("u", "no").await.unwrap();
    assert!(prompt(&reply).contains("Would you like to make any edits?"));
    assert!(h.store.is_empty());

    h.runtime.resume("u", "no edits").await.unwrap();
    let saved: Vec<String> = records(&h.store, Focus::Equipment)
        .iter()
        .map(EntityRecord::summary)
        .collect();
    assert_eq!(saved, ["A: available=true", "B: available=false"]);
}

#[tokio::test]
async fn infeasible_request_asks_for_detail() {
    let h = harness(
        ScriptedExtractor::new()
            .on("training_block_parameters", json!({"count": 20}))
            .on("training_block_parameters", json!({"count": 2})),
    );
    seed(&h.store, Focus::LongTermPlan, None, "Plan 1", json!({}));

    let reply = h
        .runtime
        .start_structured("u", ask(Focus::TrainingBlock, Operation::Create, "twenty blocks"))
        .await
        .unwrap();
    let text = prompt(&reply);
    assert!(text.contains("more than the 8 a training block can hold"), "{}", text);

    let reply = h.runtime.resume("u", "two is fine").await.unwrap();
    let text = prompt(&reply);
    assert!(text.contains("Block 2"));
    assert!(!text.contains("Block 3"));

    let calls = h.extractor.calls();
    let last = calls
        .iter()
        .filter(|c| c.schema == "training_block_parameters")
        .last()
        .unwrap();
    assert_eq!(last.raw_text, "twenty blocks\ntwo is fine");
}

#[tokio::test]
async fn workouts_are_fitted_to_saved_availability() {
    let h = harness(
        ScriptedExtractor::new()
            .on("daily_workout_parameters", json!({"count": 5}))
            .on("daily_workout_parameters", json!({})),
    );
    let plan = seed(&h.store, Focus::LongTermPlan, None, "Plan 1", json!({}));
    let block = seed(&h.store, Focus::TrainingBlock, Some(plan), "Block 1", json!({}));
    seed(&h.store, Focus::WeeklyBlock, Some(block), "Week 1", json!({}));
    seed(
        &h.store,
        Focus::Availability,
        None,
        "Availability 1",
        json!({"days_per_week": 2, "minutes_per_session": 45}),
    );

    let reply = h
        .runtime
        .start_structured("u", ask(Focus::DailyWorkout, Operation::Create, "this week's workouts"))
        .await
        .unwrap();
    let text = prompt(&reply);
    assert!(
        text.contains("5 workouts is more than the 2 training days in your availability"),
        "{}",
        text
    );

    let reply = h.runtime.resume("u", "whatever fits").await.unwrap();
    let text = prompt(&reply);
    assert!(text.contains("Day 2: duration_minutes=45"), "{}", text);
    assert!(!text.contains("Day 3"));
}

#[tokio::test]
async fn repeated_infeasibility_fails() {
    let h = harness(
        ScriptedExtractor::new()
            .on("training_block_parameters", json!({"count": 20}))
            .on("training_block_parameters", json!({"count": 20}))
            .on("training_block_parameters", json!({"count": 20})),
    );
    seed(&h.store, Focus::LongTermPlan, None, "Plan 1", json!({}));

    h.runtime
        .start_structured("u", ask(Focus::TrainingBlock, Operation::Create, "twenty blocks"))
        .await
        .unwrap();
    h.runtime.resume("u", "twenty").await.unwrap();
    let err = h.runtime.resume("u", "really twenty").await.unwrap_err();
    assert!(matches!(err, Error::Infeasible { focus: Focus::TrainingBlock, .. }));
    assert_eq!(records(&h.store, Focus::TrainingBlock).len(), 0);
}

#[tokio::test]
async fn edit_cap_ends_in_abandon() {
    let mut config = CoachConfig::default();
    config.engine.max_edit_rounds = 1;
    let h = harness_with(
        config,
        ScriptedExtractor::new().on("equipment_parameters", json!({"items": ["Barbell"]})),
    );
    h.runtime
        .start_structured("u", ask(Focus::Equipment, Operation::Create, "a barbell"))
        .await
        .unwrap();

    // The regenerated draft goes straight to confirmation.
    let reply = h.runtime.resume("u", "regenerate").await.unwrap();
    let text = prompt(&reply);
    assert!(text.contains("Save this equipment?"), "{}", text);

    let reply = h.runtime.resume("u", "no").await.unwrap();
    assert!(message(&reply).contains("discarded"));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn rejection_just_below_the_cap_gets_a_last_confirmation() {
    let mut config = CoachConfig::default();
    config.engine.max_edit_rounds = 1;
    let h = harness_with(
        config,
        ScriptedExtractor::new().on("availability_parameters", json!({"days_per_week": 9})),
    );
    h.runtime
        .start_structured("u", ask(Focus::Availability, Operation::Alter, "nine days"))
        .await
        .unwrap();
    let reply = h.runtime.resume("u", "no edits").await.unwrap();
    assert!(prompt(&reply).contains("Save it anyway?"));

    // The rejection uses the last round; edits are no longer offered.
    let reply = h.runtime.resume("u", "no").await.unwrap();
    let text = prompt(&reply);
    assert!(text.contains("Save it anyway?"), "{}", text);
    assert!(!text.contains("Would you like to make any edits?"));

    let reply = h.runtime.resume("u", "yes").await.unwrap();
    assert!(message(&reply).contains("Saved your availability:"));
    assert_eq!(records(&h.store, Focus::Availability).len(), 1);
}

#[tokio::test]
async fn regenerate_replaces_existing_items() {
    let h = harness(
        ScriptedExtractor::new().on("training_block_parameters", json!({"count": 2})),
    );
    let plan = seed_blocks(&h.store);
    let old_block = records(&h.store, Focus::TrainingBlock)[0].id;
    seed(&h.store, Focus::WeeklyBlock, Some(old_block), "Week 1", json!({}));

    h.runtime
        .start_structured("u", ask(Focus::TrainingBlock, Operation::Alter, "redo as two blocks"))
        .await
        .unwrap();
    h.runtime.resume("u", "regenerate").await.unwrap();
    h.runtime.resume("u", "looks good").await.unwrap();

    let blocks = records(&h.store, Focus::TrainingBlock);
    assert_eq!(blocks.len(), 2);
    assert!(blocks.iter().all(|b| b.parent_id == Some(plan) && b.id != old_block));
    assert!(records(&h.store, Focus::WeeklyBlock).is_empty());
}

// ===========================================================================
// Deletion
// ===========================================================================

#[tokio::test]
async fn delete_cascades_to_descendants() {
    let h = harness(
        ScriptedExtractor::new().on("training_block_deletion", json!({"target": "strength"})),
    );
    let plan = seed(&h.store, Focus::LongTermPlan, None, "Plan 1", json!({}));
    let strength = seed(&h.store, Focus::TrainingBlock, Some(plan), "Strength block", json!({"weeks": 4}));
    seed(&h.store, Focus::TrainingBlock, Some(plan), "Endurance block", json!({"weeks": 4}));
    seed(&h.store, Focus::WeeklyBlock, Some(strength), "Week 1", json!({}));

    let reply = h
        .runtime
        .start_structured(
            "u",
            ask(Focus::TrainingBlock, Operation::Delete, "delete the strength block"),
        )
        .await
        .unwrap();
    let text = message(&reply);
    assert!(text.contains("Deleted training block \"Strength block\" and 1 item(s) under it."), "{}", text);

    let names: Vec<String> = h.store.all().into_iter().map(|r| r.name).collect();
    assert_eq!(names, ["Plan 1", "Endurance block"]);
}

#[tokio::test]
async fn delete_never_offers_to_create_a_parent() {
    let h = harness(ScriptedExtractor::new());
    let err = h
        .runtime
        .start_structured("u", ask(Focus::WeeklyBlock, Operation::Delete, "delete week 2"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { focus: Focus::TrainingBlock, .. }));
}

#[tokio::test]
async fn ambiguous_delete_asks_which() {
    let h = harness(ScriptedExtractor::new().on("training_block_deletion", json!({"target": "block"})));
    seed_blocks(&h.store);

    let reply = h
        .runtime
        .start_structured("u", ask(Focus::TrainingBlock, Operation::Delete, "delete a block"))
        .await
        .unwrap();
    assert!(prompt(&reply).contains("Which one did you mean?"));
    assert_eq!(records(&h.store, Focus::TrainingBlock).len(), 3);

    let reply = h.runtime.resume("u", "hypertrophy").await.unwrap();
    assert!(message(&reply).contains("Hypertrophy block"));
    assert_eq!(records(&h.store, Focus::TrainingBlock).len(), 2);
}

// ===========================================================================
// Reads
// ===========================================================================

fn read(focus: Focus, plural: bool, current: bool) -> StatePatch {
    let f = FieldNamer::new(focus);
    ask(focus, Operation::Read, "")
        .set(f.read_plural(), plural)
        .set(f.read_current(), current)
}

#[tokio::test]
async fn read_modes() {
    let h = harness(ScriptedExtractor::new());
    let old_plan = seed(&h.store, Focus::LongTermPlan, None, "Old plan", json!({}));
    seed(&h.store, Focus::TrainingBlock, Some(old_plan), "X", json!({}));
    let plan = seed(&h.store, Focus::LongTermPlan, None, "Plan 2", json!({}));
    seed(&h.store, Focus::TrainingBlock, Some(plan), "B1", json!({}));
    seed(&h.store, Focus::TrainingBlock, Some(plan), "B2", json!({}));

    let single = message(
        &h.runtime
            .start_structured("u", read(Focus::TrainingBlock, false, false))
            .await
            .unwrap(),
    );
    assert_eq!(single, "Your training block:\n- B2");

    let current = message(
        &h.runtime
            .start_structured("u", read(Focus::TrainingBlock, true, true))
            .await
            .unwrap(),
    );
    assert_eq!(current, "Your training block:\n- B1\n- B2");

    let all = message(
        &h.runtime
            .start_structured("u", read(Focus::TrainingBlock, true, false))
            .await
            .unwrap(),
    );
    assert_eq!(all, "Your training block:\n- X\n- B1\n- B2");
}

#[tokio::test]
async fn read_returns_records_as_json() {
    let h = harness(ScriptedExtractor::new());
    let id = seed(&h.store, Focus::Equipment, None, "Barbell", json!({"available": true}));

    let reply = h
        .runtime
        .start_structured("u", read(Focus::Equipment, true, false))
        .await
        .unwrap();
    let Reply::Completed { state, .. } = reply else {
        panic!("expected a completed read");
    };
    let rows = state
        .get(&FieldNamer::new(Focus::Equipment).records())
        .and_then(Value::as_array)
        .cloned()
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], json!(id));
    assert_eq!(rows[0]["name"], json!("Barbell"));
    assert_eq!(rows[0]["data"]["available"], json!(true));
}

#[tokio::test]
async fn read_without_parent_is_not_found() {
    let h = harness(ScriptedExtractor::new());
    let err = h
        .runtime
        .start_structured("u", read(Focus::WeeklyBlock, false, false))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { focus: Focus::TrainingBlock, .. }));
}

#[tokio::test]
async fn empty_read_says_so() {
    let h = harness(ScriptedExtractor::new());
    let reply = h
        .runtime
        .start_structured("u", read(Focus::Equipment, true, false))
        .await
        .unwrap();
    assert_eq!(message(&reply), "You have no equipment yet.");
}

// ===========================================================================
// Coordinator
// ===========================================================================

#[tokio::test]
async fn free_text_request_is_parsed_and_summarized() {
    let h = harness(
        ScriptedExtractor::new()
            .on(
                "request",
                json!({
                    "requests": [
                        {"entity": "equipment", "operation": "create", "detail": "a barbell"},
                        {"entity": "spaceship", "operation": "create"}
                    ],
                    "other_requests": ["book a massage"]
                }),
            )
            .on("equipment_parameters", json!({"items": ["Barbell"]})),
    );

    let reply = h
        .runtime
        .start("u", "I have a barbell. Also book a massage.")
        .await
        .unwrap();
    assert!(prompt(&reply).contains("Barbell: available=true"));
    assert_eq!(h.extractor.call_count("request"), 1);
    let equipment_call = h
        .extractor
        .calls()
        .into_iter()
        .find(|c| c.schema == "equipment_parameters")
        .unwrap();
    assert_eq!(equipment_call.raw_text, "a barbell");

    let summary = message(&h.runtime.resume("u", "no").await.unwrap());
    assert!(summary.contains("Saved your equipment:\nBarbell: available=true"), "{}", summary);
    assert!(summary.contains("I can't handle these here:\n- book a massage"));
}

#[tokio::test]
async fn structured_request_skips_parsing() {
    let h = harness(ScriptedExtractor::new());
    h.runtime
        .start_structured("u", read(Focus::Equipment, true, false))
        .await
        .unwrap();
    assert_eq!(h.extractor.call_count("request"), 0);
}

#[tokio::test]
async fn empty_request_has_nothing_to_do() {
    let h = harness(ScriptedExtractor::new());
    let reply = h.runtime.start("u", "   ").await.unwrap();
    assert_eq!(message(&reply), "There was nothing for me to change.");
}

#[tokio::test]
async fn parents_run_before_children_in_one_message() {
    let h = harness(
        ScriptedExtractor::new()
            .on("long_term_plan_parameters", json!({"goal": "marathon"}))
            .on("training_block_parameters", json!({"count": 2})),
    );
    let mut request = ask(Focus::TrainingBlock, Operation::Create, "two blocks");
    request.extend(ask(Focus::LongTermPlan, Operation::Create, "a marathon plan"));

    let reply = h.runtime.start_structured("u", request).await.unwrap();
    assert!(prompt(&reply).contains("goal=marathon"));
    let reply = h.runtime.resume("u", "no").await.unwrap();
    assert!(prompt(&reply).contains("Block 2"));
    h.runtime.resume("u", "no").await.unwrap();

    let plan = &records(&h.store, Focus::LongTermPlan)[0];
    let blocks = records(&h.store, Focus::TrainingBlock);
    assert_eq!(blocks.len(), 2);
    assert!(blocks.iter().all(|b| b.parent_id == Some(plan.id)));
}

// ===========================================================================
// Runtime
// ===========================================================================

#[tokio::test]
async fn resume_without_pending_run_is_a_mismatch() {
    let h = harness(ScriptedExtractor::new());
    let err = h.runtime.resume("u", "yes").await.unwrap_err();
    assert!(matches!(err, Error::CheckpointMismatch(_)));
}

#[tokio::test]
async fn new_message_abandons_pending_question() {
    let h = harness(
        ScriptedExtractor::new()
            .on("equipment_parameters", json!({"items": ["Barbell"]}))
            .on("availability_parameters", json!({"days_per_week": 3})),
    );
    h.runtime
        .start_structured("u", ask(Focus::Equipment, Operation::Create, "a barbell"))
        .await
        .unwrap();
    assert!(h.runtime.has_pending("u").await.unwrap());

    let reply = h
        .runtime
        .start_structured("u", ask(Focus::Availability, Operation::Alter, "three days"))
        .await
        .unwrap();
    assert!(prompt(&reply).contains("days_per_week=3"));
    h.runtime.resume("u", "no").await.unwrap();

    assert!(records(&h.store, Focus::Equipment).is_empty());
    assert_eq!(records(&h.store, Focus::Availability).len(), 1);
    assert!(!h.runtime.has_pending("u").await.unwrap());
}

#[tokio::test]
async fn extraction_failure_keeps_the_question_open() {
    let h = harness(
        ScriptedExtractor::new()
            .on("equipment_parameters", json!({"items": ["Barbell"]}))
            .fail("draft_edits", "service unavailable")
            .on(
                "draft_edits",
                json!({"edits": [{"target": "Barbell", "available": false}]}),
            ),
    );
    h.runtime
        .start_structured("u", ask(Focus::Equipment, Operation::Create, "a barbell"))
        .await
        .unwrap();

    let err = h
        .runtime
        .resume("u", "the barbell is broken")
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    let pending = h.runtime.pending("u").await.unwrap().unwrap();
    assert!(pending.task.contains("Would you like to make any edits?"));

    let reply = h.runtime.resume("u", "the barbell is broken").await.unwrap();
    assert!(prompt(&reply).contains("Barbell: available=false"));
}

#[tokio::test]
async fn failure_after_a_save_does_not_replay_the_save() {
    let h = harness(
        ScriptedExtractor::new()
            .on("equipment_parameters", json!({"items": ["Barbell"]}))
            .fail("availability_parameters", "service unavailable"),
    );
    let mut request = ask(Focus::Equipment, Operation::Create, "a barbell");
    request.extend(ask(Focus::Availability, Operation::Alter, "three days"));
    h.runtime.start_structured("u", request).await.unwrap();

    let err = h.runtime.resume("u", "no").await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(records(&h.store, Focus::Equipment).len(), 1);
    assert!(!h.runtime.has_pending("u").await.unwrap());

    let err = h.runtime.resume("u", "no").await.unwrap_err();
    assert!(matches!(err, Error::CheckpointMismatch(_)));
    assert_eq!(records(&h.store, Focus::Equipment).len(), 1);
}

#[tokio::test]
async fn users_have_separate_threads() {
    let h = harness(ScriptedExtractor::new());
    let (a, b) = tokio::join!(
        h.runtime
            .start_structured("a", ask(Focus::Equipment, Operation::Create, "gear")),
        h.runtime
            .start_structured("b", ask(Focus::Equipment, Operation::Create, "gear")),
    );
    assert!(a.unwrap().is_prompt());
    assert!(b.unwrap().is_prompt());

    h.runtime.resume("a", "no").await.unwrap();
    assert!(!h.runtime.has_pending("a").await.unwrap());
    assert!(h.runtime.has_pending("b").await.unwrap());

    let owners: Vec<String> = h.store.all().into_iter().map(|r| r.user_id).collect();
    assert_eq!(owners, ["a"]);
}

#[tokio::test]
async fn file_checkpoints_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = CoachConfig::default();
    config.checkpoints.backend = CheckpointBackend::File;
    config.checkpoints.dir = dir.path().to_path_buf();
    let store = Arc::new(MemoryStore::new());

    let first = CoachRuntime::open(&config, Arc::new(ScriptedExtractor::new()), store.clone())
        .await
        .unwrap();
    let reply = first
        .start_structured("u", ask(Focus::Equipment, Operation::Create, "gear"))
        .await
        .unwrap();
    assert!(reply.is_prompt());
    drop(first);

    let second = CoachRuntime::open(&config, Arc::new(ScriptedExtractor::new()), store.clone())
        .await
        .unwrap();
    assert!(second.has_pending("u").await.unwrap());
    let reply = second.resume("u", "no").await.unwrap();
    assert!(message(&reply).contains("Saved your equipment:"));
    assert_eq!(store.len(), 1);
    assert_eq!(second.gc().await.unwrap(), 0);
}
