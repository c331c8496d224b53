use super::defaults;
use crate::scheduler::ItemTemplate;
use crate::strategy::EntityAgent;
use crate::validate::FieldRule;
use coachflow_core::Focus;
use coachflow_llm::FieldSpec;
use serde_json::json;

/// Exercises of one daily workout, with sets and reps.
pub struct DailyExercisesAgent;

impl EntityAgent for DailyExercisesAgent {
    fn focus(&self) -> Focus {
        Focus::DailyExercises
    }

    fn description(&self) -> &'static str {
        "Daily exercises are the movements of one workout, each with sets and reps."
    }

    fn parameter_fields(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::integer("count", Some(0), None, "how many exercises"),
            FieldSpec::text_list("items", "exercise names, e.g. Squat, Bench Press"),
            FieldSpec::integer("sets", Some(0), None, "sets per exercise"),
            FieldSpec::integer("reps", Some(0), None, "reps per set"),
        ]
    }

    fn editable_fields(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::integer("sets", Some(0), None, "sets for this exercise"),
            FieldSpec::integer("reps", Some(0), None, "reps per set"),
        ]
    }

    fn template(&self) -> ItemTemplate {
        ItemTemplate {
            noun: "Exercise",
            default_count: 4,
            max_items: 12,
            defaults: defaults(&[("sets", json!(3)), ("reps", json!(10))]),
        }
    }

    fn rules(&self) -> Vec<FieldRule> {
        vec![FieldRule::range("sets", 1, 10), FieldRule::range("reps", 1, 50)]
    }
}
