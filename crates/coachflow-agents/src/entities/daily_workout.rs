use super::defaults;
use crate::scheduler::ItemTemplate;
use crate::strategy::EntityAgent;
use crate::validate::FieldRule;
use coachflow_core::Focus;
use coachflow_llm::FieldSpec;
use serde_json::json;

pub struct DailyWorkoutAgent;

impl EntityAgent for DailyWorkoutAgent {
    fn focus(&self) -> Focus {
        Focus::DailyWorkout
    }

    fn description(&self) -> &'static str {
        "Daily workouts are the training days of a week, each with a kind and a duration."
    }

    fn parameter_fields(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::integer("count", Some(0), None, "how many workouts"),
            FieldSpec::text_list("items", "workout names, when the user names them"),
            FieldSpec::text("kind", "workout kind, e.g. strength, cardio, mobility"),
            FieldSpec::integer("duration_minutes", Some(1), None, "workout length in minutes"),
        ]
    }

    fn editable_fields(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::text("kind", "workout kind"),
            FieldSpec::integer("duration_minutes", Some(1), None, "workout length in minutes"),
        ]
    }

    fn template(&self) -> ItemTemplate {
        ItemTemplate {
            noun: "Day",
            default_count: 3,
            max_items: 7,
            defaults: defaults(&[("kind", json!("strength")), ("duration_minutes", json!(60))]),
        }
    }

    fn rules(&self) -> Vec<FieldRule> {
        vec![FieldRule::range("duration_minutes", 10, 180)]
    }
}
