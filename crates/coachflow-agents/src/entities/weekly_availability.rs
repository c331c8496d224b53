use super::defaults;
use crate::scheduler::ItemTemplate;
use crate::strategy::EntityAgent;
use crate::validate::FieldRule;
use coachflow_core::Focus;
use coachflow_llm::FieldSpec;
use serde_json::json;

/// Minutes available per day for one week. Always exists as a full week,
/// so "create" and "delete" both rewrite it.
pub struct WeeklyAvailabilityAgent;

impl EntityAgent for WeeklyAvailabilityAgent {
    fn focus(&self) -> Focus {
        Focus::WeeklyAvailability
    }

    fn description(&self) -> &'static str {
        "Weekly availability records how many minutes the user can train on each day of a week."
    }

    fn parameter_fields(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::text_list("items", "day names, when the user names specific days"),
            FieldSpec::integer("minutes", Some(0), None, "minutes available per day"),
        ]
    }

    fn editable_fields(&self) -> Vec<FieldSpec> {
        vec![FieldSpec::integer("minutes", Some(0), None, "minutes available that day")]
    }

    fn template(&self) -> ItemTemplate {
        ItemTemplate {
            noun: "Day",
            default_count: 7,
            max_items: 7,
            defaults: defaults(&[("minutes", json!(60))]),
        }
    }

    fn rules(&self) -> Vec<FieldRule> {
        vec![FieldRule::range("minutes", 0, 300)]
    }

    fn supports_create(&self) -> bool {
        false
    }

    fn supports_delete(&self) -> bool {
        false
    }
}
