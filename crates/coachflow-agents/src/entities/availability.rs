use super::defaults;
use crate::scheduler::ItemTemplate;
use crate::strategy::EntityAgent;
use crate::validate::FieldRule;
use coachflow_core::Focus;
use coachflow_llm::FieldSpec;
use serde_json::json;

/// General availability: a single settings item that is only ever altered.
pub struct AvailabilityAgent;

impl EntityAgent for AvailabilityAgent {
    fn focus(&self) -> Focus {
        Focus::Availability
    }

    fn description(&self) -> &'static str {
        "Availability is how many days a week the user can train and for how long."
    }

    fn parameter_fields(&self) -> Vec<FieldSpec> {
        self.editable_fields()
    }

    fn editable_fields(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::integer("days_per_week", Some(0), None, "training days per week"),
            FieldSpec::integer("minutes_per_session", Some(0), None, "minutes per session"),
        ]
    }

    fn template(&self) -> ItemTemplate {
        ItemTemplate {
            noun: "Availability",
            default_count: 1,
            max_items: 1,
            defaults: defaults(&[
                ("days_per_week", json!(4)),
                ("minutes_per_session", json!(60)),
            ]),
        }
    }

    fn rules(&self) -> Vec<FieldRule> {
        vec![
            FieldRule::range("days_per_week", 1, 7),
            FieldRule::range("minutes_per_session", 10, 300),
        ]
    }

    fn supports_create(&self) -> bool {
        false
    }

    fn supports_delete(&self) -> bool {
        false
    }
}
