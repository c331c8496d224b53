use super::defaults;
use crate::scheduler::ItemTemplate;
use crate::strategy::EntityAgent;
use crate::validate::FieldRule;
use coachflow_core::Focus;
use coachflow_llm::FieldSpec;
use serde_json::json;

/// The root of the training hierarchy: a goal and a horizon.
pub struct LongTermPlanAgent;

impl EntityAgent for LongTermPlanAgent {
    fn focus(&self) -> Focus {
        Focus::LongTermPlan
    }

    fn description(&self) -> &'static str {
        "A long-term plan is the user's overall training goal and how many weeks it spans."
    }

    fn parameter_fields(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::text("goal", "the overall training goal"),
            FieldSpec::integer("duration_weeks", Some(1), None, "plan length in weeks"),
        ]
    }

    fn editable_fields(&self) -> Vec<FieldSpec> {
        self.parameter_fields()
    }

    fn template(&self) -> ItemTemplate {
        ItemTemplate {
            noun: "Plan",
            default_count: 1,
            max_items: 1,
            defaults: defaults(&[
                ("goal", json!("general fitness")),
                ("duration_weeks", json!(12)),
            ]),
        }
    }

    fn rules(&self) -> Vec<FieldRule> {
        vec![FieldRule::range("duration_weeks", 4, 104)]
    }
}
