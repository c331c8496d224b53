use super::defaults;
use crate::scheduler::ItemTemplate;
use crate::strategy::EntityAgent;
use crate::validate::FieldRule;
use coachflow_core::Focus;
use coachflow_llm::FieldSpec;
use serde_json::json;

pub struct WeeklyBlockAgent;

impl EntityAgent for WeeklyBlockAgent {
    fn focus(&self) -> Focus {
        Focus::WeeklyBlock
    }

    fn description(&self) -> &'static str {
        "Weekly blocks are the weeks of a training block, each with a session count and an intensity."
    }

    fn parameter_fields(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::integer("count", Some(0), None, "how many weeks"),
            FieldSpec::text_list("items", "week names, when the user names them"),
            FieldSpec::integer("sessions", Some(0), None, "training sessions per week"),
            FieldSpec::choice("intensity", &["light", "moderate", "hard"], "week intensity"),
        ]
    }

    fn editable_fields(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::integer("sessions", Some(0), None, "sessions this week"),
            FieldSpec::choice("intensity", &["light", "moderate", "hard"], "week intensity"),
        ]
    }

    fn template(&self) -> ItemTemplate {
        ItemTemplate {
            noun: "Week",
            default_count: 4,
            max_items: 12,
            defaults: defaults(&[("sessions", json!(3)), ("intensity", json!("moderate"))]),
        }
    }

    fn rules(&self) -> Vec<FieldRule> {
        vec![FieldRule::range("sessions", 1, 7)]
    }
}
