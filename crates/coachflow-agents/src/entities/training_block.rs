use super::defaults;
use crate::scheduler::ItemTemplate;
use crate::strategy::EntityAgent;
use crate::validate::FieldRule;
use coachflow_core::Focus;
use coachflow_llm::FieldSpec;
use serde_json::json;

pub struct TrainingBlockAgent;

impl EntityAgent for TrainingBlockAgent {
    fn focus(&self) -> Focus {
        Focus::TrainingBlock
    }

    fn description(&self) -> &'static str {
        "Training blocks split a long-term plan into phases, each with an emphasis and a length in weeks."
    }

    fn parameter_fields(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::integer("count", Some(0), None, "how many blocks"),
            FieldSpec::text_list("items", "block names, when the user names them"),
            FieldSpec::text("emphasis", "training emphasis, e.g. strength or endurance"),
            FieldSpec::integer("weeks", Some(1), None, "weeks per block"),
        ]
    }

    fn editable_fields(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::text("emphasis", "training emphasis"),
            FieldSpec::integer("weeks", Some(1), None, "weeks in this block"),
        ]
    }

    fn template(&self) -> ItemTemplate {
        ItemTemplate {
            noun: "Block",
            default_count: 3,
            max_items: 8,
            defaults: defaults(&[("emphasis", json!("strength")), ("weeks", json!(4))]),
        }
    }

    fn rules(&self) -> Vec<FieldRule> {
        vec![FieldRule::range("weeks", 1, 12)]
    }
}
