use super::defaults;
use crate::scheduler::ItemTemplate;
use crate::strategy::EntityAgent;
use coachflow_core::Focus;
use coachflow_llm::FieldSpec;
use serde_json::json;

pub struct EquipmentAgent;

impl EntityAgent for EquipmentAgent {
    fn focus(&self) -> Focus {
        Focus::Equipment
    }

    fn description(&self) -> &'static str {
        "Equipment is the gear the user has access to, one item per piece of equipment."
    }

    fn parameter_fields(&self) -> Vec<FieldSpec> {
        vec![FieldSpec::text_list("items", "equipment names, e.g. Barbell, Pull-up bar")]
    }

    fn editable_fields(&self) -> Vec<FieldSpec> {
        vec![FieldSpec::boolean("available", "whether the item can be used right now")]
    }

    fn template(&self) -> ItemTemplate {
        ItemTemplate {
            noun: "Item",
            default_count: 1,
            max_items: 50,
            defaults: defaults(&[("available", json!(true))]),
        }
    }
}
