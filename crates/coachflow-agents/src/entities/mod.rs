//! One `EntityAgent` per entity in the hierarchy

mod availability;
mod daily_exercises;
mod daily_workout;
mod equipment;
mod long_term_plan;
mod training_block;
mod weekly_availability;
mod weekly_block;

pub use availability::AvailabilityAgent;
pub use daily_exercises::DailyExercisesAgent;
pub use daily_workout::DailyWorkoutAgent;
pub use equipment::EquipmentAgent;
pub use long_term_plan::LongTermPlanAgent;
pub use training_block::TrainingBlockAgent;
pub use weekly_availability::WeeklyAvailabilityAgent;
pub use weekly_block::WeeklyBlockAgent;

use crate::strategy::EntityAgent;
use coachflow_core::Focus;
use serde_json::{Map, Value};
use std::sync::Arc;

pub fn agent_for(focus: Focus) -> Arc<dyn EntityAgent> {
    match focus {
        Focus::LongTermPlan => Arc::new(LongTermPlanAgent),
        Focus::TrainingBlock => Arc::new(TrainingBlockAgent),
        Focus::WeeklyBlock => Arc::new(WeeklyBlockAgent),
        Focus::WeeklyAvailability => Arc::new(WeeklyAvailabilityAgent),
        Focus::DailyWorkout => Arc::new(DailyWorkoutAgent),
        Focus::DailyExercises => Arc::new(DailyExercisesAgent),
        Focus::Equipment => Arc::new(EquipmentAgent),
        Focus::Availability => Arc::new(AvailabilityAgent),
    }
}

/// Build a defaults map from literal pairs.
pub(crate) fn defaults(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_focus_has_a_matching_agent() {
        for focus in Focus::ALL {
            let agent = agent_for(focus);
            assert_eq!(agent.focus(), focus);
            let template = agent.template();
            assert!(template.default_count <= template.max_items);
            // Every default field an edit can reach is declared editable.
            let editable: Vec<String> =
                agent.editable_fields().into_iter().map(|f| f.name).collect();
            for key in template.defaults.keys() {
                assert!(editable.contains(key), "{}: {} not editable", focus, key);
            }
        }
    }
}
