//! The entity hierarchy
//!
//! ```text
//! long_term_plan
//! └─ training_block
//!    └─ weekly_block
//!       ├─ daily_workout
//!       │  └─ daily_exercises
//!       └─ weekly_availability
//! equipment       (root, cross-cutting)
//! availability    (root, cross-cutting)
//! ```

use serde::{Deserialize, Serialize};

/// An entity a sub-agent can govern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Focus {
    LongTermPlan,
    TrainingBlock,
    WeeklyBlock,
    DailyWorkout,
    WeeklyAvailability,
    DailyExercises,
    Equipment,
    Availability,
}

impl Focus {
    /// Every entity, parents before children.
    pub const ALL: [Focus; 8] = [
        Focus::Equipment,
        Focus::Availability,
        Focus::LongTermPlan,
        Focus::TrainingBlock,
        Focus::WeeklyBlock,
        Focus::WeeklyAvailability,
        Focus::DailyWorkout,
        Focus::DailyExercises,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LongTermPlan => "long_term_plan",
            Self::TrainingBlock => "training_block",
            Self::WeeklyBlock => "weekly_block",
            Self::DailyWorkout => "daily_workout",
            Self::WeeklyAvailability => "weekly_availability",
            Self::DailyExercises => "daily_exercises",
            Self::Equipment => "equipment",
            Self::Availability => "availability",
        }
    }

    /// Human-readable name used in prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::LongTermPlan => "long-term plan",
            Self::TrainingBlock => "training block",
            Self::WeeklyBlock => "weekly block",
            Self::DailyWorkout => "daily workout",
            Self::WeeklyAvailability => "weekly availability",
            Self::DailyExercises => "daily exercise list",
            Self::Equipment => "equipment",
            Self::Availability => "availability",
        }
    }

    /// The owning entity, or `None` for entities owned directly by the user.
    pub fn parent(&self) -> Option<Focus> {
        match self {
            Self::TrainingBlock => Some(Self::LongTermPlan),
            Self::WeeklyBlock => Some(Self::TrainingBlock),
            Self::DailyWorkout | Self::WeeklyAvailability => Some(Self::WeeklyBlock),
            Self::DailyExercises => Some(Self::DailyWorkout),
            Self::LongTermPlan | Self::Equipment | Self::Availability => None,
        }
    }

    pub fn children(&self) -> Vec<Focus> {
        Self::ALL
            .iter()
            .copied()
            .filter(|f| f.parent() == Some(*self))
            .collect()
    }

    /// Ancestors from nearest to root.
    pub fn ancestors(&self) -> Vec<Focus> {
        let mut out = Vec::new();
        let mut cur = self.parent();
        while let Some(p) = cur {
            out.push(p);
            cur = p.parent();
        }
        out
    }

    pub fn parse(s: &str) -> Option<Focus> {
        Self::ALL.iter().copied().find(|f| f.as_str() == s)
    }
}

impl std::fmt::Display for Focus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_lists_parents_first() {
        for (i, focus) in Focus::ALL.iter().enumerate() {
            if let Some(parent) = focus.parent() {
                let pi = Focus::ALL.iter().position(|f| *f == parent).unwrap();
                assert!(pi < i, "{} listed before its parent {}", focus, parent);
            }
        }
    }

    #[test]
    fn ancestors_walk_to_root() {
        assert_eq!(
            Focus::DailyExercises.ancestors(),
            vec![
                Focus::DailyWorkout,
                Focus::WeeklyBlock,
                Focus::TrainingBlock,
                Focus::LongTermPlan
            ]
        );
        assert!(Focus::Equipment.ancestors().is_empty());
    }

    #[test]
    fn weekly_block_has_two_children() {
        let children = Focus::WeeklyBlock.children();
        assert!(children.contains(&Focus::DailyWorkout));
        assert!(children.contains(&Focus::WeeklyAvailability));
        assert_eq!(children.len(), 2);
    }
}
