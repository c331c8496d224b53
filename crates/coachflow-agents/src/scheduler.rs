//! Scheduler collaborator: turns extracted parameters into a draft

use crate::draft::{Draft, DraftItem};
use crate::store::EntityRecord;
use coachflow_core::Focus;
use serde_json::{Map, Value};

/// How an entity's items are laid out when generated.
#[derive(Debug, Clone)]
pub struct ItemTemplate {
    /// Label stem for counted items, e.g. "Week" gives "Week 1", "Week 2".
    pub noun: &'static str,
    pub default_count: usize,
    pub max_items: usize,
    /// Field values every generated item starts from.
    pub defaults: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    pub focus: Focus,
    pub user_id: String,
    pub parent: Option<EntityRecord>,
    /// Extracted parameters. `count` and `items` shape the draft; any key
    /// also present in the template defaults overrides that default.
    pub parameters: Map<String, Value>,
    pub template: ItemTemplate,
    /// Every equipment record the user has, available or not.
    pub equipment: Vec<EntityRecord>,
    /// The user's availability record, when one is saved.
    pub availability: Option<EntityRecord>,
}

impl ScheduleRequest {
    fn sets(&self, key: &str) -> bool {
        self.parameters.get(key).is_some_and(|v| !v.is_null())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct Infeasible {
    pub reason: String,
}

impl Infeasible {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

pub trait Scheduler: Send + Sync {
    fn solve(&self, request: &ScheduleRequest) -> Result<Draft, Infeasible>;
}

/// What the user has to train with.
struct Resources<'a> {
    days_per_week: Option<i64>,
    minutes_per_session: Option<i64>,
    unavailable: Vec<&'a str>,
}

impl<'a> Resources<'a> {
    fn of(request: &'a ScheduleRequest) -> Self {
        let setting = |key: &str| {
            request
                .availability
                .as_ref()
                .and_then(|r| r.data.get(key))
                .and_then(Value::as_i64)
        };
        Self {
            days_per_week: setting("days_per_week"),
            minutes_per_session: setting("minutes_per_session"),
            unavailable: request
                .equipment
                .iter()
                .filter(|r| r.data.get("available") == Some(&Value::Bool(false)))
                .map(|r| r.name.trim())
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }

    /// Template count, lowered to the training days when workouts are laid out.
    fn default_count(&self, focus: Focus, template_count: usize) -> usize {
        match (focus, self.days_per_week) {
            (Focus::DailyWorkout, Some(days)) if days >= 1 => template_count.min(days as usize),
            _ => template_count,
        }
    }

    /// Fill defaults from availability and reject what it cannot hold.
    fn fit(
        &self,
        request: &ScheduleRequest,
        count: usize,
        names: &[String],
        fields: &mut Map<String, Value>,
    ) -> Result<(), Infeasible> {
        match request.focus {
            Focus::DailyWorkout => {
                if let Some(days) = self.days_per_week {
                    if count as i64 > days {
                        return Err(Infeasible::new(format!(
                            "{} workouts is more than the {} training days in your availability",
                            count, days
                        )));
                    }
                }
                if let Some(minutes) = self.minutes_per_session {
                    if !request.sets("duration_minutes") {
                        fields.insert("duration_minutes".into(), minutes.into());
                    }
                    let duration = fields.get("duration_minutes").and_then(Value::as_i64);
                    if let Some(duration) = duration.filter(|d| *d > minutes) {
                        return Err(Infeasible::new(format!(
                            "a {}-minute workout does not fit your {}-minute sessions",
                            duration, minutes
                        )));
                    }
                }
            }
            Focus::WeeklyBlock => {
                if let Some(days) = self.days_per_week.filter(|d| *d >= 1) {
                    let sessions = fields.get("sessions").and_then(Value::as_i64);
                    match sessions {
                        Some(n) if n > days && request.sets("sessions") => {
                            return Err(Infeasible::new(format!(
                                "{} sessions a week is more than the {} training days in your availability",
                                n, days
                            )));
                        }
                        Some(n) if n > days => {
                            fields.insert("sessions".into(), days.into());
                        }
                        _ => {}
                    }
                }
            }
            Focus::DailyExercises => {
                for name in names {
                    let lowered = name.to_lowercase();
                    if let Some(gear) = self
                        .unavailable
                        .iter()
                        .find(|g| lowered.contains(&g.to_lowercase()))
                    {
                        return Err(Infeasible::new(format!(
                            "{} needs the {}, which is marked unavailable",
                            name,
                            gear.to_lowercase()
                        )));
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Lays items out from the entity's template: one per named item when the
/// user listed names, otherwise a counted sequence. Workouts, weeks and
/// exercises are then fitted to the user's availability and equipment.
#[derive(Debug, Clone, Default)]
pub struct TemplateScheduler;

impl TemplateScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for TemplateScheduler {
    fn solve(&self, request: &ScheduleRequest) -> Result<Draft, Infeasible> {
        let template = &request.template;
        let resources = Resources::of(request);
        let names: Vec<String> = match request.parameters.get("items") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            _ => Vec::new(),
        };
        let count = if names.is_empty() {
            request
                .parameters
                .get("count")
                .and_then(Value::as_i64)
                .unwrap_or_else(|| resources.default_count(request.focus, template.default_count) as i64)
        } else {
            names.len() as i64
        };

        if count <= 0 {
            return Err(Infeasible::new(format!(
                "a {} needs at least one {}",
                request.focus.label(),
                template.noun.to_lowercase()
            )));
        }
        if count as usize > template.max_items {
            return Err(Infeasible::new(format!(
                "{} {}s is more than the {} a {} can hold",
                count,
                template.noun.to_lowercase(),
                template.max_items,
                request.focus.label()
            )));
        }

        let mut fields = template.defaults.clone();
        for (k, v) in &request.parameters {
            if fields.contains_key(k) && !v.is_null() {
                fields.insert(k.clone(), v.clone());
            }
        }
        resources.fit(request, count as usize, &names, &mut fields)?;

        let items = (0..count as usize)
            .map(|i| {
                let label = names
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("{} {}", template.noun, i + 1));
                DraftItem::new(format!("item-{}", i + 1), label, fields.clone())
            })
            .collect();
        Ok(Draft::new(request.focus, items))
    }
}
