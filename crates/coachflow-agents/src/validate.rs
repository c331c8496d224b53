//! Draft validity checks

use crate::draft::Draft;
use serde_json::Value;

/// An inclusive numeric range a field must stay within.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    pub field: &'static str,
    pub min: i64,
    pub max: i64,
}

impl FieldRule {
    pub const fn range(field: &'static str, min: i64, max: i64) -> Self {
        Self { field, min, max }
    }
}

/// One violation string per broken rule per item.
pub fn check_rules(draft: &Draft, rules: &[FieldRule]) -> Vec<String> {
    let mut out = Vec::new();
    for item in &draft.items {
        for rule in rules {
            match item.fields.get(rule.field) {
                Some(Value::Number(n)) => {
                    let Some(v) = n.as_i64() else {
                        out.push(format!("{}: {} must be a whole number", item.label, rule.field));
                        continue;
                    };
                    if v < rule.min {
                        out.push(format!(
                            "{}: {} is {}, below the minimum of {}",
                            item.label, rule.field, v, rule.min
                        ));
                    } else if v > rule.max {
                        out.push(format!(
                            "{}: {} is {}, above the maximum of {}",
                            item.label, rule.field, v, rule.max
                        ));
                    }
                }
                Some(Value::Null) | None => {}
                Some(_) => out.push(format!("{}: {} must be a number", item.label, rule.field)),
            }
        }
    }
    out
}
