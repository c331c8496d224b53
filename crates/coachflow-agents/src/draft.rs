//! Drafts: candidate results shown to the user before anything is saved

use crate::store::{render_value, EntityRecord};
use coachflow_core::Focus;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftItem {
    /// Stable key within the draft. Seeded drafts use the record id.
    pub key: String,
    /// The name the user addresses this item by.
    pub label: String,
    pub fields: Map<String, Value>,
}

impl DraftItem {
    pub fn new(key: impl Into<String>, label: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            fields,
        }
    }

    pub fn render(&self) -> String {
        if self.fields.is_empty() {
            return self.label.clone();
        }
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, render_value(v)))
            .collect();
        format!("{}: {}", self.label, fields.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub focus: Focus,
    pub items: Vec<DraftItem>,
}

/// One edit extracted from the user's instruction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EditInstruction {
    pub target: String,
    pub instruction: String,
    pub fields: Map<String, Value>,
}

impl EditInstruction {
    /// Build from an extracted object: `target`, `instruction`, and any
    /// other keys as field values.
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let mut edit = Self::default();
        for (k, v) in object {
            match k.as_str() {
                "target" => edit.target = v.as_str().unwrap_or_default().to_string(),
                "instruction" => edit.instruction = v.as_str().unwrap_or_default().to_string(),
                _ => {
                    edit.fields.insert(k.clone(), v.clone());
                }
            }
        }
        edit
    }

    fn forwarded_text(&self) -> String {
        if self.instruction.trim().is_empty() {
            self.target.clone()
        } else {
            self.instruction.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditOutcome {
    pub applied: usize,
    /// Instructions whose target is not an item of this draft, verbatim.
    pub forwarded: Vec<String>,
}

impl Draft {
    pub fn new(focus: Focus, items: Vec<DraftItem>) -> Self {
        Self { focus, items }
    }

    /// A one-item draft holding an existing record, for editing in place.
    pub fn from_record(record: &EntityRecord) -> Self {
        Self {
            focus: record.focus,
            items: vec![DraftItem::new(
                record.id.to_string(),
                record.name.clone(),
                record.data.clone(),
            )],
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn format(&self) -> Vec<String> {
        self.items.iter().map(DraftItem::render).collect()
    }

    /// Labels an edit may address.
    pub fn allow_list(&self) -> Vec<String> {
        self.items.iter().map(|i| i.label.clone()).collect()
    }

    pub fn find(&self, label: &str) -> Option<&DraftItem> {
        let label = label.trim();
        self.items.iter().find(|i| i.label.eq_ignore_ascii_case(label))
    }

    /// Apply edits whose target is exactly an allow-listed label. Field
    /// values are only written for names in `editable`. Anything aimed
    /// elsewhere is returned untouched for someone else to handle.
    pub fn apply_edits(&mut self, edits: &[EditInstruction], editable: &[String]) -> EditOutcome {
        let mut outcome = EditOutcome::default();
        for edit in edits {
            let target = edit.target.trim();
            let Some(item) = self
                .items
                .iter_mut()
                .find(|i| i.label.eq_ignore_ascii_case(target))
            else {
                let text = edit.forwarded_text();
                if !text.trim().is_empty() {
                    outcome.forwarded.push(text);
                }
                continue;
            };
            let mut changed = false;
            for (k, v) in &edit.fields {
                if editable.iter().any(|e| e == k) && !v.is_null() {
                    item.fields.insert(k.clone(), v.clone());
                    changed = true;
                }
            }
            if changed {
                outcome.applied += 1;
            }
        }
        outcome
    }
}
