//! EntityAgent - what differs between entities; the graph shape does not

use crate::draft::Draft;
use crate::scheduler::ItemTemplate;
use crate::validate::{check_rules, FieldRule};
use coachflow_core::Focus;
use coachflow_llm::{FieldSpec, PromptTemplate};

/// Per-entity strategy plugged into the generic entity graph.
pub trait EntityAgent: Send + Sync {
    fn focus(&self) -> Focus;

    /// One sentence describing the entity, used in extraction prompts.
    fn description(&self) -> &'static str;

    /// Parameters extracted from the user's request before generating.
    fn parameter_fields(&self) -> Vec<FieldSpec>;

    /// Per-item fields an edit may change. Integer bounds here are the
    /// hard limits the extractor must respect; softer limits belong in
    /// `rules`.
    fn editable_fields(&self) -> Vec<FieldSpec>;

    fn template(&self) -> ItemTemplate;

    fn rules(&self) -> Vec<FieldRule> {
        Vec::new()
    }

    /// Violation strings for a draft. Empty means valid.
    fn validate(&self, draft: &Draft) -> Vec<String> {
        check_rules(draft, &self.rules())
    }

    /// Whether "create" is its own path. Otherwise it is handled as alter.
    fn supports_create(&self) -> bool {
        true
    }

    /// Whether "delete" is its own path. Otherwise it is handled as alter.
    fn supports_delete(&self) -> bool {
        true
    }

    fn prompt(&self) -> PromptTemplate {
        PromptTemplate::new(format!(
            "You manage the user's {label}. {description}\n\
             Extract only what the request states; leave everything else out.\n\n\
             Request: {{input}}",
            label = self.focus().label(),
            description = self.description(),
        ))
    }
}
