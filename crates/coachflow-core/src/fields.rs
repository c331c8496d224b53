//! Field naming - per-entity State Record keys derived from a `Focus`
//!
//! Every key an entity owns is `<focus>_<field>`. Keys are only ever built
//! here, from the closed `Focus` enum, so a misspelled entity name cannot
//! produce a key nobody reads.

use crate::focus::Focus;
use crate::state::StateRecord;
use crate::types::Operation;
use serde_json::Value;

/// Global keys shared by every entity.
pub const USER_ID: &str = "user_id";
pub const REQUEST_PARSED: &str = "request_parsed";
pub const OTHER_REQUESTS: &str = "other_requests";

pub fn is_global(key: &str) -> bool {
    matches!(key, USER_ID | REQUEST_PARSED | OTHER_REQUESTS)
}

/// The fields every entity exposes to generic routing code.
pub trait EntityFields {
    fn requested(&self) -> String;
    fn altered(&self) -> String;
    fn read_plural(&self) -> String;
    fn read_current(&self) -> String;
    fn detail(&self) -> String;
    fn formatted(&self) -> String;
}

/// Derives the State Record keys owned by one entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldNamer {
    focus: Focus,
}

impl FieldNamer {
    pub fn new(focus: Focus) -> Self {
        Self { focus }
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    fn key(&self, field: &str) -> String {
        format!("{}_{}", self.focus.as_str(), field)
    }

    pub fn prefix(&self) -> String {
        format!("{}_", self.focus.as_str())
    }

    /// Whether `key` belongs to this entity's namespace.
    pub fn owns(&self, key: &str) -> bool {
        key.strip_prefix(self.focus.as_str())
            .is_some_and(|rest| rest.starts_with('_'))
    }

    pub fn is_requested(&self) -> String {
        self.key("is_requested")
    }
    pub fn is_altered(&self) -> String {
        self.key("is_altered")
    }
    pub fn is_created(&self) -> String {
        self.key("is_created")
    }
    pub fn is_deleted(&self) -> String {
        self.key("is_deleted")
    }
    pub fn is_read(&self) -> String {
        self.key("is_read")
    }
    pub fn read_plural(&self) -> String {
        self.key("read_plural")
    }
    pub fn read_current(&self) -> String {
        self.key("read_current")
    }
    pub fn detail(&self) -> String {
        self.key("detail")
    }
    pub fn formatted(&self) -> String {
        self.key("formatted")
    }
    pub fn perform_with_parent_id(&self) -> String {
        self.key("perform_with_parent_id")
    }
    pub fn other_requests(&self) -> String {
        self.key("other_requests")
    }
    pub fn parent_id(&self) -> String {
        self.key("parent_id")
    }
    pub fn operation(&self) -> String {
        self.key("operation")
    }
    pub fn parameters(&self) -> String {
        self.key("parameters")
    }
    pub fn target_id(&self) -> String {
        self.key("target_id")
    }
    pub fn draft(&self) -> String {
        self.key("draft")
    }
    pub fn violations(&self) -> String {
        self.key("violations")
    }
    pub fn edit_round(&self) -> String {
        self.key("edit_round")
    }
    pub fn edit_request(&self) -> String {
        self.key("edit_request")
    }
    pub fn edit_choice(&self) -> String {
        self.key("edit_choice")
    }
    pub fn regenerate(&self) -> String {
        self.key("regenerate")
    }
    pub fn confirmed(&self) -> String {
        self.key("confirmed")
    }
    pub fn result_ids(&self) -> String {
        self.key("result_ids")
    }
    /// Records returned by a read, as JSON objects.
    pub fn records(&self) -> String {
        self.key("records")
    }
    pub fn completed(&self) -> String {
        self.key("completed")
    }
    pub fn attempts(&self) -> String {
        self.key("attempts")
    }
    pub fn target_filter(&self) -> String {
        self.key("target_filter")
    }
    pub fn permission(&self) -> String {
        self.key("permission")
    }
}

impl EntityFields for FieldNamer {
    fn requested(&self) -> String {
        self.is_requested()
    }
    fn altered(&self) -> String {
        self.is_altered()
    }
    fn read_plural(&self) -> String {
        FieldNamer::read_plural(self)
    }
    fn read_current(&self) -> String {
        FieldNamer::read_current(self)
    }
    fn detail(&self) -> String {
        FieldNamer::detail(self)
    }
    fn formatted(&self) -> String {
        FieldNamer::formatted(self)
    }
}

/// Typed, read-only view of one entity's slice of the State Record.
pub struct EntityView<'a> {
    state: &'a StateRecord,
    fields: FieldNamer,
}

impl<'a> EntityView<'a> {
    pub fn new(state: &'a StateRecord, focus: Focus) -> Self {
        Self {
            state,
            fields: FieldNamer::new(focus),
        }
    }

    pub fn fields(&self) -> FieldNamer {
        self.fields
    }

    pub fn user_id(&self) -> Option<&'a str> {
        self.state.get_str(USER_ID)
    }

    pub fn is_requested(&self) -> bool {
        self.state.get_bool(&self.fields.is_requested())
    }
    pub fn is_altered(&self) -> bool {
        self.state.get_bool(&self.fields.is_altered())
    }
    pub fn is_created(&self) -> bool {
        self.state.get_bool(&self.fields.is_created())
    }
    pub fn is_deleted(&self) -> bool {
        self.state.get_bool(&self.fields.is_deleted())
    }
    pub fn is_read(&self) -> bool {
        self.state.get_bool(&self.fields.is_read())
    }
    pub fn read_plural(&self) -> bool {
        self.state.get_bool(&self.fields.read_plural())
    }
    pub fn read_current(&self) -> bool {
        self.state.get_bool(&self.fields.read_current())
    }
    pub fn regenerate(&self) -> bool {
        self.state.get_bool(&self.fields.regenerate())
    }
    pub fn completed(&self) -> bool {
        self.state.get_bool(&self.fields.completed())
    }

    pub fn detail(&self) -> &'a str {
        self.state.get_str(&self.fields.detail()).unwrap_or("")
    }

    pub fn formatted(&self) -> Option<&'a str> {
        self.state.get_str(&self.fields.formatted())
    }

    pub fn parent_id(&self) -> Option<i64> {
        self.state.get_i64(&self.fields.parent_id())
    }

    pub fn perform_with_parent_id(&self) -> Option<i64> {
        self.state.get_i64(&self.fields.perform_with_parent_id())
    }

    pub fn target_id(&self) -> Option<i64> {
        self.state.get_i64(&self.fields.target_id())
    }

    pub fn operation(&self) -> Option<Operation> {
        self.state
            .get_str(&self.fields.operation())
            .and_then(Operation::parse)
    }

    pub fn edit_round(&self) -> usize {
        self.state
            .get_i64(&self.fields.edit_round())
            .unwrap_or(0)
            .max(0) as usize
    }

    pub fn attempts(&self) -> usize {
        self.state
            .get_i64(&self.fields.attempts())
            .unwrap_or(0)
            .max(0) as usize
    }

    pub fn other_requests(&self) -> Vec<String> {
        self.state.get_strings(&self.fields.other_requests())
    }

    pub fn violations(&self) -> Vec<String> {
        self.state.get_strings(&self.fields.violations())
    }

    /// Filter text for locating an existing item, one entry per round.
    pub fn target_filter(&self) -> Vec<String> {
        self.state.get_strings(&self.fields.target_filter())
    }

    pub fn edit_choice(&self) -> Option<&'a str> {
        self.state.get_str(&self.fields.edit_choice())
    }

    pub fn raw(&self, key: &str) -> Option<&'a Value> {
        self.state.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_prefixed_by_focus() {
        let f = FieldNamer::new(Focus::WeeklyBlock);
        assert_eq!(f.detail(), "weekly_block_detail");
        assert_eq!(f.perform_with_parent_id(), "weekly_block_perform_with_parent_id");
        assert_eq!(EntityFields::requested(&f), "weekly_block_is_requested");
    }

    #[test]
    fn owns_does_not_cross_similar_prefixes() {
        let availability = FieldNamer::new(Focus::Availability);
        let weekly = FieldNamer::new(Focus::WeeklyAvailability);
        assert!(availability.owns("availability_detail"));
        assert!(!availability.owns("weekly_availability_detail"));
        assert!(weekly.owns("weekly_availability_detail"));
        assert!(!availability.owns("availability"));
    }
}
