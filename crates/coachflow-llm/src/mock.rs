//! ScriptedExtractor - deterministic extraction replies for testing
//!
//! Replies are queued per schema name, so a test scripts what each kind of
//! extraction returns without caring about call interleaving. An exhausted
//! queue yields an empty extraction ("nothing understood").

use crate::extractor::{ExtractError, ExtractResult, Extractor};
use crate::types::{Extraction, PromptTemplate, TargetSchema};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

#[derive(Clone, Debug)]
enum ScriptedReply {
    Fields(Value),
    Error(String),
}

/// One recorded `extract` call.
#[derive(Clone, Debug)]
pub struct ExtractCall {
    pub schema: String,
    pub raw_text: String,
    pub prompt: String,
}

#[derive(Default)]
pub struct ScriptedExtractor {
    replies: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
    calls: Mutex<Vec<ExtractCall>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next extraction against `schema`.
    pub fn on(self, schema: &str, fields: Value) -> Self {
        self.push(schema, fields);
        self
    }

    /// Queue a failure for the next extraction against `schema`.
    pub fn fail(self, schema: &str, message: &str) -> Self {
        lock(&self.replies)
            .entry(schema.to_string())
            .or_default()
            .push_back(ScriptedReply::Error(message.to_string()));
        self
    }

    pub fn push(&self, schema: &str, fields: Value) {
        lock(&self.replies)
            .entry(schema.to_string())
            .or_default()
            .push_back(ScriptedReply::Fields(fields));
    }

    pub fn calls(&self) -> Vec<ExtractCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, schema: &str) -> usize {
        lock(&self.calls).iter().filter(|c| c.schema == schema).count()
    }

    /// Replies still queued for `schema`.
    pub fn pending(&self, schema: &str) -> usize {
        lock(&self.replies).get(schema).map_or(0, VecDeque::len)
    }
}

#[async_trait::async_trait]
impl Extractor for ScriptedExtractor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn extract(
        &self,
        raw_text: &str,
        prompt: &PromptTemplate,
        schema: &TargetSchema,
    ) -> ExtractResult<Extraction> {
        lock(&self.calls).push(ExtractCall {
            schema: schema.name.clone(),
            raw_text: raw_text.to_string(),
            prompt: prompt.render(&[("input", raw_text)]),
        });

        let reply = lock(&self.replies)
            .get_mut(&schema.name)
            .and_then(VecDeque::pop_front);

        match reply {
            Some(ScriptedReply::Fields(v)) => Ok(Extraction::conform(schema, &v).0),
            Some(ScriptedReply::Error(msg)) => Err(ExtractError::InvalidResponse(msg)),
            None => Ok(Extraction::default()),
        }
    }
}
