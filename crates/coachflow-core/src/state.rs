//! The State Record threaded through every graph step
//!
//! A run owns one `StateRecord`. Nodes never mutate it directly: they return
//! a `StatePatch`, which the engine merges key by key. A patch can overwrite
//! the keys it names but has no way to remove a key, so everything written
//! during a run stays readable for the rest of it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateRecord {
    values: Map<String, Value>,
}

impl StateRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Missing and non-boolean values read as `false`.
    pub fn get_bool(&self, key: &str) -> bool {
        self.values.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(Value::as_i64)
    }

    pub fn get_strings(&self, key: &str) -> Vec<String> {
        match self.values.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// Deserialize a structured value. `Ok(None)` when the key is absent or null.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> crate::Result<Option<T>> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Merge a patch: every key in the patch overwrites, every other key is kept.
    pub fn merge(&mut self, patch: StatePatch) {
        for (k, v) in patch.values {
            self.values.insert(k, v);
        }
    }

    /// Copy the keys accepted by `keep` into a patch.
    pub fn slice(&self, keep: impl Fn(&str) -> bool) -> StatePatch {
        StatePatch {
            values: self
                .values
                .iter()
                .filter(|(k, _)| keep(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.values)
    }
}

impl From<StatePatch> for StateRecord {
    fn from(patch: StatePatch) -> Self {
        Self {
            values: patch.values,
        }
    }
}

/// The writes a node wants applied to the State Record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatePatch {
    values: Map<String, Value>,
}

impl StatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Serialize a structured value into the patch.
    pub fn set_json<T: Serialize>(self, key: impl Into<String>, value: &T) -> crate::Result<Self> {
        let v = serde_json::to_value(value)?;
        Ok(self.set(key, v))
    }

    /// Later patch wins on shared keys.
    pub fn extend(&mut self, other: StatePatch) {
        for (k, v) in other.values {
            self.values.insert(k, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
