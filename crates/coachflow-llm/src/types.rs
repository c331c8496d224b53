//! Target schemas, prompt templates, and conformed extractions

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// The type and constraints of one extracted field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Boolean,
    Integer {
        #[serde(skip_serializing_if = "Option::is_none")]
        min: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<i64>,
    },
    Text,
    /// A text value restricted to a closed set.
    Choice { options: Vec<String> },
    TextList,
    ObjectList { fields: Vec<FieldSpec> },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

impl FieldSpec {
    pub fn boolean(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean, description)
    }

    pub fn integer(
        name: impl Into<String>,
        min: Option<i64>,
        max: Option<i64>,
        description: impl Into<String>,
    ) -> Self {
        Self::new(name, FieldKind::Integer { min, max }, description)
    }

    pub fn text(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text, description)
    }

    pub fn choice(name: impl Into<String>, options: &[&str], description: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Choice {
                options: options.iter().map(|s| s.to_string()).collect(),
            },
            description,
        )
    }

    pub fn text_list(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, FieldKind::TextList, description)
    }

    pub fn object_list(
        name: impl Into<String>,
        fields: Vec<FieldSpec>,
        description: impl Into<String>,
    ) -> Self {
        Self::new(name, FieldKind::ObjectList { fields }, description)
    }

    fn new(name: impl Into<String>, kind: FieldKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn json_schema(&self) -> Value {
        let mut schema = match &self.kind {
            FieldKind::Boolean => json!({"type": "boolean"}),
            FieldKind::Integer { min, max } => {
                let mut s = json!({"type": "integer"});
                if let Some(min) = min {
                    s["minimum"] = json!(min);
                }
                if let Some(max) = max {
                    s["maximum"] = json!(max);
                }
                s
            }
            FieldKind::Text => json!({"type": "string"}),
            FieldKind::Choice { options } => json!({"type": "string", "enum": options}),
            FieldKind::TextList => json!({"type": "array", "items": {"type": "string"}}),
            FieldKind::ObjectList { fields } => json!({
                "type": "array",
                "items": object_schema(fields),
            }),
        };
        schema["description"] = json!(self.description);
        schema
    }

    /// Coerce a raw value into this field's kind, or `None` if it does not fit.
    fn conform(&self, raw: &Value, dropped: &mut Vec<String>, path: &str) -> Option<Value> {
        match (&self.kind, raw) {
            (_, Value::Null) => None,
            (FieldKind::Boolean, Value::Bool(b)) => Some(json!(b)),
            (FieldKind::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" => Some(json!(true)),
                "false" | "no" => Some(json!(false)),
                _ => None,
            },
            (FieldKind::Integer { min, max }, v) => {
                let n = match v {
                    Value::Number(n) => n.as_i64(),
                    Value::String(s) => s.trim().parse::<i64>().ok(),
                    _ => None,
                }?;
                if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
                    return None;
                }
                Some(json!(n))
            }
            (FieldKind::Text, Value::String(s)) => {
                let s = s.trim();
                (!s.is_empty()).then(|| json!(s))
            }
            (FieldKind::Choice { options }, Value::String(s)) => options
                .iter()
                .find(|o| o.eq_ignore_ascii_case(s.trim()))
                .map(|o| json!(o)),
            (FieldKind::TextList, Value::String(s)) if !s.trim().is_empty() => {
                Some(json!([s.trim()]))
            }
            (FieldKind::TextList, Value::Array(items)) => {
                let kept: Vec<&str> = items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect();
                if kept.len() != items.len() {
                    dropped.push(format!("{}: non-text list entries", path));
                }
                Some(json!(kept))
            }
            (FieldKind::ObjectList { fields }, Value::Array(items)) => {
                let mut kept = Vec::new();
                for (i, item) in items.iter().enumerate() {
                    let item_path = format!("{}[{}]", path, i);
                    match item {
                        Value::Object(obj) => {
                            if let Some(conformed) = conform_object(fields, obj, dropped, &item_path) {
                                kept.push(Value::Object(conformed));
                            }
                        }
                        _ => dropped.push(item_path),
                    }
                }
                Some(Value::Array(kept))
            }
            _ => None,
        }
    }
}

fn object_schema(fields: &[FieldSpec]) -> Value {
    let mut properties = Map::new();
    for f in fields {
        properties.insert(f.name.clone(), f.json_schema());
    }
    let required: Vec<&str> = fields
        .iter()
        .filter(|f| f.required)
        .map(|f| f.name.as_str())
        .collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Conform one object; `None` when a required field is missing or invalid.
fn conform_object(
    fields: &[FieldSpec],
    raw: &Map<String, Value>,
    dropped: &mut Vec<String>,
    path: &str,
) -> Option<Map<String, Value>> {
    let mut out = Map::new();
    for spec in fields {
        let field_path = if path.is_empty() {
            spec.name.clone()
        } else {
            format!("{}.{}", path, spec.name)
        };
        match raw.get(&spec.name) {
            Some(v) => match spec.conform(v, dropped, &field_path) {
                Some(c) => {
                    out.insert(spec.name.clone(), c);
                }
                None => {
                    if !v.is_null() {
                        dropped.push(field_path.clone());
                    }
                    if spec.required && !path.is_empty() {
                        dropped.push(format!("{} (required, object discarded)", path));
                        return None;
                    }
                }
            },
            None if spec.required && !path.is_empty() => {
                dropped.push(format!("{} (missing required {})", path, spec.name));
                return None;
            }
            None => {}
        }
    }
    for key in raw.keys() {
        if !fields.iter().any(|f| &f.name == key) {
            let unknown = if path.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", path, key)
            };
            dropped.push(format!("{} (not in schema)", unknown));
        }
    }
    Some(out)
}

/// The structured fields an extraction is expected to produce.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetSchema {
    pub name: String,
    pub description: String,
    pub fields: Vec<FieldSpec>,
}

impl TargetSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// JSON Schema for the tool input.
    pub fn to_json_schema(&self) -> Value {
        object_schema(&self.fields)
    }
}

/// A prompt with `{name}` placeholders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Substitute every `{name}`. Unknown placeholders are left as written.
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        let mut out = self.template.clone();
        for (name, value) in vars {
            out = out.replace(&format!("{{{}}}", name), value);
        }
        out
    }

    /// A template with some placeholders already filled.
    pub fn with(&self, vars: &[(&str, &str)]) -> Self {
        Self::new(self.render(vars))
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }
}

/// Fields extracted from text, already conformed to a schema.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Extraction {
    fields: Map<String, Value>,
}

impl Extraction {
    /// Keep every field of `raw` that satisfies `schema`.
    ///
    /// Returns the conformed extraction plus a description of each dropped
    /// field. Values are never repaired into something the text did not say.
    pub fn conform(schema: &TargetSchema, raw: &Value) -> (Self, Vec<String>) {
        let mut dropped = Vec::new();
        let fields = match raw {
            Value::Object(obj) => conform_object(&schema.fields, obj, &mut dropped, "")
                .unwrap_or_default(),
            Value::Null => Map::new(),
            other => {
                dropped.push(format!("top-level value is not an object: {}", other));
                Map::new()
            }
        };
        (Self { fields }, dropped)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(Value::as_bool)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(Value::as_i64)
    }

    pub fn get_strings(&self, key: &str) -> Vec<String> {
        self.fields
            .get(key)
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default()
    }

    pub fn get_objects(&self, key: &str) -> Vec<Map<String, Value>> {
        self.fields
            .get(key)
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_object().cloned()).collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}
