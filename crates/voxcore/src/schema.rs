use crate::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One step of a path into a config map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, "{}", k),
            PathSegment::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// A single validation failure, pointing at the offending field.
///
/// An empty path means the error applies to the config as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub path: Vec<PathSegment>,
    pub message: String,
}

impl FieldError {
    pub fn at(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: vec![PathSegment::Key(field.into())],
            message: message.into(),
        }
    }

    pub fn top_level(message: impl Into<String>) -> Self {
        Self {
            path: Vec::new(),
            message: message.into(),
        }
    }

    pub fn path_string(&self) -> String {
        let mut out = String::new();
        for (i, seg) in self.path.iter().enumerate() {
            if i > 0 && matches!(seg, PathSegment::Key(_)) {
                out.push('.');
            }
            out.push_str(&seg.to_string());
        }
        out
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path_string(), self.message)
        }
    }
}

/// Expected shape of a config field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    String,
    Number,
    Bool,
    Object,
    Array,
    Any,
}

impl FieldKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => matches!(value, Value::String(_)),
            FieldKind::Number => matches!(value, Value::Number(_)),
            FieldKind::Bool => matches!(value, Value::Bool(_)),
            FieldKind::Object => matches!(value, Value::Object(_)),
            FieldKind::Array => matches!(value, Value::Array(_)),
            FieldKind::Any => true,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Bool => "bool",
            FieldKind::Object => "object",
            FieldKind::Array => "array",
            FieldKind::Any => "any",
        }
    }
}

/// Declared spec for one config field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub one_of: Option<Vec<String>>,
    pub item_kind: Option<FieldKind>,
    pub default: Option<Value>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            one_of: None,
            item_kind: None,
            default: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Number)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    pub fn array_of(name: impl Into<String>, item: FieldKind) -> Self {
        let mut spec = Self::new(name, FieldKind::Array);
        spec.item_kind = Some(item);
        spec
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn one_of(mut self, choices: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.one_of = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Schema a node type declares for its config map.
///
/// Validation checks fields in declared order, so repeated calls with the
/// same input always produce the same errors in the same order.
#[derive(Debug, Clone, Default)]
pub struct ConfigSchema {
    fields: Vec<FieldSpec>,
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Default config derived from field defaults.
    pub fn defaults(&self) -> HashMap<String, Value> {
        self.fields
            .iter()
            .filter_map(|f| f.default.clone().map(|v| (f.name.clone(), v)))
            .collect()
    }

    /// Validate a config map, returning a normalized copy with defaults
    /// filled in, or one error per offending field.
    pub fn validate(&self, config: &HashMap<String, Value>) -> Result<HashMap<String, Value>, Vec<FieldError>> {
        let mut errors = Vec::new();
        let mut normalized = HashMap::new();

        for spec in &self.fields {
            match config.get(&spec.name) {
                Some(value) => {
                    if !spec.kind.matches(value) {
                        errors.push(FieldError::at(
                            spec.name.as_str(),
                            format!("expected {}", spec.kind.name()),
                        ));
                        continue;
                    }
                    if let Some(choices) = &spec.one_of {
                        let ok = value
                            .as_str()
                            .map(|s| choices.iter().any(|c| c == s))
                            .unwrap_or(false);
                        if !ok {
                            errors.push(FieldError::at(
                                spec.name.as_str(),
                                format!("must be one of: {}", choices.join(", ")),
                            ));
                            continue;
                        }
                    }
                    if let (Some(item_kind), Value::Array(items)) = (&spec.item_kind, value) {
                        let mut item_ok = true;
                        for (idx, item) in items.iter().enumerate() {
                            if !item_kind.matches(item) {
                                errors.push(FieldError {
                                    path: vec![
                                        PathSegment::Key(spec.name.clone()),
                                        PathSegment::Index(idx),
                                    ],
                                    message: format!("expected {}", item_kind.name()),
                                });
                                item_ok = false;
                            }
                        }
                        if !item_ok {
                            continue;
                        }
                    }
                    normalized.insert(spec.name.clone(), value.clone());
                }
                None => {
                    if let Some(default) = &spec.default {
                        normalized.insert(spec.name.clone(), default.clone());
                    } else if spec.required {
                        errors.push(FieldError::at(spec.name.as_str(), "required field is missing"));
                    }
                }
            }
        }

        // Unknown keys are rejected rather than silently carried along.
        let mut unknown: Vec<&String> = config
            .keys()
            .filter(|k| !self.fields.iter().any(|f| &f.name == *k))
            .collect();
        unknown.sort();
        for key in unknown {
            errors.push(FieldError::at(key.as_str(), "unknown field"));
        }

        if errors.is_empty() {
            Ok(normalized)
        } else {
            Err(errors)
        }
    }
}
