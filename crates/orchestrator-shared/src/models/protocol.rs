//! # Protocol Specification
//!
//! A named, versioned set of methods, each with a JSON-Schema-like
//! parameter schema (§3 Protocol specification, §4.1).

use crate::errors::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A minimal JSON-Schema-like parameter schema: types, required keys,
/// ranges, enums, and patterns, per §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamSchema {
    Object {
        #[serde(default)]
        properties: HashMap<String, ParamSchema>,
        #[serde(default)]
        required: Vec<String>,
    },
    String {
        #[serde(default)]
        pattern: Option<String>,
        #[serde(default)]
        r#enum: Option<Vec<String>>,
    },
    Number {
        #[serde(default)]
        minimum: Option<f64>,
        #[serde(default)]
        maximum: Option<f64>,
    },
    Integer {
        #[serde(default)]
        minimum: Option<i64>,
        #[serde(default)]
        maximum: Option<i64>,
    },
    Boolean,
    Array {
        items: Box<ParamSchema>,
    },
    /// Escape hatch for schema fragments this engine does not need to
    /// validate structurally (accepts any value).
    Any,
}

impl ParamSchema {
    /// Validates `value` against this schema, accumulating every failure
    /// found rather than stopping at the first (so `validateTask` can
    /// report all problems at once, per §4.1).
    pub fn validate(&self, value: &Value, path: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        self.validate_into(value, path, &mut errors);
        errors
    }

    fn validate_into(&self, value: &Value, path: &str, errors: &mut Vec<ValidationError>) {
        match self {
            ParamSchema::Any => {}
            ParamSchema::Object {
                properties,
                required,
            } => match value.as_object() {
                Some(obj) => {
                    for key in required {
                        if !obj.contains_key(key) {
                            errors.push(ValidationError::new(
                                format!("{path}.{key}"),
                                "required property is missing",
                            ));
                        }
                    }
                    for (key, schema) in properties {
                        if let Some(v) = obj.get(key) {
                            schema.validate_into(v, &format!("{path}.{key}"), errors);
                        }
                    }
                }
                None => errors.push(ValidationError::new(path, "expected an object")),
            },
            ParamSchema::String { pattern, r#enum } => match value.as_str() {
                Some(s) => {
                    if let Some(allowed) = r#enum {
                        if !allowed.iter().any(|a| a == s) {
                            errors.push(ValidationError::new(
                                path,
                                format!("value {s:?} is not one of {allowed:?}"),
                            ));
                        }
                    }
                    if let Some(pattern) = pattern {
                        match regex::Regex::new(pattern) {
                            Ok(re) if !re.is_match(s) => {
                                errors.push(ValidationError::new(
                                    path,
                                    format!("value does not match pattern {pattern:?}"),
                                ));
                            }
                            Err(e) => errors.push(ValidationError::new(
                                path,
                                format!("invalid schema pattern {pattern:?}: {e}"),
                            )),
                            _ => {}
                        }
                    }
                }
                None => errors.push(ValidationError::new(path, "expected a string")),
            },
            ParamSchema::Number { minimum, maximum } => match value.as_f64() {
                Some(n) => {
                    if let Some(min) = minimum {
                        if n < *min {
                            errors.push(ValidationError::new(
                                path,
                                format!("{n} is below minimum {min}"),
                            ));
                        }
                    }
                    if let Some(max) = maximum {
                        if n > *max {
                            errors.push(ValidationError::new(
                                path,
                                format!("{n} is above maximum {max}"),
                            ));
                        }
                    }
                }
                None => errors.push(ValidationError::new(path, "expected a number")),
            },
            ParamSchema::Integer { minimum, maximum } => match value.as_i64() {
                Some(n) => {
                    if let Some(min) = minimum {
                        if n < *min {
                            errors.push(ValidationError::new(
                                path,
                                format!("{n} is below minimum {min}"),
                            ));
                        }
                    }
                    if let Some(max) = maximum {
                        if n > *max {
                            errors.push(ValidationError::new(
                                path,
                                format!("{n} is above maximum {max}"),
                            ));
                        }
                    }
                }
                None => errors.push(ValidationError::new(path, "expected an integer")),
            },
            ParamSchema::Boolean => {
                if value.as_bool().is_none() {
                    errors.push(ValidationError::new(path, "expected a boolean"));
                }
            }
            ParamSchema::Array { items } => match value.as_array() {
                Some(arr) => {
                    for (i, item) in arr.iter().enumerate() {
                        items.validate_into(item, &format!("{path}[{i}]"), errors);
                    }
                }
                None => errors.push(ValidationError::new(path, "expected an array")),
            },
        }
    }
}

/// One method within a protocol. Method names may contain dots and
/// slashes (nested-tool naming) and are treated as opaque identifiers
/// (§4.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSpec {
    pub name: String,
    pub params_schema: ParamSchema,
    pub result_schema: ParamSchema,
}

/// A protocol specification, keyed by `(name, version)` (§3, §4.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolSpec {
    pub name: String,
    pub version: String,
    pub methods: HashMap<String, MethodSpec>,
    /// Another protocol (`name/version` key) this one inherits methods
    /// from; inherited methods are visible unless overridden locally.
    pub extends: Option<String>,
}

impl ProtocolSpec {
    pub fn key(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }

    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            methods: HashMap::new(),
            extends: None,
        }
    }

    pub fn with_method(mut self, method: MethodSpec) -> Self {
        self.methods.insert(method.name.clone(), method);
        self
    }

    pub fn extending(mut self, parent_key: impl Into<String>) -> Self {
        self.extends = Some(parent_key.into());
        self
    }
}
