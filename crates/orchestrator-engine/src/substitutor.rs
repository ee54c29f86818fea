//! # Parameter Substitutor (C6)
//!
//! Replaces `${task-id}` and `${task-id.a.b.c}` references in a task's
//! params tree with values from completed dependencies' results (§4.6).
//!
//! Grammar:
//! - A leaf string that is *exactly* `${ref}` is replaced with the
//!   referenced value, preserving its JSON type.
//! - A `${ref}` embedded within a larger string is replaced with a
//!   stringified form (objects/arrays as JSON, numbers canonical,
//!   booleans lowercase).
//! - `\${ref}` is an escaped literal: the backslash is dropped and the
//!   text is left untouched, never treated as a reference.

use once_cell::sync::Lazy;
use orchestrator_shared::errors::ParameterReferenceError;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

static PARAM_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\\)?\$\{([^}]+)\}").unwrap());
static EXACT_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\$\{([^}]+)\}$").unwrap());

pub struct ParameterSubstitutor;

impl ParameterSubstitutor {
    /// Recursively substitutes every reference in `params`, reading
    /// completed results from `results` (author-facing task id -> value).
    pub fn substitute(
        params: &Value,
        results: &HashMap<String, Value>,
    ) -> Result<Value, ParameterReferenceError> {
        match params {
            Value::String(s) => substitute_string(s, results),
            Value::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|v| Self::substitute(v, results))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), Self::substitute(v, results)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }
}

fn substitute_string(s: &str, results: &HashMap<String, Value>) -> Result<Value, ParameterReferenceError> {
    if let Some(caps) = EXACT_REF.captures(s) {
        return resolve_reference(&caps[1], results);
    }

    let mut out = String::with_capacity(s.len());
    let mut last_end = 0;
    for caps in PARAM_REF.captures_iter(s) {
        let whole = caps.get(0).unwrap();
        out.push_str(&s[last_end..whole.start()]);
        if caps.get(1).is_some() {
            // Escaped: drop the backslash, keep the literal `${...}`.
            out.push_str(&format!("${{{}}}", &caps[2]));
        } else {
            let value = resolve_reference(&caps[2], results)?;
            out.push_str(&stringify_for_embed(&value));
        }
        last_end = whole.end();
    }
    out.push_str(&s[last_end..]);
    Ok(Value::String(out))
}

fn resolve_reference(reference: &str, results: &HashMap<String, Value>) -> Result<Value, ParameterReferenceError> {
    let (task_id, path) = match reference.split_once('.') {
        Some((id, rest)) => (id, rest),
        None => (reference, ""),
    };
    let root = results
        .get(task_id)
        .ok_or_else(|| ParameterReferenceError::UnsatisfiedReference {
            task_id: task_id.to_string(),
        })?;
    if path.is_empty() {
        return Ok(root.clone());
    }
    navigate(root, task_id, path)
}

fn navigate(root: &Value, task_id: &str, path: &str) -> Result<Value, ParameterReferenceError> {
    let mut current = root;
    for segment in path.split('.') {
        current = match segment.parse::<usize>() {
            Ok(index) => current.get(index),
            Err(_) => current.get(segment),
        }
        .ok_or_else(|| ParameterReferenceError::MissingPath {
            task_id: task_id.to_string(),
            path: path.to_string(),
        })?;
    }
    Ok(current.clone())
}

fn stringify_for_embed(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
