//! # Protocol Registry (C1)
//!
//! Registers protocol specifications, resolves methods through an
//! `extends` chain, and validates task parameters against the resolved
//! method's schema (§4.1).

use dashmap::DashMap;
use orchestrator_shared::errors::{SharedError, SharedResult, ValidationError};
use orchestrator_shared::models::protocol::{MethodSpec, ProtocolSpec};
use orchestrator_shared::models::task::Task;
use std::collections::HashSet;

fn split_key(key: &str) -> (String, String) {
    match key.split_once('/') {
        Some((name, version)) => (name.to_string(), version.to_string()),
        None => (key.to_string(), String::new()),
    }
}

/// Registered protocol specifications, keyed by `name/version`.
#[derive(Debug, Default)]
pub struct ProtocolRegistry {
    specs: DashMap<String, ProtocolSpec>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self {
            specs: DashMap::new(),
        }
    }

    /// Registers a protocol specification. Re-registering under the same
    /// key with an identical definition is a no-op; registering a
    /// different definition under a key already in use is a conflict
    /// (§4.1 edge cases).
    pub fn register(&self, spec: ProtocolSpec) -> SharedResult<()> {
        let key = spec.key();
        if let Some(existing) = self.specs.get(&key) {
            if *existing == spec {
                return Ok(());
            }
            return Err(SharedError::ProtocolConflict {
                name: spec.name,
                version: spec.version,
            });
        }
        self.specs.insert(key, spec);
        Ok(())
    }

    pub fn lookup(&self, key: &str) -> Option<ProtocolSpec> {
        self.specs.get(key).map(|entry| entry.clone())
    }

    /// All registered protocol specifications, for read-only introspection.
    pub fn list(&self) -> Vec<ProtocolSpec> {
        self.specs.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Resolves `method` on protocol `key`, walking the `extends` chain
    /// when the method is not defined locally. Cycles in the inheritance
    /// chain are reported rather than looping forever (§4.1).
    pub fn resolve_method(&self, key: &str, method: &str) -> SharedResult<MethodSpec> {
        let mut visited = HashSet::new();
        let mut current = key.to_string();
        loop {
            if !visited.insert(current.clone()) {
                let (name, version) = split_key(key);
                return Err(SharedError::InheritanceCycle { name, version });
            }
            let spec = self.specs.get(&current).ok_or_else(|| {
                let (name, version) = split_key(&current);
                SharedError::UnknownProtocol { name, version }
            })?;
            if let Some(m) = spec.methods.get(method) {
                return Ok(m.clone());
            }
            match spec.extends.clone() {
                Some(parent) => {
                    drop(spec);
                    current = parent;
                }
                None => {
                    let (name, version) = split_key(key);
                    return Err(SharedError::UnknownMethod {
                        name,
                        version,
                        method: method.to_string(),
                    });
                }
            }
        }
    }

    /// Validates a task's parameters against its resolved method schema
    /// (§4.1 `validateTask`). Accumulates every schema violation rather
    /// than failing fast.
    pub fn validate_task(&self, task: &Task) -> Result<(), Vec<ValidationError>> {
        match self.resolve_method(&task.protocol, &task.method) {
            Ok(method_spec) => {
                let errors = method_spec.params_schema.validate(&task.params, "params");
                if errors.is_empty() {
                    Ok(())
                } else {
                    Err(errors)
                }
            }
            Err(e) => Err(vec![ValidationError::new("protocol", e.to_string())]),
        }
    }
}
