//! Exported diagnostic variables.
//!
//! Components on the reactor thread publish counters and labels here; the
//! diagnostic HTTP endpoint reads them from its own task, so the map is
//! shared behind a lock.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A single exported value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ExportValue {
    /// Integer counter or gauge
    Int(i64),
    /// Free-form label
    Str(String),
}

/// Thread-safe map of named diagnostic variables.
///
/// Cloning yields another handle to the same map.
#[derive(Debug, Clone, Default)]
pub struct ExportMap {
    vars: Arc<RwLock<BTreeMap<String, ExportValue>>>,
}

impl ExportMap {
    /// Creates an empty export map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an integer variable.
    pub fn set_int(&self, name: &str, value: i64) {
        self.vars
            .write()
            .insert(name.to_string(), ExportValue::Int(value));
    }

    /// Adds `delta` to an integer variable, creating it at zero first.
    ///
    /// A string variable of the same name is replaced.
    pub fn add_int(&self, name: &str, delta: i64) -> i64 {
        let mut vars = self.vars.write();
        let slot = vars
            .entry(name.to_string())
            .or_insert(ExportValue::Int(0));
        let next = match slot {
            ExportValue::Int(current) => *current + delta,
            ExportValue::Str(_) => delta,
        };
        *slot = ExportValue::Int(next);
        next
    }

    /// Sets a string variable.
    pub fn set_string(&self, name: &str, value: impl Into<String>) {
        self.vars
            .write()
            .insert(name.to_string(), ExportValue::Str(value.into()));
    }

    /// Returns an integer variable.
    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.vars.read().get(name) {
            Some(ExportValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    /// Returns a string variable.
    pub fn get_string(&self, name: &str) -> Option<String> {
        match self.vars.read().get(name) {
            Some(ExportValue::Str(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Returns a copy of every variable, sorted by name.
    pub fn snapshot(&self) -> BTreeMap<String, ExportValue> {
        self.vars.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_int_starts_at_zero() {
        let map = ExportMap::new();
        assert_eq!(map.add_int("rpc-connections-accepted", 1), 1);
        assert_eq!(map.add_int("rpc-connections-accepted", 2), 3);
        assert_eq!(map.get_int("rpc-connections-accepted"), Some(3));
    }

    #[test]
    fn test_clones_share_state() {
        let map = ExportMap::new();
        let other = map.clone();
        other.set_string("slp-scopes", "default");
        assert_eq!(map.get_string("slp-scopes").as_deref(), Some("default"));
        assert_eq!(map.get_int("slp-scopes"), None);
    }

    #[test]
    fn test_snapshot_serializes_untagged() {
        let map = ExportMap::new();
        map.set_int("slp-store-entries", 4);
        map.set_string("slp-scopes", "default");
        let json = serde_json::to_string(&map.snapshot()).unwrap();
        assert_eq!(json, r#"{"slp-scopes":"default","slp-store-entries":4}"#);
    }
}
