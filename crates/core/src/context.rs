//! Execution context: arbitrary typed key/value state attached to a job or
//! step execution.
//!
//! The context is a flat map of tagged scalar values. The type tag travels
//! with each value through the persistence codec instead of being inferred
//! from the store's native type system, so values whose precision a native
//! number cannot carry survive a round trip.

use bson::Decimal128;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single typed context value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContextValue {
    String(String),
    Long(i64),
    Double(f64),
    Date(DateTime<Utc>),
    /// Arbitrary-precision decimal. A native double cannot represent these
    /// losslessly, so the codec persists the canonical string together with
    /// a companion type field.
    Numeric(Decimal128),
}

/// Which execution a context document belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextOwner {
    Job(i64),
    Step(i64),
}

impl ContextOwner {
    pub fn id(self) -> i64 {
        match self {
            ContextOwner::Job(id) | ContextOwner::Step(id) => id,
        }
    }
}

/// Flat mapping from string key to typed scalar value.
///
/// Saved wholesale: every save replaces the previously persisted map
/// entirely, there is no partial-field update.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    entries: BTreeMap<String, ContextValue>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: ContextValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn put_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.put(key, ContextValue::String(value.into()));
    }

    pub fn put_long(&mut self, key: impl Into<String>, value: i64) {
        self.put(key, ContextValue::Long(value));
    }

    pub fn put_double(&mut self, key: impl Into<String>, value: f64) {
        self.put(key, ContextValue::Double(value));
    }

    pub fn put_date(&mut self, key: impl Into<String>, value: DateTime<Utc>) {
        self.put(key, ContextValue::Date(value));
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ContextValue)> {
        self.entries.iter()
    }
}

impl FromIterator<(String, ContextValue)> for ExecutionContext {
    fn from_iter<T: IntoIterator<Item = (String, ContextValue)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_holds_typed_values() {
        let mut context = ExecutionContext::new();
        context.put_string("reader.state", "page-4");
        context.put_long("restart.offset", 1024);
        context.put_double("ratio", 0.25);

        assert_eq!(context.len(), 3);
        assert_eq!(
            context.get("restart.offset"),
            Some(&ContextValue::Long(1024))
        );
        assert_eq!(context.get("missing"), None);
    }

    #[test]
    fn owner_exposes_its_id() {
        assert_eq!(ContextOwner::Job(3).id(), 3);
        assert_eq!(ContextOwner::Step(8).id(), 8);
    }
}
