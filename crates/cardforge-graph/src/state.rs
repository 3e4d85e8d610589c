use std::collections::BTreeMap;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use cardforge_core::error::{CardforgeError, Result};

/// A single state value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Bytes(Bytes),
    /// A sequence of records (or scalars), kept as JSON.
    List(Vec<serde_json::Value>),
}

impl Value {
    /// Build a list value from any serializable sequence.
    pub fn list<T: Serialize>(items: &[T]) -> Result<Self> {
        let values = items
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Value::List(values))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items.into_iter().map(serde_json::Value::String).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// The keys a step computed, to be merged into the run state.
///
/// Entries replace the corresponding state keys wholesale; nothing is
/// deep-merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    entries: BTreeMap<String, Value>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key to the update.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    /// A soft failure: every key in `outputs` is set to null and the error
    /// message is stored under `error_key`, so downstream steps can carry on
    /// with reduced information instead of aborting the run.
    pub fn degraded(outputs: &[&str], error_key: &str, message: impl Into<String>) -> Self {
        let mut update = Self::new();
        for key in outputs {
            update.insert(*key, Value::Null);
        }
        update.insert(error_key, Value::Text(message.into()));
        update
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared run state threaded through every node of a graph.
///
/// Keys are never removed. Steps receive a snapshot and return a
/// [`StateUpdate`]; only the executor merges updates back in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    data: BTreeMap<String, Value>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, used to assemble initial run input.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Merge a partial update: each key in `update` overwrites, everything
    /// else passes through unchanged.
    pub fn apply(&mut self, update: &StateUpdate) {
        for (k, v) in &update.entries {
            self.data.insert(k.clone(), v.clone());
        }
    }

    /// Non-mutating form of [`State::apply`].
    pub fn merged(&self, update: &StateUpdate) -> State {
        let mut next = self.clone();
        next.apply(update);
        next
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get a value as a string, if it's a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.data.get(key) {
            Some(Value::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.data.get(key) {
            Some(Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.data.get(key) {
            Some(Value::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn get_bytes(&self, key: &str) -> Option<&Bytes> {
        match self.data.get(key) {
            Some(Value::Bytes(b)) => Some(b),
            _ => None,
        }
    }

    pub fn get_list(&self, key: &str) -> Option<&[serde_json::Value]> {
        match self.data.get(key) {
            Some(Value::List(items)) => Some(items),
            _ => None,
        }
    }

    /// String list, skipping non-string entries.
    pub fn get_strings(&self, key: &str) -> Vec<String> {
        self.get_list(key)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Decode a list value into typed records. Missing or null keys give `None`.
    pub fn get_records<T: DeserializeOwned>(&self, key: &str) -> Result<Option<Vec<T>>> {
        match self.data.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::List(items)) => items
                .iter()
                .map(|v| serde_json::from_value(v.clone()).map_err(CardforgeError::from))
                .collect::<Result<Vec<T>>>()
                .map(Some),
            Some(_) => Err(CardforgeError::StateType {
                key: key.to_string(),
                expected: "list",
            }),
        }
    }

    /// A string key the caller cannot proceed without.
    pub fn require_str(&self, key: &str) -> Result<&str> {
        match self.data.get(key) {
            Some(Value::Text(s)) => Ok(s),
            None | Some(Value::Null) => Err(CardforgeError::MissingStateKey {
                key: key.to_string(),
            }),
            Some(_) => Err(CardforgeError::StateType {
                key: key.to_string(),
                expected: "text",
            }),
        }
    }

    pub fn require_bytes(&self, key: &str) -> Result<&Bytes> {
        match self.data.get(key) {
            Some(Value::Bytes(b)) => Ok(b),
            None | Some(Value::Null) => Err(CardforgeError::MissingStateKey {
                key: key.to_string(),
            }),
            Some(_) => Err(CardforgeError::StateType {
                key: key.to_string(),
                expected: "bytes",
            }),
        }
    }

    pub fn require_int(&self, key: &str) -> Result<i64> {
        match self.data.get(key) {
            Some(Value::Int(n)) => Ok(*n),
            None | Some(Value::Null) => Err(CardforgeError::MissingStateKey {
                key: key.to_string(),
            }),
            Some(_) => Err(CardforgeError::StateType {
                key: key.to_string(),
                expected: "int",
            }),
        }
    }
}
