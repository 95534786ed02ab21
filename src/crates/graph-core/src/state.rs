//! State schemas and per-field reducers
//!
//! A graph declares a [`StateSchema`]: the set of named fields its threads
//! carry, each with a [`Reducer`] deciding how a node's update merges into
//! the current value. The default reducer replaces; message channels use the
//! id-merge reducer from [`messages`](crate::messages); map-like channels
//! (document cache, token data) use a shallow object merge.
//!
//! Reducer failures are fatal to a run: a half-applied update would leave
//! the thread inconsistent.

use crate::error::{GraphError, Result};
use crate::messages::add_message_values;
use graph_store::StateMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Merges an update into the current value of one state field
pub trait Reducer: Send + Sync {
    fn apply(&self, current: Option<Value>, update: Value) -> std::result::Result<Value, String>;
}

/// Default reducer: the update replaces the current value
pub struct ReplaceReducer;

impl Reducer for ReplaceReducer {
    fn apply(&self, _current: Option<Value>, update: Value) -> std::result::Result<Value, String> {
        Ok(update)
    }
}

/// Message-list reducer: append with replace-by-id and delete semantics
pub struct AddMessagesReducer;

impl Reducer for AddMessagesReducer {
    fn apply(&self, current: Option<Value>, update: Value) -> std::result::Result<Value, String> {
        let left = match current {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => return Err(format!("expected array, found {other}")),
        };
        let right = match update {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => return Err(format!("expected array update, found {other}")),
        };
        Ok(Value::Array(add_message_values(left, right)))
    }
}

/// Shallow object merge: `{...current, ...update}`
pub struct MergeReducer;

impl Reducer for MergeReducer {
    fn apply(&self, current: Option<Value>, update: Value) -> std::result::Result<Value, String> {
        let mut base = match current {
            Some(Value::Object(map)) => map,
            Some(Value::Null) | None => serde_json::Map::new(),
            Some(other) => return Err(format!("expected object, found {other}")),
        };
        match update {
            Value::Object(map) => {
                for (key, value) in map {
                    base.insert(key, value);
                }
                Ok(Value::Object(base))
            }
            Value::Null => Ok(Value::Object(base)),
            other => Err(format!("expected object update, found {other}")),
        }
    }
}

/// Declaration of one state field
#[derive(Clone)]
pub struct FieldSpec {
    pub name: String,
    pub reducer: Arc<dyn Reducer>,
    pub default: Value,
}

/// Record of fields carried by a graph's threads
#[derive(Clone, Default)]
pub struct StateSchema {
    fields: HashMap<String, FieldSpec>,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field with the default replace reducer
    pub fn field(self, name: impl Into<String>, default: Value) -> Self {
        self.field_with(name, default, Arc::new(ReplaceReducer))
    }

    /// Declare a message channel merged with [`AddMessagesReducer`]
    pub fn messages_field(self, name: impl Into<String>) -> Self {
        self.field_with(name, Value::Array(Vec::new()), Arc::new(AddMessagesReducer))
    }

    /// Declare a map channel merged with [`MergeReducer`]
    pub fn merged_field(self, name: impl Into<String>) -> Self {
        self.field_with(
            name,
            Value::Object(serde_json::Map::new()),
            Arc::new(MergeReducer),
        )
    }

    pub fn field_with(
        mut self,
        name: impl Into<String>,
        default: Value,
        reducer: Arc<dyn Reducer>,
    ) -> Self {
        let name = name.into();
        self.fields.insert(
            name.clone(),
            FieldSpec {
                name,
                reducer,
                default,
            },
        );
        self
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Initial values: every declared field at its default
    pub fn defaults(&self) -> StateMap {
        let mut values = StateMap::new();
        for (name, spec) in &self.fields {
            values.insert(name.clone(), spec.default.clone());
        }
        values
    }

    /// Merge an update into current values field by field.
    ///
    /// Unknown fields use replace semantics; a reducer error is fatal.
    pub fn apply(&self, mut current: StateMap, update: StateMap) -> Result<StateMap> {
        for (field, value) in update {
            match self.fields.get(&field) {
                Some(spec) => {
                    let merged = spec
                        .reducer
                        .apply(current.get(&field).cloned(), value)
                        .map_err(|e| GraphError::reducer(&field, e))?;
                    current.insert(field, merged);
                }
                None => {
                    current.insert(field, value);
                }
            }
        }
        Ok(current)
    }
}

impl std::fmt::Debug for StateSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSchema")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}
