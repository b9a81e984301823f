//! Entity records and the identifiers used to address them.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::EntityError;

/// Primary-key field names for the entity types every backend exposes.
const BUILTIN_PRIMARY_KEYS: [(&str, &str); 6] = [
    ("comment", "cid"),
    ("file", "fid"),
    ("node", "nid"),
    ("taxonomy_term", "tid"),
    ("taxonomy_vocabulary", "vid"),
    ("user", "uid"),
];

/// Primary-key field for one of the built-in entity types.
pub fn builtin_primary_key(entity_type: &str) -> Option<&'static str> {
    BUILTIN_PRIMARY_KEYS
        .iter()
        .find(|(name, _)| *name == entity_type)
        .map(|(_, key)| *key)
}

/// Names of the built-in entity types, in table order.
pub fn builtin_entity_types() -> impl Iterator<Item = &'static str> {
    BUILTIN_PRIMARY_KEYS.iter().map(|(name, _)| *name)
}

/// Entity type tag such as `node` or `user`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(String);

impl EntityType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_node(&self) -> bool {
        self.0 == "node"
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityType {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&EntityType> for EntityType {
    fn from(value: &EntityType) -> Self {
        value.clone()
    }
}

impl AsRef<str> for EntityType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Remote operation names used in dedup queue keys and handler lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Retrieve,
    Create,
    Update,
    Delete,
    Index,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Retrieve => "retrieve",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Index => "index",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record of an entity type: a mapping of named fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity(Map<String, Value>);

impl Entity {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Integer value of the primary-key field, accepting numeric strings.
    ///
    /// Absent, null, zero, and non-numeric values all mean "no key": the
    /// entity has not been saved yet.
    pub fn primary_key_value(&self, key: &str) -> Option<i64> {
        let id = match self.0.get(key)? {
            Value::Number(number) => number.as_i64()?,
            Value::String(text) => text.trim().parse().ok()?,
            _ => return None,
        };
        (id != 0).then_some(id)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Entity {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

impl TryFrom<Value> for Entity {
    type Error = EntityError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(EntityError::malformed(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Caller-supplied entity id before validation.
///
/// Single-entity operations accept integers and integer-like strings; a list
/// of ids is a batch request and is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityIdArg {
    Single(i64),
    Text(String),
    Batch(Vec<i64>),
}

impl EntityIdArg {
    /// Coerce to a single integer id.
    pub fn resolve(self) -> Result<i64, EntityError> {
        match self {
            EntityIdArg::Single(id) => Ok(id),
            EntityIdArg::Text(text) => text.trim().parse::<i64>().map_err(|_| {
                EntityError::invalid_id(format!("`{text}` is not an integer entity id"))
            }),
            EntityIdArg::Batch(ids) => Err(EntityError::invalid_id(format!(
                "batch loads are not supported ({} ids given); load one entity id at a time",
                ids.len()
            ))),
        }
    }
}

impl From<i64> for EntityIdArg {
    fn from(value: i64) -> Self {
        Self::Single(value)
    }
}

impl From<i32> for EntityIdArg {
    fn from(value: i32) -> Self {
        Self::Single(value.into())
    }
}

impl From<u32> for EntityIdArg {
    fn from(value: u32) -> Self {
        Self::Single(value.into())
    }
}

impl From<&str> for EntityIdArg {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for EntityIdArg {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<i64>> for EntityIdArg {
    fn from(value: Vec<i64>) -> Self {
        Self::Batch(value)
    }
}

impl From<&[i64]> for EntityIdArg {
    fn from(value: &[i64]) -> Self {
        Self::Batch(value.to_vec())
    }
}
