//! Per-type remote handlers.
//!
//! Each entity type registers one [`EntityHandler`] at startup. The facade
//! looks handlers up by type tag; a missing registration is how an entity
//! type is "unsupported".

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::domain::{Entity, EntityError, EntityType, Operation};

use super::callbacks::CallOptions;

/// Remote operations for one entity type.
///
/// Every method must eventually fire exactly one side of its
/// [`CallOptions`]. Handlers may fire synchronously or from another task.
pub trait EntityHandler: Send + Sync {
    fn retrieve(&self, id: i64, call: CallOptions<Entity>);

    fn create(&self, entity: Entity, call: CallOptions<Value>);

    fn update(&self, entity: Entity, call: CallOptions<Value>);

    fn delete(&self, id: i64, call: CallOptions<Value>);

    /// List query; `query_key` is the canonical path/parameters string.
    fn index(&self, query_key: &str, call: CallOptions<Vec<Entity>>) {
        let _ = query_key;
        call.fail(EntityError::Unimplemented {
            operation: Operation::Index,
        });
    }

    /// Whether `operation` is backed by a real remote endpoint.
    fn supports(&self, operation: Operation) -> bool {
        !matches!(operation, Operation::Index)
    }

    /// Primary-key field for types outside the built-in table.
    fn primary_key(&self) -> Option<&str> {
        None
    }
}

/// Entity type → handler table.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<EntityType, Arc<dyn EntityHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` for `entity_type`, replacing any earlier one.
    pub fn register(
        &mut self,
        entity_type: impl Into<EntityType>,
        handler: Arc<dyn EntityHandler>,
    ) -> &mut Self {
        self.handlers.insert(entity_type.into(), handler);
        self
    }

    pub fn get(&self, entity_type: &EntityType) -> Option<&Arc<dyn EntityHandler>> {
        self.handlers.get(entity_type)
    }

    pub fn contains(&self, entity_type: &EntityType) -> bool {
        self.handlers.contains_key(entity_type)
    }

    /// Registered type tags, sorted.
    pub fn entity_types(&self) -> Vec<EntityType> {
        let mut types: Vec<_> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
