//! Entity facade: cache-first loads with request deduplication, plus
//! save/delete/index dispatch to the registered remote handlers.
//!
//! Every method is a fault boundary. Store failures are logged and treated
//! as a miss; declared failures reach the caller's error callback when one
//! was supplied and are otherwise only logged. Success is evidenced only by
//! the success callback firing.

use std::sync::Arc;

use metrics::counter;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{
    Entity, EntityError, EntityIdArg, EntityType, Operation, builtin_primary_key,
};

use super::callbacks::{
    CallOptions, ErrorCallback, SuccessCallback, oneshot_callbacks, report,
};
use super::context::EntityContext;
use super::queue::{Admission, QueueKey};
use super::registry::EntityHandler;

const METRIC_REMOTE_DISPATCH: &str = "entity_relay_remote_dispatch_total";

/// Flags supplied by the surrounding page framework.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallerHints {
    /// The operation runs as part of a page reload.
    pub page_reload: bool,
    /// The caller explicitly asked for fresh data.
    pub reset: bool,
}

impl CallerHints {
    /// A reload that also asked for a reset discards still-valid cache entries.
    pub fn forces_reset(&self) -> bool {
        self.page_reload && self.reset
    }
}

/// Options for [`EntityFacade::load`].
#[derive(Default)]
pub struct LoadOptions {
    pub reset: bool,
    pub hints: CallerHints,
    pub success: Option<SuccessCallback<Entity>>,
    pub error: Option<ErrorCallback>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success(mut self, callback: impl FnOnce(Entity) + Send + 'static) -> Self {
        self.success = Some(Box::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl FnOnce(EntityError) + Send + 'static) -> Self {
        self.error = Some(Box::new(callback));
        self
    }

    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    pub fn with_hints(mut self, hints: CallerHints) -> Self {
        self.hints = hints;
        self
    }

    fn forces_reset(&self) -> bool {
        self.reset || self.hints.forces_reset()
    }
}

/// Options for [`EntityFacade::save`] and [`EntityFacade::delete`].
///
/// The success callback receives the remote response body verbatim.
#[derive(Default)]
pub struct WriteOptions {
    pub success: Option<SuccessCallback<Value>>,
    pub error: Option<ErrorCallback>,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success(mut self, callback: impl FnOnce(Value) + Send + 'static) -> Self {
        self.success = Some(Box::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl FnOnce(EntityError) + Send + 'static) -> Self {
        self.error = Some(Box::new(callback));
        self
    }
}

pub type SaveOptions = WriteOptions;
pub type DeleteOptions = WriteOptions;

/// Options for [`EntityFacade::index`].
#[derive(Default)]
pub struct IndexOptions {
    pub reset: bool,
    pub hints: CallerHints,
    pub success: Option<SuccessCallback<Vec<Entity>>>,
    pub error: Option<ErrorCallback>,
}

impl IndexOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success(mut self, callback: impl FnOnce(Vec<Entity>) + Send + 'static) -> Self {
        self.success = Some(Box::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl FnOnce(EntityError) + Send + 'static) -> Self {
        self.error = Some(Box::new(callback));
        self
    }

    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    pub fn with_hints(mut self, hints: CallerHints) -> Self {
        self.hints = hints;
        self
    }
}

/// Entry point for entity reads and writes.
#[derive(Clone)]
pub struct EntityFacade {
    ctx: EntityContext,
}

impl EntityFacade {
    pub fn new(ctx: EntityContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &EntityContext {
        &self.ctx
    }

    /// Load one entity, from cache when a valid copy exists.
    ///
    /// Concurrent loads of the same `(type, id)` share one remote retrieve;
    /// every caller's success callback fires in registration order. On
    /// remote failure only the caller that triggered the dispatch hears
    /// about it.
    pub fn load(
        &self,
        entity_type: impl Into<EntityType>,
        id: impl Into<EntityIdArg>,
        options: LoadOptions,
    ) {
        let entity_type = entity_type.into();
        let reset = options.forces_reset();
        let LoadOptions { success, error, .. } = options;

        let id = match id.into().resolve() {
            Ok(id) => id,
            Err(err) => {
                warn!(
                    target = "application::facade::load",
                    entity_type = %entity_type,
                    error = %err,
                    "rejected entity load"
                );
                report(error, err);
                return;
            }
        };

        if let Some(entity) = self.cached_entity(&entity_type, id, reset) {
            if let Some(callback) = success {
                callback(entity);
            }
            return;
        }

        let handler = match self.handler_for(&entity_type, Operation::Retrieve) {
            Ok(handler) => handler,
            Err(err) => {
                warn!(
                    target = "application::facade::load",
                    entity_type = %entity_type,
                    entity_id = id,
                    error = %err,
                    "entity load not dispatched"
                );
                report(error, err);
                return;
            }
        };

        let key = QueueKey::new(entity_type.clone(), Operation::Retrieve, id);
        let error = match self.ctx.queue().admit(&key, success, error) {
            Admission::Joined => return,
            Admission::Dispatch(error) => error,
        };

        record_dispatch(&entity_type, Operation::Retrieve);
        debug!(entity_type = %entity_type, entity_id = id, "dispatching remote retrieve");

        let ctx = self.ctx.clone();
        let on_success: SuccessCallback<Entity> =
            Box::new(move |entity| resolve_retrieve(&ctx, &key, entity));
        let on_error: ErrorCallback = Box::new(move |err| {
            warn!(
                target = "application::facade::load",
                entity_type = %entity_type,
                entity_id = id,
                error = %err,
                "remote retrieve failed"
            );
            report(error, err);
        });
        handler.retrieve(id, CallOptions::from_parts(on_success, on_error));
    }

    /// Load one entity and await the outcome.
    ///
    /// A caller that joins a request which then fails for its owner never
    /// resolves; wrap this in a timeout where that matters.
    pub async fn fetch(
        &self,
        entity_type: impl Into<EntityType>,
        id: impl Into<EntityIdArg>,
        hints: CallerHints,
    ) -> Result<Entity, EntityError> {
        let (success, error, outcome) = oneshot_callbacks();
        self.load(
            entity_type,
            id,
            LoadOptions {
                reset: false,
                hints,
                success: Some(success),
                error: Some(error),
            },
        );
        outcome.await
    }

    /// Create or update an entity.
    ///
    /// The type's primary-key field decides: present means update, absent
    /// means create. Nodes without a `language` get the default language,
    /// and any entity without a `type` takes a non-empty `bundle`.
    pub fn save(
        &self,
        entity_type: impl Into<EntityType>,
        bundle: &str,
        mut entity: Entity,
        options: SaveOptions,
    ) {
        let entity_type = entity_type.into();
        let WriteOptions { success, error } = options;

        let dispatch = self.save_target(&entity_type, &entity);
        let (operation, handler) = match dispatch {
            Ok(found) => found,
            Err(err) => {
                warn!(
                    target = "application::facade::save",
                    entity_type = %entity_type,
                    error = %err,
                    "entity save not dispatched"
                );
                report(error, err);
                return;
            }
        };

        if entity_type.is_node() && !entity.contains_field("language") {
            entity.insert("language", self.ctx.default_language());
        }
        if !bundle.is_empty() && !entity.contains_field("type") {
            entity.insert("type", bundle);
        }

        record_dispatch(&entity_type, operation);
        debug!(
            entity_type = %entity_type,
            bundle,
            operation = %operation,
            "dispatching remote save"
        );

        let call = forward(success, error, entity_type, operation);
        match operation {
            Operation::Update => handler.update(entity, call),
            _ => handler.create(entity, call),
        }
    }

    /// Delete an entity remotely.
    ///
    /// Leaves the cached copy and any in-flight load untouched; pair with
    /// [`invalidate`](Self::invalidate) when the cache must follow.
    pub fn delete(
        &self,
        entity_type: impl Into<EntityType>,
        id: impl Into<EntityIdArg>,
        options: DeleteOptions,
    ) {
        let entity_type = entity_type.into();
        let WriteOptions { success, error } = options;

        let dispatch = id.into().resolve().and_then(|id| {
            self.handler_for(&entity_type, Operation::Delete)
                .map(|handler| (id, handler))
        });
        let (id, handler) = match dispatch {
            Ok(found) => found,
            Err(err) => {
                warn!(
                    target = "application::facade::delete",
                    entity_type = %entity_type,
                    error = %err,
                    "entity delete not dispatched"
                );
                report(error, err);
                return;
            }
        };

        record_dispatch(&entity_type, Operation::Delete);
        debug!(entity_type = %entity_type, entity_id = id, "dispatching remote delete");
        handler.delete(id, forward(success, error, entity_type, Operation::Delete));
    }

    /// Run a list query, served from the index cache when every listed
    /// entity is still cached.
    pub fn index(
        &self,
        entity_type: impl Into<EntityType>,
        query_key: impl Into<String>,
        options: IndexOptions,
    ) {
        let entity_type = entity_type.into();
        let query_key = query_key.into();
        let reset = options.reset || options.hints.forces_reset();
        let IndexOptions { success, error, .. } = options;

        if let Some(entities) = self.cached_index(&entity_type, &query_key, reset) {
            if let Some(callback) = success {
                callback(entities);
            }
            return;
        }

        let prepared = self.handler_for(&entity_type, Operation::Index).and_then(|handler| {
            self.primary_key_of(entity_type.as_str())
                .map(|key| (handler, key.to_owned()))
                .ok_or_else(|| EntityError::UnresolvedPrimaryKey {
                    entity_type: entity_type.clone(),
                })
        });
        let (handler, primary_key) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!(
                    target = "application::facade::index",
                    entity_type = %entity_type,
                    query_key = %query_key,
                    error = %err,
                    "index query not dispatched"
                );
                report(error, err);
                return;
            }
        };

        record_dispatch(&entity_type, Operation::Index);
        debug!(entity_type = %entity_type, query_key = %query_key, "dispatching remote index");

        let ctx = self.ctx.clone();
        let dispatch_key = query_key.clone();
        let on_success: SuccessCallback<Vec<Entity>> = Box::new(move |entities| {
            store_index(&ctx, &entity_type, &query_key, &primary_key, &entities);
            if let Some(callback) = success {
                callback(entities);
            }
        });
        let on_error: ErrorCallback = Box::new(move |err| {
            warn!(
                target = "application::facade::index",
                error = %err,
                "remote index failed"
            );
            report(error, err);
        });
        handler.index(&dispatch_key, CallOptions::from_parts(on_success, on_error));
    }

    /// Run a list query and await the outcome.
    pub async fn fetch_index(
        &self,
        entity_type: impl Into<EntityType>,
        query_key: impl Into<String>,
        hints: CallerHints,
    ) -> Result<Vec<Entity>, EntityError> {
        let (success, error, outcome) = oneshot_callbacks();
        self.index(
            entity_type,
            query_key,
            IndexOptions {
                reset: false,
                hints,
                success: Some(success),
                error: Some(error),
            },
        );
        outcome.await
    }

    /// Primary-key field name for `entity_type`.
    ///
    /// Built-in types come from the fixed table; others ask their registered
    /// handler. Unknown types log a warning and yield `None`.
    pub fn primary_key_of(&self, entity_type: &str) -> Option<&str> {
        if let Some(key) = builtin_primary_key(entity_type) {
            return Some(key);
        }
        let key = self
            .ctx
            .registry()
            .get(&EntityType::from(entity_type))
            .and_then(|handler| handler.primary_key());
        if key.is_none() {
            warn!(
                target = "application::facade::primary_key_of",
                entity_type,
                "no primary key known for entity type"
            );
        }
        key
    }

    /// Drop the cached copy of one entity.
    pub fn invalidate(&self, entity_type: impl Into<EntityType>, id: i64) {
        let entity_type = entity_type.into();
        if let Err(err) = self.ctx.entities().delete(&entity_type, id) {
            warn!(
                target = "application::facade::invalidate",
                entity_type = %entity_type,
                entity_id = id,
                error = %err,
                "failed to invalidate cached entity"
            );
        }
    }

    /// Drop a cached index result. Entities it listed stay cached.
    pub fn invalidate_index(&self, query_key: &str) {
        if let Err(err) = self.ctx.indexes().delete(query_key) {
            warn!(
                target = "application::facade::invalidate_index",
                query_key,
                error = %err,
                "failed to invalidate cached index"
            );
        }
    }

    /// Pick create or update for `entity` and the handler that serves it.
    fn save_target(
        &self,
        entity_type: &EntityType,
        entity: &Entity,
    ) -> Result<(Operation, Arc<dyn EntityHandler>), EntityError> {
        if self.ctx.registry().get(entity_type).is_none() {
            return Err(EntityError::unsupported(entity_type));
        }
        let primary_key = self.primary_key_of(entity_type.as_str()).ok_or_else(|| {
            EntityError::UnresolvedPrimaryKey {
                entity_type: entity_type.clone(),
            }
        })?;
        let operation = if entity.primary_key_value(primary_key).is_some() {
            Operation::Update
        } else {
            Operation::Create
        };
        Ok((operation, self.handler_for(entity_type, operation)?))
    }

    fn handler_for(
        &self,
        entity_type: &EntityType,
        operation: Operation,
    ) -> Result<Arc<dyn EntityHandler>, EntityError> {
        let handler = self
            .ctx
            .registry()
            .get(entity_type)
            .ok_or_else(|| EntityError::unsupported(entity_type))?;
        if !handler.supports(operation) {
            return Err(EntityError::missing_handler(entity_type, operation));
        }
        Ok(Arc::clone(handler))
    }

    fn cached_entity(&self, entity_type: &EntityType, id: i64, reset: bool) -> Option<Entity> {
        if !self.ctx.cache().caching_enabled() {
            return None;
        }
        match self.ctx.entities().load(entity_type, id, reset) {
            Ok(Some(entity)) => {
                debug!(entity_type = %entity_type, entity_id = id, "entity served from cache");
                Some(entity)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(
                    target = "application::facade::load",
                    entity_type = %entity_type,
                    entity_id = id,
                    error = %err,
                    "entity cache read failed; treating as miss"
                );
                None
            }
        }
    }

    fn cached_index(
        &self,
        entity_type: &EntityType,
        query_key: &str,
        reset: bool,
    ) -> Option<Vec<Entity>> {
        if !self.ctx.cache().caching_enabled() {
            return None;
        }
        match self.ctx.indexes().load(query_key, entity_type, reset) {
            Ok(Some(items)) => {
                // Any entity that fell out of the cache invalidates the whole result.
                let entities = items.into_iter().collect::<Option<Vec<_>>>();
                match &entities {
                    Some(found) => {
                        debug!(query_key, items = found.len(), "index served from cache")
                    }
                    None => debug!(query_key, "cached index is incomplete"),
                }
                entities
            }
            Ok(None) => None,
            Err(err) => {
                warn!(
                    target = "application::facade::index",
                    query_key,
                    error = %err,
                    "index cache read failed; treating as miss"
                );
                None
            }
        }
    }
}

fn record_dispatch(entity_type: &EntityType, operation: Operation) {
    counter!(
        METRIC_REMOTE_DISPATCH,
        "entity_type" => entity_type.to_string(),
        "operation" => operation.as_str()
    )
    .increment(1);
}

/// Success path of a deduplicated retrieve: cache, then fan out.
fn resolve_retrieve(ctx: &EntityContext, key: &QueueKey, entity: Entity) {
    if let Some(expiration) = ctx.fresh_expiration()
        && let Err(err) = ctx
            .entities()
            .save(&key.entity_type, key.id, &entity, expiration)
    {
        warn!(
            target = "application::facade::load",
            entity_type = %key.entity_type,
            entity_id = key.id,
            error = %err,
            "failed to cache retrieved entity"
        );
    }

    let callbacks = ctx.queue().drain_success(key);
    debug!(queue_key = %key, callbacks = callbacks.len(), "fanning out retrieved entity");
    for callback in callbacks {
        callback(entity.clone());
    }
}

fn store_index(
    ctx: &EntityContext,
    entity_type: &EntityType,
    query_key: &str,
    primary_key: &str,
    entities: &[Entity],
) {
    let Some(expiration) = ctx.fresh_expiration() else {
        return;
    };

    for entity in entities {
        let Some(id) = entity.primary_key_value(primary_key) else {
            continue;
        };
        if let Err(err) = ctx.entities().save(entity_type, id, entity, expiration) {
            warn!(
                target = "application::facade::index",
                entity_type = %entity_type,
                entity_id = id,
                error = %err,
                "failed to cache listed entity"
            );
        }
    }

    if let Err(err) = ctx
        .indexes()
        .save(query_key, entity_type, expiration, entities, primary_key)
    {
        warn!(
            target = "application::facade::index",
            query_key,
            error = %err,
            "failed to cache index result"
        );
    }
}

/// Wrap optional caller callbacks for a write dispatch.
fn forward(
    success: Option<SuccessCallback<Value>>,
    error: Option<ErrorCallback>,
    entity_type: EntityType,
    operation: Operation,
) -> CallOptions<Value> {
    CallOptions::from_parts(
        Box::new(move |response| {
            if let Some(callback) = success {
                callback(response);
            }
        }),
        Box::new(move |err| {
            warn!(
                target = "application::facade",
                entity_type = %entity_type,
                operation = %operation,
                error = %err,
                "remote write failed"
            );
            report(error, err);
        }),
    )
}
