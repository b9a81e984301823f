//! Cache storage for entities and index results.
//!
//! Entity entries hold one serialized entity plus its expiration. Index
//! entries hold only the ordered ids a list query returned; reading one
//! replays every id through the entity store.

use std::sync::Arc;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{Entity, EntityType};

use super::expiration::{Clock, Expiration};
use super::keys::{entity_key, index_key};
use super::kv::{KeyValueStore, StoreError};

const METRIC_CACHE_HIT: &str = "entity_relay_cache_hit_total";
const METRIC_CACHE_MISS: &str = "entity_relay_cache_miss_total";
const METRIC_CACHE_EXPIRED: &str = "entity_relay_cache_expired_total";
const METRIC_INDEX_HIT: &str = "entity_relay_index_hit_total";
const METRIC_INDEX_MISS: &str = "entity_relay_index_miss_total";

#[derive(Serialize)]
struct EntityRecordRef<'a> {
    expiration: Expiration,
    entity: &'a Entity,
}

#[derive(Deserialize)]
struct EntityRecord {
    expiration: Expiration,
    entity: Entity,
}

#[derive(Serialize, Deserialize)]
struct IndexRecord {
    entity_type: EntityType,
    expiration: Expiration,
    entity_ids: Vec<i64>,
}

// ============================================================================
// Entity cache
// ============================================================================

/// Entity cache keyed by `(entity type, id)`.
#[derive(Clone)]
pub struct EntityCacheStore {
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl EntityCacheStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { kv, clock }
    }

    /// Read a cached entity.
    ///
    /// `reset` removes the entry and reports a miss. An expired entry is
    /// removed as part of the read. An entry that no longer parses is removed
    /// and reported as an error.
    pub fn load(
        &self,
        entity_type: &EntityType,
        id: i64,
        reset: bool,
    ) -> Result<Option<Entity>, StoreError> {
        let key = entity_key(entity_type, id);

        if reset {
            self.kv.remove(&key)?;
            debug!(entity_type = %entity_type, entity_id = id, "Entity cache reset");
            return Ok(None);
        }

        let Some(raw) = self.kv.get(&key)? else {
            counter!(METRIC_CACHE_MISS, "entity_type" => entity_type.to_string()).increment(1);
            return Ok(None);
        };

        let record: EntityRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(err) => {
                self.kv.remove(&key)?;
                return Err(StoreError::malformed(key, err.to_string()));
            }
        };

        if record.expiration.is_expired(self.clock.now()) {
            self.kv.remove(&key)?;
            counter!(METRIC_CACHE_EXPIRED, "entity_type" => entity_type.to_string()).increment(1);
            debug!(entity_type = %entity_type, entity_id = id, "Entity cache entry expired");
            return Ok(None);
        }

        counter!(METRIC_CACHE_HIT, "entity_type" => entity_type.to_string()).increment(1);
        Ok(Some(record.entity))
    }

    /// Write `entity` with its expiration attached, replacing any prior copy.
    pub fn save(
        &self,
        entity_type: &EntityType,
        id: i64,
        entity: &Entity,
        expiration: Expiration,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(&EntityRecordRef { expiration, entity })?;
        self.kv.set(&entity_key(entity_type, id), raw)
    }

    pub fn delete(&self, entity_type: &EntityType, id: i64) -> Result<(), StoreError> {
        self.kv.remove(&entity_key(entity_type, id))
    }
}

// ============================================================================
// Index cache
// ============================================================================

/// Index cache keyed by an opaque query key.
#[derive(Clone)]
pub struct IndexCacheStore {
    kv: Arc<dyn KeyValueStore>,
    entities: EntityCacheStore,
    clock: Arc<dyn Clock>,
}

impl IndexCacheStore {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        entities: EntityCacheStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            kv,
            entities,
            clock,
        }
    }

    /// Rebuild a cached index result.
    ///
    /// Each stored id is read back through the entity cache; entities that
    /// expired, were removed on their own, or no longer parse show up as
    /// `None` in place.
    pub fn load(
        &self,
        query_key: &str,
        entity_type: &EntityType,
        reset: bool,
    ) -> Result<Option<Vec<Option<Entity>>>, StoreError> {
        let key = index_key(query_key);

        if reset {
            self.kv.remove(&key)?;
            debug!(query_key, "Index cache reset");
            return Ok(None);
        }

        let Some(raw) = self.kv.get(&key)? else {
            counter!(METRIC_INDEX_MISS, "entity_type" => entity_type.to_string()).increment(1);
            return Ok(None);
        };

        let record: IndexRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(err) => {
                self.kv.remove(&key)?;
                return Err(StoreError::malformed(key, err.to_string()));
            }
        };

        if record.expiration.is_expired(self.clock.now()) {
            self.kv.remove(&key)?;
            counter!(METRIC_INDEX_MISS, "entity_type" => entity_type.to_string()).increment(1);
            debug!(query_key, "Index cache entry expired");
            return Ok(None);
        }

        counter!(METRIC_INDEX_HIT, "entity_type" => entity_type.to_string()).increment(1);
        let items = record
            .entity_ids
            .into_iter()
            .map(|id| match self.entities.load(entity_type, id, false) {
                Ok(entity) => entity,
                Err(err) => {
                    warn!(
                        target = "cache::store::index",
                        query_key,
                        entity_type = %entity_type,
                        entity_id = id,
                        error = %err,
                        "Index item unreadable; treating as miss"
                    );
                    None
                }
            })
            .collect();
        Ok(Some(items))
    }

    /// Persist the ordered ids of `entities` under `query_key`.
    ///
    /// Every entity must carry a value for `primary_key`.
    pub fn save(
        &self,
        query_key: &str,
        entity_type: &EntityType,
        expiration: Expiration,
        entities: &[Entity],
        primary_key: &str,
    ) -> Result<(), StoreError> {
        let entity_ids = entities
            .iter()
            .enumerate()
            .map(|(position, entity)| {
                entity.primary_key_value(primary_key).ok_or_else(|| {
                    StoreError::malformed(
                        index_key(query_key),
                        format!("entity at position {position} has no `{primary_key}` value"),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let record = IndexRecord {
            entity_type: entity_type.clone(),
            expiration,
            entity_ids,
        };
        self.kv
            .set(&index_key(query_key), serde_json::to_string(&record)?)
    }

    pub fn delete(&self, query_key: &str) -> Result<(), StoreError> {
        self.kv.remove(&index_key(query_key))
    }
}
