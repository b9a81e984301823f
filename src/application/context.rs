//! Shared state behind an [`EntityFacade`](super::facade::EntityFacade).

use std::sync::Arc;

use crate::cache::{
    CacheConfig, CacheControl, Clock, EntityCacheStore, Expiration, IndexCacheStore,
    KeyValueStore, SystemClock, compute_expiration,
};

use super::queue::RequestQueue;
use super::registry::HandlerRegistry;

/// Language code injected into nodes saved without one.
pub const DEFAULT_LANGUAGE: &str = "und";

/// Cache stores, dedup queue, handler table, and live cache settings.
///
/// Cloning is cheap and every clone shares the same state; build one per
/// process (or per test) and hand clones to whoever needs them.
#[derive(Clone)]
pub struct EntityContext {
    cache: CacheControl,
    entities: EntityCacheStore,
    indexes: IndexCacheStore,
    queue: Arc<RequestQueue>,
    registry: Arc<HandlerRegistry>,
    clock: Arc<dyn Clock>,
    default_language: Arc<str>,
}

impl EntityContext {
    pub fn new(
        config: CacheConfig,
        kv: Arc<dyn KeyValueStore>,
        registry: HandlerRegistry,
    ) -> Self {
        Self::with_clock(config, kv, registry, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: CacheConfig,
        kv: Arc<dyn KeyValueStore>,
        registry: HandlerRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let entities = EntityCacheStore::new(Arc::clone(&kv), Arc::clone(&clock));
        let indexes = IndexCacheStore::new(kv, entities.clone(), Arc::clone(&clock));
        Self {
            cache: CacheControl::new(config),
            entities,
            indexes,
            queue: Arc::new(RequestQueue::new()),
            registry: Arc::new(registry),
            clock,
            default_language: Arc::from(DEFAULT_LANGUAGE),
        }
    }

    pub fn with_default_language(mut self, language: impl AsRef<str>) -> Self {
        self.default_language = Arc::from(language.as_ref());
        self
    }

    pub fn cache(&self) -> &CacheControl {
        &self.cache
    }

    pub fn entities(&self) -> &EntityCacheStore {
        &self.entities
    }

    pub fn indexes(&self) -> &IndexCacheStore {
        &self.indexes
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    /// Expiration for a copy written now, or `None` when caching is off.
    pub fn fresh_expiration(&self) -> Option<Expiration> {
        let config = self.cache.current();
        compute_expiration(config.ttl_seconds, config.enabled, self.clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ManualClock, MemoryStore};

    fn context(config: CacheConfig) -> EntityContext {
        EntityContext::with_clock(
            config,
            Arc::new(MemoryStore::new()),
            HandlerRegistry::new(),
            Arc::new(ManualClock::new(500)),
        )
    }

    #[test]
    fn fresh_expiration_follows_live_settings() {
        let ctx = context(CacheConfig {
            enabled: true,
            ttl_seconds: 30,
        });
        assert_eq!(ctx.fresh_expiration(), Some(Expiration::At(530)));

        ctx.cache().set_ttl_seconds(0);
        assert_eq!(ctx.fresh_expiration(), Some(Expiration::Never));

        ctx.cache().set_enabled(false);
        assert_eq!(ctx.fresh_expiration(), None);
    }

    #[test]
    fn clones_share_queue_and_settings() {
        let ctx = context(CacheConfig::default());
        let other = ctx.clone();

        other.cache().set_enabled(false);
        assert!(!ctx.cache().caching_enabled());

        let key = crate::application::queue::QueueKey::new(
            "node",
            crate::domain::Operation::Retrieve,
            1,
        );
        other.queue().enqueue(&key);
        assert!(ctx.queue().is_queued(&key));
    }

    #[test]
    fn default_language_is_configurable() {
        let ctx = context(CacheConfig::default());
        assert_eq!(ctx.default_language(), DEFAULT_LANGUAGE);
        assert_eq!(ctx.with_default_language("en").default_language(), "en");
    }
}
