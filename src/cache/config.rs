//! Cache configuration.
//!
//! Controls whether entities are cached locally and for how long, via the
//! `[cache]` section of `entity-relay.toml`.

use std::sync::{Arc, RwLock};

use serde::Deserialize;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::config";

/// Cache configuration from `entity-relay.toml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the local entity and index caches.
    pub enabled: bool,
    /// Seconds a cached copy stays fresh; `0` keeps it forever.
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 0,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            ttl_seconds: settings.ttl_seconds,
        }
    }
}

/// Live, shared view of [`CacheConfig`].
///
/// Every cache decision reads the current value, so toggling caching or
/// changing the TTL affects the next operation without rebuilding anything.
#[derive(Debug, Clone, Default)]
pub struct CacheControl {
    inner: Arc<RwLock<CacheConfig>>,
}

impl CacheControl {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    pub fn current(&self) -> CacheConfig {
        *rw_read(&self.inner, SOURCE, "current")
    }

    pub fn caching_enabled(&self) -> bool {
        self.current().enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        rw_write(&self.inner, SOURCE, "set_enabled").enabled = enabled;
    }

    pub fn set_ttl_seconds(&self, ttl_seconds: u64) {
        rw_write(&self.inner, SOURCE, "set_ttl_seconds").ttl_seconds = ttl_seconds;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.ttl_seconds, 0);
    }

    #[test]
    fn control_changes_are_visible_to_clones() {
        let control = CacheControl::new(CacheConfig::default());
        let reader = control.clone();

        control.set_enabled(false);
        control.set_ttl_seconds(90);

        let seen = reader.current();
        assert!(!seen.enabled);
        assert_eq!(seen.ttl_seconds, 90);
        assert!(!reader.caching_enabled());
    }
}
