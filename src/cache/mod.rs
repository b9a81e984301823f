//! Local cache for remote entities.
//!
//! Two persisted caches share one key/value backend:
//!
//! - **Entity cache**: one serialized entity per `(type, id)`
//! - **Index cache**: the ordered ids returned by a list query
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! ttl_seconds = 300   # 0 keeps entries until they are invalidated
//! backend = "file"
//! directory = ".entity-relay/cache"
//! ```

mod config;
mod expiration;
mod keys;
mod kv;
pub(crate) mod lock;
mod store;

pub use config::{CacheConfig, CacheControl};
pub use expiration::{Clock, Expiration, ManualClock, SystemClock, compute_expiration};
pub use keys::{entity_key, index_key};
pub use kv::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use store::{EntityCacheStore, IndexCacheStore};
