//! Request deduplication queue.
//!
//! Tracks in-flight remote requests by `(entity type, operation, id)` and
//! the callbacks of every caller waiting on each one, so a given key is
//! dispatched once no matter how many callers ask for it concurrently.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use metrics::counter;
use tracing::debug;

use crate::cache::lock::mutex_lock;
use crate::domain::{Entity, EntityType, Operation};

use super::callbacks::{ErrorCallback, SuccessCallback};

const SOURCE: &str = "application::queue";
const METRIC_QUEUE_JOIN: &str = "entity_relay_queue_join_total";

/// Identity of one logical in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueKey {
    pub entity_type: EntityType,
    pub operation: Operation,
    pub id: i64,
}

impl QueueKey {
    pub fn new(entity_type: impl Into<EntityType>, operation: Operation, id: i64) -> Self {
        Self {
            entity_type: entity_type.into(),
            operation,
            id,
        }
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.entity_type, self.operation, self.id)
    }
}

/// A callback waiting on a queued request.
pub enum QueuedCallback {
    Success(SuccessCallback<Entity>),
    Error(ErrorCallback),
}

/// Outcome of [`RequestQueue::admit`].
pub enum Admission {
    /// No request was in flight; the caller owns the dispatch and keeps its
    /// error callback.
    Dispatch(Option<ErrorCallback>),
    /// The caller was registered as a waiter on an in-flight request.
    Joined,
}

#[derive(Default)]
struct QueueEntry {
    success: Vec<SuccessCallback<Entity>>,
    error: Vec<ErrorCallback>,
}

/// Process-wide registry of in-flight requests.
///
/// All reads and writes go through one mutex, which gives every caller the
/// same ordering a single cooperative thread would see. Callbacks are never
/// invoked while the lock is held.
#[derive(Default)]
pub struct RequestQueue {
    entries: Mutex<HashMap<QueueKey, QueueEntry>>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_queued(&self, key: &QueueKey) -> bool {
        mutex_lock(&self.entries, SOURCE, "is_queued").contains_key(key)
    }

    /// Create the entry for `key` if absent.
    ///
    /// Returns `true` when this call created it, meaning the caller owns the
    /// outbound dispatch.
    pub fn enqueue(&self, key: &QueueKey) -> bool {
        let mut entries = mutex_lock(&self.entries, SOURCE, "enqueue");
        if entries.contains_key(key) {
            return false;
        }
        entries.insert(key.clone(), QueueEntry::default());
        debug!(queue_key = %key, "Request queued");
        true
    }

    /// Append a callback to an existing entry.
    ///
    /// Returns `false` when no entry exists for `key`; the callback is dropped.
    pub fn add_callback(&self, key: &QueueKey, callback: QueuedCallback) -> bool {
        let mut entries = mutex_lock(&self.entries, SOURCE, "add_callback");
        let Some(entry) = entries.get_mut(key) else {
            return false;
        };
        match callback {
            QueuedCallback::Success(cb) => entry.success.push(cb),
            QueuedCallback::Error(cb) => entry.error.push(cb),
        }
        true
    }

    /// Register a caller on a request that is already in flight.
    ///
    /// Returns `false` when the entry vanished in between.
    pub fn join(
        &self,
        key: &QueueKey,
        success: Option<SuccessCallback<Entity>>,
        error: Option<ErrorCallback>,
    ) -> bool {
        let mut entries = mutex_lock(&self.entries, SOURCE, "join");
        let Some(entry) = entries.get_mut(key) else {
            return false;
        };
        entry.success.extend(success);
        entry.error.extend(error);
        counter!(METRIC_QUEUE_JOIN, "entity_type" => key.entity_type.to_string()).increment(1);
        debug!(queue_key = %key, waiters = entry.success.len(), "Joined in-flight request");
        true
    }

    /// Join the in-flight request for `key`, or open one.
    ///
    /// Both steps happen under one lock acquisition, so two racing callers
    /// never both end up owning the dispatch. The opener's success callback
    /// is queued like any waiter's; its error callback is handed back.
    pub fn admit(
        &self,
        key: &QueueKey,
        success: Option<SuccessCallback<Entity>>,
        error: Option<ErrorCallback>,
    ) -> Admission {
        let mut entries = mutex_lock(&self.entries, SOURCE, "admit");
        if let Some(entry) = entries.get_mut(key) {
            entry.success.extend(success);
            entry.error.extend(error);
            counter!(METRIC_QUEUE_JOIN, "entity_type" => key.entity_type.to_string()).increment(1);
            debug!(queue_key = %key, waiters = entry.success.len(), "Joined in-flight request");
            return Admission::Joined;
        }

        let mut entry = QueueEntry::default();
        entry.success.extend(success);
        entries.insert(key.clone(), entry);
        debug!(queue_key = %key, "Request queued");
        Admission::Dispatch(error)
    }

    /// Take the success callbacks for a resolved request, in registration order.
    ///
    /// The entry is removed; error callbacks registered by waiters are
    /// discarded without being invoked.
    pub fn drain_success(&self, key: &QueueKey) -> Vec<SuccessCallback<Entity>> {
        let entry = mutex_lock(&self.entries, SOURCE, "drain_success").remove(key);
        match entry {
            Some(entry) => {
                debug!(
                    queue_key = %key,
                    success_callbacks = entry.success.len(),
                    dropped_error_callbacks = entry.error.len(),
                    "Request resolved"
                );
                entry.success
            }
            None => Vec::new(),
        }
    }

    /// Pending `(success, error)` callback counts for `key`.
    pub fn pending(&self, key: &QueueKey) -> Option<(usize, usize)> {
        mutex_lock(&self.entries, SOURCE, "pending")
            .get(key)
            .map(|entry| (entry.success.len(), entry.error.len()))
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
