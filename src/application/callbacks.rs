//! Callback plumbing between callers, the dedup queue, and remote handlers.

use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::cache::lock::mutex_lock;
use crate::domain::EntityError;

const SOURCE: &str = "application::callbacks";

pub type SuccessCallback<T> = Box<dyn FnOnce(T) + Send + 'static>;
pub type ErrorCallback = Box<dyn FnOnce(EntityError) + Send + 'static>;

/// The success/error pair handed to a remote handler.
///
/// Consuming `succeed` or `fail` guarantees at most one of the two fires.
pub struct CallOptions<T> {
    success: SuccessCallback<T>,
    error: ErrorCallback,
}

impl<T> CallOptions<T> {
    pub fn new(
        success: impl FnOnce(T) + Send + 'static,
        error: impl FnOnce(EntityError) + Send + 'static,
    ) -> Self {
        Self {
            success: Box::new(success),
            error: Box::new(error),
        }
    }

    pub(crate) fn from_parts(success: SuccessCallback<T>, error: ErrorCallback) -> Self {
        Self { success, error }
    }

    pub fn succeed(self, value: T) {
        (self.success)(value);
    }

    pub fn fail(self, error: EntityError) {
        (self.error)(error);
    }
}

/// Invoke an optional error callback.
pub(crate) fn report(error_cb: Option<ErrorCallback>, error: EntityError) {
    if let Some(cb) = error_cb {
        cb(error);
    }
}

/// Bridge a callback pair onto a oneshot channel.
///
/// The receiver yields the first outcome delivered. If both callbacks are
/// dropped without firing it yields [`EntityError::Abandoned`]; if they are
/// held forever (a waiter on a request that failed for someone else) it
/// never resolves, so callers should wrap it in a timeout.
pub fn oneshot_callbacks<T: Send + 'static>() -> (
    SuccessCallback<T>,
    ErrorCallback,
    impl Future<Output = Result<T, EntityError>> + Send,
) {
    let (tx, rx) = oneshot::channel::<Result<T, EntityError>>();
    let slot = Arc::new(Mutex::new(Some(tx)));
    let error_slot = Arc::clone(&slot);

    let success: SuccessCallback<T> = Box::new(move |value| {
        if let Some(tx) = mutex_lock(&slot, SOURCE, "success").take() {
            let _ = tx.send(Ok(value));
        }
    });
    let error: ErrorCallback = Box::new(move |err| {
        if let Some(tx) = mutex_lock(&error_slot, SOURCE, "error").take() {
            let _ = tx.send(Err(err));
        }
    });

    let outcome = async move { rx.await.unwrap_or(Err(EntityError::Abandoned)) };
    (success, error, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn oneshot_delivers_success() {
        let (success, _error, outcome) = oneshot_callbacks::<u32>();
        success(7);
        assert_eq!(outcome.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn oneshot_delivers_first_outcome_only() {
        let (success, error, outcome) = oneshot_callbacks::<u32>();
        error(EntityError::unsupported("widget"));
        success(1);
        assert!(matches!(
            outcome.await,
            Err(EntityError::UnsupportedType { .. })
        ));
    }

    #[tokio::test]
    async fn dropped_callbacks_resolve_as_abandoned() {
        let (success, error, outcome) = oneshot_callbacks::<u32>();
        drop(success);
        drop(error);
        assert!(matches!(outcome.await, Err(EntityError::Abandoned)));
    }

    #[test]
    fn call_options_fire_exactly_one_side() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let ok_hits = Arc::clone(&hits);
        let err_hits = Arc::clone(&hits);

        let call = CallOptions::new(
            move |value: &'static str| ok_hits.lock().unwrap().push(value),
            move |_err| err_hits.lock().unwrap().push("error"),
        );
        call.succeed("done");

        assert_eq!(*hits.lock().unwrap(), vec!["done"]);
    }
}
