//! Entity access services: callbacks, dedup queue, handler registry, facade.

pub mod callbacks;
pub mod context;
pub mod error;
pub mod facade;
pub mod queue;
pub mod registry;

pub use callbacks::{CallOptions, ErrorCallback, SuccessCallback, oneshot_callbacks};
pub use context::{DEFAULT_LANGUAGE, EntityContext};
pub use facade::{
    CallerHints, DeleteOptions, EntityFacade, IndexOptions, LoadOptions, SaveOptions,
    WriteOptions,
};
pub use queue::{Admission, QueueKey, QueuedCallback, RequestQueue};
pub use registry::{EntityHandler, HandlerRegistry};
