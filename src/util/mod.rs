pub mod compose;
pub mod errors;

pub use compose::{async_step, compose, sync_step, AsyncStep, Composed, Step, SyncStep};
pub use errors::{ErrorData, ErrorFactory, ErrorMap, TaggedError};
