//! # Realtime store client
//!
//! The hierarchical, path-addressed key-value store that the [`cms`](crate::cms)
//! layer reads from and writes to. It exposes the Realtime Database surface the
//! content layer relies on:
//!
//! - [`DatabaseReference`] locations with `set`, `update`, `remove` and
//!   `transaction`
//! - immutable [`DatabaseQuery`] builders (`order_by_child`, `order_by_key`,
//!   `order_by_value`, `limit_to_first`, `limit_to_last`, `start_at`, `end_at`,
//!   `equal_to`)
//! - one-shot reads returning a [`DataSnapshot`]
//! - typed listeners ([`EventKind`]) returning a [`ListenerRegistration`] handle
//!
//! Two backends ship with the crate: an in-memory tree that evaluates queries
//! locally, and a REST backend for an emulator or a hosted database. Custom
//! storage can be plugged in through [`DatabaseBackend`].
//!
//! ## Example
//!
//! ```
//! use realtime_cms::database::{Database, EventKind};
//! use serde_json::json;
//!
//! # futures::executor::block_on(async {
//! let database = Database::in_memory();
//! let scores = database.reference("scores")?;
//! scores.set(json!({ "a": { "score": 10 }, "b": { "score": 20 } })).await?;
//!
//! let best = scores
//!     .query()
//!     .order_by_child("score")?
//!     .limit_to_last(1)?
//!     .get()
//!     .await?;
//! assert_eq!(best.value(), &json!({ "b": { "score": 20 } }));
//!
//! let registration = scores
//!     .on(EventKind::ChildAdded, |event| {
//!         if let Ok(event) = event {
//!             println!("child added: {:?}", event.snapshot.key());
//!         }
//!     })
//!     .await?;
//! registration.detach();
//! # Ok::<(), realtime_cms::database::error::DatabaseError>(())
//! # }).unwrap();
//! ```

mod api;
mod backend;
pub mod error;
mod query;

#[doc(inline)]
pub use api::{
    DataSnapshot, Database, DatabaseEvent, DatabaseQuery, DatabaseReference, EventKind,
    ListenerRegistration, TransactionResult,
};

#[doc(inline)]
pub use backend::{DatabaseBackend, TransactionOutcome, TransactionUpdate};

#[doc(inline)]
pub use error::{DatabaseError, DatabaseErrorCode, DatabaseResult};

#[doc(inline)]
pub use query::QueryParams;
