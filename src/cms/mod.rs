//! # Content client
//!
//! Content, navigation and schema collections on top of the realtime
//! [`database`](crate::database). A request goes through four stages:
//!
//! 1. [`path`] turns a collection key, the current environment and the
//!    current locale into a store path;
//! 2. [`compositor`] applies the ordering and filters of [`QueryOptions`] to a
//!    query at that path;
//! 3. the store performs the read or registers the listener;
//! 4. [`projector`] keeps only the requested `fields` of each entry.
//!
//! The stages are chained with [`util::compose`](crate::util::compose).
//!
//! ## Example
//!
//! ```
//! use realtime_cms::cms::{Cms, CmsConfig, QueryOptions};
//! use realtime_cms::database::Database;
//! use serde_json::json;
//!
//! # futures::executor::block_on(async {
//! let cms = Cms::new(CmsConfig::default(), Database::in_memory())?;
//! let content = cms.content();
//! content
//!     .set(("products", "1"), json!({ "title": "Tap", "price": "10.00" }))
//!     .await?;
//!
//! let titles = content
//!     .get("products", &QueryOptions::new().fields(["title"]))
//!     .await?;
//! assert_eq!(titles, json!({ "1": { "title": "Tap" } }));
//! # Ok::<(), realtime_cms::cms::CmsError>(())
//! # }).unwrap();
//! ```

mod api;
pub mod compositor;
mod config;
pub mod error;
pub mod navigation;
mod options;
pub mod path;
pub mod projector;

#[doc(inline)]
pub use api::{
    Cms, CmsEvent, ContentResource, NavigationResource, Resource, SchemaResource, Subscription,
    Target,
};

#[doc(inline)]
pub use config::{CmsConfig, DEFAULT_ENVIRONMENT, DEFAULT_LOCALE};

#[doc(inline)]
pub use error::{CmsError, CmsErrorCode, CmsResult};

#[doc(inline)]
pub use navigation::MenuStructure;

#[doc(inline)]
pub use options::{FilterKey, QueryOptions};

#[doc(inline)]
pub use path::{ResourceKind, ResourcePath};
