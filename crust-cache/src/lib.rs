//! Client-resident entity cache for REST backends.
//!
//! Keeps one live [`Entity`] per record identity, loads records lazily and
//! batches concurrent reads into single list requests.
//!
//! # Architecture
//!
//! - **Database**: registered models, one [`Table`] per model and the shared
//!   [`IndexTree`]
//! - **Table**: identity → entity map with observable length, keys and load
//!   state; all server round trips for a model start here
//! - **Fetch coordinator**: per-table debounce window that merges `get` calls
//!   into one batch
//! - **Indexer**: server-computed ordered identity lists, cached for the life
//!   of the database and composable over subsets
//! - **Entity**: property access through the strategy each schema field
//!   resolves to (enums, flags, dates, adapters, relations)
//! - **Transport**: the only I/O seam; [`HttpTransport`] for REST and
//!   [`mock::MockTransport`] for tests
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use crust_cache::{mock::MockTransport, Database};
//! use crust_model::{ModelSchema, Property};
//!
//! let db = Database::new(Arc::new(MockTransport::new()));
//! let user = db.register(
//!     ModelSchema::builder("User", "/api/Users")
//!         .property(Property::integer("id"))
//!         .property(Property::string("name"))
//!         .build()?,
//! )?;
//!
//! let ada = db.create(&user);
//! assert!(ada.set("name", "Ada"));
//! assert_eq!(ada.get("name"), Some("Ada".into()));
//! assert!(ada.is_modified());
//! # Ok::<(), crust_cache::CacheError>(())
//! ```

mod collection;
mod config;
mod coordinator;
mod database;
mod entity;
mod error;
mod http;
mod indexer;
mod observe;
mod table;
mod transport;

pub use collection::{Collection, Member};
pub use config::{CacheConfig, HttpConfig};
pub use coordinator::{Batch, FetchCoordinator, Phase};
pub use database::Database;
pub use entity::{Entity, Lifecycle};
pub use error::{
    CacheError, CacheResult, FetchError, TransportError, TransportErrorKind, TransportResult,
};
pub use http::HttpTransport;
pub use indexer::{Direction, IndexKind, IndexTree, Indexer};
pub use observe::Observable;
pub use table::{Target, Table};
pub use transport::{mock, Transport};
