//! Normalizing entity store with change propagation.
//!
//! Nested raw records are flattened into collections of typed entities
//! keyed by `(type, id)`. Nested objects become references between
//! records, each record tracks the records that reference it, and
//! observers subscribe to a collection, a record, or a single field.
//!
//! # Components
//!
//! - [`Store`]: the root, with load, update, subscribe and reads
//! - [`Scope`] / [`Subscription`]: what a callback listens to, and the
//!   handle used to cancel it
//! - [`Notification`]: what a callback receives
//! - [`RecordHandle`] / [`RecordView`] / [`FieldValue`]: normalized records
//! - [`StoreConfig`] / [`EvictionPolicy`]: raw format and eviction
//!
//! # Design Rules
//!
//! 1. Records are owned by the store's arena; every edge is a handle.
//! 2. A record's `parents` lists exactly the records referencing it.
//! 3. Mutations queue notifications and deliver them after the graph is
//!    released, so callbacks may re-enter the store.
//! 4. Subscribing always fires the callback once immediately.
//! 5. Change bubbling reaches direct parents only.
//! 6. Unknown targets fail `subscribe` but only log on `update`.

pub mod config;
pub mod error;
pub mod record;
pub mod store;
pub mod subscription;

mod collection;
mod eviction;
mod graph;
mod loader;
mod merge;

pub use config::{EvictionPolicy, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use record::{FieldValue, RecordHandle, RecordView};
pub use store::Store;
pub use subscription::{Callback, Notification, Scope, Source, Subscription};
pub use symstore_types::{EntityId, RawFormat, Scalar, TypeName};
