//! Subscriber cache over a wide-column store.
//!
//! [`store::ColumnStore`] is the seam to the backing store: rows of named
//! columns, writes carrying client-supplied microsecond timestamps and an
//! optional TTL. [`cache::SubscriberCache`] layers the typed subscriber
//! operations on top. [`memory::MemoryStore`] is the in-process backend used
//! by tests and HSS-less deployments.

pub mod cache;
pub mod error;
pub mod memory;
pub mod store;

pub use cache::{SubscriberCache, SubscriptionRecord};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use store::{generate_timestamp, Column, ColumnStore};
