//! Settings cache primitives.
//!
//! Resolution caches are layered but share one building block:
//!
//! - **Request slots**: one memo per request, keyed by the type's cache
//!   attribute name (`_namespace.typename`).
//! - **Render-context partitions**: one memo per render context, keyed by
//!   scope partition (site, request or deployment) and natural key.
//! - **Instance page URLs**: one memo per resolved instance, keyed by field.
//!
//! Each is a [`MemoMap`], which guarantees at most one fetch per key for the
//! lifetime of the map and never stores a failed fetch.

mod lock;
mod memo;
pub mod metrics;

pub(crate) use lock::{rw_read, rw_write};
pub use memo::MemoMap;
