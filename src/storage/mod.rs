//! Storage Layer - SQLite-backed persistence
//!
//! System of record is a single SQLite table:
//! - resource(oid, name, parent, content, last_modified)
//!
//! Directories are rows without content. Traversal of the parent links is
//! delegated to a [`Dialect`].

pub mod dialect;
pub mod pool;
pub mod schema;
pub mod sqlite;

pub use dialect::{Dialect, PathMatch, MAX_DEPTH};
pub use pool::{ConnectionPool, PooledConnection, DEFAULT_POOL_SIZE};
pub use sqlite::{ContentWriter, SqlResource, SqlResourceStore, StoreOptions, StoreStats};
