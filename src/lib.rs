//! # resource-store - Hierarchical resources persisted in SQLite
//!
//! A filesystem-like tree of named resources (directories and leaves with
//! byte content) kept in a single relational table.
//!
//! resource-store provides:
//! - Path utilities for slash-separated resource paths
//! - A lazy, path-keyed [`Resource`] handle contract
//! - [`SqlResourceStore`], backed by a pooled SQLite database with two
//!   traversal dialects (iterative walk and recursive CTE)
//! - [`FileSystemResourceStore`], the same contract over a local directory
//! - [`SimpleResourceCache`], which materializes resources as local files

pub mod paths;
pub mod resource;
pub mod resources;
pub mod storage;
pub mod cache;
pub mod fs;
pub mod config;
pub mod ignore;
pub mod ui;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use resource::{Resource, ResourceStore, ResourceType};
pub use storage::{Dialect, SqlResource, SqlResourceStore, StoreOptions};
pub use cache::{ResourceCache, SimpleResourceCache};
pub use fs::{FileSystemResource, FileSystemResourceStore};
pub use config::StoreConfig;

/// Result type alias for resource store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for resource store operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cannot construct resource store: {0}")]
    Construction(String),

    #[error("Storage consistency error: {0}")]
    StorageConsistency(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Not a resource: {0}")]
    NotAResource(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid move: {0}")]
    InvalidMove(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
