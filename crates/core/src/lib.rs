//! Core types for the treewatch traversal and watch engines
//!
//! This crate provides the foundational abstractions shared by the walker and
//! watcher crates:
//!
//! - **Attributes**: file metadata snapshots and identity keys
//! - **File system**: the collaborator traits the engines consume, with a
//!   host-backed and an in-memory implementation
//! - **Configuration**: walk and watch settings loaded from TOML/environment
//! - **Error handling**: unified error types
//!

pub mod attributes;
pub mod config;
pub mod error;
pub mod fs;

// Re-export main types for convenience
pub use attributes::{AttributeView, FileAttributes, FileKey, FileKind, ViewAttributes};
pub use config::{Config, WalkerConfig, WatcherConfig};
pub use error::{Error, Result, ResultExt};
pub use fs::{
    AttributeAccess, DirStream, DirectoryListing, FileSystem, IdentitySameFile, ListedEntry,
    MemoryFileSystem, OsFileSystem,
};

/// Version of the core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::attributes::FileAttributes;
    pub use crate::config::Config;
    pub use crate::error::{Result, ResultExt};
    pub use crate::fs::FileSystem;
}
