#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

//! Depth-bounded, cycle-safe directory tree traversal
//!
//! This crate provides three layers over the same engine:
//!
//! - [`TraversalEngine`]: an explicit-stack walker producing
//!   [`TraversalEvent`]s one at a time
//! - [`TraversalIterator`]: a lazy sequence of paths with their attributes
//! - [`walk_file_tree`]: a driver that calls a [`FileVisitor`] and honours
//!   its skip/terminate decisions
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use treewatch_core::OsFileSystem;
//! use treewatch_walker::{find, WalkOptions};
//!
//! # fn example() -> treewatch_core::Result<()> {
//! let options = WalkOptions::new().max_depth(3).follow_links(true);
//! let sources = find(Arc::new(OsFileSystem), Path::new("."), options, |path, attrs| {
//!     attrs.is_regular_file() && path.extension().is_some_and(|e| e == "rs")
//! })?;
//! for path in sources {
//!     println!("{}", path?.display());
//! }
//! # Ok(())
//! # }
//! ```

mod engine;
mod event;
mod iter;
mod options;
mod visitor;

pub use engine::TraversalEngine;
pub use event::{EventType, TraversalEvent};
pub use iter::{find, walk, TraversalIterator, WalkEntry};
pub use options::WalkOptions;
pub use visitor::{walk_file_tree, FileVisitor, VisitResult};
