#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

//! Polling directory watches
//!
//! This crate watches directories by re-listing them on a timer:
//! - Per-directory watch keys with coalesced, bounded event queues
//! - A registry that hands signalled keys to consumers in FIFO order
//! - Pluggable timers, tokio-backed or driven by a virtual clock in tests
//!
//! # Example
//!
//! ```no_run
//! use treewatch_watcher::{EventKind, PollingConfig, WatchRegistry};
//!
//! # async fn example() -> treewatch_core::Result<()> {
//! let registry = WatchRegistry::with_tokio(PollingConfig::default())?;
//! registry.register(
//!     "/path/to/project",
//!     &[EventKind::Create, EventKind::Modify, EventKind::Delete],
//!     &[],
//! )?;
//!
//! loop {
//!     let key = registry.take().await?;
//!     if key.is_close_sentinel() {
//!         break;
//!     }
//!     for event in key.poll_events() {
//!         println!("{}: {}", key.watchable().display(), event);
//!     }
//!     if !key.reset() {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod event;
mod key;
mod polling;
mod registry;
mod scheduler;

pub use event::{EventKind, EventSet, WatchEvent, WatchModifier};
pub use key::{KeyState, WatchKey};
pub use polling::PollingConfig;
pub use registry::WatchRegistry;
pub use scheduler::{ManualScheduler, ScheduledTask, Scheduler, TimerHandle, TokioScheduler};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::event::{EventKind, WatchEvent};
    pub use crate::key::WatchKey;
    pub use crate::registry::WatchRegistry;
}
