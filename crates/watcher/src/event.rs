//! Watch event types
//!
//! Events are delivered per watch key. The context of an event is the name of
//! the changed entry relative to the watched directory; overflow events carry
//! no context.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use strum::{Display, EnumString};
use treewatch_core::error::{Error, Result};

/// Kind of change reported for a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EventKind {
    Create,
    Modify,
    Delete,
    /// Events were lost because the key's queue was full
    Overflow,
}

impl EventKind {
    /// Parse a kind name, rejecting unknown names as not supported
    pub fn parse(name: &str) -> Result<Self> {
        Self::from_str(name.trim())
            .map_err(|_| Error::not_supported(format!("Unknown event kind '{name}'")))
    }
}

/// A single pending change on a watch key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    kind: EventKind,
    context: Option<PathBuf>,
    count: u32,
}

impl WatchEvent {
    pub(crate) fn new(kind: EventKind, context: Option<PathBuf>) -> Self {
        Self {
            kind,
            context,
            count: 1,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Entry name relative to the watched directory, `None` for overflow
    pub fn context(&self) -> Option<&Path> {
        self.context.as_deref()
    }

    /// How many times this event was signalled, at least 1
    pub fn count(&self) -> u32 {
        self.count
    }

    pub(crate) fn increment(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    pub(crate) fn matches(&self, kind: EventKind, context: Option<&Path>) -> bool {
        self.kind == kind && self.context.as_deref() == context
    }
}

impl fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "{}({}) x{}", self.kind, context.display(), self.count),
            None => write!(f, "{} x{}", self.kind, self.count),
        }
    }
}

/// Registration modifiers
///
/// None are supported by the polling watcher; registering with any of them
/// fails with [`Error::NotSupported`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchModifier {
    /// Watch the whole tree below the directory
    FileTree,
    /// Requested polling sensitivity
    Sensitivity(Duration),
}

/// The event kinds a key is subscribed to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventSet {
    create: bool,
    modify: bool,
    delete: bool,
}

impl EventSet {
    /// Build a subscription from requested kinds
    ///
    /// `Overflow` is always delivered and is accepted but ignored here. A set
    /// with no create, modify or delete kind is a configuration error.
    pub fn from_kinds(kinds: &[EventKind]) -> Result<Self> {
        let mut set = Self::default();
        for kind in kinds {
            match kind {
                EventKind::Create => set.create = true,
                EventKind::Modify => set.modify = true,
                EventKind::Delete => set.delete = true,
                EventKind::Overflow => {}
            }
        }
        if set.is_empty() {
            return Err(Error::config("No events to register"));
        }
        Ok(set)
    }

    /// Create, modify and delete
    pub fn all() -> Self {
        Self {
            create: true,
            modify: true,
            delete: true,
        }
    }

    /// Parse event kind names such as those in `watcher.events`
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let kinds = names
            .iter()
            .map(|name| EventKind::parse(name.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::from_kinds(&kinds)
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::Create => self.create,
            EventKind::Modify => self.modify,
            EventKind::Delete => self.delete,
            EventKind::Overflow => true,
        }
    }

    fn is_empty(&self) -> bool {
        !(self.create || self.modify || self.delete)
    }
}
