//! Traversal event types

use std::path::{Path, PathBuf};
use treewatch_core::error::{Error, Result};
use treewatch_core::fs::is_policy_denied;
use treewatch_core::FileAttributes;

/// Discriminant of a [`TraversalEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    StartDirectory,
    EndDirectory,
    Entry,
}

/// One step of a directory tree traversal
#[derive(Debug)]
pub enum TraversalEvent {
    /// A directory was opened and its children follow
    StartDirectory { path: PathBuf, attrs: FileAttributes },
    /// All children of a directory have been produced (or its listing failed)
    EndDirectory { path: PathBuf, error: Option<Error> },
    /// A path that is not descended into: a file, a directory at the depth
    /// limit, or a path whose attributes or listing could not be read
    Entry {
        path: PathBuf,
        result: Result<FileAttributes>,
    },
}

impl TraversalEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::StartDirectory { .. } => EventType::StartDirectory,
            Self::EndDirectory { .. } => EventType::EndDirectory,
            Self::Entry { .. } => EventType::Entry,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::StartDirectory { path, .. }
            | Self::EndDirectory { path, .. }
            | Self::Entry { path, .. } => path,
        }
    }

    pub fn attributes(&self) -> Option<&FileAttributes> {
        match self {
            Self::StartDirectory { attrs, .. } => Some(attrs),
            Self::Entry {
                result: Ok(attrs), ..
            } => Some(attrs),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            Self::EndDirectory { error, .. } => error.as_ref(),
            Self::Entry { result: Err(e), .. } => Some(e),
            _ => None,
        }
    }

    /// Whether this entry failed because an access policy refused it
    pub(crate) fn is_policy_denied(&self) -> bool {
        matches!(
            self,
            Self::Entry {
                result: Err(Error::Io(e)),
                ..
            } if is_policy_denied(e)
        )
    }
}
