//! File metadata snapshots
//!
//! This module defines the immutable attribute types handed out by an
//! [`AttributeAccess`](crate::fs::AttributeAccess) implementation, along with
//! the closed set of attribute views a backend may offer.

use crate::error::{Error, Result};
use std::str::FromStr;
use std::time::SystemTime;
use strum::{Display, EnumString};

/// Opaque identity of an underlying file
///
/// Two paths with equal keys refer to the same file (hard links, or the same
/// directory reached through a symbolic link). Keys are only meaningful when
/// compared against keys produced by the same file system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileKey {
    device: u64,
    inode: u64,
}

impl FileKey {
    pub fn new(device: u64, inode: u64) -> Self {
        Self { device, inode }
    }
}

/// Type of a file as seen by the attribute read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Directory,
    RegularFile,
    SymbolicLink,
    Other,
}

/// Basic metadata for one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttributes {
    /// Size in bytes
    pub size: u64,
    /// Creation time, when the platform records one
    pub created: Option<SystemTime>,
    /// Last modification time
    pub modified: SystemTime,
    /// Last access time
    pub accessed: SystemTime,
    /// File type
    pub file_type: FileKind,
    /// Identity key, when the platform supplies one
    pub file_key: Option<FileKey>,
}

impl FileAttributes {
    pub fn is_directory(&self) -> bool {
        self.file_type == FileKind::Directory
    }

    pub fn is_regular_file(&self) -> bool {
        self.file_type == FileKind::RegularFile
    }

    pub fn is_symbolic_link(&self) -> bool {
        self.file_type == FileKind::SymbolicLink
    }

    pub fn is_other(&self) -> bool {
        self.file_type == FileKind::Other
    }
}

/// Attribute views a backend may support
///
/// Names parse case-insensitively (`"basic"`, `"posix"`, `"owner"`); see
/// [`AttributeView::parse`] for the error returned on unknown names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AttributeView {
    Basic,
    Posix,
    Owner,
}

impl AttributeView {
    /// Parse a view name, rejecting unknown names as a configuration error
    pub fn parse(name: &str) -> Result<Self> {
        Self::from_str(name)
            .map_err(|_| Error::config(format!("Unknown attribute view '{name}'")))
    }
}

/// Attributes read through a specific view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewAttributes {
    Basic(FileAttributes),
    Posix {
        basic: FileAttributes,
        owner: u32,
        group: u32,
        mode: u32,
    },
    Owner {
        owner: u32,
    },
}

impl ViewAttributes {
    /// Which view produced these attributes
    pub fn view(&self) -> AttributeView {
        match self {
            Self::Basic(_) => AttributeView::Basic,
            Self::Posix { .. } => AttributeView::Posix,
            Self::Owner { .. } => AttributeView::Owner,
        }
    }
}
