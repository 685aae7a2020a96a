//! File system collaborators
//!
//! The traversal engine and the polling watcher never touch `std::fs`
//! directly. They consume three narrow interfaces:
//!
//! - [`AttributeAccess`]: metadata and identity key for a path
//! - [`DirectoryListing`]: a lazy, closeable sequence of child entries
//! - [`IdentitySameFile`]: a same-file test for when identity keys are missing
//!
//! [`OsFileSystem`] implements them over the host file system and
//! [`MemoryFileSystem`] over an in-memory tree for deterministic tests.

mod memory;
mod os;

pub use memory::{ListingFault, MemoryFileSystem};
pub use os::OsFileSystem;

use crate::attributes::{AttributeView, FileAttributes, ViewAttributes};
use crate::error::{Error, Result};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Reads file metadata
pub trait AttributeAccess {
    /// Read the basic attributes of `path`
    ///
    /// With `follow_links` false a symbolic link reports its own attributes.
    fn read_attributes(&self, path: &Path, follow_links: bool) -> io::Result<FileAttributes>;

    /// Read attributes through a named view
    ///
    /// Backends only need to override this for views beyond `Basic`.
    fn read_view(
        &self,
        path: &Path,
        view: AttributeView,
        follow_links: bool,
    ) -> Result<ViewAttributes> {
        match view {
            AttributeView::Basic => Ok(ViewAttributes::Basic(
                self.read_attributes(path, follow_links)?,
            )),
            other => Err(Error::not_supported(format!(
                "attribute view '{other}' is not available"
            ))),
        }
    }
}

/// Opens directory listings
pub trait DirectoryListing {
    fn open_dir(&self, path: &Path) -> io::Result<DirStream>;
}

/// Same-file test used when identity keys are unavailable
pub trait IdentitySameFile {
    fn is_same_file(&self, a: &Path, b: &Path) -> io::Result<bool>;
}

/// Everything the core needs from a file system
pub trait FileSystem: AttributeAccess + DirectoryListing + IdentitySameFile + Send + Sync {}

impl<T> FileSystem for T where
    T: AttributeAccess + DirectoryListing + IdentitySameFile + Send + Sync
{
}

/// One child produced by a directory listing
#[derive(Debug, Clone)]
pub struct ListedEntry {
    /// Full path of the child (listing directory joined with the child name)
    pub path: PathBuf,
    /// No-follow attributes gathered while listing, if the backend had them
    pub attrs: Option<FileAttributes>,
}

impl ListedEntry {
    pub fn new(path: PathBuf) -> Self {
        Self { path, attrs: None }
    }

    pub fn with_attrs(path: PathBuf, attrs: FileAttributes) -> Self {
        Self {
            path,
            attrs: Some(attrs),
        }
    }
}

type CloseHook = Box<dyn FnOnce() -> io::Result<()> + Send>;

/// Lazy sequence of directory children
///
/// Iteration failures are yielded as `Err` items. The stream is closed
/// exactly once, either explicitly through [`DirStream::close`] or on drop.
pub struct DirStream {
    entries: Box<dyn Iterator<Item = io::Result<ListedEntry>> + Send>,
    on_close: Option<CloseHook>,
}

impl DirStream {
    pub fn new<I>(entries: I) -> Self
    where
        I: Iterator<Item = io::Result<ListedEntry>> + Send + 'static,
    {
        Self {
            entries: Box::new(entries),
            on_close: None,
        }
    }

    /// Run `hook` when the stream is closed
    pub fn on_close<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() -> io::Result<()> + Send + 'static,
    {
        self.on_close = Some(Box::new(hook));
        self
    }

    /// Close the underlying listing; later calls are no-ops
    pub fn close(&mut self) -> io::Result<()> {
        self.entries = Box::new(std::iter::empty());
        match self.on_close.take() {
            Some(hook) => hook(),
            None => Ok(()),
        }
    }
}

impl Iterator for DirStream {
    type Item = io::Result<ListedEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }
}

impl Drop for DirStream {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::debug!("Error closing directory listing: {e}");
        }
    }
}

impl fmt::Debug for DirStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirStream")
            .field("closed", &self.on_close.is_none())
            .finish_non_exhaustive()
    }
}

/// Marker carried inside a `PermissionDenied` I/O error when access was
/// refused by an access policy rather than by the file system itself
///
/// The traversal engine silently skips children whose attributes are refused
/// this way; ordinary permission errors are reported on the entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyDenied;

impl fmt::Display for PolicyDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("access denied by policy")
    }
}

impl std::error::Error for PolicyDenied {}

impl PolicyDenied {
    pub fn into_io_error(self) -> io::Error {
        io::Error::new(io::ErrorKind::PermissionDenied, self)
    }
}

/// Whether `err` is a policy refusal (see [`PolicyDenied`])
pub fn is_policy_denied(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied
        && err.get_ref().is_some_and(|inner| inner.is::<PolicyDenied>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_dir_stream_closes_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closes);
        let mut stream = DirStream::new(
            vec![Ok(ListedEntry::new(PathBuf::from("/a/b")))].into_iter(),
        )
        .on_close(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(stream.next().is_some());
        stream.close().unwrap();
        stream.close().unwrap();
        assert!(stream.next().is_none());
        drop(stream);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_denied_detection() {
        assert!(is_policy_denied(&PolicyDenied.into_io_error()));
        let plain = io::Error::new(io::ErrorKind::PermissionDenied, "EACCES");
        assert!(!is_policy_denied(&plain));
    }
}
