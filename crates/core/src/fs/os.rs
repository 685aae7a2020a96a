//! Host file system backed by `std::fs`

use super::{AttributeAccess, DirStream, DirectoryListing, IdentitySameFile, ListedEntry};
use crate::attributes::{AttributeView, FileAttributes, FileKey, FileKind, ViewAttributes};
#[cfg(not(unix))]
use crate::error::Error;
use crate::error::Result;
use std::fs::{self, Metadata};
use std::io;
use std::path::Path;

/// File system access through the standard library
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl OsFileSystem {
    pub fn new() -> Self {
        Self
    }

    fn metadata(path: &Path, follow_links: bool) -> io::Result<Metadata> {
        if follow_links {
            fs::metadata(path)
        } else {
            fs::symlink_metadata(path)
        }
    }
}

fn file_kind(meta: &Metadata) -> FileKind {
    let ft = meta.file_type();
    if ft.is_symlink() {
        FileKind::SymbolicLink
    } else if ft.is_dir() {
        FileKind::Directory
    } else if ft.is_file() {
        FileKind::RegularFile
    } else {
        FileKind::Other
    }
}

#[cfg(unix)]
fn file_key(meta: &Metadata) -> Option<FileKey> {
    use std::os::unix::fs::MetadataExt;
    Some(FileKey::new(meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn file_key(_meta: &Metadata) -> Option<FileKey> {
    None
}

fn to_attributes(meta: &Metadata) -> io::Result<FileAttributes> {
    let modified = meta.modified()?;
    Ok(FileAttributes {
        size: meta.len(),
        created: meta.created().ok(),
        modified,
        accessed: meta.accessed().unwrap_or(modified),
        file_type: file_kind(meta),
        file_key: file_key(meta),
    })
}

impl AttributeAccess for OsFileSystem {
    fn read_attributes(&self, path: &Path, follow_links: bool) -> io::Result<FileAttributes> {
        let meta = Self::metadata(path, follow_links)?;
        to_attributes(&meta)
    }

    #[cfg(unix)]
    fn read_view(
        &self,
        path: &Path,
        view: AttributeView,
        follow_links: bool,
    ) -> Result<ViewAttributes> {
        use std::os::unix::fs::MetadataExt;

        let meta = Self::metadata(path, follow_links)?;
        Ok(match view {
            AttributeView::Basic => ViewAttributes::Basic(to_attributes(&meta)?),
            AttributeView::Posix => ViewAttributes::Posix {
                basic: to_attributes(&meta)?,
                owner: meta.uid(),
                group: meta.gid(),
                mode: meta.mode() & 0o7777,
            },
            AttributeView::Owner => ViewAttributes::Owner { owner: meta.uid() },
        })
    }

    #[cfg(not(unix))]
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
                "attribute view '{other}' is not available on this platform"
            ))),
        }
    }
}

impl DirectoryListing for OsFileSystem {
    fn open_dir(&self, path: &Path) -> io::Result<DirStream> {
        let read_dir = fs::read_dir(path)?;
        Ok(DirStream::new(
            read_dir.map(|entry| entry.map(|e| ListedEntry::new(e.path()))),
        ))
    }
}

impl IdentitySameFile for OsFileSystem {
    fn is_same_file(&self, a: &Path, b: &Path) -> io::Result<bool> {
        if a == b {
            return Ok(true);
        }
        let key_a = file_key(&fs::metadata(a)?);
        let key_b = file_key(&fs::metadata(b)?);
        match (key_a, key_b) {
            (Some(ka), Some(kb)) => Ok(ka == kb),
            _ => Ok(fs::canonicalize(a)? == fs::canonicalize(b)?),
        }
    }
}
