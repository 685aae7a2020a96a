//! Explicit-stack directory traversal
//!
//! The engine keeps one frame per open directory. Each call to
//! [`TraversalEngine::next_event`] pulls a single child from the directory on
//! top of the stack, so a walk can be suspended between any two events and
//! resumed later without recursion.

use crate::event::TraversalEvent;
use crate::options::WalkOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};
use treewatch_core::error::{Error, Result};
use treewatch_core::fs::{DirStream, FileSystem};
use treewatch_core::{FileAttributes, FileKey};

/// One open directory on the traversal stack
struct Frame {
    dir: PathBuf,
    key: Option<FileKey>,
    listing: DirStream,
    skipped: bool,
}

/// Single-threaded, resumable walker over a directory tree
pub struct TraversalEngine {
    fs: Arc<dyn FileSystem>,
    options: WalkOptions,
    stack: Vec<Frame>,
    closed: bool,
}

impl TraversalEngine {
    pub fn new(fs: Arc<dyn FileSystem>, options: WalkOptions) -> Self {
        Self {
            fs,
            options,
            stack: Vec::new(),
            closed: false,
        }
    }

    /// Start walking at `root` and return the first event
    ///
    /// The first event is `StartDirectory` when `root` is a directory that
    /// can be opened and lies within the depth limit, otherwise `Entry`.
    /// Starting a walk while directories of an earlier one are still open is
    /// a configuration error.
    pub fn walk(&mut self, root: &Path) -> Result<TraversalEvent> {
        if self.closed {
            return Err(Error::ClosedWalker);
        }
        if let Some(top) = self.stack.last() {
            return Err(Error::config(format!(
                "Cannot start a walk at {} while {} is still open",
                root.display(),
                top.dir.display()
            )));
        }
        debug!("Starting walk at {:?} ({:?})", root, self.options);
        Ok(self.visit(root.to_path_buf(), None))
    }

    /// Produce the next event, or `None` once every directory is exhausted
    pub fn next_event(&mut self) -> Result<Option<TraversalEvent>> {
        if self.closed {
            return Err(Error::ClosedWalker);
        }

        loop {
            let Some(top) = self.stack.last_mut() else {
                return Ok(None);
            };

            let mut listing_error = None;
            let mut entry = None;
            if !top.skipped {
                match top.listing.next() {
                    Some(Ok(child)) => entry = Some(child),
                    Some(Err(e)) => listing_error = Some(e),
                    None => {}
                }
            }

            let Some(entry) = entry else {
                return Ok(self.finish_top(listing_error));
            };

            let event = self.visit(entry.path, entry.attrs);
            if event.is_policy_denied() {
                trace!("Skipping {:?}: access refused by policy", event.path());
                continue;
            }
            return Ok(Some(event));
        }
    }

    /// Stop producing children of the directory on top of the stack
    pub fn skip_remaining_siblings(&mut self) {
        if let Some(top) = self.stack.last_mut() {
            top.skipped = true;
        }
    }

    /// Pop and close the directory on top of the stack without an
    /// `EndDirectory` event
    pub fn pop(&mut self) {
        if let Some(mut frame) = self.stack.pop() {
            debug!("Popped {:?} (depth {})", frame.dir, self.stack.len());
            if let Err(e) = frame.listing.close() {
                trace!("Ignoring close error for {:?}: {}", frame.dir, e);
            }
        }
    }

    /// Close every open directory; later calls are no-ops
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        while !self.stack.is_empty() {
            self.pop();
        }
    }

    pub fn is_open(&self) -> bool {
        !self.closed
    }

    /// Number of directories currently open
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn finish_top(&mut self, listing_error: Option<std::io::Error>) -> Option<TraversalEvent> {
        let mut frame = self.stack.pop()?;
        let mut error = listing_error;
        if let Err(close_error) = frame.listing.close() {
            match error {
                None => error = Some(close_error),
                Some(_) => trace!(
                    "Suppressed close error for {:?}: {}",
                    frame.dir,
                    close_error
                ),
            }
        }
        debug!("Finished {:?} (depth {})", frame.dir, self.stack.len());
        Some(TraversalEvent::EndDirectory {
            path: frame.dir,
            error: error.map(Error::Io),
        })
    }

    fn read_attributes(
        &self,
        path: &Path,
        cached: Option<FileAttributes>,
    ) -> std::io::Result<FileAttributes> {
        let follow = self.options.follow_links;
        if let Some(attrs) = cached {
            if !follow || !attrs.is_symbolic_link() {
                return Ok(attrs);
            }
        }

        match self.fs.read_attributes(path, follow) {
            Ok(attrs) => Ok(attrs),
            // a dangling link is reported as the link itself
            Err(_) if follow => self.fs.read_attributes(path, false),
            Err(e) => Err(e),
        }
    }

    fn would_loop(&self, dir: &Path, key: Option<FileKey>) -> bool {
        self.stack.iter().any(|ancestor| match (key, ancestor.key) {
            (Some(key), Some(ancestor_key)) => key == ancestor_key,
            _ => self
                .fs
                .is_same_file(dir, &ancestor.dir)
                .unwrap_or(false),
        })
    }

    fn visit(&mut self, path: PathBuf, cached: Option<FileAttributes>) -> TraversalEvent {
        let attrs = match self.read_attributes(&path, cached) {
            Ok(attrs) => attrs,
            Err(e) => {
                trace!("Attributes unavailable for {:?}: {}", path, e);
                return TraversalEvent::Entry {
                    path,
                    result: Err(Error::Io(e)),
                };
            }
        };

        let depth = self.stack.len();
        if depth >= self.options.max_depth || !attrs.is_directory() {
            trace!("Entry {:?} at depth {}", path, depth);
            return TraversalEvent::Entry {
                path,
                result: Ok(attrs),
            };
        }

        if self.options.follow_links && self.would_loop(&path, attrs.file_key) {
            debug!("Loop detected at {:?}", path);
            return TraversalEvent::Entry {
                result: Err(Error::FileSystemLoop(path.clone())),
                path,
            };
        }

        let listing = match self.fs.open_dir(&path) {
            Ok(listing) => listing,
            Err(e) => {
                trace!("Cannot open {:?}: {}", path, e);
                return TraversalEvent::Entry {
                    path,
                    result: Err(Error::Io(e)),
                };
            }
        };

        self.stack.push(Frame {
            dir: path.clone(),
            key: attrs.file_key,
            listing,
            skipped: false,
        });
        debug!("Entered {:?} (depth {})", path, self.stack.len());
        TraversalEvent::StartDirectory { path, attrs }
    }
}

impl Drop for TraversalEngine {
    fn drop(&mut self) {
        self.close();
    }
}
