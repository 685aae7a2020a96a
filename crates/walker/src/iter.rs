//! Pull-style iteration over a directory tree

use crate::engine::TraversalEngine;
use crate::event::TraversalEvent;
use crate::options::WalkOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use treewatch_core::error::{Error, Result};
use treewatch_core::fs::FileSystem;
use treewatch_core::FileAttributes;

/// A path produced by a walk together with its attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub attrs: FileAttributes,
}

/// Lazy, single-pass sequence of the paths below (and including) a start
/// path
///
/// Directories appear before their contents. `EndDirectory` events are not
/// exposed. An error on any later path is yielded as an `Err` item and
/// iteration continues with the next path. Once closed, every call reports
/// [`Error::ClosedWalker`].
pub struct TraversalIterator {
    engine: TraversalEngine,
    next: Option<WalkEntry>,
}

impl TraversalIterator {
    /// Open a walk at `start`
    ///
    /// Fails if `start` itself cannot be accessed.
    pub fn new(fs: Arc<dyn FileSystem>, start: &Path, options: WalkOptions) -> Result<Self> {
        let mut engine = TraversalEngine::new(fs, options);
        let first = match engine.walk(start)? {
            TraversalEvent::StartDirectory { path, attrs }
            | TraversalEvent::Entry {
                path,
                result: Ok(attrs),
            } => WalkEntry { path, attrs },
            TraversalEvent::Entry { result: Err(e), .. } => return Err(e),
            TraversalEvent::EndDirectory { path, .. } => {
                return Err(Error::config(format!(
                    "walk of {} began with end of directory",
                    path.display()
                )))
            }
        };
        Ok(Self {
            engine,
            next: Some(first),
        })
    }

    /// Whether another path is available
    pub fn has_next(&mut self) -> Result<bool> {
        self.check_open()?;
        self.fetch_next_if_needed()?;
        Ok(self.next.is_some())
    }

    /// Take the next path, `Ok(None)` at the end of the walk
    pub fn next_entry(&mut self) -> Result<Option<WalkEntry>> {
        self.check_open()?;
        self.fetch_next_if_needed()?;
        Ok(self.next.take())
    }

    /// Close the walk and release every open listing
    pub fn close(&mut self) {
        self.engine.close();
        self.next = None;
    }

    /// Map the walk to bare paths
    pub fn paths(self) -> impl Iterator<Item = Result<PathBuf>> {
        self.map(|entry| entry.map(|e| e.path))
    }

    /// Lazily keep only paths matching `predicate`
    ///
    /// The predicate runs once per path as the sequence is consumed.
    pub fn find<P>(self, mut predicate: P) -> impl Iterator<Item = Result<PathBuf>>
    where
        P: FnMut(&Path, &FileAttributes) -> bool,
    {
        self.filter_map(move |entry| match entry {
            Ok(e) => predicate(&e.path, &e.attrs).then_some(Ok(e.path)),
            Err(e) => Some(Err(e)),
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.engine.is_open() {
            Ok(())
        } else {
            Err(Error::ClosedWalker)
        }
    }

    fn fetch_next_if_needed(&mut self) -> Result<()> {
        if self.next.is_some() {
            return Ok(());
        }
        while let Some(event) = self.engine.next_event()? {
            match event {
                TraversalEvent::EndDirectory { error: None, .. } => continue,
                TraversalEvent::EndDirectory { error: Some(e), .. }
                | TraversalEvent::Entry { result: Err(e), .. } => return Err(e),
                TraversalEvent::StartDirectory { path, attrs }
                | TraversalEvent::Entry {
                    path,
                    result: Ok(attrs),
                } => {
                    self.next = Some(WalkEntry { path, attrs });
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

impl Iterator for TraversalIterator {
    type Item = Result<WalkEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

/// Walk `start` and return every path below it
pub fn walk(
    fs: Arc<dyn FileSystem>,
    start: &Path,
    options: WalkOptions,
) -> Result<impl Iterator<Item = Result<PathBuf>>> {
    Ok(TraversalIterator::new(fs, start, options)?.paths())
}

/// Walk `start` and return the paths accepted by `predicate`
pub fn find<P>(
    fs: Arc<dyn FileSystem>,
    start: &Path,
    options: WalkOptions,
    predicate: P,
) -> Result<impl Iterator<Item = Result<PathBuf>>>
where
    P: FnMut(&Path, &FileAttributes) -> bool,
{
    Ok(TraversalIterator::new(fs, start, options)?.find(predicate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use treewatch_core::fs::ListingFault;
    use treewatch_core::MemoryFileSystem;

    fn tree() -> Arc<MemoryFileSystem> {
        let fs = MemoryFileSystem::new();
        fs.create_dir_all("/w/src").unwrap();
        fs.write_file("/w/src/lib.rs", 10).unwrap();
        fs.write_file("/w/src/main.rs", 20).unwrap();
        fs.write_file("/w/README", 5).unwrap();
        Arc::new(fs)
    }

    #[test]
    fn test_paths_in_walk_order() {
        let fs = tree();
        let paths: Vec<PathBuf> = walk(fs, Path::new("/w"), WalkOptions::default())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/w"),
                PathBuf::from("/w/README"),
                PathBuf::from("/w/src"),
                PathBuf::from("/w/src/lib.rs"),
                PathBuf::from("/w/src/main.rs"),
            ]
        );
    }

    #[test]
    fn test_find_filters_lazily() {
        let fs = tree();
        let mut calls = 0;
        let mut found = find(fs, Path::new("/w"), WalkOptions::default(), |path, attrs| {
            calls += 1;
            attrs.is_regular_file() && path.extension().is_some_and(|e| e == "rs")
        })
        .unwrap();

        let first = found.next().unwrap().unwrap();
        assert_eq!(first, PathBuf::from("/w/src/lib.rs"));
        let second = found.next().unwrap().unwrap();
        assert_eq!(second, PathBuf::from("/w/src/main.rs"));
        assert!(found.next().is_none());
        drop(found);
        assert_eq!(calls, 5);
    }

    #[test]
    fn test_start_failure_reported_at_construction() {
        let fs = tree();
        let result = TraversalIterator::new(fs, Path::new("/missing"), WalkOptions::default());
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_errors_do_not_end_iteration() {
        let fs = tree();
        fs.fail_listing("/w/src", Some(ListingFault::Open)).unwrap();
        let items: Vec<_> = TraversalIterator::new(fs, Path::new("/w"), WalkOptions::default())
            .unwrap()
            .collect();
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert!(items[1].is_ok());
        assert!(items[2].is_err());
    }

    #[test]
    fn test_has_next_and_close() {
        let fs = tree();
        let mut iter = TraversalIterator::new(fs.clone(), Path::new("/w"), WalkOptions::default())
            .unwrap();
        assert!(iter.has_next().unwrap());
        assert!(iter.has_next().unwrap());
        assert_eq!(iter.next_entry().unwrap().unwrap().path, PathBuf::from("/w"));

        iter.close();
        assert!(matches!(iter.has_next(), Err(Error::ClosedWalker)));
        assert!(matches!(iter.next_entry(), Err(Error::ClosedWalker)));
        assert_eq!(fs.open_listings(), 0);
    }

    #[test]
    fn test_exhausted_iterator_stays_exhausted() {
        let fs = tree();
        let mut iter =
            TraversalIterator::new(fs, Path::new("/w/README"), WalkOptions::default()).unwrap();
        assert!(iter.next().is_some());
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }
}
