//! In-memory file system for tests
//!
//! Paths are absolute and resolved against a single root. Symbolic links,
//! hard links, modification times and failures are all under the caller's
//! control, so traversal and scan behaviour can be reproduced exactly.

use super::{
    AttributeAccess, DirStream, DirectoryListing, IdentitySameFile, ListedEntry, PolicyDenied,
};
use crate::attributes::{FileAttributes, FileKey, FileKind};
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

const ROOT: u64 = 1;
const DEVICE: u64 = 0x4d45_4d46;
const MAX_LINK_HOPS: usize = 40;

/// Failure injected into a directory listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingFault {
    /// Opening the listing fails
    Open,
    /// The listing yields this many entries, then fails
    AfterEntries(usize),
}

#[derive(Debug)]
enum NodeKind {
    Dir(BTreeMap<OsString, u64>),
    File { size: u64 },
    Symlink(PathBuf),
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    modified: SystemTime,
    created: SystemTime,
    policy_denied: bool,
    attr_fault: bool,
    listing_fault: Option<ListingFault>,
}

#[derive(Debug)]
struct State {
    nodes: HashMap<u64, Node>,
    next_id: u64,
    clock: SystemTime,
    open_listings: usize,
    identity_keys: bool,
}

/// File system held entirely in memory
#[derive(Debug, Clone)]
pub struct MemoryFileSystem {
    state: Arc<Mutex<State>>,
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{}: no such file or directory", path.display()),
    )
}

fn not_a_directory(path: &Path) -> io::Error {
    io::Error::other(format!("{}: not a directory", path.display()))
}

impl State {
    fn node(&self, id: u64) -> io::Result<&Node> {
        self.nodes
            .get(&id)
            .ok_or_else(|| io::Error::other(format!("dangling node {id}")))
    }

    fn tick(&mut self) -> SystemTime {
        self.clock += Duration::from_secs(1);
        self.clock
    }

    fn alloc(&mut self, kind: NodeKind) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let now = self.tick();
        self.nodes.insert(
            id,
            Node {
                kind,
                modified: now,
                created: now,
                policy_denied: false,
                attr_fault: false,
                listing_fault: None,
            },
        );
        id
    }

    /// Resolve `path` to a node id, following links in every component and,
    /// when `follow_last` is set, in the final one too
    fn resolve(&self, path: &Path, follow_last: bool) -> io::Result<u64> {
        let mut stack = vec![ROOT];
        let mut hops = 0;
        self.walk(&mut stack, path, path, follow_last, &mut hops)?;
        Ok(*stack.last().unwrap_or(&ROOT))
    }

    fn walk(
        &self,
        stack: &mut Vec<u64>,
        path: &Path,
        original: &Path,
        follow_last: bool,
        hops: &mut usize,
    ) -> io::Result<()> {
        let components: Vec<Component<'_>> = path.components().collect();
        let count = components.len();
        for (i, component) in components.into_iter().enumerate() {
            let last = i + 1 == count;
            match component {
                Component::Prefix(_) | Component::RootDir => stack.truncate(1),
                Component::CurDir => {}
                Component::ParentDir => {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                }
                Component::Normal(name) => {
                    let current = *stack.last().unwrap_or(&ROOT);
                    let children = match &self.node(current)?.kind {
                        NodeKind::Dir(children) => children,
                        _ => return Err(not_a_directory(original)),
                    };
                    let child = *children.get(name).ok_or_else(|| not_found(original))?;
                    match &self.node(child)?.kind {
                        NodeKind::Symlink(target) if !last || follow_last => {
                            *hops += 1;
                            if *hops > MAX_LINK_HOPS {
                                return Err(io::Error::other(format!(
                                    "{}: too many levels of symbolic links",
                                    original.display()
                                )));
                            }
                            let target = target.clone();
                            self.walk(stack, &target, original, true, hops)?;
                        }
                        _ => stack.push(child),
                    }
                }
            }
        }
        Ok(())
    }

    fn parent_and_name(&self, path: &Path) -> io::Result<(u64, OsString)> {
        let name = path
            .file_name()
            .ok_or_else(|| io::Error::other(format!("{}: no file name", path.display())))?;
        let parent = path.parent().unwrap_or(Path::new("/"));
        let parent_id = self.resolve(parent, true)?;
        match self.node(parent_id)?.kind {
            NodeKind::Dir(_) => Ok((parent_id, name.to_owned())),
            _ => Err(not_a_directory(parent)),
        }
    }

    fn link_child(&mut self, parent: u64, name: OsString, child: u64) -> io::Result<()> {
        let now = self.tick();
        let node = self
            .nodes
            .get_mut(&parent)
            .ok_or_else(|| io::Error::other("dangling parent"))?;
        if let NodeKind::Dir(children) = &mut node.kind {
            children.insert(name, child);
            node.modified = now;
        }
        Ok(())
    }

    fn attributes(&self, id: u64) -> io::Result<FileAttributes> {
        let node = self.node(id)?;
        let (size, file_type) = match &node.kind {
            NodeKind::Dir(children) => (children.len() as u64, FileKind::Directory),
            NodeKind::File { size } => (*size, FileKind::RegularFile),
            NodeKind::Symlink(target) => (
                target.as_os_str().len() as u64,
                FileKind::SymbolicLink,
            ),
        };
        Ok(FileAttributes {
            size,
            created: Some(node.created),
            modified: node.modified,
            accessed: node.modified,
            file_type,
            file_key: self.identity_keys.then(|| FileKey::new(DEVICE, id)),
        })
    }

    fn check_access(&self, id: u64, path: &Path) -> io::Result<()> {
        let node = self.node(id)?;
        if node.policy_denied {
            return Err(PolicyDenied.into_io_error());
        }
        if node.attr_fault {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{}: permission denied", path.display()),
            ));
        }
        Ok(())
    }
}

impl MemoryFileSystem {
    /// Create a file system containing only the root directory `/`
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        let clock = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        nodes.insert(
            ROOT,
            Node {
                kind: NodeKind::Dir(BTreeMap::new()),
                modified: clock,
                created: clock,
                policy_denied: false,
                attr_fault: false,
                listing_fault: None,
            },
        );
        Self {
            state: Arc::new(Mutex::new(State {
                nodes,
                next_id: ROOT + 1,
                clock,
                open_listings: 0,
                identity_keys: true,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a directory and any missing parents
    pub fn create_dir_all(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref();
        let mut state = self.lock();
        let mut current = PathBuf::from("/");
        for component in path.components() {
            if let Component::Normal(name) = component {
                current.push(name);
                match state.resolve(&current, true) {
                    Ok(id) => {
                        if !matches!(state.node(id)?.kind, NodeKind::Dir(_)) {
                            return Err(not_a_directory(&current));
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        let (parent, name) = state.parent_and_name(&current)?;
                        let id = state.alloc(NodeKind::Dir(BTreeMap::new()));
                        state.link_child(parent, name, id)?;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }

    /// Create or overwrite a regular file, bumping its modification time
    pub fn write_file(&self, path: impl AsRef<Path>, size: u64) -> io::Result<()> {
        let path = path.as_ref();
        let mut state = self.lock();
        match state.resolve(path, true) {
            Ok(id) => {
                let now = state.tick();
                let node = state
                    .nodes
                    .get_mut(&id)
                    .ok_or_else(|| not_found(path))?;
                match &mut node.kind {
                    NodeKind::File { size: current } => *current = size,
                    _ => return Err(io::Error::other(format!("{}: not a file", path.display()))),
                }
                node.modified = now;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let (parent, name) = state.parent_and_name(path)?;
                let id = state.alloc(NodeKind::File { size });
                state.link_child(parent, name, id)
            }
            Err(e) => Err(e),
        }
    }

    /// Create a symbolic link at `link` pointing to `target`
    pub fn symlink(&self, target: impl AsRef<Path>, link: impl AsRef<Path>) -> io::Result<()> {
        let mut state = self.lock();
        let (parent, name) = state.parent_and_name(link.as_ref())?;
        let id = state.alloc(NodeKind::Symlink(target.as_ref().to_path_buf()));
        state.link_child(parent, name, id)
    }

    /// Add a second name for an existing file
    pub fn hard_link(&self, existing: impl AsRef<Path>, link: impl AsRef<Path>) -> io::Result<()> {
        let mut state = self.lock();
        let id = state.resolve(existing.as_ref(), false)?;
        let (parent, name) = state.parent_and_name(link.as_ref())?;
        state.link_child(parent, name, id)
    }

    /// Remove a name from its parent directory
    pub fn remove(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref();
        let mut state = self.lock();
        let (parent, name) = state.parent_and_name(path)?;
        let now = state.tick();
        let node = state
            .nodes
            .get_mut(&parent)
            .ok_or_else(|| not_found(path))?;
        if let NodeKind::Dir(children) = &mut node.kind {
            children.remove(&name).ok_or_else(|| not_found(path))?;
            node.modified = now;
        }
        Ok(())
    }

    /// Set the modification time of `path` (links are not followed)
    pub fn set_modified(&self, path: impl AsRef<Path>, time: SystemTime) -> io::Result<()> {
        self.update(path.as_ref(), |node| node.modified = time)
    }

    /// Refuse access to `path` by policy (see [`PolicyDenied`])
    pub fn deny_by_policy(&self, path: impl AsRef<Path>) -> io::Result<()> {
        self.update(path.as_ref(), |node| node.policy_denied = true)
    }

    /// Make attribute reads of `path` fail with a permission error
    pub fn fail_attributes(&self, path: impl AsRef<Path>, fail: bool) -> io::Result<()> {
        self.update(path.as_ref(), |node| node.attr_fault = fail)
    }

    /// Inject a failure into listings of the directory at `path`
    pub fn fail_listing(&self, path: impl AsRef<Path>, fault: Option<ListingFault>) -> io::Result<()> {
        self.update(path.as_ref(), |node| node.listing_fault = fault)
    }

    /// Report no identity keys in attributes, like platforms without inodes
    pub fn disable_identity_keys(&self) {
        self.lock().identity_keys = false;
    }

    /// Number of listings opened and not yet closed
    pub fn open_listings(&self) -> usize {
        self.lock().open_listings
    }

    fn update(&self, path: &Path, f: impl FnOnce(&mut Node)) -> io::Result<()> {
        let mut state = self.lock();
        let id = state.resolve(path, false)?;
        let node = state.nodes.get_mut(&id).ok_or_else(|| not_found(path))?;
        f(node);
        Ok(())
    }
}

impl AttributeAccess for MemoryFileSystem {
    fn read_attributes(&self, path: &Path, follow_links: bool) -> io::Result<FileAttributes> {
        let state = self.lock();
        let id = state.resolve(path, follow_links)?;
        state.check_access(id, path)?;
        state.attributes(id)
    }
}

impl DirectoryListing for MemoryFileSystem {
    fn open_dir(&self, path: &Path) -> io::Result<DirStream> {
        let mut state = self.lock();
        let id = state.resolve(path, true)?;
        let node = state.node(id)?;
        if node.policy_denied {
            return Err(PolicyDenied.into_io_error());
        }
        let children = match &node.kind {
            NodeKind::Dir(children) => children,
            _ => return Err(not_a_directory(path)),
        };

        let mut entries: Vec<io::Result<ListedEntry>> = Vec::with_capacity(children.len());
        for (name, child) in children {
            let child_path = path.join(name);
            let cached = state.node(*child).ok().filter(|n| !n.policy_denied && !n.attr_fault);
            entries.push(Ok(match cached {
                Some(_) => ListedEntry::with_attrs(child_path, state.attributes(*child)?),
                None => ListedEntry::new(child_path),
            }));
        }

        match node.listing_fault {
            Some(ListingFault::Open) => {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("{}: cannot open directory", path.display()),
                ))
            }
            Some(ListingFault::AfterEntries(n)) => {
                entries.truncate(n);
                entries.push(Err(io::Error::other(format!(
                    "{}: listing interrupted",
                    path.display()
                ))));
            }
            None => {}
        }

        state.open_listings += 1;
        let shared = Arc::clone(&self.state);
        Ok(DirStream::new(entries.into_iter()).on_close(move || {
            let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
            state.open_listings = state.open_listings.saturating_sub(1);
            Ok(())
        }))
    }
}

impl IdentitySameFile for MemoryFileSystem {
    fn is_same_file(&self, a: &Path, b: &Path) -> io::Result<bool> {
        let state = self.lock();
        Ok(state.resolve(a, true)? == state.resolve(b, true)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_list() {
        let fs = MemoryFileSystem::new();
        fs.create_dir_all("/root/sub").unwrap();
        fs.write_file("/root/b.txt", 3).unwrap();
        fs.write_file("/root/a.txt", 1).unwrap();

        let names: Vec<_> = fs
            .open_dir(Path::new("/root"))
            .unwrap()
            .map(|e| e.unwrap().path)
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("/root/a.txt"),
                PathBuf::from("/root/b.txt"),
                PathBuf::from("/root/sub"),
            ]
        );
        assert_eq!(fs.open_listings(), 0);
    }

    #[test]
    fn test_symlink_resolution() {
        let fs = MemoryFileSystem::new();
        fs.create_dir_all("/data/inner").unwrap();
        fs.symlink("/data", "/data/inner/up").unwrap();

        let link = fs
            .read_attributes(Path::new("/data/inner/up"), false)
            .unwrap();
        assert!(link.is_symbolic_link());

        let followed = fs.read_attributes(Path::new("/data/inner/up"), true).unwrap();
        let data = fs.read_attributes(Path::new("/data"), false).unwrap();
        assert_eq!(followed.file_key, data.file_key);
        assert!(fs
            .is_same_file(Path::new("/data/inner/up/inner"), Path::new("/data/inner"))
            .unwrap());
    }

    #[test]
    fn test_relative_symlink() {
        let fs = MemoryFileSystem::new();
        fs.create_dir_all("/a/b").unwrap();
        fs.write_file("/a/target", 7).unwrap();
        fs.symlink("../target", "/a/b/rel").unwrap();

        let attrs = fs.read_attributes(Path::new("/a/b/rel"), true).unwrap();
        assert_eq!(attrs.size, 7);
    }

    #[test]
    fn test_write_bumps_modified_time() {
        let fs = MemoryFileSystem::new();
        fs.write_file("/f", 1).unwrap();
        let before = fs.read_attributes(Path::new("/f"), false).unwrap().modified;
        fs.write_file("/f", 2).unwrap();
        let after = fs.read_attributes(Path::new("/f"), false).unwrap().modified;
        assert!(after > before);
    }

    #[test]
    fn test_listing_faults() {
        let fs = MemoryFileSystem::new();
        fs.create_dir_all("/d").unwrap();
        fs.write_file("/d/1", 0).unwrap();
        fs.write_file("/d/2", 0).unwrap();

        fs.fail_listing("/d", Some(ListingFault::Open)).unwrap();
        assert!(fs.open_dir(Path::new("/d")).is_err());

        fs.fail_listing("/d", Some(ListingFault::AfterEntries(1))).unwrap();
        let items: Vec<_> = fs.open_dir(Path::new("/d")).unwrap().collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }

    #[test]
    fn test_remove_and_hard_link() {
        let fs = MemoryFileSystem::new();
        fs.write_file("/orig", 4).unwrap();
        fs.hard_link("/orig", "/alias").unwrap();
        fs.remove("/orig").unwrap();

        assert!(fs.read_attributes(Path::new("/orig"), false).is_err());
        assert_eq!(fs.read_attributes(Path::new("/alias"), false).unwrap().size, 4);
    }
}
