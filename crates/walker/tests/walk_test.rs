//! Integration tests for tree walks over the host file system
//!
//! These tests use temporary directories and real filesystem operations
//! to validate traversal behaviour in realistic scenarios.

use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use treewatch_core::{Error, FileAttributes, OsFileSystem};
use treewatch_walker::{
    find, walk, walk_file_tree, EventType, FileVisitor, TraversalEngine, VisitResult, WalkOptions,
};

/// Helper to create a small project tree
fn setup_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("src/nested")).unwrap();
    fs::write(root.join("src/lib.rs"), "pub fn a() {}").unwrap();
    fs::write(root.join("src/nested/mod.rs"), "").unwrap();
    fs::write(root.join("Cargo.toml"), "[package]").unwrap();
    dir
}

fn relative(root: &Path, paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut rel: Vec<PathBuf> = paths
        .into_iter()
        .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
        .collect();
    rel.sort();
    rel
}

#[test]
fn test_walk_lists_every_path() {
    let dir = setup_tree();
    let paths: Vec<PathBuf> = walk(Arc::new(OsFileSystem), dir.path(), WalkOptions::default())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(
        relative(dir.path(), paths),
        vec![
            PathBuf::from(""),
            PathBuf::from("Cargo.toml"),
            PathBuf::from("src"),
            PathBuf::from("src/lib.rs"),
            PathBuf::from("src/nested"),
            PathBuf::from("src/nested/mod.rs"),
        ]
    );
}

#[test]
fn test_max_depth_zero_yields_only_root_entry() {
    let dir = setup_tree();
    let mut engine = TraversalEngine::new(Arc::new(OsFileSystem), WalkOptions::new().max_depth(0));
    let first = engine.walk(dir.path()).unwrap();
    assert_eq!(first.event_type(), EventType::Entry);
    assert_eq!(first.path(), dir.path());
    assert!(engine.next_event().unwrap().is_none());
}

#[test]
fn test_find_rust_sources() {
    let dir = setup_tree();
    let found: Vec<PathBuf> = find(
        Arc::new(OsFileSystem),
        dir.path(),
        WalkOptions::default(),
        |path, attrs| attrs.is_regular_file() && path.extension().is_some_and(|e| e == "rs"),
    )
    .unwrap()
    .collect::<Result<_, _>>()
    .unwrap();

    assert_eq!(
        relative(dir.path(), found),
        vec![PathBuf::from("src/lib.rs"), PathBuf::from("src/nested/mod.rs")]
    );
}

#[test]
fn test_every_start_has_matching_end() {
    let dir = setup_tree();
    let mut engine = TraversalEngine::new(Arc::new(OsFileSystem), WalkOptions::default());
    let mut open = Vec::new();
    let mut next = Some(engine.walk(dir.path()).unwrap());
    while let Some(ev) = next {
        match ev.event_type() {
            EventType::StartDirectory => open.push(ev.path().to_path_buf()),
            EventType::EndDirectory => {
                assert_eq!(open.pop().as_deref(), Some(ev.path()));
            }
            EventType::Entry => assert!(ev.error().is_none()),
        }
        assert_eq!(engine.depth(), open.len());
        next = engine.next_event().unwrap();
    }
    assert!(open.is_empty());
}

#[cfg(unix)]
#[test]
fn test_symlink_cycle_reported_and_siblings_continue() {
    let dir = setup_tree();
    let root = dir.path();
    std::os::unix::fs::symlink(root, root.join("src/nested/back")).unwrap();

    let mut engine = TraversalEngine::new(
        Arc::new(OsFileSystem),
        WalkOptions::new().follow_links(true),
    );
    let mut next = Some(engine.walk(root).unwrap());
    let mut loops = Vec::new();
    let mut files = Vec::new();
    while let Some(ev) = next {
        match ev.error() {
            Some(Error::FileSystemLoop(p)) => loops.push(p.clone()),
            Some(other) => panic!("unexpected error {other}"),
            None if ev.event_type() == EventType::Entry => files.push(ev.path().to_path_buf()),
            None => {}
        }
        next = engine.next_event().unwrap();
    }

    assert_eq!(loops, vec![root.join("src/nested/back")]);
    assert_eq!(
        relative(root, files),
        vec![
            PathBuf::from("Cargo.toml"),
            PathBuf::from("src/lib.rs"),
            PathBuf::from("src/nested/mod.rs"),
        ]
    );
}

#[test]
fn test_visitor_skip_subtree_hides_children() {
    struct SkipSrc {
        seen: Vec<PathBuf>,
    }

    impl FileVisitor for SkipSrc {
        fn pre_visit_directory(
            &mut self,
            dir: &Path,
            _attrs: &FileAttributes,
        ) -> treewatch_core::Result<VisitResult> {
            self.seen.push(dir.to_path_buf());
            if dir.ends_with("src") {
                Ok(VisitResult::SkipSubtree)
            } else {
                Ok(VisitResult::Continue)
            }
        }

        fn visit_file(
            &mut self,
            file: &Path,
            _attrs: &FileAttributes,
        ) -> treewatch_core::Result<VisitResult> {
            self.seen.push(file.to_path_buf());
            Ok(VisitResult::Continue)
        }
    }

    let dir = setup_tree();
    let mut visitor = SkipSrc { seen: Vec::new() };
    walk_file_tree(
        Arc::new(OsFileSystem),
        dir.path(),
        WalkOptions::default(),
        &mut visitor,
    )
    .unwrap();

    assert_eq!(
        relative(dir.path(), visitor.seen),
        vec![
            PathBuf::from(""),
            PathBuf::from("Cargo.toml"),
            PathBuf::from("src"),
        ]
    );
}
