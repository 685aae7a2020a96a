use pretty_assertions::assert_eq;
use std::path::Path;
use tempfile::TempDir;
use treewatch_core::config::{Config, DEFAULT_POLL_INTERVAL_MS};
use treewatch_core::fs::{AttributeAccess, DirectoryListing, IdentitySameFile};
use treewatch_core::{Error, MemoryFileSystem, OsFileSystem};

#[test]
fn test_environment_overrides_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("treewatch.toml");
    std::fs::write(
        &path,
        r#"
[walker]
max_depth = 4

[watcher]
poll_interval_ms = 1000
"#,
    )
    .unwrap();

    std::env::set_var("TREEWATCH_WATCHER__POLL_INTERVAL_MS", "250");
    std::env::set_var("TREEWATCH_WATCHER__EVENTS", "create,delete");
    let config = Config::from_file(&path);
    std::env::remove_var("TREEWATCH_WATCHER__POLL_INTERVAL_MS");
    std::env::remove_var("TREEWATCH_WATCHER__EVENTS");

    let config = config.unwrap();
    assert_eq!(config.walker.max_depth, Some(4));
    assert!(!config.walker.follow_links);
    assert_eq!(config.watcher.poll_interval_ms, 250);
    assert_eq!(
        config.watcher.events,
        vec!["create".to_string(), "delete".to_string()]
    );
}

#[test]
fn test_validation_messages() {
    let mut config = Config::default();
    assert_eq!(config.watcher.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);

    config.walker.max_depth = Some(-3);
    let err = config.validate().unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(err.to_string().contains("walker.max_depth"));

    config.walker.max_depth = Some(0);
    assert_eq!(config.walker.resolved_max_depth().unwrap(), 0);
    config.watcher.poll_interval_ms = 0;
    assert!(config
        .validate()
        .unwrap_err()
        .to_string()
        .contains("poll_interval_ms"));
}

#[test]
fn test_host_and_memory_agree_on_listing_shape() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::create_dir(temp_dir.path().join("dir")).unwrap();
    std::fs::write(temp_dir.path().join("file"), "abc").unwrap();

    let memory = MemoryFileSystem::new();
    memory.create_dir_all("/root/dir").unwrap();
    memory.write_file("/root/file", 3).unwrap();

    let host = OsFileSystem::new();
    let mut host_names = names(&host, temp_dir.path());
    host_names.sort();
    assert_eq!(host_names, names(&memory, Path::new("/root")));

    let host_file = host
        .read_attributes(&temp_dir.path().join("file"), false)
        .unwrap();
    let memory_file = memory
        .read_attributes(Path::new("/root/file"), false)
        .unwrap();
    assert_eq!(host_file.size, memory_file.size);
    assert!(host_file.is_regular_file() && memory_file.is_regular_file());
}

#[test]
fn test_same_file_through_hard_link() {
    let memory = MemoryFileSystem::new();
    memory.create_dir_all("/a").unwrap();
    memory.write_file("/a/original", 1).unwrap();
    memory.hard_link("/a/original", "/a/alias").unwrap();

    assert!(memory
        .is_same_file(Path::new("/a/original"), Path::new("/a/alias"))
        .unwrap());
    let original = memory
        .read_attributes(Path::new("/a/original"), false)
        .unwrap();
    let alias = memory.read_attributes(Path::new("/a/alias"), false).unwrap();
    assert_eq!(original.file_key, alias.file_key);
}

fn names<F: DirectoryListing>(fs: &F, dir: &Path) -> Vec<String> {
    fs.open_dir(dir)
        .unwrap()
        .map(|entry| {
            entry
                .unwrap()
                .path
                .file_name()
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect()
}
