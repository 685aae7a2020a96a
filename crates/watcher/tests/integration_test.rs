//! Integration tests for the polling watch service
//!
//! The deterministic tests drive scans with the manual scheduler over the
//! in-memory file system; the last ones use temporary directories and the
//! tokio scheduler to validate behaviour against the host file system.

use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use treewatch_core::fs::ListingFault;
use treewatch_core::{Error, MemoryFileSystem};
use treewatch_watcher::{
    EventKind, KeyState, ManualScheduler, PollingConfig, WatchKey, WatchRegistry,
};

const TICK: Duration = Duration::from_secs(2);
const ALL: [EventKind; 3] = [EventKind::Create, EventKind::Modify, EventKind::Delete];

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn memory_registry() -> (MemoryFileSystem, ManualScheduler, Arc<WatchRegistry>) {
    init_tracing();
    let fs = MemoryFileSystem::new();
    fs.create_dir_all("/project").unwrap();
    fs.write_file("/project/a.txt", 10).unwrap();
    let scheduler = ManualScheduler::new();
    let registry = WatchRegistry::new(
        Arc::new(fs.clone()),
        Arc::new(scheduler.clone()),
        PollingConfig::new().interval(TICK),
    );
    (fs, scheduler, Arc::new(registry))
}

fn drain(key: &WatchKey) -> BTreeSet<(EventKind, String, u32)> {
    key.poll_events()
        .into_iter()
        .map(|e| {
            (
                e.kind(),
                e.context()
                    .map(|c| c.display().to_string())
                    .unwrap_or_default(),
                e.count(),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_replace_file_yields_create_and_delete() {
    let (fs, scheduler, registry) = memory_registry();
    let key = registry.register("/project", &ALL, &[]).unwrap();

    fs.remove("/project/a.txt").unwrap();
    fs.write_file("/project/b.txt", 3).unwrap();
    scheduler.advance(TICK);

    let ready = registry.take().await.unwrap();
    assert_eq!(ready, key);
    assert_eq!(
        drain(&ready),
        BTreeSet::from([
            (EventKind::Create, "b.txt".to_string(), 1),
            (EventKind::Delete, "a.txt".to_string(), 1),
        ])
    );
    assert!(ready.reset());
    assert_eq!(ready.state(), KeyState::Ready);
}

#[tokio::test]
async fn test_repeated_modifications_coalesce_between_deliveries() {
    let (fs, scheduler, registry) = memory_registry();
    let key = registry.register("/project", &ALL, &[]).unwrap();

    for size in 1..=3 {
        fs.write_file("/project/a.txt", size).unwrap();
        scheduler.advance(TICK);
    }

    assert_eq!(registry.take().await.unwrap(), key);
    assert_eq!(
        drain(&key),
        BTreeSet::from([(EventKind::Modify, "a.txt".to_string(), 3)])
    );
}

#[tokio::test]
async fn test_keys_delivered_in_signal_order() {
    let (fs, scheduler, registry) = memory_registry();
    fs.create_dir_all("/other").unwrap();
    let other = registry.register("/other", &ALL, &[]).unwrap();
    let project = registry.register("/project", &ALL, &[]).unwrap();

    fs.write_file("/project/new", 1).unwrap();
    scheduler.advance(TICK);
    fs.write_file("/other/new", 1).unwrap();
    scheduler.advance(TICK);

    assert_eq!(registry.poll().unwrap(), Some(project));
    assert_eq!(registry.poll().unwrap(), Some(other));
    assert_eq!(registry.poll().unwrap(), None);
}

#[tokio::test]
async fn test_inaccessible_directory_cancels_key() {
    let (fs, scheduler, registry) = memory_registry();
    let key = registry.register("/project", &ALL, &[]).unwrap();

    fs.fail_listing("/project", Some(ListingFault::Open))
        .unwrap();
    scheduler.advance(TICK);

    let ready = registry.take().await.unwrap();
    assert_eq!(ready, key);
    assert_eq!(ready.state(), KeyState::Invalid);
    assert!(!ready.reset());
    assert!(registry.is_empty());
    assert_eq!(scheduler.active_timers(), 0);
}

#[tokio::test]
async fn test_close_wakes_outstanding_take() {
    let (_fs, _scheduler, registry) = memory_registry();
    registry.register("/project", &ALL, &[]).unwrap();

    let waiters: Vec<_> = (0..2)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.take().await })
        })
        .collect();
    // let both waiters suspend
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    registry.close();
    for waiter in waiters {
        let key = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("take did not wake after close")
            .unwrap()
            .unwrap();
        assert!(key.is_close_sentinel());
    }

    assert!(matches!(
        registry.take().await,
        Err(Error::ClosedWatchService)
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn test_host_directory_changes_detected() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.txt"), "old").unwrap();

    let registry =
        WatchRegistry::with_tokio(PollingConfig::new().interval(Duration::from_millis(50)))
            .unwrap();
    let key = registry
        .register(dir.path(), &[EventKind::Create, EventKind::Delete], &[])
        .unwrap();

    std::fs::remove_file(dir.path().join("a.txt")).unwrap();
    std::fs::write(dir.path().join("b.txt"), "new").unwrap();

    let ready = registry
        .poll_timeout(Duration::from_secs(10))
        .await
        .unwrap()
        .expect("no key signalled within timeout");
    assert_eq!(ready, key);

    // both changes are seen by the same scan
    assert_eq!(
        drain(&ready),
        BTreeSet::from([
            (EventKind::Create, "b.txt".to_string(), 1),
            (EventKind::Delete, "a.txt".to_string(), 1),
        ])
    );

    registry.close();
    assert!(!key.is_valid());
}

#[cfg(unix)]
#[tokio::test]
async fn test_host_registration_requires_directory() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("plain");
    std::fs::write(&file, "x").unwrap();

    let registry = WatchRegistry::with_tokio(PollingConfig::default()).unwrap();
    assert!(matches!(
        registry.register(&file, &ALL, &[]),
        Err(Error::NotDirectory(_))
    ));
}
