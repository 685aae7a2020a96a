//! Polling change detection for one directory
//!
//! The watcher keeps a cache of the directory's children with their last
//! seen modification time and the scan tick that last saw them. Each tick
//! re-lists the directory and compares:
//!
//! - a name not in the cache is a creation (or a modification when only
//!   MODIFY is subscribed)
//! - a cached name with a different modification time is a modification
//! - a cached name not seen during the tick is a deletion

use crate::event::{EventKind, EventSet};
use crate::key::{KeyDriver, WatchKey};
use crate::scheduler::{Scheduler, TimerHandle};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};
use tracing::{debug, trace, warn};
use treewatch_core::config::{WatcherConfig, DEFAULT_POLL_INTERVAL_MS};
use treewatch_core::error::{Error, Result};
use treewatch_core::fs::{FileSystem, ListedEntry};

/// Runtime settings for polling watches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    /// Time between scans of a watched directory
    pub interval: Duration,
    /// Subscription used by [`WatchRegistry::register_default`](crate::WatchRegistry::register_default)
    pub events: EventSet,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            events: EventSet::all(),
        }
    }
}

impl PollingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Validate watcher settings into runtime options
    pub fn from_config(config: &WatcherConfig) -> Result<Self> {
        if config.poll_interval_ms == 0 {
            return Err(Error::config(
                "watcher.poll_interval_ms must be greater than 0",
            ));
        }
        Ok(Self {
            interval: Duration::from_millis(config.poll_interval_ms),
            events: EventSet::from_names(&config.events)?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    /// `None` until the entry's attributes could be read
    modified: Option<SystemTime>,
    last_tick: u64,
}

struct ScanState {
    cache: HashMap<OsString, CacheEntry>,
    tick: u64,
    events: EventSet,
}

/// State shared with the timer task
struct Scanner {
    dir: PathBuf,
    fs: Arc<dyn FileSystem>,
    state: Mutex<ScanState>,
    in_flight: AtomicBool,
}

/// Drives a [`WatchKey`] by periodically re-listing its directory
pub(crate) struct PollingDirectoryWatcher {
    scanner: Arc<Scanner>,
    scheduler: Arc<dyn Scheduler>,
    interval: Duration,
    timer: Mutex<Option<TimerHandle>>,
}

impl PollingDirectoryWatcher {
    /// List `dir` once to seed the cache
    pub(crate) fn new(
        dir: &Path,
        fs: Arc<dyn FileSystem>,
        scheduler: Arc<dyn Scheduler>,
        interval: Duration,
    ) -> Result<Self> {
        let mut cache = HashMap::new();
        for entry in fs.open_dir(dir)? {
            let entry = entry?;
            let Some(name) = entry.path.file_name().map(|n| n.to_os_string()) else {
                continue;
            };
            let modified = match modified_time(fs.as_ref(), &entry) {
                Ok(modified) => Some(modified),
                Err(e) => {
                    trace!("No modification time for {:?} in initial scan: {}", entry.path, e);
                    None
                }
            };
            cache.insert(
                name,
                CacheEntry {
                    modified,
                    last_tick: 0,
                },
            );
        }
        debug!("Seeded cache for {:?} with {} entries", dir, cache.len());

        Ok(Self {
            scanner: Arc::new(Scanner {
                dir: dir.to_path_buf(),
                fs,
                state: Mutex::new(ScanState {
                    cache,
                    tick: 0,
                    events: EventSet::default(),
                }),
                in_flight: AtomicBool::new(false),
            }),
            scheduler,
            interval,
            timer: Mutex::new(None),
        })
    }

    fn timer(&self) -> MutexGuard<'_, Option<TimerHandle>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyDriver for PollingDirectoryWatcher {
    fn enable(&self, key: &WatchKey, events: EventSet) -> Result<()> {
        self.scanner.lock().events = events;

        let scanner = Arc::clone(&self.scanner);
        let key = key.downgrade();
        let handle = self.scheduler.schedule_periodic(
            self.interval,
            Box::new(move || {
                if let Some(key) = key.upgrade() {
                    scanner.poll(&key);
                }
            }),
        );

        if let Some(previous) = self.timer().replace(handle) {
            previous.cancel();
        }
        debug!(
            "Polling {:?} every {:?} for {:?}",
            self.scanner.dir, self.interval, events
        );
        Ok(())
    }

    fn disable(&self) {
        if let Some(timer) = self.timer().take() {
            timer.cancel();
            trace!("Stopped polling {:?}", self.scanner.dir);
        }
    }
}

impl Scanner {
    /// One tick; skipped when the previous tick is still running
    fn poll(&self, key: &WatchKey) {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Scan of {:?} still running, skipping tick", self.dir);
            return;
        }
        self.scan(key);
        self.in_flight.store(false, Ordering::Release);
    }

    fn scan(&self, key: &WatchKey) {
        if !key.is_valid() {
            return;
        }

        let mut state = self.lock();
        state.tick += 1;
        let tick = state.tick;
        let events = state.events;

        let listing = match self.fs.open_dir(&self.dir) {
            Ok(listing) => listing,
            Err(e) => {
                drop(state);
                warn!("Directory {:?} is no longer accessible: {}", self.dir, e);
                key.cancel();
                key.signal();
                return;
            }
        };

        let mut complete = true;
        let mut signalled = 0usize;
        for entry in listing {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Listing of {:?} failed part-way: {}", self.dir, e);
                    complete = false;
                    break;
                }
            };
            let Some(name) = entry.path.file_name().map(|n| n.to_os_string()) else {
                continue;
            };
            let modified = match modified_time(self.fs.as_ref(), &entry) {
                Ok(modified) => modified,
                Err(e) => {
                    // still listed, so a known entry stays cached
                    trace!("Cannot read {:?}: {}", entry.path, e);
                    if let Some(cached) = state.cache.get_mut(&name) {
                        cached.last_tick = tick;
                    }
                    continue;
                }
            };

            match state.cache.get_mut(&name) {
                None => {
                    state.cache.insert(
                        name.clone(),
                        CacheEntry {
                            modified: Some(modified),
                            last_tick: tick,
                        },
                    );
                    if events.contains(EventKind::Create) {
                        key.signal_event(EventKind::Create, Some(PathBuf::from(name)));
                        signalled += 1;
                    } else if events.contains(EventKind::Modify) {
                        key.signal_event(EventKind::Modify, Some(PathBuf::from(name)));
                        signalled += 1;
                    }
                }
                Some(cached) => {
                    let changed = cached.modified.is_some_and(|seen| seen != modified);
                    cached.modified = Some(modified);
                    cached.last_tick = tick;
                    if changed && events.contains(EventKind::Modify) {
                        key.signal_event(EventKind::Modify, Some(PathBuf::from(name)));
                        signalled += 1;
                    }
                }
            }
        }

        if complete {
            let gone: Vec<OsString> = state
                .cache
                .iter()
                .filter(|(_, entry)| entry.last_tick != tick)
                .map(|(name, _)| name.clone())
                .collect();
            for name in gone {
                state.cache.remove(&name);
                if events.contains(EventKind::Delete) {
                    key.signal_event(EventKind::Delete, Some(PathBuf::from(name)));
                    signalled += 1;
                }
            }
        }

        trace!(
            "Scan {} of {:?}: {} cached, {} events",
            tick,
            self.dir,
            state.cache.len(),
            signalled
        );
    }

    fn lock(&self) -> MutexGuard<'_, ScanState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn modified_time(fs: &dyn FileSystem, entry: &ListedEntry) -> std::io::Result<SystemTime> {
    match &entry.attrs {
        Some(attrs) => Ok(attrs.modified),
        None => Ok(fs.read_attributes(&entry.path, false)?.modified),
    }
}
