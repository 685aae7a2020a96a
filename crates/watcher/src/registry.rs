//! Watch registration and delivery of signalled keys
//!
//! The registry owns one key per watched directory, indexed by the
//! directory's identity key, and a FIFO of keys that have events ready.
//! Both live behind a single mutex. Keys refer back to the registry weakly
//! and find themselves in the map by identity key.

use crate::event::{EventKind, EventSet, WatchModifier};
use crate::key::WatchKey;
use crate::polling::{PollingConfig, PollingDirectoryWatcher};
use crate::scheduler::{Scheduler, TokioScheduler};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info};
use treewatch_core::error::{Error, Result};
use treewatch_core::fs::{FileSystem, OsFileSystem};
use treewatch_core::FileKey;

#[derive(Default)]
struct RegistryState {
    registrations: HashMap<FileKey, WatchKey>,
    ready: VecDeque<WatchKey>,
    closed: bool,
}

/// State reachable from keys
#[derive(Default)]
pub(crate) struct RegistryShared {
    state: Mutex<RegistryState>,
    notify: Notify,
}

enum Inserted {
    New,
    Existing(WatchKey),
}

impl RegistryShared {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a signalled key; ignored once closed
    pub(crate) fn enqueue(&self, key: WatchKey) {
        {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.ready.push_back(key);
        }
        self.notify.notify_one();
    }

    /// Drop `key`'s registration if it is still the registered key
    pub(crate) fn remove_if_same(&self, key: &WatchKey) {
        let Some(file_key) = key.file_key() else {
            return;
        };
        let mut state = self.lock();
        if state.registrations.get(&file_key) == Some(key) {
            state.registrations.remove(&file_key);
        }
    }

    /// Next ready key; the close sentinel is left in place
    pub(crate) fn pop_ready(&self) -> Option<WatchKey> {
        let (key, more) = {
            let mut state = self.lock();
            if state.ready.front().is_some_and(WatchKey::is_close_sentinel) {
                return state.ready.front().cloned();
            }
            let key = state.ready.pop_front();
            (key, !state.ready.is_empty())
        };
        if key.is_some() && more {
            self.notify.notify_one();
        }
        key
    }

    #[cfg(test)]
    pub(crate) fn ready_len(&self) -> usize {
        self.lock().ready.len()
    }

    fn lookup(&self, file_key: &FileKey) -> Result<Option<WatchKey>> {
        let state = self.lock();
        if state.closed {
            return Err(Error::ClosedWatchService);
        }
        Ok(state.registrations.get(file_key).cloned())
    }

    fn insert(&self, file_key: FileKey, key: &WatchKey) -> Result<Inserted> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::ClosedWatchService);
        }
        if let Some(existing) = state.registrations.get(&file_key) {
            return Ok(Inserted::Existing(existing.clone()));
        }
        state.registrations.insert(file_key, key.clone());
        Ok(Inserted::New)
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Suspend until a key is ready
    async fn wait_ready(&self) -> WatchKey {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(key) = self.pop_ready() {
                return key;
            }
            notified.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Polling watch service
///
/// Register directories with [`WatchRegistry::register`], then consume keys
/// with [`poll`](WatchRegistry::poll), [`poll_timeout`](WatchRegistry::poll_timeout)
/// or [`take`](WatchRegistry::take). After handling a key's events call
/// [`WatchKey::reset`] so it can be delivered again.
///
/// Dropping the registry closes it.
pub struct WatchRegistry {
    shared: Arc<RegistryShared>,
    fs: Arc<dyn FileSystem>,
    scheduler: Arc<dyn Scheduler>,
    config: PollingConfig,
}

impl WatchRegistry {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        scheduler: Arc<dyn Scheduler>,
        config: PollingConfig,
    ) -> Self {
        Self {
            shared: RegistryShared::new(),
            fs,
            scheduler,
            config,
        }
    }

    /// Registry over the host file system, polling on the current tokio
    /// runtime
    pub fn with_tokio(config: PollingConfig) -> Result<Self> {
        Ok(Self::new(
            Arc::new(OsFileSystem::new()),
            Arc::new(TokioScheduler::current()?),
            config,
        ))
    }

    /// Watch `dir` for `events`
    ///
    /// Registering a directory that is already watched returns the same key
    /// with its subscription replaced.
    pub fn register(
        &self,
        dir: impl AsRef<Path>,
        events: &[EventKind],
        modifiers: &[WatchModifier],
    ) -> Result<WatchKey> {
        if self.shared.is_closed() {
            return Err(Error::ClosedWatchService);
        }
        if let Some(modifier) = modifiers.first() {
            return Err(Error::not_supported(format!(
                "Modifier {modifier:?} is not supported"
            )));
        }
        let events = EventSet::from_kinds(events)?;
        self.register_set(dir.as_ref(), events)
    }

    /// Watch `dir` for the configured default events
    pub fn register_default(&self, dir: impl AsRef<Path>) -> Result<WatchKey> {
        if self.shared.is_closed() {
            return Err(Error::ClosedWatchService);
        }
        self.register_set(dir.as_ref(), self.config.events)
    }

    fn register_set(&self, dir: &Path, events: EventSet) -> Result<WatchKey> {
        let attrs = self.fs.read_attributes(dir, true)?;
        if !attrs.is_directory() {
            return Err(Error::NotDirectory(dir.to_path_buf()));
        }
        let file_key = attrs.file_key.ok_or_else(|| {
            Error::not_supported(format!("No identity key available for {}", dir.display()))
        })?;

        loop {
            if let Some(existing) = self.shared.lookup(&file_key)? {
                if self.reuse(&existing, events)? {
                    debug!("Re-registered {:?} for {:?}", dir, events);
                    return Ok(existing);
                }
                continue;
            }

            let driver = PollingDirectoryWatcher::new(
                dir,
                Arc::clone(&self.fs),
                Arc::clone(&self.scheduler),
                self.config.interval,
            )?;
            let key = WatchKey::new(
                dir.to_path_buf(),
                file_key,
                Arc::downgrade(&self.shared),
                Some(Arc::new(driver)),
            );
            key.enable(events)?;

            match self.shared.insert(file_key, &key) {
                Ok(Inserted::New) => {
                    info!("Watching {:?} for {:?}", dir, events);
                    return Ok(key);
                }
                // lost a race with a concurrent registration of the same directory
                Ok(Inserted::Existing(existing)) => {
                    key.shut_down();
                    if self.reuse(&existing, events)? {
                        return Ok(existing);
                    }
                }
                Err(e) => {
                    key.shut_down();
                    return Err(e);
                }
            }
        }
    }

    /// Re-enable a registered key; `false` when it was cancelled meanwhile and
    /// has been dropped from the registrations
    fn reuse(&self, existing: &WatchKey, events: EventSet) -> Result<bool> {
        match existing.enable(events) {
            Ok(()) => Ok(true),
            Err(Error::ClosedWatchService) if !self.shared.is_closed() => {
                debug!(
                    "Registration of {:?} was cancelled, replacing it",
                    existing.watchable()
                );
                self.shared.remove_if_same(existing);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Next signalled key without waiting
    pub fn poll(&self) -> Result<Option<WatchKey>> {
        if self.shared.is_closed() {
            return Err(Error::ClosedWatchService);
        }
        Ok(self.shared.pop_ready())
    }

    /// Next signalled key, waiting at most `timeout`
    pub async fn poll_timeout(&self, timeout: Duration) -> Result<Option<WatchKey>> {
        if self.shared.is_closed() {
            return Err(Error::ClosedWatchService);
        }
        match tokio::time::timeout(timeout, self.shared.wait_ready()).await {
            Ok(key) => Ok(Some(key)),
            Err(_) => Ok(None),
        }
    }

    /// Next signalled key, waiting as long as needed
    ///
    /// A call already waiting when the registry closes returns the close
    /// sentinel (see [`WatchKey::is_close_sentinel`]).
    pub async fn take(&self) -> Result<WatchKey> {
        if self.shared.is_closed() {
            return Err(Error::ClosedWatchService);
        }
        Ok(self.shared.wait_ready().await)
    }

    pub fn is_open(&self) -> bool {
        !self.shared.is_closed()
    }

    /// Number of directories currently registered
    pub fn len(&self) -> usize {
        self.shared.lock().registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invalidate every key and wake all waiters; idempotent
    pub fn close(&self) {
        let keys: Vec<WatchKey> = {
            let mut state = self.shared.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.ready.clear();
            state.ready.push_back(WatchKey::close_sentinel());
            state.registrations.drain().map(|(_, key)| key).collect()
        };
        self.shared.notify.notify_waiters();

        for key in &keys {
            key.shut_down();
        }
        info!("Watch service closed ({} keys invalidated)", keys.len());
    }
}

impl Drop for WatchRegistry {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("open", &self.is_open())
            .field("registrations", &self.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
