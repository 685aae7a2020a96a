//! Watch keys and their pending event queues
//!
//! A key is READY while it has nothing undelivered, SIGNALLED once it has
//! been placed on its registry's ready queue, and INVALID after cancellation
//! or registry close. Events are coalesced on the way in so a busy directory
//! produces a bounded queue.

use crate::event::{EventKind, EventSet, WatchEvent};
use crate::registry::RegistryShared;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, trace};
use treewatch_core::config::MAX_PENDING_EVENTS;
use treewatch_core::error::{Error, Result};
use treewatch_core::FileKey;

/// Lifecycle state of a [`WatchKey`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyState {
    Ready,
    Signalled,
    Invalid,
}

/// Whatever produces events for a key
pub(crate) trait KeyDriver: Send + Sync {
    /// Start (or restart) delivering `events` to `key`
    fn enable(&self, key: &WatchKey, events: EventSet) -> Result<()>;

    /// Stop delivering events; idempotent
    fn disable(&self);
}

#[derive(Default)]
struct Pending {
    events: Vec<WatchEvent>,
    /// Queue position of the latest MODIFY per context
    last_modify: HashMap<PathBuf, usize>,
    signalled: bool,
    valid: bool,
}

struct KeyInner {
    dir: PathBuf,
    file_key: Option<FileKey>,
    registry: Weak<RegistryShared>,
    driver: Option<Arc<dyn KeyDriver>>,
    sentinel: bool,
    pending: Mutex<Pending>,
}

impl Drop for KeyInner {
    fn drop(&mut self) {
        if let Some(driver) = &self.driver {
            driver.disable();
        }
    }
}

/// Handle on one watched directory
///
/// Clones share state; equality is identity.
#[derive(Clone)]
pub struct WatchKey {
    inner: Arc<KeyInner>,
}

/// Non-owning reference used by timers
#[derive(Clone)]
pub(crate) struct WeakWatchKey(Weak<KeyInner>);

impl WeakWatchKey {
    pub(crate) fn upgrade(&self) -> Option<WatchKey> {
        self.0.upgrade().map(|inner| WatchKey { inner })
    }
}

impl WatchKey {
    pub(crate) fn new(
        dir: PathBuf,
        file_key: FileKey,
        registry: Weak<RegistryShared>,
        driver: Option<Arc<dyn KeyDriver>>,
    ) -> Self {
        Self {
            inner: Arc::new(KeyInner {
                dir,
                file_key: Some(file_key),
                registry,
                driver,
                sentinel: false,
                pending: Mutex::new(Pending {
                    valid: true,
                    ..Default::default()
                }),
            }),
        }
    }

    /// The key queued when a registry closes
    pub(crate) fn close_sentinel() -> Self {
        Self {
            inner: Arc::new(KeyInner {
                dir: PathBuf::new(),
                file_key: None,
                registry: Weak::new(),
                driver: None,
                sentinel: true,
                pending: Mutex::new(Pending::default()),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakWatchKey {
        WeakWatchKey(Arc::downgrade(&self.inner))
    }

    /// The watched directory
    pub fn watchable(&self) -> &Path {
        &self.inner.dir
    }

    /// Identity key of the watched directory, `None` only for the close
    /// sentinel
    pub fn file_key(&self) -> Option<FileKey> {
        self.inner.file_key
    }

    /// Whether this is the key a closed registry hands to waiting callers
    pub fn is_close_sentinel(&self) -> bool {
        self.inner.sentinel
    }

    pub fn state(&self) -> KeyState {
        let pending = self.lock();
        if !pending.valid {
            KeyState::Invalid
        } else if pending.signalled {
            KeyState::Signalled
        } else {
            KeyState::Ready
        }
    }

    pub fn is_valid(&self) -> bool {
        self.lock().valid
    }

    /// Queue an event, coalescing it with what is already pending
    ///
    /// Events for a cancelled key are dropped.
    pub fn signal_event(&self, kind: EventKind, context: Option<PathBuf>) {
        let mut pending = self.lock();
        if !pending.valid {
            return;
        }

        if let Some(last) = pending.events.last_mut() {
            if last.kind() == EventKind::Overflow || last.matches(kind, context.as_deref()) {
                last.increment();
                return;
            }
        }

        if let Some(name) = &context {
            if kind == EventKind::Modify {
                if let Some(&index) = pending.last_modify.get(name) {
                    pending.events[index].increment();
                    return;
                }
            } else {
                pending.last_modify.remove(name);
            }
        }

        let (kind, context) = if pending.events.len() >= MAX_PENDING_EVENTS {
            debug!(
                "Event queue for {:?} full, replacing pending events with overflow",
                self.inner.dir
            );
            (EventKind::Overflow, None)
        } else {
            (kind, context)
        };

        if kind == EventKind::Overflow {
            pending.events.clear();
            pending.last_modify.clear();
        }
        if kind == EventKind::Modify {
            if let Some(name) = &context {
                let index = pending.events.len();
                pending.last_modify.insert(name.clone(), index);
            }
        }
        pending.events.push(WatchEvent::new(kind, context));
        self.signal_locked(&mut pending);
    }

    /// Move to SIGNALLED without adding an event
    ///
    /// Used when a key is cancelled by its driver so a consumer can observe
    /// the invalid key.
    pub fn signal(&self) {
        let mut pending = self.lock();
        self.signal_locked(&mut pending);
    }

    /// Remove and return every pending event
    pub fn poll_events(&self) -> Vec<WatchEvent> {
        let mut pending = self.lock();
        pending.last_modify.clear();
        std::mem::take(&mut pending.events)
    }

    /// Finish delivery of a signalled key
    ///
    /// Goes back to READY when nothing arrived in the meantime, otherwise
    /// re-queues the key. Returns whether the key is still valid.
    pub fn reset(&self) -> bool {
        let mut pending = self.lock();
        if pending.valid && pending.signalled {
            if pending.events.is_empty() {
                pending.signalled = false;
            } else {
                self.enqueue();
            }
        }
        pending.valid
    }

    /// Stop watching; idempotent
    pub fn cancel(&self) {
        if let Some(driver) = &self.inner.driver {
            driver.disable();
        }
        if self.invalidate() {
            debug!("Cancelled watch on {:?}", self.inner.dir);
        }
        if let Some(registry) = self.inner.registry.upgrade() {
            registry.remove_if_same(self);
        }
    }

    /// Mark invalid and stop the driver without touching the registry
    pub(crate) fn shut_down(&self) {
        if let Some(driver) = &self.inner.driver {
            driver.disable();
        }
        self.invalidate();
    }

    /// Start delivering `events`, replacing any previous subscription
    pub(crate) fn enable(&self, events: EventSet) -> Result<()> {
        if !self.is_valid() {
            return Err(Error::ClosedWatchService);
        }
        match &self.inner.driver {
            Some(driver) => {
                driver.disable();
                driver.enable(self, events)
            }
            None => Ok(()),
        }
    }

    /// Returns whether the key was valid before the call
    fn invalidate(&self) -> bool {
        std::mem::replace(&mut self.lock().valid, false)
    }

    fn signal_locked(&self, pending: &mut Pending) {
        if !pending.signalled {
            pending.signalled = true;
            self.enqueue();
        }
    }

    fn enqueue(&self) {
        match self.inner.registry.upgrade() {
            Some(registry) => registry.enqueue(self.clone()),
            None => trace!("Registry for {:?} is gone", self.inner.dir),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartialEq for WatchKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for WatchKey {}

impl fmt::Debug for WatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_close_sentinel() {
            return f.write_str("WatchKey(CLOSE)");
        }
        f.debug_struct("WatchKey")
            .field("dir", &self.inner.dir)
            .field("state", &self.state())
            .finish()
    }
}
