//! Periodic timers for polling watch keys
//!
//! Every registered key owns one periodic timer. The [`Scheduler`] trait hides
//! where timers come from: [`TokioScheduler`] spawns a task per timer on a
//! tokio runtime, [`ManualScheduler`] keeps a virtual clock that tests advance
//! explicitly so scans can be single-stepped.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use treewatch_core::error::{Error, Result};

/// Callback run on every timer tick
pub type ScheduledTask = Box<dyn Fn() + Send + Sync + 'static>;

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Source of cancelable periodic timers
pub trait Scheduler: Send + Sync {
    /// Run `task` every `interval`, first after one full interval
    fn schedule_periodic(&self, interval: Duration, task: ScheduledTask) -> TimerHandle;
}

/// Cancel token for a scheduled timer
///
/// Dropping the handle does not stop the timer; call [`TimerHandle::cancel`].
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the timer; no tick starts after this returns
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Scheduler backed by tokio tasks
///
/// Ticks run on the blocking pool since scans perform synchronous file
/// system calls. A tick that falls due while the previous one is still
/// running is skipped.
#[derive(Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scheduler on the runtime of the calling context
    pub fn current() -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| Error::config(format!("No tokio runtime for watch timers: {e}")))?;
        Ok(Self::new(handle))
    }
}

impl fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioScheduler").finish_non_exhaustive()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_periodic(&self, interval: Duration, task: ScheduledTask) -> TimerHandle {
        let timer = TimerHandle::new();
        let token = timer.token();
        let period = interval.max(MIN_PERIOD);
        let task: Arc<dyn Fn() + Send + Sync> = Arc::from(task);

        self.handle.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        trace!("Timer cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        let task = Arc::clone(&task);
                        if let Err(e) = tokio::task::spawn_blocking(move || task()).await {
                            debug!("Timer task failed: {}", e);
                        }
                    }
                }
            }
        });

        timer
    }
}

struct ManualTimer {
    period: Duration,
    next_due: Duration,
    token: CancellationToken,
    task: Arc<dyn Fn() + Send + Sync>,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    timers: Vec<ManualTimer>,
}

/// Virtual-clock scheduler for deterministic tests
///
/// Nothing runs until [`ManualScheduler::advance`] or
/// [`ManualScheduler::fire_all`] is called. Tasks run on the calling thread,
/// outside the scheduler's lock, so a task may schedule or cancel timers.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed on the virtual clock
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Number of timers that have not been cancelled
    pub fn active_timers(&self) -> usize {
        let mut state = self.lock();
        state.timers.retain(|t| !t.token.is_cancelled());
        state.timers.len()
    }

    /// Move the clock forward, running every tick that falls due in order
    ///
    /// Returns the number of task runs.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.lock().now + by;
        let mut runs = 0;

        loop {
            let task = {
                let mut state = self.lock();
                state.timers.retain(|t| !t.token.is_cancelled());
                let due = state
                    .timers
                    .iter_mut()
                    .filter(|t| t.next_due <= target)
                    .min_by_key(|t| t.next_due);
                match due {
                    Some(timer) => {
                        let at = timer.next_due;
                        timer.next_due += timer.period;
                        let task = Arc::clone(&timer.task);
                        state.now = at;
                        task
                    }
                    None => {
                        state.now = target;
                        break;
                    }
                }
            };
            task();
            runs += 1;
        }

        runs
    }

    /// Run every live timer once without moving the clock
    pub fn fire_all(&self) -> usize {
        let tasks: Vec<_> = {
            let mut state = self.lock();
            state.timers.retain(|t| !t.token.is_cancelled());
            state.timers.iter().map(|t| Arc::clone(&t.task)).collect()
        };
        for task in &tasks {
            task();
        }
        tasks.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("timers", &state.timers.len())
            .finish()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_periodic(&self, interval: Duration, task: ScheduledTask) -> TimerHandle {
        let timer = TimerHandle::new();
        let period = interval.max(MIN_PERIOD);
        let mut state = self.lock();
        let next_due = state.now + period;
        state.timers.push(ManualTimer {
            period,
            next_due,
            token: timer.token(),
            task: Arc::from(task),
        });
        timer
    }
}
