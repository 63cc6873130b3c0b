//! Poll timers
//!
//! A [`Scheduler`] owns at most one repeating timer per job id. Starting a
//! timer for a job that already has one replaces it, and [`Scheduler::stop`]
//! is the single cancellation entry point.
//!
//! [`TokioScheduler`] runs each timer as a tokio task. The tick future is
//! awaited inline, so a tick never starts while the previous one is still
//! waiting on the network; ticks that fall due meanwhile are skipped.

use crate::jobs::JobId;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// What the timer does after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    /// Keep ticking
    Continue,
    /// Disarm the timer
    Stop,
}

/// Callback run on every tick
pub type TickFn = Arc<dyn Fn() -> BoxFuture<'static, TickControl> + Send + Sync>;

/// Timer seam; tests drive it with tokio's paused clock
pub trait Scheduler: Send + Sync {
    /// Arm a timer for `job_id`, replacing any existing one. The first tick
    /// fires one `interval` after the call.
    fn start(&self, job_id: &JobId, interval: Duration, on_tick: TickFn);

    /// Disarm the timer. Returns false if none was armed.
    fn stop(&self, job_id: &JobId) -> bool;

    fn is_active(&self, job_id: &JobId) -> bool;

    fn active_count(&self) -> usize;
}

struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

type Timers = Arc<Mutex<HashMap<JobId, Timer>>>;

/// [`Scheduler`] backed by tokio tasks
#[derive(Default)]
pub struct TokioScheduler {
    timers: Timers,
    next_generation: AtomicU64,
}

impl fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("active", &self.active_count())
            .finish()
    }
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock(timers: &Timers) -> std::sync::MutexGuard<'_, HashMap<JobId, Timer>> {
    timers.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Scheduler for TokioScheduler {
    fn start(&self, job_id: &JobId, interval: Duration, on_tick: TickFn) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("Cannot arm poll timer for job {}: {}", job_id, e);
                return;
            }
        };

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(&self.timers);
        let id = job_id.clone();

        // Insert under the lock so the driver's own cleanup cannot run first
        let mut active = lock(&self.timers);
        if let Some(previous) = active.remove(job_id) {
            debug!("Replacing poll timer for job {}", job_id);
            previous.handle.abort();
        }

        let handle = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if on_tick().await == TickControl::Stop {
                    break;
                }
            }

            let mut active = lock(&timers);
            if active.get(&id).is_some_and(|t| t.generation == generation) {
                active.remove(&id);
                debug!("Poll timer for job {} disarmed", id);
            }
        });

        active.insert(job_id.clone(), Timer { generation, handle });
        debug!("Poll timer armed for job {} every {:?}", job_id, interval);
    }

    fn stop(&self, job_id: &JobId) -> bool {
        match lock(&self.timers).remove(job_id) {
            Some(timer) => {
                timer.handle.abort();
                debug!("Poll timer for job {} stopped", job_id);
                true
            }
            None => false,
        }
    }

    fn is_active(&self, job_id: &JobId) -> bool {
        lock(&self.timers).contains_key(job_id)
    }

    fn active_count(&self) -> usize {
        lock(&self.timers).len()
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, timer) in lock(&self.timers).drain() {
            timer.handle.abort();
        }
    }
}
