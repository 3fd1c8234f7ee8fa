//! Periodic polling of the contract.
//!
//! One tokio task per scheduler. Ticks run strictly one after another: a tick
//! that comes due while the previous fetch is still pending is skipped, not
//! queued. Failed ticks are logged and published on the status channel; the
//! next attempt is the next natural tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use chrono::Utc;
use timestore_common::message::StoredMessage;
use timestore_common::schedule::RefreshSchedule;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::contract::{ContractClient, FetchError};
use crate::provider::Provider;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("poll interval must be at least one minute")]
    ZeroInterval,
}

/// What the scheduler has done so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollStatus {
    pub schedule: RefreshSchedule,
    /// Completed ticks, failed ones included.
    pub ticks: u64,
    /// Ticks dropped because they came due while a fetch was pending.
    pub skipped: u64,
    /// Error from the most recent tick, if it failed.
    pub last_error: Option<FetchError>,
}

pub struct PollScheduler;

impl PollScheduler {
    /// Start polling `client` every `interval_minutes`, first tick now.
    ///
    /// `on_tick` receives each successful result with placeholders removed.
    /// It may stop the scheduler itself through a shared [`PollHandle`].
    /// Must be called from within a tokio runtime.
    pub fn start<P, F>(
        client: Arc<ContractClient<P>>,
        interval_minutes: u32,
        on_tick: F,
    ) -> Result<PollHandle, ScheduleError>
    where
        P: Provider,
        F: FnMut(Vec<StoredMessage>) + Send + 'static,
    {
        if interval_minutes == 0 {
            return Err(ScheduleError::ZeroInterval);
        }

        let run = Arc::new(RunState {
            running: AtomicBool::new(true),
            delivery: Mutex::new(()),
            delivering_thread: Mutex::new(None),
        });
        let (status_tx, status_rx) = watch::channel(PollStatus {
            schedule: RefreshSchedule {
                interval_minutes,
                next_refresh_at: Utc::now(),
            },
            ticks: 0,
            skipped: 0,
            last_error: None,
        });

        let task = tokio::spawn(poll_loop(
            client,
            interval_minutes,
            on_tick,
            run.clone(),
            status_tx,
        ));

        Ok(PollHandle {
            run,
            task: Some(task),
            status: status_rx,
        })
    }

    /// Same as [`PollHandle::stop`].
    pub fn stop(handle: &mut PollHandle) {
        handle.stop();
    }
}

/// Shared between the loop and its handle.
struct RunState {
    running: AtomicBool,
    /// Held for the whole of each delivery.
    delivery: Mutex<()>,
    /// Thread currently running `on_tick`, if any.
    delivering_thread: Mutex<Option<ThreadId>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RunState {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn set_delivering(&self, thread: Option<ThreadId>) {
        *lock(&self.delivering_thread) = thread;
    }

    /// Stop and wait out any delivery in progress on another thread.
    fn halt(&self) {
        self.running.store(false, Ordering::SeqCst);
        let current = thread::current().id();
        if *lock(&self.delivering_thread) != Some(current) {
            drop(lock(&self.delivery));
        }
    }
}

/// First deadline of the tick grid that will actually run a fetch, given
/// the tick that fired at `due` and a fetch that ended at `now`. Deadlines
/// that passed during the fetch are skipped.
fn next_deadline(due: Instant, period: Duration, now: Instant) -> Instant {
    let next = due + period;
    if now <= next {
        return next;
    }
    let behind = (now - next).as_nanos() % period.as_nanos();
    now + period - Duration::from_nanos(behind as u64)
}

fn schedule_for(deadline: Instant, interval_minutes: u32) -> RefreshSchedule {
    let wait = deadline.saturating_duration_since(Instant::now());
    RefreshSchedule {
        interval_minutes,
        next_refresh_at: Utc::now()
            + chrono::Duration::from_std(wait).unwrap_or(chrono::Duration::zero()),
    }
}

async fn poll_loop<P, F>(
    client: Arc<ContractClient<P>>,
    interval_minutes: u32,
    mut on_tick: F,
    run: Arc<RunState>,
    status: watch::Sender<PollStatus>,
) where
    P: Provider,
    F: FnMut(Vec<StoredMessage>) + Send + 'static,
{
    let period = Duration::from_secs(u64::from(interval_minutes) * 60);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_fetch_end: Option<Instant> = None;

    loop {
        let due = interval.tick().await;
        if !run.is_running() {
            break;
        }
        if last_fetch_end.is_some_and(|end| due < end) {
            debug!("skipping tick that came due during the previous fetch");
            status.send_modify(|s| s.skipped += 1);
            continue;
        }

        let result = client.fetch_unlocked().await;
        let end = Instant::now();
        last_fetch_end = Some(end);
        let schedule = schedule_for(next_deadline(due, period, end), interval_minutes);

        {
            // Held while delivering so stop() from another thread cannot
            // return mid-delivery.
            let _delivery = lock(&run.delivery);
            if !run.is_running() {
                break;
            }
            run.set_delivering(Some(thread::current().id()));
            match result {
                Ok(messages) => {
                    debug!(count = messages.len(), "poll tick");
                    on_tick(messages);
                    status.send_modify(|s| {
                        s.schedule = schedule;
                        s.ticks += 1;
                        s.last_error = None;
                    });
                }
                Err(e) => {
                    warn!(error = %e, "poll tick failed, waiting for next tick");
                    status.send_modify(|s| {
                        s.schedule = schedule;
                        s.ticks += 1;
                        s.last_error = Some(e);
                    });
                }
            }
            run.set_delivering(None);
        }
    }
    debug!("poll loop stopped");
}

/// Owns a running scheduler. Dropping it stops polling.
pub struct PollHandle {
    run: Arc<RunState>,
    task: Option<JoinHandle<()>>,
    status: watch::Receiver<PollStatus>,
}

impl PollHandle {
    /// Stop polling. Once this returns `on_tick` is never called again and
    /// the task is cancelled at its next await, abandoning any pending
    /// fetch. Calling it again does nothing.
    ///
    /// Called from inside `on_tick`, the current delivery finishes and no
    /// further tick runs.
    pub fn stop(&mut self) {
        self.run.halt();
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("poll scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn status(&self) -> PollStatus {
        self.status.borrow().clone()
    }

    pub fn schedule(&self) -> RefreshSchedule {
        self.status.borrow().schedule
    }

    /// Receiver that observes every status change.
    pub fn subscribe(&self) -> watch::Receiver<PollStatus> {
        self.status.clone()
    }
}

impl std::fmt::Debug for PollHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollHandle")
            .field("running", &self.is_running())
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
