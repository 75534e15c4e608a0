//! One-shot timers for session expiry handling.
//!
//! The controller never sleeps itself. It asks a `Scheduler` to deliver a
//! `Timer` at some instant and cancels it again when the session changes.
//! Delivery happens as a `SessionEvent::Timer` that the hosting event loop
//! hands back to `SessionController::handle`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};
use super::session::SessionEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Announce that the session is about to expire.
    Warn,
    /// End the session.
    Expire,
}

/// A timer payload. `generation` ties it to the session that scheduled it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    pub kind: TimerKind,
    pub generation: u64,
}

pub trait Scheduler {
    /// Deliver `timer` at `at`. Instants in the past fire as soon as possible.
    fn schedule(&mut self, at: DateTime<Utc>, timer: Timer) -> TimerId;

    /// Cancel a pending timer. Unknown or already fired ids are ignored.
    fn cancel(&mut self, id: TimerId);
}

// ============================================================================
// Tokio
// ============================================================================

/// Spawns one sleeping task per timer and sends `SessionEvent::Timer` on a
/// channel when it wakes.
pub struct TokioScheduler<C: Clock = SystemClock> {
    tx: mpsc::UnboundedSender<SessionEvent>,
    clock: C,
    tasks: HashMap<TimerId, JoinHandle<()>>,
    next_id: u64,
}

impl TokioScheduler<SystemClock> {
    pub fn new(tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self::with_clock(tx, SystemClock)
    }
}

impl<C: Clock> TokioScheduler<C> {
    pub fn with_clock(tx: mpsc::UnboundedSender<SessionEvent>, clock: C) -> Self {
        Self {
            tx,
            clock,
            tasks: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn pending(&self) -> usize {
        self.tasks.values().filter(|task| !task.is_finished()).count()
    }
}

impl<C: Clock> Scheduler for TokioScheduler<C> {
    fn schedule(&mut self, at: DateTime<Utc>, timer: Timer) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);

        // Forget timers that already fired
        self.tasks.retain(|_, task| !task.is_finished());

        let delay = (at - self.clock.now()).to_std().unwrap_or_default();

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                // Without a runtime the poll and resume checks still apply
                warn!(error = %e, kind = ?timer.kind, "No async runtime, timer will not fire");
                return id;
            }
        };

        let tx = self.tx.clone();
        let task = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(SessionEvent::Timer(timer)).is_err() {
                debug!(kind = ?timer.kind, "Timer fired after receiver closed");
            }
        });

        debug!(?id, kind = ?timer.kind, delay_ms = delay.as_millis() as u64, "Timer scheduled");
        self.tasks.insert(id, task);
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(task) = self.tasks.remove(&id) {
            task.abort();
            debug!(?id, "Timer cancelled");
        }
    }
}

impl<C: Clock> Drop for TokioScheduler<C> {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

// ============================================================================
// Manual
// ============================================================================

#[derive(Debug, Default)]
struct ManualTimers {
    pending: Vec<(TimerId, DateTime<Utc>, Timer)>,
    next_id: u64,
}

/// Records timers and releases them only when asked. Clones share state, so
/// a test can keep one handle while the controller owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    inner: Arc<Mutex<ManualTimers>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return every timer due at `now`, earliest first.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<Timer> {
        let mut inner = self.lock();
        let mut due: Vec<_> = Vec::new();
        inner.pending.retain(|&(_, at, timer)| {
            if at <= now {
                due.push((at, timer));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|&(at, _)| at);
        due.into_iter().map(|(_, timer)| timer).collect()
    }

    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Deadline of the pending timer of `kind`, if any.
    pub fn deadline(&self, kind: TimerKind) -> Option<DateTime<Utc>> {
        self.lock()
            .pending
            .iter()
            .find(|(_, _, timer)| timer.kind == kind)
            .map(|&(_, at, _)| at)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualTimers> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, at: DateTime<Utc>, timer: Timer) -> TimerId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = TimerId(inner.next_id);
        inner.pending.push((id, at, timer));
        id
    }

    fn cancel(&mut self, id: TimerId) {
        self.lock().pending.retain(|(pending, _, _)| *pending != id);
    }
}
