//! Debounced trigger deciding when a submission attempt runs.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

/// Work run by every trigger.
pub type SubmissionCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

enum TimerState {
    Idle,
    Armed(CancellationToken),
    Triggering,
}

/// Runs the submission callback at most `max_delay` after the first unacknowledged
/// activity, or immediately on [`SubmissionTimer::trigger`].
///
/// The timer is anchored to the first [`SubmissionTimer::notify_active`] call: later
/// calls while armed do not push it back.
pub struct SubmissionTimer {
    max_delay: Duration,
    callback: SubmissionCallback,
    state: Mutex<TimerState>,
    trigger_lock: tokio::sync::Mutex<()>,
    completed: watch::Sender<u64>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl SubmissionTimer {
    pub fn new(
        max_delay: Duration,
        callback: SubmissionCallback,
        tracker: TaskTracker,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let (completed, _) = watch::channel(0);
        Arc::new(Self {
            max_delay,
            callback,
            state: Mutex::new(TimerState::Idle),
            trigger_lock: tokio::sync::Mutex::new(()),
            completed,
            tracker,
            shutdown,
        })
    }

    /// Arms the timer if it is idle. Does nothing while armed or triggering.
    pub fn notify_active(self: &Arc<Self>) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let mut state = self.state();
        if !matches!(*state, TimerState::Idle) {
            return;
        }

        let token = self.shutdown.child_token();
        *state = TimerState::Armed(token.clone());
        drop(state);

        debug!(delay_ms = self.max_delay.as_millis() as u64, "Submission timer armed");
        let timer = Arc::clone(self);
        self.tracker.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timer.max_delay) => timer.trigger().await,
            }
        });
    }

    /// Cancels any pending timer, runs the callback to completion and wakes waiters.
    /// Concurrent triggers run one after the other.
    pub async fn trigger(self: &Arc<Self>) {
        self.enter_triggering();
        let _serialized = self.trigger_lock.lock().await;
        self.enter_triggering();

        (self.callback)().await;

        {
            let mut state = self.state();
            if matches!(*state, TimerState::Triggering) {
                *state = TimerState::Idle;
            }
        }
        self.completed.send_modify(|count| *count += 1);
    }

    /// Starts a trigger in the background unless one is already running. Returns whether
    /// a trigger was started.
    pub fn trigger_soon(self: &Arc<Self>) -> bool {
        {
            let mut state = self.state();
            match &*state {
                TimerState::Triggering => return false,
                TimerState::Armed(token) => token.cancel(),
                TimerState::Idle => {}
            }
            *state = TimerState::Triggering;
        }
        let timer = Arc::clone(self);
        self.tracker.spawn(async move { timer.trigger().await });
        true
    }

    /// Cancels a pending timer without running the callback.
    pub fn clear(&self) {
        let mut state = self.state();
        if let TimerState::Armed(token) = &*state {
            token.cancel();
            *state = TimerState::Idle;
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(*self.state(), TimerState::Armed(_))
    }

    pub fn completed_submissions(&self) -> u64 {
        *self.completed.borrow()
    }

    /// Resolves once at least `count` triggers have completed.
    pub async fn wait_for_completed_submissions(&self, count: u64) {
        let mut receiver = self.completed.subscribe();
        // The sender lives as long as `self`, so this cannot fail while we are borrowed.
        let _ = receiver.wait_for(|completed| *completed >= count).await;
    }

    fn enter_triggering(&self) {
        let mut state = self.state();
        if let TimerState::Armed(token) = &*state {
            token.cancel();
        }
        *state = TimerState::Triggering;
    }

    fn state(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
