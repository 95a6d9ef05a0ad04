use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use rstest::*;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::scheduler::{SubmissionCallback, SubmissionTimer};

const MAX_DELAY: Duration = Duration::from_millis(1000);

struct Harness {
    timer: Arc<SubmissionTimer>,
    calls: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

#[fixture]
fn harness() -> Harness {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let callback: SubmissionCallback = Arc::new(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        .boxed()
    });
    let shutdown = CancellationToken::new();
    let timer = SubmissionTimer::new(MAX_DELAY, callback, TaskTracker::new(), shutdown.clone());
    Harness { timer, calls, shutdown }
}

/// Lets spawned timer tasks run up to their next await point.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn notify_fires_after_exactly_max_delay(harness: Harness) {
    harness.timer.notify_active();
    settle().await;
    assert!(harness.timer.is_armed());

    tokio::time::advance(MAX_DELAY - Duration::from_millis(1)).await;
    settle().await;
    assert_eq!(harness.calls.load(Ordering::SeqCst), 0);

    tokio::time::advance(Duration::from_millis(1)).await;
    harness.timer.wait_for_completed_submissions(1).await;
    assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
    assert!(!harness.timer.is_armed());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn repeated_notify_does_not_push_the_timer_back(harness: Harness) {
    harness.timer.notify_active();
    settle().await;
    tokio::time::advance(Duration::from_millis(600)).await;
    harness.timer.notify_active();
    settle().await;

    tokio::time::advance(Duration::from_millis(400)).await;
    harness.timer.wait_for_completed_submissions(1).await;
    assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn clear_cancels_a_pending_timer(harness: Harness) {
    harness.timer.notify_active();
    settle().await;
    harness.timer.clear();

    tokio::time::advance(MAX_DELAY * 3).await;
    settle().await;
    assert_eq!(harness.calls.load(Ordering::SeqCst), 0);
    assert!(!harness.timer.is_armed());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn trigger_runs_now_and_disarms(harness: Harness) {
    harness.timer.notify_active();
    settle().await;

    harness.timer.trigger().await;
    assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.timer.completed_submissions(), 1);

    tokio::time::advance(MAX_DELAY * 2).await;
    settle().await;
    assert_eq!(harness.calls.load(Ordering::SeqCst), 1);

    harness.timer.notify_active();
    settle().await;
    assert!(harness.timer.is_armed());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn trigger_soon_runs_in_the_background(harness: Harness) {
    assert!(harness.timer.trigger_soon());
    harness.timer.wait_for_completed_submissions(1).await;
    assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn nothing_is_armed_after_shutdown(harness: Harness) {
    harness.shutdown.cancel();
    harness.timer.notify_active();
    assert!(!harness.timer.is_armed());
}
