// src/heartbeat/scheduler_tests.rs

use super::*;
use crate::timer::VirtualTimerService;
use std::sync::atomic::{AtomicU32, Ordering};

#[tokio::test]
async fn rescheduling_check_cancels_prior_timer() {
    let timer = Arc::new(VirtualTimerService::new());
    let scheduler = HeartbeatScheduler::new(timer.clone());
    let task_id = "task-1".to_string();

    let count_a = Arc::new(AtomicU32::new(0));
    let count_a_cb = count_a.clone();
    scheduler
        .schedule_checks(&task_id, 10, move || {
            let count_a_cb = count_a_cb.clone();
            async move {
                count_a_cb.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

    timer.advance(15).await;
    assert_eq!(count_a.load(Ordering::SeqCst), 1);

    let count_b = Arc::new(AtomicU32::new(0));
    let count_b_cb = count_b.clone();
    scheduler
        .schedule_checks(&task_id, 10, move || {
            let count_b_cb = count_b_cb.clone();
            async move {
                count_b_cb.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

    timer.advance(25).await;
    // The first callback must never fire again after being replaced.
    assert_eq!(count_a.load(Ordering::SeqCst), 1);
    assert!(count_b.load(Ordering::SeqCst) >= 1);
    assert_eq!(scheduler.stats().active_checks, 1);
}

#[tokio::test]
async fn cancel_all_removes_every_timer_for_task() {
    let timer = Arc::new(VirtualTimerService::new());
    let scheduler = HeartbeatScheduler::new(timer.clone());
    let task_id = "task-2".to_string();

    scheduler.schedule_checks(&task_id, 10, || async {}).await;
    scheduler.schedule_timeout(&task_id, 100, || async {}).await;
    scheduler.schedule_progress_reporting(&task_id, 5, || async {}).await;

    let stats = scheduler.stats();
    assert_eq!(stats.active_checks, 1);
    assert_eq!(stats.active_timeouts, 1);
    assert_eq!(stats.active_progress_reporters, 1);

    scheduler.cancel_all(&task_id).await;
    let stats = scheduler.stats();
    assert_eq!(stats.active_checks, 0);
    assert_eq!(stats.active_timeouts, 0);
    assert_eq!(stats.active_progress_reporters, 0);
}

#[tokio::test]
async fn cancel_all_is_idempotent() {
    let timer = Arc::new(VirtualTimerService::new());
    let scheduler = HeartbeatScheduler::new(timer.clone());
    let task_id = "task-3".to_string();

    scheduler.schedule_checks(&task_id, 10, || async {}).await;
    scheduler.cancel_all(&task_id).await;
    scheduler.cancel_all(&task_id).await;
    scheduler.cancel_all(&task_id).await;

    assert_eq!(scheduler.stats().active_checks, 0);
}

#[tokio::test]
async fn cancel_all_tasks_clears_every_registry() {
    let timer = Arc::new(VirtualTimerService::new());
    let scheduler = HeartbeatScheduler::new(timer.clone());

    for i in 0..5 {
        let id = format!("task-{i}");
        scheduler.schedule_checks(&id, 10, || async {}).await;
        scheduler.schedule_timeout(&id, 50, || async {}).await;
    }

    scheduler.cancel_all_tasks().await;
    let stats = scheduler.stats();
    assert_eq!(stats.active_checks, 0);
    assert_eq!(stats.active_timeouts, 0);
}
