// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

use crate::frame::encode;
use crate::link::Link;
use crate::shade::Action;
use crate::test_support::{shade_record, FakeLink};

fn setup() -> (Arc<FakeLink>, RetryScheduler) {
    let link = Arc::new(FakeLink::new());
    let scheduler = RetryScheduler::new(Arc::clone(&link) as Arc<dyn Link>);
    (link, scheduler)
}

fn frame_for(shade_id: u32, action: Action) -> crate::frame::TxFrame {
    encode(&shade_record(shade_id), action).expect("configured action")
}

// ---------------------------------------------------------------------------
// Burst scheduling
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn burst_transmits_on_schedule() {
    let (link, scheduler) = setup();
    let origin = Instant::now();

    let task_id = scheduler.enqueue_shade(frame_for(14, Action::Raise));
    assert!(scheduler.wait(&task_id, Duration::from_secs(2)).await);

    assert_eq!(link.offsets_ms(origin), vec![0, 650, 1500]);
    let lines = link.lines();
    assert_eq!(lines.len(), 3);
    assert!(lines.iter().all(|l| l == &lines[0]), "burst frames must be identical");

    let stats = scheduler.stats();
    assert_eq!(stats.total_active_tasks, 0);
    assert!(stats.shade_task_mapping.is_empty());
}

#[tokio::test(start_paused = true)]
async fn burst_continues_past_failed_transmissions() {
    let (link, scheduler) = setup();
    link.fail_with(Some(crate::error::Error::LinkWrite { reason: "io".into() }));

    let task_id = scheduler.enqueue_shade(frame_for(14, Action::Raise));
    tokio::time::sleep(Duration::from_millis(700)).await;
    link.fail_with(None);

    assert!(scheduler.wait(&task_id, Duration::from_secs(2)).await);
    // First two writes failed silently; the third landed.
    assert_eq!(link.lines().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn task_ids_are_unique_and_monotonic() {
    let (_link, scheduler) = setup();
    let a = scheduler.enqueue_shade(frame_for(1, Action::Raise));
    let b = scheduler.enqueue_shade(frame_for(2, Action::Raise));
    assert_ne!(a, b);
    assert!(a.starts_with("t1-"));
    assert!(b.starts_with("t2-"));
}

// ---------------------------------------------------------------------------
// Latest command wins
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn latest_command_wins_for_same_shade() {
    let (link, scheduler) = setup();
    let origin = Instant::now();

    let raise_id = scheduler.enqueue_shade(frame_for(30, Action::Raise));
    tokio::time::sleep(Duration::from_millis(5)).await;
    let lower_id = scheduler.enqueue_shade(frame_for(30, Action::Lower));

    tokio::time::sleep(Duration::from_millis(195)).await;
    let stats = scheduler.stats();
    assert_eq!(stats.total_active_tasks, 1);
    assert_eq!(stats.shade_task_mapping.get(&30), Some(&lower_id));
    assert!(!scheduler.cancel_task(&raise_id), "displaced task must already be gone");

    assert!(scheduler.wait(&lower_id, Duration::from_secs(2)).await);

    // The raise burst issued only its immediate transmission; every later
    // write belongs to the lower burst.
    let lower_line = frame_for(30, Action::Lower).as_line().to_owned();
    let lines = link.lines();
    assert_eq!(lines.len(), 4);
    assert_ne!(lines[0], lower_line);
    assert!(lines[1..].iter().all(|l| l == &lower_line));
    assert_eq!(link.offsets_ms(origin), vec![0, 5, 655, 1505]);

    let stats = scheduler.stats();
    assert_eq!(stats.total_cancelled_tasks, 1);
    assert!(stats.shade_task_mapping.is_empty());
}

#[tokio::test(start_paused = true)]
async fn commands_for_distinct_shades_run_independently() {
    let (link, scheduler) = setup();

    let a = scheduler.enqueue_shade(frame_for(1, Action::Raise));
    let b = scheduler.enqueue_shade(frame_for(2, Action::Lower));

    assert!(scheduler.wait(&a, Duration::from_secs(2)).await);
    assert!(scheduler.wait(&b, Duration::from_secs(2)).await);
    assert_eq!(link.lines().len(), 6);
    assert_eq!(scheduler.stats().total_cancelled_tasks, 0);
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn cancel_shade_stops_remaining_transmissions() {
    let (link, scheduler) = setup();

    let task_id = scheduler.enqueue_shade(frame_for(14, Action::Raise));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(scheduler.cancel_shade(14));
    assert!(scheduler.wait(&task_id, Duration::from_millis(100)).await);

    assert_eq!(link.lines().len(), 1);
    assert!(!scheduler.cancel_shade(14), "no owner left to cancel");
}

#[tokio::test(start_paused = true)]
async fn cancel_all_clears_every_task() {
    let (_link, scheduler) = setup();

    let a = scheduler.enqueue_shade(frame_for(1, Action::Raise));
    let b = scheduler.enqueue_shade(frame_for(2, Action::Raise));
    assert_eq!(scheduler.cancel_all(), 2);

    assert!(scheduler.wait(&a, Duration::from_millis(100)).await);
    assert!(scheduler.wait(&b, Duration::from_millis(100)).await);
    let stats = scheduler.stats();
    assert_eq!(stats.total_active_tasks, 0);
    assert!(stats.shade_task_mapping.is_empty());
}

#[tokio::test(start_paused = true)]
async fn wait_on_unknown_task_returns_immediately() {
    let (_link, scheduler) = setup();
    assert!(scheduler.wait("t99-0", Duration::from_millis(10)).await);
}

// ---------------------------------------------------------------------------
// Zombie detection
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn stuck_burst_is_flagged_then_killed_by_deadline() {
    let (link, scheduler) = setup();
    link.set_delay(Duration::from_secs(3600));

    let task_id = scheduler.enqueue_shade(frame_for(14, Action::Raise));

    tokio::time::advance(Duration::from_secs(7)).await;
    scheduler.sweep_now();
    let stats = scheduler.stats();
    assert_eq!(stats.zombie.detected, 1);
    assert_eq!(stats.active_zombie_warnings, 1);
    assert_eq!(stats.suspicious_tasks.len(), 1);

    // The in-task deadline fires at 10 s and releases everything.
    tokio::time::advance(Duration::from_secs(4)).await;
    assert!(scheduler.wait(&task_id, Duration::from_millis(100)).await);
    let stats = scheduler.stats();
    assert_eq!(stats.zombie.timeout_kills, 1);
    assert_eq!(stats.total_active_tasks, 0);
    assert_eq!(stats.active_zombie_warnings, 0);
}

#[tokio::test(start_paused = true)]
async fn sweep_force_cancels_overdue_scene_task() {
    let (_link, scheduler) = setup();

    let ticket = scheduler.register_scene("stuck", Duration::from_secs(1));
    let task_id = ticket.task_id.clone();
    let cancel = ticket.cancel.clone();
    let handle = tokio::spawn(async move {
        let _release = ticket.release;
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(Duration::from_secs(3600)) => {}
        }
    });
    scheduler.attach_abort(&task_id, handle.abort_handle());

    tokio::time::advance(Duration::from_secs(7)).await;
    scheduler.sweep_now();

    assert!(scheduler.wait(&task_id, Duration::from_millis(100)).await);
    let stats = scheduler.stats();
    assert_eq!(stats.zombie.cleaned, 1);
    assert_eq!(stats.total_active_tasks, 0);
}

#[tokio::test(start_paused = true)]
async fn sweep_leaves_healthy_scene_task_alone() {
    let (_link, scheduler) = setup();

    let ticket = scheduler.register_scene("long", Duration::from_secs(120));
    let task_id = ticket.task_id.clone();
    let cancel = ticket.cancel.clone();
    tokio::spawn(async move {
        let _release = ticket.release;
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(Duration::from_secs(30)) => {}
        }
    });

    // Well past the burst thresholds but inside the scene's own deadline.
    tokio::time::advance(Duration::from_secs(20)).await;
    scheduler.sweep_now();
    let stats = scheduler.stats();
    assert_eq!(stats.zombie.detected, 0);
    assert_eq!(stats.zombie.cleaned, 0);

    assert!(scheduler.wait(&task_id, Duration::from_secs(15)).await);
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn stats_reflect_registered_work() {
    let (link, scheduler) = setup();
    link.set_delay(Duration::from_secs(3600));

    let task_id = scheduler.enqueue_shade(frame_for(5, Action::Stop));
    let stats = scheduler.stats();
    assert_eq!(stats.total_active_tasks, 1);
    assert_eq!(stats.active_shade_tasks, 1);
    assert_eq!(stats.active_task_ids, vec![task_id.clone()]);
    assert_eq!(stats.shade_task_mapping.get(&5), Some(&task_id));

    scheduler.cancel_task(&task_id);
    assert!(scheduler.wait(&task_id, Duration::from_millis(100)).await);
    let stats = scheduler.stats();
    assert_eq!(stats.total_cancelled_tasks, 1);
    assert_eq!(stats.recent_cancellations, 1);
}
