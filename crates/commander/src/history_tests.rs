// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn log(scene: &str, started_at_ms: u64) -> SceneExecutionLog {
    SceneExecutionLog {
        scene: scene.to_owned(),
        started_at_ms,
        total_steps: 2,
        successes: 2,
        failures: 0,
        duration_ms: 1500,
        outcome: SceneOutcome::Completed,
        steps: Vec::new(),
    }
}

#[test]
fn recent_is_newest_first() {
    let history = ExecutionHistory::new();
    history.push(log("morning", 1));
    history.push(log("evening", 2));

    let recent = history.recent();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].scene, "evening");
    assert_eq!(recent[1].scene, "morning");
}

#[test]
fn ring_never_exceeds_capacity() {
    let history = ExecutionHistory::new();
    for i in 0..150 {
        history.push(log("scene", i));
    }

    assert_eq!(history.len(), HISTORY_CAP);
    let recent = history.recent();
    assert_eq!(recent[0].started_at_ms, 149);
    assert_eq!(recent[HISTORY_CAP - 1].started_at_ms, 50);
}

#[test]
fn empty_history() {
    let history = ExecutionHistory::new();
    assert!(history.is_empty());
    assert!(history.recent().is_empty());
}
