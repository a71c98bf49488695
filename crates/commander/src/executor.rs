// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scene executor: runs scenes as background tasks under the scheduler's
//! cancellation model.
//!
//! A queued scene cancels any previously running scene (latest scene wins)
//! and then cycles over its steps. Each step claims its shade in the shared
//! ownership map for the duration of one single-shot transmission, so an
//! individual shade command can win that shade back mid-scene while the
//! scene keeps running its remaining steps and cycles.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::directory::ShadeDirectory;
use crate::error::Error;
use crate::frame;
use crate::history::{ExecutionHistory, SceneExecutionLog, SceneOutcome, StepOutcome};
use crate::link::Link;
use crate::scene::{SceneDefinition, SceneStore, MAX_RETRY_COUNT, MAX_TIMEOUT_SECS};
use crate::scheduler::{epoch_ms, RetryScheduler, SceneTicket};

/// Pause between scene cycles.
const CYCLE_GAP: Duration = Duration::from_secs(2);

/// Per-call overrides for scene execution, bounded to the same ranges as the
/// scene definition fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct SceneOverrides {
    pub retry_count: Option<u32>,
    pub timeout_seconds: Option<u64>,
}

/// One planned transmission in a dry run or receipt.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedStep {
    pub shade_id: u32,
    pub action: crate::shade::Action,
    pub delay_ms: u64,
}

/// Immediate response to queuing a scene.
#[derive(Debug, Clone, Serialize)]
pub struct SceneReceipt {
    pub accepted: bool,
    pub scene: String,
    pub task_id: String,
    pub cycles: u32,
    pub timeout_seconds: u64,
    pub planned_steps: Vec<PlannedStep>,
}

/// Dry-run result: what would be executed, without enqueuing anything.
#[derive(Debug, Clone, Serialize)]
pub struct ScenePlan {
    pub scene: String,
    pub cycles: u32,
    pub timeout_seconds: u64,
    pub planned_steps: Vec<PlannedStep>,
    pub estimated_duration_ms: u64,
}

struct ExecInner {
    directory: Arc<dyn ShadeDirectory>,
    link: Arc<dyn Link>,
    scheduler: RetryScheduler,
    history: Arc<ExecutionHistory>,
}

/// Loads scene definitions and queues them as background tasks.
pub struct SceneExecutor {
    store: SceneStore,
    inner: Arc<ExecInner>,
}

impl SceneExecutor {
    pub fn new(
        store: SceneStore,
        directory: Arc<dyn ShadeDirectory>,
        link: Arc<dyn Link>,
        scheduler: RetryScheduler,
        history: Arc<ExecutionHistory>,
    ) -> Self {
        Self {
            store,
            inner: Arc::new(ExecInner { directory, link, scheduler, history }),
        }
    }

    pub fn store(&self) -> &SceneStore {
        &self.store
    }

    /// Compute the plan for a scene without enqueuing it.
    pub fn plan(&self, name: &str, overrides: &SceneOverrides) -> Result<ScenePlan, Error> {
        let scene = self.store.load(name)?;
        let (cycles, timeout_seconds) = resolve_overrides(&scene, overrides);
        Ok(ScenePlan {
            scene: name.to_owned(),
            cycles,
            timeout_seconds,
            planned_steps: planned_steps(&scene),
            estimated_duration_ms: scene.estimated_duration_ms(),
        })
    }

    /// Queue a scene for background execution, cancelling any running scene.
    /// Returns immediately once the task is registered.
    pub fn enqueue(&self, name: &str, overrides: &SceneOverrides) -> Result<SceneReceipt, Error> {
        let scene = self.store.load(name)?;
        let (cycles, timeout_seconds) = resolve_overrides(&scene, overrides);
        let deadline = Duration::from_secs(timeout_seconds);

        let displaced = self.inner.scheduler.cancel_scenes();
        if displaced > 0 {
            info!(scene = name, displaced, "latest scene wins, cancelled running scene tasks");
        }

        let ticket = self.inner.scheduler.register_scene(name, deadline);
        let task_id = ticket.task_id.clone();
        let receipt = SceneReceipt {
            accepted: true,
            scene: name.to_owned(),
            task_id: task_id.clone(),
            cycles,
            timeout_seconds,
            planned_steps: planned_steps(&scene),
        };

        let inner = Arc::clone(&self.inner);
        let scene_name = name.to_owned();
        let handle = tokio::spawn(run_scene(inner, ticket, scene_name, scene, cycles, deadline));
        self.inner.scheduler.attach_abort(&task_id, handle.abort_handle());

        info!(scene = name, task = %task_id, cycles, timeout_seconds, "queued scene for background execution");
        Ok(receipt)
    }

    /// Recent scene execution logs, newest first.
    pub fn history(&self) -> Vec<SceneExecutionLog> {
        self.inner.history.recent()
    }
}

fn resolve_overrides(scene: &SceneDefinition, overrides: &SceneOverrides) -> (u32, u64) {
    let retries = overrides
        .retry_count
        .unwrap_or(scene.retry_count)
        .min(MAX_RETRY_COUNT);
    let timeout = overrides
        .timeout_seconds
        .unwrap_or(scene.timeout_seconds)
        .clamp(1, MAX_TIMEOUT_SECS);
    (retries + 1, timeout)
}

fn planned_steps(scene: &SceneDefinition) -> Vec<PlannedStep> {
    scene
        .commands
        .iter()
        .map(|c| PlannedStep { shade_id: c.shade_id, action: c.action, delay_ms: c.delay_ms })
        .collect()
}

async fn run_scene(
    inner: Arc<ExecInner>,
    ticket: SceneTicket,
    name: String,
    scene: SceneDefinition,
    cycles: u32,
    deadline: Duration,
) {
    let task_id = ticket.task_id.clone();
    let _release = ticket.release;
    let started = Instant::now();
    let started_at_ms = epoch_ms();
    let steps: Arc<Mutex<Vec<StepOutcome>>> = Arc::new(Mutex::new(Vec::new()));

    info!(scene = %name, task = %task_id, cycles, "scene execution started");

    let outcome = tokio::select! {
        _ = ticket.cancel.cancelled() => {
            info!(scene = %name, task = %task_id, "scene cancelled");
            SceneOutcome::Cancelled
        }
        res = tokio::time::timeout(
            deadline,
            run_cycles(&inner, &task_id, &name, &scene, cycles, &steps),
        ) => match res {
            Ok(()) => {
                info!(scene = %name, task = %task_id, cycles, "scene completed all cycles");
                SceneOutcome::Completed
            }
            Err(_) => {
                warn!(
                    scene = %name,
                    task = %task_id,
                    timeout_secs = deadline.as_secs(),
                    "scene timed out"
                );
                SceneOutcome::TimedOut
            }
        },
    };

    let steps = steps.lock().clone();
    let successes = steps.iter().filter(|s| s.ok).count();
    let failures = steps.len() - successes;
    inner.history.push(SceneExecutionLog {
        scene: name,
        started_at_ms,
        total_steps: steps.len(),
        successes,
        failures,
        duration_ms: started.elapsed().as_millis() as u64,
        outcome,
        steps,
    });
}

async fn run_cycles(
    inner: &Arc<ExecInner>,
    task_id: &str,
    name: &str,
    scene: &SceneDefinition,
    cycles: u32,
    steps: &Arc<Mutex<Vec<StepOutcome>>>,
) {
    let last = scene.commands.len() - 1;
    for cycle in 1..=cycles {
        info!(scene = %name, cycle, cycles, "scene cycle");
        for (i, step) in scene.commands.iter().enumerate() {
            // Claim the shade only around the transmission itself; a
            // concurrent single-shade command can seize it back between
            // steps without touching this task.
            inner.scheduler.claim_shade(step.shade_id, task_id);
            let (ok, detail) = single_shot(inner, step.shade_id, step.action).await;
            inner.scheduler.release_shade(step.shade_id, task_id);

            steps.lock().push(StepOutcome {
                shade_id: step.shade_id,
                action: step.action,
                cycle,
                ok,
                detail,
            });

            if i < last && step.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(step.delay_ms)).await;
            }
        }
        if cycle < cycles {
            tokio::time::sleep(CYCLE_GAP).await;
        }
    }
}

/// One transmission, no retries; repetition comes from the scene's cycles.
async fn single_shot(
    inner: &Arc<ExecInner>,
    shade_id: u32,
    action: crate::shade::Action,
) -> (bool, String) {
    let record = match inner.directory.lookup(shade_id) {
        Ok(r) => r,
        Err(e) => {
            warn!(shade_id, err = %e, "scene step lookup failed");
            return (false, e.to_string());
        }
    };
    let frame = match frame::encode(&record, action) {
        Ok(f) => f,
        Err(e) => {
            warn!(shade_id, err = %e, "scene step not encodable");
            return (false, e.to_string());
        }
    };
    match inner.link.send_line(frame.as_line(), Duration::ZERO).await {
        Ok(_) => {
            debug!(shade_id, %action, "scene single-shot sent");
            (true, "sent".to_owned())
        }
        Err(e) => {
            // Silent failure: logged and recorded, never surfaced.
            debug!(shade_id, %action, err = %e, "scene single-shot failed");
            (false, e.to_string())
        }
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
