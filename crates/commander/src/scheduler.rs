// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry scheduler: owns all in-flight background transmission tasks.
//!
//! Single-shade commands run as fire-and-forget bursts; scene tasks register
//! here too so both share one shade-ownership map. Latest command wins: a
//! new command for a shade displaces whatever currently owns that shade.
//! Every task deregisters itself through a drop guard on any exit path, and
//! a periodic sweep force-cancels anything that overstays its deadline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::frame::TxFrame;
use crate::link::Link;
use crate::shade::Action;

/// Inter-transmit delays for one burst, giving transmissions at offsets
/// [0, 650, 1500] ms from task start. The first gap stays above the
/// firmware's ~750 ms RF transmit cycle so a follow-up write cannot be
/// coalesced with the cycle still in flight.
pub const BURST_DELAYS_MS: [u64; 2] = [650, 850];

/// Wall-clock cap for a single burst task.
pub const TASK_DEADLINE: Duration = Duration::from_secs(10);

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// A burst task older than this is suspicious (normal duration is under 2 s).
const SUSPECT_AGE: Duration = Duration::from_secs(6);
/// A burst task older than this is a zombie and gets force-cancelled.
const ZOMBIE_AGE: Duration = Duration::from_secs(12);
/// Grace beyond a scene's own timeout before the sweep force-cancels it.
const SCENE_GRACE: Duration = Duration::from_secs(5);
/// Window for the recent-cancellation count in [`TaskStats`].
const RECENT_CANCEL_WINDOW: Duration = Duration::from_secs(300);

#[derive(Debug)]
enum TaskKind {
    Burst { shade_id: u32, action: Action },
    Scene { name: String, deadline: Duration },
}

struct TaskEntry {
    kind: TaskKind,
    cancel: CancellationToken,
    done: CancellationToken,
    started_at: Instant,
    abort: Option<AbortHandle>,
}

#[derive(Default)]
struct State {
    active: HashMap<String, TaskEntry>,
    shade_owners: HashMap<u32, String>,
    cancelled: HashMap<String, Instant>,
    warnings: HashMap<String, Instant>,
    zombies: ZombieStats,
}

/// Zombie-monitoring counters, reset daily.
#[derive(Debug, Clone, Serialize)]
pub struct ZombieStats {
    pub detected: u64,
    pub cleaned: u64,
    pub timeout_kills: u64,
    pub today: u64,
    pub last_reset_date: chrono::NaiveDate,
}

impl Default for ZombieStats {
    fn default() -> Self {
        Self {
            detected: 0,
            cleaned: 0,
            timeout_kills: 0,
            today: 0,
            last_reset_date: chrono::Local::now().date_naive(),
        }
    }
}

/// A task past the suspicious-age threshold, as reported by [`TaskStats`].
#[derive(Debug, Clone, Serialize)]
pub struct SuspiciousTask {
    pub task_id: String,
    pub age_secs: u64,
}

/// Scheduler snapshot for operator surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStats {
    pub total_active_tasks: usize,
    pub active_shade_tasks: usize,
    pub total_cancelled_tasks: usize,
    /// Cancellations within the last five minutes.
    pub recent_cancellations: usize,
    pub active_task_ids: Vec<String>,
    pub shade_task_mapping: HashMap<u32, String>,
    pub suspicious_tasks: Vec<SuspiciousTask>,
    pub oldest_task_age_ms: u64,
    pub active_zombie_warnings: usize,
    pub zombie: ZombieStats,
}

struct Inner {
    link: Arc<dyn Link>,
    state: Mutex<State>,
    counter: AtomicU64,
}

/// Owner of all in-flight background transmission tasks.
#[derive(Clone)]
pub struct RetryScheduler {
    inner: Arc<Inner>,
}

impl RetryScheduler {
    pub fn new(link: Arc<dyn Link>) -> Self {
        Self {
            inner: Arc::new(Inner {
                link,
                state: Mutex::new(State::default()),
                counter: AtomicU64::new(0),
            }),
        }
    }

    fn next_task_id(&self) -> String {
        let n = self.inner.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("t{n}-{}", epoch_ms())
    }

    /// Queue a fire-and-forget burst for the frame's shade.
    ///
    /// Never blocks on the link; returns as soon as the task is registered.
    /// Any task currently owning the shade is displaced first (latest
    /// command wins), inside one critical section so the ownership transfer
    /// is observable atomically.
    pub fn enqueue_shade(&self, frame: TxFrame) -> String {
        let shade_id = frame.shade_id();
        let action = frame.action();
        let task_id = self.next_task_id();
        let cancel = CancellationToken::new();
        let done = CancellationToken::new();

        {
            let mut state = self.inner.state.lock();
            displace_owner(&mut state, shade_id);
            state.active.insert(
                task_id.clone(),
                TaskEntry {
                    kind: TaskKind::Burst { shade_id, action },
                    cancel: cancel.clone(),
                    done: done.clone(),
                    started_at: Instant::now(),
                    abort: None,
                },
            );
            state.shade_owners.insert(shade_id, task_id.clone());
        }

        let inner = Arc::clone(&self.inner);
        let id = task_id.clone();
        let handle = tokio::spawn(async move {
            let _release = ReleaseGuard {
                inner: Arc::clone(&inner),
                task_id: id.clone(),
                shade_id: Some(shade_id),
                done,
            };
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(task = %id, shade_id, "burst cancelled");
                }
                res = tokio::time::timeout(TASK_DEADLINE, run_burst(&inner, &id, &frame)) => {
                    if res.is_err() {
                        inner.state.lock().zombies.timeout_kills += 1;
                        error!(
                            task = %id,
                            shade_id,
                            deadline_secs = TASK_DEADLINE.as_secs(),
                            "burst exceeded its deadline, forcing cleanup"
                        );
                    }
                }
            }
        });
        self.attach_abort(&task_id, handle.abort_handle());

        info!(shade_id, %action, task = %task_id, "queued fire-and-forget burst");
        task_id
    }

    /// Register a scene task and hand its lifecycle objects to the executor.
    ///
    /// The executor spawns the task itself; the returned ticket carries the
    /// release guard that must live inside the spawned future.
    pub(crate) fn register_scene(&self, name: &str, deadline: Duration) -> SceneTicket {
        let task_id = self.next_task_id();
        let cancel = CancellationToken::new();
        let done = CancellationToken::new();

        let mut state = self.inner.state.lock();
        state.active.insert(
            task_id.clone(),
            TaskEntry {
                kind: TaskKind::Scene { name: name.to_owned(), deadline },
                cancel: cancel.clone(),
                done: done.clone(),
                started_at: Instant::now(),
                abort: None,
            },
        );

        SceneTicket {
            task_id: task_id.clone(),
            cancel,
            release: ReleaseGuard {
                inner: Arc::clone(&self.inner),
                task_id,
                shade_id: None,
                done,
            },
        }
    }

    pub(crate) fn attach_abort(&self, task_id: &str, handle: AbortHandle) {
        let mut state = self.inner.state.lock();
        if let Some(entry) = state.active.get_mut(task_id) {
            entry.abort = Some(handle);
        }
    }

    /// Claim shade ownership for a scene step, displacing any current owner.
    pub(crate) fn claim_shade(&self, shade_id: u32, task_id: &str) {
        let mut state = self.inner.state.lock();
        displace_owner(&mut state, shade_id);
        state.shade_owners.insert(shade_id, task_id.to_owned());
    }

    /// Release a scene step's shade registration, if still held.
    pub(crate) fn release_shade(&self, shade_id: u32, task_id: &str) {
        let mut state = self.inner.state.lock();
        if state.shade_owners.get(&shade_id).map(String::as_str) == Some(task_id) {
            state.shade_owners.remove(&shade_id);
        }
    }

    /// Cancel whatever task currently owns the shade. Returns whether a
    /// cancellation occurred.
    pub fn cancel_shade(&self, shade_id: u32) -> bool {
        let mut state = self.inner.state.lock();
        let state = &mut *state;
        let Some(owner_id) = state.shade_owners.remove(&shade_id) else {
            return false;
        };
        match state.active.get(&owner_id) {
            Some(entry) => {
                entry.cancel.cancel();
                state.cancelled.insert(owner_id.clone(), Instant::now());
                info!(shade_id, task = %owner_id, "cancelled task owning shade");
                true
            }
            None => false,
        }
    }

    /// Cancel one task by id. Returns whether the task was found.
    pub fn cancel_task(&self, task_id: &str) -> bool {
        let mut state = self.inner.state.lock();
        let state = &mut *state;
        match state.active.get(task_id) {
            Some(entry) => {
                entry.cancel.cancel();
                state.cancelled.insert(task_id.to_owned(), Instant::now());
                info!(task = %task_id, "cancelled task");
                true
            }
            None => false,
        }
    }

    /// Cancel every active task. Returns the number signalled.
    pub fn cancel_all(&self) -> usize {
        let mut state = self.inner.state.lock();
        let ids: Vec<String> = state.active.keys().cloned().collect();
        for id in &ids {
            if let Some(entry) = state.active.get(id) {
                entry.cancel.cancel();
            }
            state.cancelled.insert(id.clone(), Instant::now());
        }
        if !ids.is_empty() {
            info!(count = ids.len(), "cancelled all active tasks");
        }
        ids.len()
    }

    /// Cancel all active scene tasks (latest scene wins). Returns the count.
    pub fn cancel_scenes(&self) -> usize {
        let mut state = self.inner.state.lock();
        let scene_ids: Vec<String> = state
            .active
            .iter()
            .filter(|(_, e)| matches!(e.kind, TaskKind::Scene { .. }))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &scene_ids {
            if let Some(entry) = state.active.get(id) {
                entry.cancel.cancel();
            }
            state.cancelled.insert(id.clone(), Instant::now());
            info!(task = %id, "cancelled scene task");
        }
        scene_ids.len()
    }

    /// Wait for a task to deregister, up to `timeout`. Returns `true` when
    /// the task finished (or was already gone) within the window.
    pub async fn wait(&self, task_id: &str, timeout: Duration) -> bool {
        let done = {
            let state = self.inner.state.lock();
            match state.active.get(task_id) {
                Some(entry) => entry.done.clone(),
                None => return true,
            }
        };
        tokio::time::timeout(timeout, done.cancelled()).await.is_ok()
    }

    /// Scheduler snapshot for monitoring.
    pub fn stats(&self) -> TaskStats {
        let now = Instant::now();
        let state = self.inner.state.lock();

        let mut suspicious = Vec::new();
        let mut oldest_ms = 0u64;
        for (id, entry) in &state.active {
            let age = now.saturating_duration_since(entry.started_at);
            oldest_ms = oldest_ms.max(age.as_millis() as u64);
            if age > SUSPECT_AGE {
                suspicious.push(SuspiciousTask {
                    task_id: id.clone(),
                    age_secs: age.as_secs(),
                });
            }
        }

        TaskStats {
            total_active_tasks: state.active.len(),
            active_shade_tasks: state.shade_owners.len(),
            total_cancelled_tasks: state.cancelled.len(),
            recent_cancellations: state
                .cancelled
                .values()
                .filter(|at| now.saturating_duration_since(**at) < RECENT_CANCEL_WINDOW)
                .count(),
            active_task_ids: state.active.keys().cloned().collect(),
            shade_task_mapping: state.shade_owners.clone(),
            suspicious_tasks: suspicious,
            oldest_task_age_ms: oldest_ms,
            active_zombie_warnings: state.warnings.len(),
            zombie: state.zombies.clone(),
        }
    }

    /// Spawn the periodic zombie sweep. Runs until `shutdown` fires.
    pub fn spawn_sweeper(&self, shutdown: CancellationToken) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(SWEEP_INTERVAL);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            timer.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = timer.tick() => {}
                }
                scheduler.sweep_now();
            }
        });
    }

    /// One pass of zombie detection and cleanup.
    pub(crate) fn sweep_now(&self) {
        let now = Instant::now();
        let today = chrono::Local::now().date_naive();
        let mut state = self.inner.state.lock();

        if state.zombies.last_reset_date != today {
            if state.zombies.today > 0 {
                info!(
                    yesterday = state.zombies.today,
                    "daily zombie counter reset"
                );
            }
            state.zombies.today = 0;
            state.zombies.last_reset_date = today;
        }

        let mut expired: Vec<String> = Vec::new();
        let mut fresh_suspects: Vec<String> = Vec::new();
        let mut resolved: Vec<String> = Vec::new();

        for (id, entry) in &state.active {
            let age = now.saturating_duration_since(entry.started_at);
            let (suspect_at, zombie_at) = match &entry.kind {
                TaskKind::Burst { .. } => (SUSPECT_AGE, ZOMBIE_AGE),
                // Scene tasks are governed by their own timeout; the sweep
                // only backstops a failed in-task deadline.
                TaskKind::Scene { deadline, .. } => {
                    (*deadline + SCENE_GRACE, *deadline + SCENE_GRACE)
                }
            };

            if age > zombie_at {
                entry.cancel.cancel();
                if let Some(abort) = &entry.abort {
                    abort.abort();
                }
                expired.push(id.clone());
                error!(
                    task = %id,
                    age_secs = age.as_secs(),
                    "zombie task force-cancelled"
                );
            } else if age > suspect_at {
                if !state.warnings.contains_key(id) {
                    fresh_suspects.push(id.clone());
                    warn!(
                        task = %id,
                        age_secs = age.as_secs(),
                        "suspicious task age, will force-cancel if it persists"
                    );
                }
            } else if state.warnings.contains_key(id) {
                resolved.push(id.clone());
            }
        }

        for id in &fresh_suspects {
            state.warnings.insert(id.clone(), now);
            state.zombies.detected += 1;
            state.zombies.today += 1;
        }
        for id in &resolved {
            state.warnings.remove(id);
            info!(task = %id, "suspicious task recovered");
        }
        for id in &expired {
            // The release guard removes the maps entries when the aborted
            // future drops; clear the bookkeeping that should not wait.
            state.warnings.remove(id);
            state.cancelled.insert(id.clone(), now);
            state.zombies.cleaned += 1;
        }

        if !state.warnings.is_empty() {
            warn!(
                active_warnings = state.warnings.len(),
                today = state.zombies.today,
                total_detected = state.zombies.detected,
                "zombie watch status"
            );
        }
    }
}

/// Lifecycle objects for a scene task; see [`RetryScheduler::register_scene`].
pub(crate) struct SceneTicket {
    pub task_id: String,
    pub cancel: CancellationToken,
    pub release: ReleaseGuard,
}

/// Deregisters a task from the scheduler maps when dropped.
///
/// Lives inside the task future so that completion, cancellation, deadline
/// expiry, panic unwinding, and forced aborts all release ownership.
pub(crate) struct ReleaseGuard {
    inner: Arc<Inner>,
    task_id: String,
    shade_id: Option<u32>,
    done: CancellationToken,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.active.remove(&self.task_id);
        state.warnings.remove(&self.task_id);
        if let Some(shade_id) = self.shade_id {
            if state.shade_owners.get(&shade_id).map(String::as_str)
                == Some(self.task_id.as_str())
            {
                state.shade_owners.remove(&shade_id);
            }
        }
        drop(state);
        self.done.cancel();
    }
}

/// Displace the current owner of a shade, if any.
///
/// A burst owner is cancelled outright; a scene owner only loses its shade
/// registration — the scene task keeps running and may re-claim the shade on
/// a later cycle.
fn displace_owner(state: &mut State, shade_id: u32) {
    let Some(owner_id) = state.shade_owners.get(&shade_id).cloned() else {
        return;
    };
    match state.active.get(&owner_id).map(|e| &e.kind) {
        Some(TaskKind::Burst { .. }) => {
            if let Some(entry) = state.active.get(&owner_id) {
                entry.cancel.cancel();
            }
            state.cancelled.insert(owner_id.clone(), Instant::now());
            state.shade_owners.remove(&shade_id);
            info!(shade_id, task = %owner_id, "latest command wins, cancelled previous burst");
        }
        Some(TaskKind::Scene { name, .. }) => {
            info!(shade_id, task = %owner_id, scene = %name, "latest command wins, displaced scene step");
            state.shade_owners.remove(&shade_id);
        }
        None => {
            state.shade_owners.remove(&shade_id);
        }
    }
}

async fn run_burst(inner: &Arc<Inner>, task_id: &str, frame: &TxFrame) {
    let total = BURST_DELAYS_MS.len() + 1;
    transmit(inner, task_id, frame, 1, total).await;
    for (i, delay_ms) in BURST_DELAYS_MS.iter().enumerate() {
        tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
        transmit(inner, task_id, frame, i + 2, total).await;
    }
    debug!(task = %task_id, shade_id = frame.shade_id(), "burst complete");
}

async fn transmit(inner: &Arc<Inner>, task_id: &str, frame: &TxFrame, attempt: usize, total: usize) {
    match inner.link.send_line(frame.as_line(), Duration::ZERO).await {
        Ok(outcome) => {
            debug!(
                task = %task_id,
                attempt,
                total,
                port = outcome.port.as_deref().unwrap_or("-"),
                "burst transmission sent"
            );
        }
        Err(e) => {
            // Silent failure: the burst continues, nothing reaches the caller.
            debug!(task = %task_id, attempt, total, err = %e, "burst transmission failed");
        }
    }
}

/// Current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
