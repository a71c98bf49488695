// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatcher facade: the caller-facing operations.
//!
//! Validation failures (unknown shade or scene, unconfigured action, store
//! errors) surface synchronously here, before any task is enqueued. Once a
//! task is queued the call has succeeded; transmission outcomes stay
//! internal.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::directory::ShadeDirectory;
use crate::error::Error;
use crate::executor::{SceneExecutor, SceneOverrides, ScenePlan, SceneReceipt};
use crate::frame;
use crate::history::{ExecutionHistory, SceneExecutionLog};
use crate::link::{Link, LinkStatus};
use crate::scene::{SceneDefinition, SceneStore, SceneSummary};
use crate::scheduler::{RetryScheduler, TaskStats};
use crate::shade::{Action, ShadeRecord};

/// Runtime objects for building a [`Commander`].
pub struct CommanderConfig {
    pub directory: Arc<dyn ShadeDirectory>,
    pub link: Arc<dyn Link>,
    pub scene_store: SceneStore,
    pub shutdown: CancellationToken,
}

/// Immediate response to queuing a single-shade command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandReceipt {
    pub accepted: bool,
    pub task_id: String,
    pub shade_id: u32,
    pub action: Action,
}

/// Scene detail for inspection surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct SceneDetail {
    pub scene: SceneDefinition,
    pub estimated_duration_ms: u64,
}

/// The command dispatcher: wires the directory, link, scheduler, and scene
/// executor together behind the caller-facing operations.
pub struct Commander {
    directory: Arc<dyn ShadeDirectory>,
    link: Arc<dyn Link>,
    scheduler: RetryScheduler,
    scenes: SceneExecutor,
}

impl Commander {
    pub fn new(config: CommanderConfig) -> Self {
        let scheduler = RetryScheduler::new(Arc::clone(&config.link));
        scheduler.spawn_sweeper(config.shutdown);
        let history = Arc::new(ExecutionHistory::new());
        let scenes = SceneExecutor::new(
            config.scene_store,
            Arc::clone(&config.directory),
            Arc::clone(&config.link),
            scheduler.clone(),
            history,
        );
        Self {
            directory: config.directory,
            link: config.link,
            scheduler,
            scenes,
        }
    }

    /// Queue a fire-and-forget burst for one shade.
    ///
    /// Validates the shade and action synchronously; returns as soon as the
    /// task is registered. Transmission results are never reported back.
    pub fn send_shade_command(
        &self,
        shade_id: u32,
        action: Action,
    ) -> Result<CommandReceipt, Error> {
        let record = self.directory.lookup(shade_id)?;
        let frame = frame::encode(&record, action)?;
        let task_id = self.scheduler.enqueue_shade(frame);
        Ok(CommandReceipt { accepted: true, task_id, shade_id, action })
    }

    /// Queue a scene for background execution.
    pub fn execute_scene(
        &self,
        name: &str,
        overrides: &SceneOverrides,
    ) -> Result<SceneReceipt, Error> {
        self.scenes.enqueue(name, overrides)
    }

    /// Dry run: the planned sequence, without enqueuing.
    pub fn plan_scene(&self, name: &str, overrides: &SceneOverrides) -> Result<ScenePlan, Error> {
        self.scenes.plan(name, overrides)
    }

    pub fn cancel_shade(&self, shade_id: u32) -> bool {
        self.scheduler.cancel_shade(shade_id)
    }

    pub fn cancel_task(&self, task_id: &str) -> bool {
        self.scheduler.cancel_task(task_id)
    }

    pub fn cancel_all(&self) -> usize {
        self.scheduler.cancel_all()
    }

    /// Wait for a queued task to finish, up to `timeout`.
    pub async fn wait(&self, task_id: &str, timeout: Duration) -> bool {
        self.scheduler.wait(task_id, timeout).await
    }

    pub fn stats(&self) -> TaskStats {
        self.scheduler.stats()
    }

    pub fn list_shades(&self) -> Result<Vec<ShadeRecord>, Error> {
        self.directory.list_all()
    }

    pub fn list_scenes(&self) -> Vec<SceneSummary> {
        self.scenes.store().list()
    }

    pub fn scene_detail(&self, name: &str) -> Result<SceneDetail, Error> {
        let scene = self.scenes.store().load(name)?;
        let estimated_duration_ms = scene.estimated_duration_ms();
        Ok(SceneDetail { scene, estimated_duration_ms })
    }

    /// Recent scene execution logs, newest first, at most 100.
    pub fn scene_history(&self) -> Vec<SceneExecutionLog> {
        self.scenes.history()
    }

    pub fn link_status(&self) -> LinkStatus {
        self.link.status()
    }

    pub async fn probe_link(&self) -> Result<bool, Error> {
        self.link.probe().await
    }

    pub async fn reconnect_link(&self) -> Result<LinkStatus, Error> {
        self.link.reconnect().await
    }

    pub async fn close_link(&self) {
        self.link.close().await;
    }
}

#[cfg(test)]
#[path = "commander_tests.rs"]
mod tests;
