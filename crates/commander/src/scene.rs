// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scene definitions and the file-backed scene store.
//!
//! One JSON document per scene, keyed by file stem. The store is read-only;
//! loading validates the document against the bounds below.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Error;
use crate::shade::Action;

/// Upper bound on scene retry cycles beyond the first.
pub const MAX_RETRY_COUNT: u32 = 5;
/// Process-wide ceiling on a scene's total timeout.
pub const MAX_TIMEOUT_SECS: u64 = 300;

/// One step of a scene: command a shade, then wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneStep {
    pub shade_id: u32,
    pub action: Action,
    /// Delay after this step in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_delay_ms() -> u64 {
    1000
}

/// A named, ordered choreography of shade commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneDefinition {
    pub name: String,
    pub description: String,
    pub commands: Vec<SceneStep>,
    /// Extra execution cycles beyond the first (0–5).
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Total timeout for scene execution in seconds (1–300).
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_retry_count() -> u32 {
    2
}

fn default_timeout_seconds() -> u64 {
    30
}

impl SceneDefinition {
    /// Validate bounds; returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.commands.is_empty() {
            return Err("scene must have at least one command".to_owned());
        }
        if self.retry_count > MAX_RETRY_COUNT {
            return Err(format!(
                "retry_count {} exceeds maximum {MAX_RETRY_COUNT}",
                self.retry_count
            ));
        }
        if self.timeout_seconds < 1 || self.timeout_seconds > MAX_TIMEOUT_SECS {
            return Err(format!(
                "timeout_seconds {} outside 1..={MAX_TIMEOUT_SECS}",
                self.timeout_seconds
            ));
        }
        Ok(())
    }

    /// Rough execution time estimate: step delays plus a base cost per step.
    pub fn estimated_duration_ms(&self) -> u64 {
        let delays: u64 = self.commands.iter().map(|c| c.delay_ms).sum();
        delays + self.commands.len() as u64 * 500
    }
}

/// Summary row for scene listings.
#[derive(Debug, Clone, Serialize)]
pub struct SceneSummary {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub command_count: usize,
    pub estimated_duration_ms: u64,
}

/// File-backed scene store: `<dir>/<name>.json` per scene.
pub struct SceneStore {
    dir: PathBuf,
}

impl SceneStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load and validate one scene by name.
    pub fn load(&self, name: &str) -> Result<SceneDefinition, Error> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(Error::SceneNotFound { scene: name.to_owned() });
        }
        let path = self.dir.join(format!("{name}.json"));
        if !path.exists() {
            return Err(Error::SceneNotFound { scene: name.to_owned() });
        }
        let text = std::fs::read_to_string(&path).map_err(|e| Error::StoreUnavailable {
            reason: format!("{}: {e}", path.display()),
        })?;
        let scene: SceneDefinition =
            serde_json::from_str(&text).map_err(|e| Error::SceneInvalid {
                scene: name.to_owned(),
                reason: e.to_string(),
            })?;
        scene.validate().map_err(|reason| Error::SceneInvalid {
            scene: name.to_owned(),
            reason,
        })?;
        Ok(scene)
    }

    /// Names of every scene document present, sorted. A missing directory is
    /// an empty store, not an error.
    pub fn names(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|e| {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    path.file_stem().map(|s| s.to_string_lossy().into_owned())
                } else {
                    None
                }
            })
            .collect();
        names.sort();
        names
    }

    /// Summaries of every loadable scene; unloadable documents are skipped
    /// with a warning.
    pub fn list(&self) -> Vec<SceneSummary> {
        let mut out = Vec::new();
        for name in self.names() {
            match self.load(&name) {
                Ok(scene) => out.push(SceneSummary {
                    name,
                    display_name: scene.name.clone(),
                    description: scene.description.clone(),
                    command_count: scene.commands.len(),
                    estimated_duration_ms: scene.estimated_duration_ms(),
                }),
                Err(e) => {
                    warn!(scene = %name, err = %e, "skipping unloadable scene");
                }
            }
        }
        out
    }
}

#[cfg(test)]
#[path = "scene_tests.rs"]
mod tests;
