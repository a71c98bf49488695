// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;

/// RF command dispatcher for motorized window shades.
#[derive(Debug, Parser)]
#[command(name = "shadecmd", version, about)]
pub struct Config {
    /// Path to the shade database.
    #[arg(long, env = "SHADECMD_DB", default_value = "data/shades.db")]
    pub db: PathBuf,

    /// Directory of scene definition files.
    #[arg(long, env = "SHADECMD_SCENES", default_value = "data/scenes")]
    pub scenes_dir: PathBuf,

    /// Log format (json or text).
    #[arg(long, env = "SHADECMD_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "SHADECMD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.log_format != "json" && self.log_format != "text" {
            anyhow::bail!("--log-format must be 'json' or 'text'");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
