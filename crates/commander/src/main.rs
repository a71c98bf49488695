// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use commander::commander::{Commander, CommanderConfig};
use commander::config::Config;
use commander::directory::SqliteDirectory;
use commander::executor::SceneOverrides;
use commander::link::SerialLink;
use commander::scene::SceneStore;
use commander::scheduler::TASK_DEADLINE;
use commander::shade::Action;

#[derive(Parser)]
#[command(name = "shadecmd", version, about = "RF command dispatcher for motorized window shades.")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Send a single shade command and wait for the burst to finish.
    Send {
        shade_id: u32,
        /// u (raise), d (lower), or s (stop).
        action: Action,
    },
    /// Execute a scene.
    Scene {
        name: String,
        /// Override the scene's retry-cycle count.
        #[arg(long)]
        retries: Option<u32>,
        /// Override the scene's timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,
        /// Print the planned sequence without transmitting.
        #[arg(long)]
        dry_run: bool,
    },
    /// List configured shades.
    Shades,
    /// List available scenes.
    Scenes,
    /// Auto-detect and bind the controller.
    Detect,
    /// Show link status.
    Status,
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone()));
    if config.log_format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{text}");
            0
        }
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }
    init_tracing(&cli.config);

    let commander = Commander::new(CommanderConfig {
        directory: Arc::new(SqliteDirectory::new(&cli.config.db)),
        link: Arc::new(SerialLink::new()),
        scene_store: SceneStore::new(&cli.config.scenes_dir),
        shutdown: CancellationToken::new(),
    });

    let code = run(&commander, cli.command).await;
    std::process::exit(code);
}

async fn run(commander: &Commander, command: Commands) -> i32 {
    match command {
        Commands::Send { shade_id, action } => match commander.send_shade_command(shade_id, action)
        {
            Ok(receipt) => {
                let code = print_json(&receipt);
                // Hold the process open until the burst completes.
                commander
                    .wait(&receipt.task_id, TASK_DEADLINE + Duration::from_secs(2))
                    .await;
                code
            }
            Err(e) => {
                eprintln!("error: {e}");
                1
            }
        },
        Commands::Scene { name, retries, timeout, dry_run } => {
            let overrides = SceneOverrides { retry_count: retries, timeout_seconds: timeout };
            if dry_run {
                return match commander.plan_scene(&name, &overrides) {
                    Ok(plan) => print_json(&plan),
                    Err(e) => {
                        eprintln!("error: {e}");
                        1
                    }
                };
            }
            match commander.execute_scene(&name, &overrides) {
                Ok(receipt) => {
                    let code = print_json(&receipt);
                    let grace = Duration::from_secs(receipt.timeout_seconds + 2);
                    commander.wait(&receipt.task_id, grace).await;
                    code
                }
                Err(e) => {
                    eprintln!("error: {e}");
                    1
                }
            }
        }
        Commands::Shades => match commander.list_shades() {
            Ok(shades) => print_json(&shades),
            Err(e) => {
                eprintln!("error: {e}");
                1
            }
        },
        Commands::Scenes => print_json(&commander.list_scenes()),
        Commands::Detect => match commander.reconnect_link().await {
            Ok(status) => print_json(&status),
            Err(e) => {
                eprintln!("error: {e}");
                1
            }
        },
        Commands::Status => print_json(&commander.link_status()),
    }
}
