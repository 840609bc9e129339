// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `swagent`: SecureWatch endpoint log-collection agent.

use clap::Parser;
use std::path::PathBuf;
use sw_daemon::Agent;
use tracing::{error, info};

/// Exit codes: 0 normal, 1 failure, 130 on interrupt.
const EXIT_FAILURE: i32 = 1;
const EXIT_INTERRUPT: i32 = 130;

#[derive(Parser)]
#[command(name = "swagent", about = "SecureWatch endpoint log-collection agent", version)]
struct Cli {
    /// Path to the agent configuration file
    #[arg(short, long, default_value = "/etc/securewatch/agent.json")]
    config: PathBuf,

    /// Override the agent id
    #[arg(long)]
    agent_id: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    // Peek at the logging section before the full (validated) load so the
    // subscriber exists for config-load diagnostics.
    let logging = peek_logging_config(&cli.config);
    let _log_guard = sw_daemon::logging::init(cli.verbose, logging.as_ref());

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start runtime: {e}");
            std::process::exit(EXIT_FAILURE);
        }
    };

    let exit_code = runtime.block_on(run(cli));
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> i32 {
    let mut agent = Agent::new(cli.config, cli.agent_id);
    let shutdown = agent.shutdown_signal();

    let interrupted = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    spawn_signal_handler(shutdown.clone(), std::sync::Arc::clone(&interrupted));

    match agent.start().await {
        Ok(()) => {
            if interrupted.load(std::sync::atomic::Ordering::Relaxed) {
                EXIT_INTERRUPT
            } else {
                0
            }
        }
        Err(e) => {
            error!(error = %e, "agent failed");
            EXIT_FAILURE
        }
    }
}

/// Interrupt and termination both trigger graceful shutdown; interrupt is
/// remembered for the 130 exit code.
fn spawn_signal_handler(
    shutdown: sw_core::ShutdownSignal,
    interrupted: std::sync::Arc<std::sync::atomic::AtomicBool>,
) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut terminate = match signal(SignalKind::terminate()) {
                Ok(terminate) => terminate,
                Err(e) => {
                    error!(error = %e, "failed to install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received, shutting down");
                    interrupted.store(true, std::sync::atomic::Ordering::Relaxed);
                }
                _ = terminate.recv() => {
                    info!("termination signal received, shutting down");
                }
            }
        }
        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                interrupted.store(true, std::sync::atomic::Ordering::Relaxed);
            }
        }
        shutdown.trigger();
    });
}

fn peek_logging_config(path: &std::path::Path) -> Option<sw_config::LoggingConfig> {
    let raw = std::fs::read_to_string(path).ok()?;
    let doc: serde_json::Value = serde_json::from_str(&raw).ok()?;
    serde_json::from_value(doc.get("logging")?.clone()).ok()
}
