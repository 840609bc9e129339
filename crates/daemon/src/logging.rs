// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracing subscriber setup for the agent binary.

use sw_config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// Level comes from `RUST_LOG` when set, otherwise the config `logging.level`
/// (`--verbose` forces debug). When `logging.file_path` is configured, output
/// additionally goes to a non-blocking file appender; the returned guard must
/// stay alive for the lifetime of the process.
pub fn init(
    verbose: bool,
    logging: Option<&LoggingConfig>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let default_level = if verbose {
        "debug".to_string()
    } else {
        logging
            .map(|l| l.level.to_lowercase())
            .map(|level| match level.as_str() {
                "warning" => "warn".to_string(),
                "critical" => "error".to_string(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| "info".to_string())
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_path = logging.and_then(|l| l.file_path.clone());
    match file_path {
        Some(path) => {
            let directory = path.parent().map(|p| p.to_path_buf()).unwrap_or_default();
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "agent.log".to_string());
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}
