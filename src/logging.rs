use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "markerflow=info";

/// Initializes console logging, plus a daily JSON log file when `log_dir` is given.
///
/// The returned guard flushes the file writer when dropped; keep it alive for the
/// whole run.
pub fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let (file_layer, guard) = match log_dir.and_then(|dir| fs::create_dir_all(dir).ok().map(|_| dir)) {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "markerflow.log");
            let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer().json().with_writer(non_blocking_writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();
    if installed.is_err() {
        // a subscriber is already installed (tests, embedding programs)
        return None;
    }
    guard
}
