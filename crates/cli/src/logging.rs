//! Logging setup for CLI commands and the serve daemon.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Console-only logging for one-shot commands.
pub fn init_cli_logging() {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
    .init();
}

/// Console plus daily-rotated file logging for `serve`.
/// Returns the guard that must be kept alive for the duration of the program.
pub fn init_serve_logging(log_dir: &Path) -> Option<WorkerGuard> {
  if std::fs::create_dir_all(log_dir).is_err() {
    init_cli_logging();
    return None;
  }

  let file_appender = tracing_appender::rolling::daily(log_dir, "letarette.log");
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  let env_filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

  let console_layer = tracing_subscriber::fmt::layer().with_target(true).with_ansi(true);

  let file_layer = tracing_subscriber::fmt::layer()
    .with_target(true)
    .with_ansi(false)
    .with_writer(file_writer);

  tracing_subscriber::registry()
    .with(env_filter)
    .with(console_layer)
    .with(file_layer)
    .init();

  Some(guard)
}
