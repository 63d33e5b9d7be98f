use once_cell::sync::OnceCell;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

// Keeps the non-blocking writer flushing for the process lifetime.
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Initialise logging. With `debug` the default level is `debug` and the
/// `RUST_LOG` environment variable may override it; otherwise the level is
/// forced to `info` so a stray environment variable cannot turn on verbose
/// output. When `log_file` is set, output goes there instead of stderr.
pub fn init(debug: bool, log_file: Option<PathBuf>) {
    let level = if debug { "debug" } else { "info" };

    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    } else {
        EnvFilter::new(level)
    };

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path);
            match file {
                Ok(file) => {
                    let (writer, guard) = tracing_appender::non_blocking(file);
                    let _ = FILE_GUARD.set(guard);
                    let _ = tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_writer(writer)
                        .with_ansi(false)
                        .try_init();
                }
                Err(err) => {
                    eprintln!("failed to open log file {}: {err}", path.display());
                    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
                }
            }
        }
        None => {
            let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        }
    }
}
