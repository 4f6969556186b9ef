use std::path::Path;
use tracing_appender::rolling;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE: &str = "structmerge.log";

/// Initialize logging to `<log_dir>/structmerge.log` and stderr.
///
/// `RUST_LOG` takes precedence over `default_filter`. Stdout is left alone
/// so merged output can be piped. The returned guard must be held until
/// exit or buffered lines are lost.
pub fn init_logging(
    log_dir: &Path,
    default_filter: &str,
) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = rolling::never(log_dir, LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;

    Ok(guard)
}
