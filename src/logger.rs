use chrono::Local;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%m%dT%H:%M:%S%.3f"))
    }
}

/// Log to stdout and to `log_path`, both filtered by `level`
/// (an `EnvFilter` directive such as `"info,relay=debug"`).
///
/// Keep the returned guard alive for the whole run, dropping it flushes the file writer.
pub fn init(log_path: impl AsRef<Path>, level: &str) -> Result<WorkerGuard, Box<dyn std::error::Error>> {
    let file = std::fs::File::create(log_path)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTimer)
                .with_writer(std::io::stdout)
                .with_filter(tracing_subscriber::EnvFilter::new(level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTimer)
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(tracing_subscriber::EnvFilter::new(level)),
        )
        .try_init()?;

    Ok(guard)
}

/// Stdout-only variant. Returns false if a global subscriber was already set.
pub fn init_stdout(level: &str) -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTimer)
                .with_writer(std::io::stdout)
                .with_filter(tracing_subscriber::EnvFilter::new(level)),
        )
        .try_init()
        .is_ok()
}
