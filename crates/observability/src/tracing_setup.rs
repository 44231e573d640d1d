use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::SystemTime;

/// Install the global tracing subscriber: JSON lines to stdout, filtered by
/// `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops (tests share a
/// process).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(SystemTime)
        .with_target(false)
        .try_init();
}
