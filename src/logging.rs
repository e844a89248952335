use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "GRAPHQA_LOG";

/// Installs a stderr subscriber. `level` overrides `GRAPHQA_LOG`; without
/// either only warnings are shown. A second call is a no-op.
pub fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(format!("graphqa={level}")),
        None => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("graphqa=warn")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
