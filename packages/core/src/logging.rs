use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset. sqlx logs every statement at info.
pub const DEFAULT_FILTER: &str = "info,sqlx=warn,hyper=warn";

/// Initialize structured logging for the application.
///
/// Honours `RUST_LOG`, falling back to [`DEFAULT_FILTER`]. Call once at startup.
pub fn init_logging() {
    init_logging_with(DEFAULT_FILTER);
}

/// Same as [`init_logging`] with a caller-supplied fallback filter.
///
/// A second call is a no-op: the global subscriber can only be set once.
pub fn init_logging_with(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let installed = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .is_ok();

    if installed {
        info!(filter = default_filter, "Logging initialized");
    }
}
