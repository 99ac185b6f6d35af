use tracing_subscriber::{EnvFilter, fmt};

/// Installs a console subscriber at `min_level` (`RUST_LOG` takes precedence).
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_logging(min_level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(min_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(false).try_init().is_ok()
}
