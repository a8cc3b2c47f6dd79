//! Tracing subscriber installation.
//!
//! Events are written as JSON lines with system-time timestamps. The filter
//! comes from `RUST_LOG`; without it everything at `info` and above is kept.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber using `RUST_LOG`.
///
/// Returns `false` when a subscriber was already installed, in which case
/// nothing changes.
pub fn init() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    install(filter)
}

/// Install the global subscriber with an explicit filter directive such as
/// `"comanda_infra=debug,info"`. Invalid directives fall back to `info`.
pub fn init_with_filter(directives: &str) -> bool {
    let filter = EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    install(filter)
}

fn install(filter: EnvFilter) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_current_span(true)
        .with_target(true)
        .try_init()
        .is_ok()
}
