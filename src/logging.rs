//! Logging setup for the plugin process.
//!
//! All output goes to **stderr**: the host reads the handshake from stdout
//! and collects stderr as the plugin's log stream.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: log filter (e.g. `info`, `rest_api_provider=debug`)
//!
//! ```bash
//! # Show the per-request debug events of the API resource
//! RUST_LOG=rest_api_provider=debug ./rest-api-provider
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn subscriber(default_level: &str) -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry().with(filter(default_level)).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    )
}

/// Install the stderr subscriber, filtering with `RUST_LOG` or `info`.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Like [`init_logging`], with a custom level used when `RUST_LOG` is unset.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    subscriber(default_level).init();
}

/// Try to install the subscriber; returns `false` if one is already set.
pub fn try_init_logging() -> bool {
    subscriber("info").try_init().is_ok()
}
