//! Tracing subscriber setup

use tracing::{debug, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

/// Install the global fmt subscriber
///
/// `RUST_LOG` takes precedence over `verbose`. Calling this twice leaves the
/// first subscriber in place.
pub fn init_logging(verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let stderr_layer = fmt::layer()
        .compact()
        .with_target(verbose)
        .with_thread_names(verbose)
        .with_writer(std::io::stderr);

    if let Err(error) = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init()
    {
        warn!(%error, "global tracing subscriber already initialized");
    } else {
        debug!(verbose, "tracing initialized");
    }
}
