//! Log subscriber setup for the `harvit` binary.
//!
//! The library only emits `tracing` events; nothing is printed unless a
//! subscriber is installed, which is the binary's job.

use tracing_subscriber::EnvFilter;

use crate::config::Settings;

/// Filter used when neither `RUST_LOG` nor `HARVIT_LOG` is set.
pub fn default_directive(debug: bool) -> &'static str {
    if debug {
        "harvit=debug"
    } else {
        "harvit=info"
    }
}

/// Resolve the log filter: `RUST_LOG`, then `HARVIT_LOG`, then the default.
pub fn filter(settings: &Settings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| {
            settings
                .log_filter
                .as_deref()
                .and_then(|directives| EnvFilter::try_new(directives).ok())
        })
        .unwrap_or_else(|| EnvFilter::new(default_directive(settings.debug)))
}

/// Install a stderr subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(settings: &Settings) {
    let result = tracing_subscriber::fmt()
        .with_env_filter(filter(settings))
        .with_writer(std::io::stderr)
        .with_target(settings.debug)
        .try_init();

    if result.is_err() {
        tracing::debug!("log subscriber already installed");
    }
}
