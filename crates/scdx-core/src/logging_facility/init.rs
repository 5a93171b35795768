//! Subscriber setup for binaries and tests embedding the pipeline

use std::sync::Once;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

/// Output style and default verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Text lines, `scdx` crates at debug
    Development,
    /// One JSON object per event, `scdx` crates at info
    Production,
    /// No output; pair with `init_test_capture()`
    Test,
}

impl Profile {
    /// Filter used when `RUST_LOG` is unset
    pub fn default_directive(&self) -> &'static str {
        match self {
            Profile::Development => "scdx=debug",
            Profile::Production => "scdx=info",
            Profile::Test => "scdx=trace",
        }
    }
}

static INIT_ONCE: Once = Once::new();

/// Install the global subscriber for `profile`
///
/// Only the first call has any effect. `RUST_LOG` replaces the profile's
/// filter.
pub fn init(profile: Profile) {
    INIT_ONCE.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(profile.default_directive()));
        match profile {
            Profile::Development => {
                tracing_subscriber::fmt().with_env_filter(filter).init();
            }
            Profile::Production => {
                tracing_subscriber::fmt()
                    .json()
                    .with_current_span(false)
                    .with_env_filter(filter)
                    .init();
            }
            Profile::Test => {
                // try_init: a capture subscriber may already be installed
                let _ = tracing_subscriber::registry().try_init();
            }
        }
    });
}
