//! Logging setup for test binaries.

use std::sync::Once;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Install a `tracing` subscriber once per process.
///
/// `RUST_LOG` wins when set, otherwise `warn,mqkit_admin=debug`. A subscriber that
/// was already installed elsewhere is left in place.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,mqkit_admin=debug"));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init()
            .ok();
    });
}
