//! Tracing setup for hosts embedding scopefs

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins over `default_directive`. Returns false when a global
/// subscriber was already installed.
pub fn init_logging(default_directive: &str) -> bool {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
