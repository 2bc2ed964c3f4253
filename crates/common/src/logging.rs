//! Logging initialization
//!
//! Installs a `tracing` subscriber that writes to systemd's journal when it is
//! reachable and to the console otherwise. `RUST_LOG` takes precedence over the
//! level passed in.

use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging with the given default level
pub fn init_logging(level: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match tracing_journald::layer().ok() {
        Some(journal) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_target(false))
                .with(journal)
                .try_init()?;
            info!("Logging initialized with systemd journald");
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_target(false))
                .try_init()?;
            info!("Logging initialized with console output");
        }
    }

    Ok(())
}
