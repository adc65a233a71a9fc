//! Shared startup for the command-line binaries.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use shopsearch_core::config::{Config, Settings};

/// Installs the fmt subscriber. `RUST_LOG` overrides the default level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,lance=warn,lancedb=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Loads and validates settings; `fake` forces the hashing models.
pub fn load_settings(fake: bool) -> anyhow::Result<Settings> {
    let config = Config::load().context("loading configuration")?;
    let mut settings = config.settings().context("validating configuration")?;
    if fake {
        settings.models.use_fake = true;
    }
    Ok(settings)
}
