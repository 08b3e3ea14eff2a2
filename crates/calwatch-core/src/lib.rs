pub mod config;
pub mod error;
pub mod time;

pub use config::{
    AccountsConfig, ChannelsConfig, Config, DatabaseConfig, DedupConfig, GoogleConfig,
    MeetingLinksConfig, ServerConfig, ValidationResult,
};
pub use error::ConfigError;

use anyhow::Result;

/// Initialize the core: tracing/logging for the whole process.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    tracing::info!("Calwatch core initialized");
    Ok(())
}
