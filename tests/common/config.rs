//! Test configuration helpers for loading .env credentials and building archivers

use std::path::Path;

use discord_archive::config::{ApiConfig, ExportConfig};
use discord_archive::{Archiver, Config};

/// Error type for test configuration
#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Credentials for the live service
pub struct LiveCredentials {
    /// Bot or user token
    pub token: String,
    /// Index of the guild to archive, as printed by `list`
    pub guild_index: String,
}

/// Load live credentials from environment variables
///
/// Required environment variables:
/// - `DISCORD_TOKEN` - Token to log in with
///
/// Optional environment variables:
/// - `DISCORD_GUILD_INDEX` - Guild to archive (default: 0)
pub fn load_live_credentials() -> Result<LiveCredentials, ConfigError> {
    dotenvy::dotenv().ok();

    let token = std::env::var("DISCORD_TOKEN")
        .map_err(|_| ConfigError("DISCORD_TOKEN not set in environment".to_string()))?;

    let guild_index = std::env::var("DISCORD_GUILD_INDEX").unwrap_or_else(|_| "0".to_string());

    Ok(LiveCredentials { token, guild_index })
}

/// Check if live credentials are available
pub fn has_live_credentials() -> bool {
    load_live_credentials().is_ok()
}

/// Configuration pointing at `base_url` and writing archives into `output_dir`
pub fn test_config(base_url: &str, output_dir: &Path) -> Config {
    Config {
        api: ApiConfig {
            base_url: base_url.to_string(),
            ..ApiConfig::default()
        },
        export: ExportConfig {
            output_dir: output_dir.to_path_buf(),
            ..ExportConfig::default()
        },
    }
}

/// Archiver for [`test_config`]
pub fn test_archiver(base_url: &str, output_dir: &Path) -> Archiver {
    Archiver::new(test_config(base_url, output_dir)).expect("valid test config")
}
