//! Configuration types for discord-archive

use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

use crate::error::{Error, Result};

/// Largest page the Discord messages endpoint will return
pub const MAX_PAGE_SIZE: usize = 100;

/// Remote service settings
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the REST API (default: "https://discord.com/api/v9")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Export pipeline settings (pagination, concurrency, output)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Messages requested per page (default: 100, the service maximum)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Maximum channels exported at the same time (default: 4)
    ///
    /// Every selected channel still gets its own task; this only bounds how
    /// many of them are paginating at any instant.
    #[serde(default = "default_max_concurrent_channels")]
    pub max_concurrent_channels: usize,

    /// Capacity of the command channel feeding the archive writer (default: 64)
    #[serde(default = "default_writer_buffer")]
    pub writer_buffer: usize,

    /// Directory archive files are created in (default: ".")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Directory for per-entry spool files (None = system temp directory)
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,

    /// Only list and archive text-based channels (default: true)
    ///
    /// Voice channels and categories carry no message history and would make
    /// an "all channels" export fail.
    #[serde(default = "default_true")]
    pub text_channels_only: bool,

    /// Keep the archive file on disk when an export fails (default: false).
    ///
    /// A kept file is empty; it is never a readable zip.
    #[serde(default)]
    pub keep_partial: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_concurrent_channels: default_max_concurrent_channels(),
            writer_buffer: default_writer_buffer(),
            output_dir: default_output_dir(),
            spool_dir: None,
            text_channels_only: true,
            keep_partial: false,
        }
    }
}

/// Main configuration for discord-archive
///
/// Every field has a default, so an empty JSON object is a valid config file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote service settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Export pipeline settings
    #[serde(default)]
    pub export: ExportConfig,
}

impl Config {
    /// Load configuration from a JSON file and validate it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.export.page_size == 0 || self.export.page_size > MAX_PAGE_SIZE {
            return Err(Error::config(
                "export.page_size",
                format!("must be between 1 and {MAX_PAGE_SIZE}"),
            ));
        }
        if self.export.max_concurrent_channels == 0 {
            return Err(Error::config(
                "export.max_concurrent_channels",
                "must be at least 1",
            ));
        }
        if self.export.writer_buffer == 0 {
            return Err(Error::config("export.writer_buffer", "must be at least 1"));
        }
        if url::Url::parse(&self.api.base_url).is_err() {
            return Err(Error::config(
                "api.base_url",
                format!("{:?} is not a valid URL", self.api.base_url),
            ));
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "https://discord.com/api/v9".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("discord-archive/{}", env!("CARGO_PKG_VERSION"))
}

fn default_page_size() -> usize {
    MAX_PAGE_SIZE
}

fn default_max_concurrent_channels() -> usize {
    4
}

fn default_writer_buffer() -> usize {
    64
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
