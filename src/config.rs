//! Environment-derived configuration, loaded once at process start.
//!
//! All components receive an explicit [`Config`] reference; nothing reads the
//! environment after startup. Credentials are treated as opaque strings.

use std::env;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::dedup::MatchMode;

/// Compression threshold applied when `CLOUDINARY_MAX_FILE_SIZE` is unset.
/// 8 MB keeps every volume safely under Cloudinary's 10 MB free-tier limit.
pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 8;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Prefix applied to every remote folder argument. May be empty (root).
    pub default_folder: String,
    /// Compression threshold as configured, in megabytes.
    pub max_file_size_mb: u64,
    pub match_mode: MatchMode,
}

impl Config {
    /// Reads configuration from the environment. Fails before any transfer
    /// begins when credentials are missing or a value does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let cloud_name = require("CLOUDINARY_CLOUD_NAME")?;
        let api_key = require("CLOUDINARY_API_KEY")?;
        let api_secret = require("CLOUDINARY_API_SECRET")?;

        let default_folder = env::var("CLOUDINARY_DEFAULT_FOLDER")
            .unwrap_or_default()
            .trim_matches('/')
            .to_string();

        let max_file_size_mb = match env::var("CLOUDINARY_MAX_FILE_SIZE") {
            Ok(raw) => {
                let parsed = raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                    var: "CLOUDINARY_MAX_FILE_SIZE",
                    reason: e.to_string(),
                })?;
                if parsed == 0 {
                    return Err(ConfigError::Invalid {
                        var: "CLOUDINARY_MAX_FILE_SIZE",
                        reason: "must be greater than zero".to_string(),
                    });
                }
                parsed
            }
            Err(_) => DEFAULT_MAX_FILE_SIZE_MB,
        };

        let match_mode = match env::var("CLOUDINARY_MATCH_MODE") {
            Ok(raw) => MatchMode::from(raw.as_str()),
            Err(_) => MatchMode::NameSize,
        };

        if default_folder.is_empty() {
            warn!("CLOUDINARY_DEFAULT_FOLDER not set, operating on the media library root");
        }

        info!(
            cloud_name = %cloud_name,
            default_folder = %default_folder,
            max_file_size_mb,
            ?match_mode,
            "Loaded Cloudinary configuration from environment"
        );

        Ok(Config {
            cloud_name,
            api_key,
            api_secret,
            default_folder,
            max_file_size_mb,
            match_mode,
        })
    }

    /// Compression threshold in bytes. The MB value is converted exactly once
    /// here; downstream components only ever see bytes. Saturates instead of
    /// overflowing on absurd configured values.
    pub fn threshold_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

fn require(var: &'static str) -> Result<String, ConfigError> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => {
            error!(var, "required environment variable missing or empty");
            Err(ConfigError::Missing(var))
        }
    }
}
