//! Store configuration.
//!
//! Values validate via [`StoreConfig::validate`] before the store opens;
//! a store never runs with an out-of-range configuration.

use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::cursor::HMAC_KEY_LENGTH;

/// Hard upper bound on any page size.
const PAGE_SIZE_CEILING: usize = 1000;

/// Configuration validation error.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[snafu(display("invalid config: {message}"))]
    Validation {
        /// Description of the validation failure.
        message: String,
    },
}

/// Configuration for a [`LedgerStore`](crate::LedgerStore).
#[derive(Debug, Clone, bon::Builder, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Page size used when a request does not specify one.
    #[serde(default = "default_page_size")]
    #[builder(default = default_page_size())]
    pub default_page_size: usize,

    /// Largest page size a request may ask for; larger limits are clamped.
    #[serde(default = "max_page_size")]
    #[builder(default = max_page_size())]
    pub max_page_size: usize,

    /// Fixed HMAC key for pagination cursors.
    ///
    /// When absent, a random key is generated at store open and cursors
    /// only stay valid within that process.
    #[serde(default)]
    pub cursor_key: Option<[u8; HMAC_KEY_LENGTH]>,
}

fn default_page_size() -> usize {
    20
}

fn max_page_size() -> usize {
    100
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: max_page_size(),
            cursor_key: None,
        }
    }
}

impl StoreConfig {
    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` when a value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_page_size == 0 {
            return Err(ConfigError::Validation {
                message: "default_page_size must be at least 1".to_string(),
            });
        }
        if self.max_page_size < self.default_page_size {
            return Err(ConfigError::Validation {
                message: format!(
                    "max_page_size ({}) must be >= default_page_size ({})",
                    self.max_page_size, self.default_page_size
                ),
            });
        }
        if self.max_page_size > PAGE_SIZE_CEILING {
            return Err(ConfigError::Validation {
                message: format!(
                    "max_page_size ({}) must be <= {PAGE_SIZE_CEILING}",
                    self.max_page_size
                ),
            });
        }
        Ok(())
    }
}
