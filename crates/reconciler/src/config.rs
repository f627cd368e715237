//! Reconciler configuration.

use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable naming the receive adapter image.
pub const IMAGE_ENV: &str = "COUCHDB_RA_IMAGE";

/// Configuration for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Container image of the receive adapter.
    pub receive_adapter_image: String,
    /// Delay before retrying a pass that failed with a retryable error.
    pub retry_backoff: Duration,
    /// Requeue converged sources after this long. `None` waits for a change.
    pub resync_period: Option<Duration>,
    /// Deadline for a single pass.
    pub reconcile_timeout: Option<Duration>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            receive_adapter_image: String::new(),
            retry_backoff: Duration::from_secs(5),
            resync_period: None,
            reconcile_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl ReconcilerConfig {
    /// Defaults with the image taken from the environment.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` when the image variable is unset or blank.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` when the image variable is unset or blank.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let image = lookup(IMAGE_ENV)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                Error::invalid_config(format!(
                    "required environment variable '{IMAGE_ENV}' not defined"
                ))
            })?;
        let config = Self {
            receive_adapter_image: image,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the receive adapter image.
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.receive_adapter_image = image.into();
        self
    }

    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` when the image is blank or the retry
    /// backoff is zero.
    pub fn validate(&self) -> Result<()> {
        if self.receive_adapter_image.trim().is_empty() {
            return Err(Error::invalid_config("receive adapter image is required"));
        }
        if self.retry_backoff.is_zero() {
            return Err(Error::invalid_config("retry backoff must be positive"));
        }
        Ok(())
    }
}
