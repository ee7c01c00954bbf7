//! Provider configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, Result};

/// Credentials forwarded verbatim to the configuration source and the node
/// connections. The password never shows up in `Debug` output.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Settings for [`ConfigurationProvider`](crate::ConfigurationProvider).
///
/// Durations (de)serialize as integer milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// `host:port` of the configuration (REST) service, tried in order.
    pub seeds: Vec<String>,
    pub bucket: String,
    pub credentials: Credentials,
    /// Threshold hits within `reconnect_window` that trigger a full
    /// reconnect from the seed list.
    pub max_config_check: u32,
    #[serde(with = "crate::millis")]
    pub reconnect_window: Duration,
    /// Poll period of the background refresh task when the source cannot
    /// stream configurations.
    #[serde(with = "crate::millis")]
    pub refresh_interval: Duration,
}

impl ProviderSettings {
    pub const DEFAULT_MAX_CONFIG_CHECK: u32 = 10;
    pub const DEFAULT_RECONNECT_WINDOW: Duration = Duration::from_secs(10);
    pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

    /// Settings for the given seed list with default tuning.
    pub fn new<I, S>(seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            seeds: seeds.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_max_config_check(mut self, max: u32) -> Self {
        self.max_config_check = max;
        self
    }

    pub fn with_reconnect_window(mut self, window: Duration) -> Self {
        self.reconnect_window = window;
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.seeds.is_empty() {
            return Err(ProviderError::InvalidSettings("seed list is empty".into()));
        }
        if self.max_config_check == 0 {
            return Err(ProviderError::InvalidSettings(
                "max_config_check must be at least 1".into(),
            ));
        }
        if self.reconnect_window.is_zero() || self.refresh_interval.is_zero() {
            return Err(ProviderError::InvalidSettings(
                "reconnect_window and refresh_interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            seeds: vec!["127.0.0.1:8091".to_string()],
            bucket: "default".to_string(),
            credentials: Credentials::default(),
            max_config_check: Self::DEFAULT_MAX_CONFIG_CHECK,
            reconnect_window: Self::DEFAULT_RECONNECT_WINDOW,
            refresh_interval: Self::DEFAULT_REFRESH_INTERVAL,
        }
    }
}
