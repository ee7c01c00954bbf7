//! Client configuration.

use std::time::Duration;

use durability::{DurabilityRequirement, ObserveSettings};
use provider::ProviderSettings;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Everything the client needs, passed explicitly to
/// [`Client::connect`](crate::Client::connect).
///
/// Durations (de)serialize as integer milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub provider: ProviderSettings,
    /// Bound on one keyed operation, retries included.
    #[serde(with = "provider::millis")]
    pub operation_timeout: Duration,
    /// Applied to writes that do not name a requirement of their own.
    pub default_durability: DurabilityRequirement,
    /// Reroutes allowed per operation after ownership mismatches, missing
    /// owners or unreachable nodes.
    pub max_retries: u32,
    /// Pause before re-resolving a partition that had no active owner.
    #[serde(with = "provider::millis")]
    pub no_owner_backoff: Duration,
    #[serde(with = "provider::millis")]
    pub observe_interval: Duration,
    #[serde(with = "provider::millis")]
    pub observe_max_interval: Duration,
    /// How long shutdown waits for in-flight operations before aborting them.
    #[serde(with = "provider::millis")]
    pub shutdown_grace: Duration,
}

impl Settings {
    pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_millis(2500);
    pub const DEFAULT_MAX_RETRIES: u32 = 10;
    pub const DEFAULT_NO_OWNER_BACKOFF: Duration = Duration::from_millis(100);
    pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

    pub fn new(provider: ProviderSettings) -> Self {
        Self {
            provider,
            ..Self::default()
        }
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_default_durability(mut self, requirement: DurabilityRequirement) -> Self {
        self.default_durability = requirement;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_no_owner_backoff(mut self, backoff: Duration) -> Self {
        self.no_owner_backoff = backoff;
        self
    }

    pub fn with_observe_intervals(mut self, interval: Duration, max_interval: Duration) -> Self {
        self.observe_interval = interval;
        self.observe_max_interval = max_interval;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn observe(&self) -> ObserveSettings {
        ObserveSettings {
            interval: self.observe_interval,
            max_interval: self.observe_max_interval,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.provider.validate()?;
        if self.operation_timeout.is_zero() {
            return Err(ClientError::InvalidSettings(
                "operation_timeout must be non-zero".into(),
            ));
        }
        if self.observe_interval.is_zero() || self.observe_max_interval < self.observe_interval {
            return Err(ClientError::InvalidSettings(
                "observe_interval must be non-zero and at most observe_max_interval".into(),
            ));
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        let observe = ObserveSettings::default();
        Self {
            provider: ProviderSettings::default(),
            operation_timeout: Self::DEFAULT_OPERATION_TIMEOUT,
            default_durability: DurabilityRequirement::NONE,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            no_owner_backoff: Self::DEFAULT_NO_OWNER_BACKOFF,
            observe_interval: observe.interval,
            observe_max_interval: observe.max_interval,
            shutdown_grace: Self::DEFAULT_SHUTDOWN_GRACE,
        }
    }
}
